//! Robust linear models
//!
//! [`lm_robust`] fits ordinary (or weighted) least squares and attaches a
//! heteroskedasticity- or cluster-robust coefficient table. Inputs are
//! carried by [`ModelData`]; estimator choices by [`LmRobustOptions`].
//!
//! ```rust
//! use design_regression::{lm_robust, LmRobustOptions, ModelData};
//! use nalgebra::{DMatrix, DVector};
//!
//! let x = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
//! let y = DVector::from_vec(vec![5.0, 3.0, 7.0, 1.0]);
//! let data = ModelData::new(x, y).unwrap();
//!
//! let fit = lm_robust(&data, &LmRobustOptions::default()).unwrap();
//! let slope = fit.table.get(1).unwrap();
//! assert!((slope.estimate.unwrap() - 4.0).abs() < 1e-10);
//! ```

use crate::cluster::{cluster_vcov, ClusterType};
use crate::hc::{heteroskedastic_vcov, residual_df, HcType};
use crate::solver::{solve, LeastSquares, RankDeficiency, SolverAlgorithm};
use crate::variance::VarianceType;
use design_core::error::{check_finite, check_len};
use design_core::{CoefficientEstimate, CoefficientTable, ConfidenceLevel, Error, Grouping, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use tracing::{debug, instrument};

/// Numeric inputs of a linear model
#[derive(Debug, Clone)]
pub struct ModelData {
    x: DMatrix<f64>,
    y: DVector<f64>,
    terms: Vec<String>,
    weights: Option<Vec<f64>>,
    clusters: Option<Grouping>,
}

impl ModelData {
    /// Outcome `y` regressed on the columns of `x`
    ///
    /// Terms default to `(Intercept)` for a column of ones and `x{j}`
    /// (1-based) otherwise.
    pub fn new(x: DMatrix<f64>, y: DVector<f64>) -> Result<Self> {
        check_len(y.len(), x.nrows(), "outcome vector")?;
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(Error::empty_input("design matrix"));
        }
        let terms = (0..x.ncols())
            .map(|j| {
                if x.column(j).iter().all(|&v| v == 1.0) {
                    "(Intercept)".to_string()
                } else {
                    format!("x{}", j + 1)
                }
            })
            .collect();
        Ok(Self {
            x,
            y,
            terms,
            weights: None,
            clusters: None,
        })
    }

    /// Build a model from named columns, optionally prepending an intercept
    pub fn from_columns(columns: &[(&str, &[f64])], y: &[f64], intercept: bool) -> Result<Self> {
        let n = y.len();
        let k = columns.len() + usize::from(intercept);
        let mut x = DMatrix::zeros(n, k);
        let mut terms = Vec::with_capacity(k);
        let mut col = 0;
        if intercept {
            x.column_mut(0).fill(1.0);
            terms.push("(Intercept)".to_string());
            col = 1;
        }
        for (name, values) in columns {
            check_len(values.len(), n, name)?;
            x.set_column(col, &DVector::from_column_slice(values));
            terms.push((*name).to_string());
            col += 1;
        }
        Self::new(x, DVector::from_column_slice(y))?.with_terms(terms)
    }

    /// Override the term names
    pub fn with_terms(mut self, terms: Vec<String>) -> Result<Self> {
        check_len(terms.len(), self.x.ncols(), "term names")?;
        self.terms = terms;
        Ok(self)
    }

    /// Attach observation weights; all must be finite and strictly positive
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        check_len(weights.len(), self.x.nrows(), "weights")?;
        check_finite(&weights, "weights")?;
        if let Some(bad) = weights.iter().find(|&&w| w <= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "weights must be strictly positive, found {bad}"
            )));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Attach a cluster partition of the rows
    pub fn with_clusters(mut self, clusters: Grouping) -> Result<Self> {
        clusters.check_units(self.x.nrows(), "cluster labels")?;
        self.clusters = Some(clusters);
        Ok(self)
    }

    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn clusters(&self) -> Option<&Grouping> {
        self.clusters.as_ref()
    }

    pub fn nobs(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Whether some column is constant and nonzero
    pub fn has_intercept(&self) -> bool {
        (0..self.x.ncols()).any(|j| is_constant_column(&self.x, j))
    }
}

fn is_constant_column(x: &DMatrix<f64>, j: usize) -> bool {
    let first = x[(0, j)];
    first != 0.0 && x.column(j).iter().all(|&v| v == first)
}

/// Options for [`lm_robust`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmRobustOptions {
    /// Variance estimator; `None` picks HC2 or CR2 depending on clusters
    pub se_type: Option<VarianceType>,
    pub confidence_level: ConfidenceLevel,
    pub algorithm: SolverAlgorithm,
    /// Keep the variance-covariance matrix in the result
    pub return_vcov: bool,
}

impl Default for LmRobustOptions {
    fn default() -> Self {
        Self {
            se_type: None,
            confidence_level: ConfidenceLevel::default(),
            algorithm: SolverAlgorithm::default(),
            return_vcov: true,
        }
    }
}

impl LmRobustOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_se_type(mut self, se_type: VarianceType) -> Self {
        self.se_type = Some(se_type);
        self
    }

    pub fn with_confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_algorithm(mut self, algorithm: SolverAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_return_vcov(mut self, return_vcov: bool) -> Self {
        self.return_vcov = return_vcov;
        self
    }

    /// Fit a model with these options
    pub fn fit(&self, data: &ModelData) -> Result<LmRobustFit> {
        lm_robust(data, self)
    }
}

/// Robust Wald F test that all non-intercept coefficients are zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FStatistic {
    pub value: f64,
    pub numdf: f64,
    pub dendf: f64,
    pub p_value: Option<f64>,
}

/// Result of a robust linear fit
#[derive(Debug, Clone)]
pub struct LmRobustFit {
    /// One row per column of X; dropped columns have no estimate
    pub table: CoefficientTable,
    /// Variance matrix over the retained terms
    pub vcov: Option<DMatrix<f64>>,
    /// Names of the rows/columns of `vcov`
    pub vcov_terms: Vec<String>,
    /// Weighted residual variance `Σwe²/(N−r)`
    pub res_var: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: Option<FStatistic>,
    /// Fitted values on the original scale
    pub fitted: DVector<f64>,
    /// `y − fitted` on the original scale
    pub residuals: DVector<f64>,
    pub rank: usize,
    pub nobs: usize,
    pub n_clusters: Option<usize>,
    pub se_type: VarianceType,
    pub rank_deficiency: Option<RankDeficiency>,
}

impl LmRobustFit {
    /// Row for a named term
    pub fn coefficient(&self, term: &str) -> Option<&CoefficientEstimate> {
        self.table.term(term)
    }

    /// Residual degrees of freedom `N − r`
    pub fn df_residual(&self) -> f64 {
        self.nobs as f64 - self.rank as f64
    }
}

/// Variance and per-coefficient df over the retained terms
struct VarianceEstimate {
    vcov: DMatrix<f64>,
    df: Vec<f64>,
    n_clusters: Option<usize>,
}

/// Fit a linear model with robust standard errors
#[instrument(skip(data, options), fields(n = data.nobs(), k = data.ncols(), clustered = data.clusters().is_some()))]
pub fn lm_robust(data: &ModelData, options: &LmRobustOptions) -> Result<LmRobustFit> {
    let clustered = data.clusters.is_some();
    let se_type = options
        .se_type
        .unwrap_or_else(|| VarianceType::default_for(clustered));
    se_type.check_compatible(clustered)?;
    debug!("lm_robust with se_type {}", se_type);

    let (xw, yw) = match &data.weights {
        Some(w) => sqrt_weighted(&data.x, &data.y, w),
        None => (data.x.clone(), data.y.clone()),
    };
    let ls = solve(&xw, &yw, options.algorithm)?;

    let variance = match (&data.clusters, se_type) {
        (_, VarianceType::None) => None,
        (Some(clusters), _) => {
            let cluster_type = match se_type {
                VarianceType::CR0 => ClusterType::CR0,
                VarianceType::Stata => ClusterType::Stata,
                _ => ClusterType::CR2,
            };
            let cv = cluster_vcov(&ls, clusters, cluster_type)?;
            Some(VarianceEstimate {
                vcov: cv.vcov,
                df: cv.df,
                n_clusters: Some(cv.n_clusters),
            })
        }
        (None, _) => {
            let hc_type = match se_type {
                VarianceType::Classical => HcType::Classical,
                VarianceType::HC0 => HcType::HC0,
                VarianceType::HC1 | VarianceType::Stata => HcType::HC1,
                VarianceType::HC3 => HcType::HC3,
                _ => HcType::HC2,
            };
            Some(VarianceEstimate {
                vcov: heteroskedastic_vcov(&ls, hc_type),
                df: vec![residual_df(&ls); ls.rank()],
                n_clusters: None,
            })
        }
    };

    let table = coefficient_table(data, &ls, variance.as_ref(), options.confidence_level);
    let fitted = original_scale_fit(&data.x, &ls);
    let residuals = &data.y - &fitted;
    let intercept = data.has_intercept();
    let (r_squared, adj_r_squared) = r_squared(data, &residuals, ls.rank(), intercept);
    let res_var = ls.residuals().norm_squared() / residual_df(&ls);

    let f_statistic = variance.as_ref().and_then(|v| {
        let dendf = match v.n_clusters {
            Some(s) => s as f64 - 1.0,
            None => residual_df(&ls),
        };
        wald_f(data, &ls, &v.vcov, intercept, dendf)
    });

    let vcov_terms = ls.kept().iter().map(|&j| data.terms[j].clone()).collect();
    let n_clusters = variance.as_ref().and_then(|v| v.n_clusters);

    Ok(LmRobustFit {
        table,
        vcov: variance.filter(|_| options.return_vcov).map(|v| v.vcov),
        vcov_terms,
        res_var,
        r_squared,
        adj_r_squared,
        f_statistic,
        fitted,
        residuals,
        rank: ls.rank(),
        nobs: ls.nobs(),
        n_clusters,
        se_type,
        rank_deficiency: ls.rank_deficiency(),
    })
}

fn sqrt_weighted(x: &DMatrix<f64>, y: &DVector<f64>, weights: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let mut xw = x.clone();
    let mut yw = y.clone();
    for (i, w) in weights.iter().enumerate() {
        let sw = w.sqrt();
        for j in 0..xw.ncols() {
            xw[(i, j)] *= sw;
        }
        yw[i] *= sw;
    }
    (xw, yw)
}

fn coefficient_table(
    data: &ModelData,
    ls: &LeastSquares,
    variance: Option<&VarianceEstimate>,
    level: ConfidenceLevel,
) -> CoefficientTable {
    let rows = (0..ls.n_columns())
        .map(|j| {
            let position = ls.kept().iter().position(|&kj| kj == j);
            let (se, df) = match (position, variance) {
                (Some(p), Some(v)) => {
                    let var = v.vcov[(p, p)];
                    let se = if var.is_nan() { None } else { Some(var.max(0.0).sqrt()) };
                    (se, Some(v.df[p]))
                }
                _ => (None, None),
            };
            CoefficientEstimate::new(data.terms[j].clone(), ls.coefficients()[j], se, df, level)
        })
        .collect();
    CoefficientTable::new(rows, level)
}

fn original_scale_fit(x: &DMatrix<f64>, ls: &LeastSquares) -> DVector<f64> {
    let x_kept = x.select_columns(ls.kept().iter());
    x_kept * ls.kept_coefficients()
}

fn r_squared(data: &ModelData, residuals: &DVector<f64>, rank: usize, intercept: bool) -> (f64, f64) {
    let n = data.nobs() as f64;
    let w = |i: usize| data.weights.as_ref().map_or(1.0, |w| w[i]);

    let ssr: f64 = residuals.iter().enumerate().map(|(i, e)| w(i) * e * e).sum();
    let center = if intercept {
        let total_w: f64 = (0..data.nobs()).map(w).sum();
        data.y.iter().enumerate().map(|(i, y)| w(i) * y).sum::<f64>() / total_w
    } else {
        0.0
    };
    let sst: f64 = data
        .y
        .iter()
        .enumerate()
        .map(|(i, y)| w(i) * (y - center) * (y - center))
        .sum();

    let r2 = 1.0 - ssr / sst;
    let int = if intercept { 1.0 } else { 0.0 };
    let adj = 1.0 - (1.0 - r2) * (n - int) / (n - rank as f64);
    (r2, adj)
}

fn wald_f(
    data: &ModelData,
    ls: &LeastSquares,
    vcov: &DMatrix<f64>,
    intercept: bool,
    dendf: f64,
) -> Option<FStatistic> {
    let tested: Vec<usize> = ls
        .kept()
        .iter()
        .enumerate()
        .filter(|(_, &j)| !(intercept && is_constant_column(&data.x, j)))
        .map(|(p, _)| p)
        .collect();
    if tested.is_empty() {
        return None;
    }

    let beta = ls.kept_coefficients().select_rows(tested.iter());
    let v = vcov.select_rows(tested.iter()).select_columns(tested.iter());
    let v_inv = v.try_inverse()?;
    let q = tested.len() as f64;
    let value = (beta.transpose() * v_inv * &beta)[(0, 0)] / q;
    if !value.is_finite() {
        return None;
    }

    let p_value = if dendf > 0.0 {
        FisherSnedecor::new(q, dendf)
            .ok()
            .map(|dist| 1.0 - dist.cdf(value))
    } else {
        None
    };
    Some(FStatistic {
        value,
        numdf: q,
        dendf,
        p_value,
    })
}
