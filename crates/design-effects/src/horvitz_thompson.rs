//! Horvitz-Thompson estimation of average treatment effects
//!
//! The estimate weights each observed outcome by the inverse probability of
//! the condition it was observed in. Variance comes from the condition
//! probability matrix in one of two ways:
//!
//! - [`HtVariance::Youngs`]: the conservative Aronow–Samii estimator. Pairs
//!   of units that can never be observed together contribute through
//!   Young's inequality instead of their (unidentified) cross product.
//! - [`HtVariance::Constant`]: assumes a constant effect, imputes the
//!   missing potential outcome of every unit and evaluates the exact
//!   design variance of the resulting schedule.
//!
//! Blocks are estimated separately and combined with weights `N_b/N`.
//! With clusters, outcomes are summed to cluster totals by default
//! ("collapsed") before estimation. Inference uses the normal distribution.

use crate::effect::{check_outcomes, EffectEstimate};
use design_core::{CoefficientEstimate, ConfidenceLevel, Error, Grouping, Result};
use design_probability::{declaration_to_condition_pr_mat, ConditionPrMatrix, Declaration};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

/// Horvitz-Thompson variance estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HtVariance {
    /// Conservative estimator bounding unidentified terms with Young's inequality
    #[default]
    Youngs,
    /// Exact variance under a constant treatment effect
    Constant,
}

impl fmt::Display for HtVariance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Youngs => f.write_str("youngs"),
            Self::Constant => f.write_str("constant"),
        }
    }
}

/// Result of a Horvitz-Thompson estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtEstimate {
    /// Estimate, standard error, z statistic, p-value and interval
    pub coefficient: CoefficientEstimate,
    pub se_type: HtVariance,
    /// Number of units
    pub nobs: usize,
    pub n_blocks: Option<usize>,
    pub n_clusters: Option<usize>,
    /// Whether outcomes were summed to cluster totals
    pub collapsed: bool,
}

impl EffectEstimate for HtEstimate {
    fn coefficient(&self) -> &CoefficientEstimate {
        &self.coefficient
    }

    fn nobs(&self) -> usize {
        self.nobs
    }
}

/// Horvitz-Thompson estimator configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorvitzThompson {
    se_type: HtVariance,
    confidence_level: ConfidenceLevel,
    /// `None` collapses whenever clusters are present
    collapsed: Option<bool>,
}

impl Default for HorvitzThompson {
    fn default() -> Self {
        Self {
            se_type: HtVariance::default(),
            confidence_level: ConfidenceLevel::default(),
            collapsed: None,
        }
    }
}

/// Estimate and variance of one independent piece, on the unit-mean scale
struct Piece {
    estimate: f64,
    variance: f64,
}

impl HorvitzThompson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_se_type(mut self, se_type: HtVariance) -> Self {
        self.se_type = se_type;
        self
    }

    pub fn with_confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    /// Sum outcomes to cluster totals (`true`) or estimate on units (`false`)
    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    /// Estimate under a declared design; blocks and clusters come from it
    #[instrument(skip(self, y, z, declaration), fields(n = y.len(), design = declaration.design().name()))]
    pub fn estimate(&self, y: &[f64], z: &[f64], declaration: &Declaration) -> Result<HtEstimate> {
        let matrix = declaration_to_condition_pr_mat(declaration)?;
        self.estimate_with_matrix(y, z, &matrix, declaration.blocks(), declaration.clusters())
    }

    /// Estimate with independent assignment at the given probabilities
    pub fn estimate_with_probs(&self, y: &[f64], z: &[f64], prob_treat: &[f64]) -> Result<HtEstimate> {
        let declaration = Declaration::simple(prob_treat.to_vec())?;
        self.estimate(y, z, &declaration)
    }

    /// Estimate from a prebuilt condition probability matrix
    pub fn estimate_with_matrix(
        &self,
        y: &[f64],
        z: &[f64],
        matrix: &ConditionPrMatrix,
        blocks: Option<&Grouping>,
        clusters: Option<&Grouping>,
    ) -> Result<HtEstimate> {
        let n = y.len();
        check_outcomes(y, z)?;
        matrix_units(matrix, n)?;
        if let Some(b) = blocks {
            b.check_units(n, "block labels")?;
        }
        if let Some(c) = clusters {
            c.check_units(n, "cluster labels")?;
            if let Some(b) = blocks {
                c.check_nested_in(b)?;
            }
        }
        let collapsed = clusters.is_some() && self.collapsed.unwrap_or(true);

        let pieces: Vec<(f64, Piece)> = match blocks {
            None => vec![(1.0, self.piece(y, z, matrix, clusters, collapsed)?)],
            Some(blocks) => blocks
                .groups()
                .map(|members| -> Result<(f64, Piece)> {
                    let weight = members.len() as f64 / n as f64;
                    let yb: Vec<f64> = members.iter().map(|&u| y[u]).collect();
                    let zb: Vec<f64> = members.iter().map(|&u| z[u]).collect();
                    let mb = matrix.restrict_to(members)?;
                    let cb = clusters.map(|c| c.restrict(members)).transpose()?;
                    Ok((weight, self.piece(&yb, &zb, &mb, cb.as_ref(), collapsed)?))
                })
                .collect::<Result<_>>()?,
        };

        let estimate: f64 = pieces.iter().map(|(w, p)| w * p.estimate).sum();
        let variance: f64 = pieces.iter().map(|(w, p)| w * w * p.variance).sum();
        if variance < 0.0 {
            warn!("negative Horvitz-Thompson variance estimate {variance}; standard error is undefined");
        }
        debug!("HT estimate {estimate} with variance {variance} from {} piece(s)", pieces.len());

        let coefficient = CoefficientEstimate::new(
            "z",
            Some(estimate),
            Some(variance.sqrt()),
            Some(f64::INFINITY),
            self.confidence_level,
        );
        Ok(HtEstimate {
            coefficient,
            se_type: self.se_type,
            nobs: n,
            n_blocks: blocks.map(Grouping::n_groups),
            n_clusters: clusters.map(Grouping::n_groups),
            collapsed,
        })
    }

    /// One block (or the whole sample), optionally collapsed to clusters
    fn piece(
        &self,
        y: &[f64],
        z: &[f64],
        matrix: &ConditionPrMatrix,
        clusters: Option<&Grouping>,
        collapsed: bool,
    ) -> Result<Piece> {
        let denominator = y.len() as f64;
        match clusters {
            Some(clusters) if collapsed => {
                if !clusters.is_constant_within(z) {
                    return Err(Error::DesignMismatch(
                        "treatment must be constant within clusters".to_string(),
                    ));
                }
                let totals: Vec<f64> = clusters.groups().map(|m| m.iter().map(|&u| y[u]).sum()).collect();
                let zc: Vec<f64> = clusters.first_units().iter().map(|&u| z[u]).collect();
                let sizes: Vec<f64> = clusters.sizes().iter().map(|&s| s as f64).collect();
                let mc = matrix.collapse_to(clusters)?;
                ht_piece(&totals, &zc, &sizes, &mc, denominator, self.se_type)
            }
            _ => {
                let sizes = vec![1.0; y.len()];
                ht_piece(y, z, &sizes, matrix, denominator, self.se_type)
            }
        }
    }
}

fn matrix_units(matrix: &ConditionPrMatrix, n: usize) -> Result<()> {
    if matrix.n_units() != n {
        return Err(Error::size_mismatch(
            2 * n,
            2 * matrix.n_units(),
            "condition probability matrix dimension",
        ));
    }
    Ok(())
}

/// HT estimate over analysis units with `sizes[i]` units each
fn ht_piece(
    y: &[f64],
    z: &[f64],
    sizes: &[f64],
    matrix: &ConditionPrMatrix,
    denominator: f64,
    se_type: HtVariance,
) -> Result<Piece> {
    let p1 = matrix.treatment_probs();
    let p0 = matrix.control_probs();

    for i in 0..y.len() {
        let observed = if z[i] == 1.0 { p1[i] } else { p0[i] };
        if observed <= 0.0 {
            return Err(Error::DesignMismatch(format!(
                "unit {} was observed in a condition it has zero probability of receiving",
                i + 1
            )));
        }
    }

    let total: f64 = (0..y.len())
        .map(|i| if z[i] == 1.0 { y[i] / p1[i] } else { -y[i] / p0[i] })
        .sum();
    let estimate = total / denominator;

    let variance_total = match se_type {
        HtVariance::Youngs => youngs_variance(y, z, matrix, &p0, &p1),
        HtVariance::Constant => constant_effects_variance(y, z, sizes, estimate, matrix, &p0, &p1),
    };
    Ok(Piece {
        estimate,
        variance: variance_total / (denominator * denominator),
    })
}

/// Aronow–Samii variance of the HT total
fn youngs_variance(y: &[f64], z: &[f64], matrix: &ConditionPrMatrix, p0: &[f64], p1: &[f64]) -> f64 {
    let n = y.len();
    let m = matrix.matrix();
    let treated: Vec<usize> = (0..n).filter(|&i| z[i] == 1.0).collect();
    let control: Vec<usize> = (0..n).filter(|&i| z[i] == 0.0).collect();
    let y1 = |i: usize| y[i] / p1[i];
    let y0 = |i: usize| y[i] / p0[i];

    let mut v = 0.0;

    // Same-arm terms: offset 0 for control, n for treatment
    for (units, probs, offset, scaled) in [
        (&treated, p1, n, &y1 as &dyn Fn(usize) -> f64),
        (&control, p0, 0, &y0 as &dyn Fn(usize) -> f64),
    ] {
        for &i in units.iter() {
            let yi = scaled(i);
            v += (1.0 - probs[i]) * yi * yi;
            for &j in units.iter().filter(|&&j| j != i) {
                let pij = m[(offset + i, offset + j)];
                if pij > 0.0 {
                    v += (pij - probs[i] * probs[j]) / pij * yi * scaled(j);
                }
            }
            let never_together = (0..n)
                .filter(|&j| j != i && probs[j] > 0.0 && m[(offset + i, offset + j)] == 0.0)
                .count();
            v += never_together as f64 * probs[i] * yi * yi;
        }
    }

    // Cross-arm terms; pair (i treated, j control)
    for &i in &treated {
        for &j in &control {
            let pij = m[(n + i, j)];
            if pij > 0.0 {
                v -= 2.0 * (pij - p1[i] * p0[j]) / pij * y1(i) * y0(j);
            }
        }
        let never = (0..n).filter(|&j| p0[j] > 0.0 && m[(n + i, j)] == 0.0).count();
        v += never as f64 * p1[i] * y1(i) * y1(i);
    }
    for &j in &control {
        let never = (0..n).filter(|&i| p1[i] > 0.0 && m[(n + i, j)] == 0.0).count();
        v += never as f64 * p0[j] * y0(j) * y0(j);
    }
    v
}

/// Exact design variance of the HT total under a constant effect
fn constant_effects_variance(
    y: &[f64],
    z: &[f64],
    sizes: &[f64],
    effect: f64,
    matrix: &ConditionPrMatrix,
    p0: &[f64],
    p1: &[f64],
) -> f64 {
    let n = y.len();
    let mut schedule = DVector::zeros(2 * n);
    let mut marginals = DVector::zeros(2 * n);
    for i in 0..n {
        let shift = effect * sizes[i];
        let (y0, y1) = if z[i] == 1.0 {
            (y[i] - shift, y[i])
        } else {
            (y[i], y[i] + shift)
        };
        schedule[i] = if p0[i] > 0.0 { -y0 / p0[i] } else { 0.0 };
        schedule[n + i] = if p1[i] > 0.0 { y1 / p1[i] } else { 0.0 };
        marginals[i] = p0[i];
        marginals[n + i] = p1[i];
    }
    let centered = matrix.matrix() - &marginals * marginals.transpose();
    (schedule.transpose() * centered * &schedule)[(0, 0)]
}
