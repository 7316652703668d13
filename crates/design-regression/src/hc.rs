//! Heteroskedasticity-consistent (sandwich) variance estimators
//!
//! All variants share the form `(XᵗX)⁻¹ Xᵗ Ω X (XᵗX)⁻¹` with a diagonal Ω:
//!
//! | Type | ωᵢ |
//! |---|---|
//! | HC0 | `eᵢ²` |
//! | HC1 | `eᵢ² · N/(N−r)` |
//! | HC2 | `eᵢ²/(1−hᵢᵢ)` |
//! | HC3 | `eᵢ²/(1−hᵢᵢ)²` |
//!
//! The classical estimator `σ̂²(XᵗX)⁻¹` is included for completeness.
//! Degrees of freedom are `N − r` for every type.

use crate::solver::LeastSquares;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Non-clustered variance estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HcType {
    Classical,
    HC0,
    HC1,
    HC2,
    HC3,
}

/// Variance-covariance matrix of the retained coefficients
pub fn heteroskedastic_vcov(fit: &LeastSquares, hc_type: HcType) -> DMatrix<f64> {
    let n = fit.nobs() as f64;
    let r = fit.rank() as f64;
    let e = fit.residuals();

    let omega: Vec<f64> = match hc_type {
        HcType::Classical => {
            let s2 = e.norm_squared() / (n - r);
            return fit.xtx_inv() * s2;
        }
        HcType::HC0 => e.iter().map(|ei| ei * ei).collect(),
        HcType::HC1 => {
            let scale = n / (n - r);
            e.iter().map(|ei| ei * ei * scale).collect()
        }
        HcType::HC2 => {
            let h = fit.leverage();
            e.iter()
                .zip(h.iter())
                .map(|(ei, hi)| ei * ei / (1.0 - hi))
                .collect()
        }
        HcType::HC3 => {
            let h = fit.leverage();
            e.iter()
                .zip(h.iter())
                .map(|(ei, hi)| ei * ei / ((1.0 - hi) * (1.0 - hi)))
                .collect()
        }
    };

    sandwich(fit.x_kept(), fit.xtx_inv(), &omega)
}

/// `M Xᵗ diag(ω) X M`
pub fn sandwich(x: &DMatrix<f64>, xtx_inv: &DMatrix<f64>, omega: &[f64]) -> DMatrix<f64> {
    let mut weighted = x.clone();
    for (i, &w) in omega.iter().enumerate() {
        for j in 0..weighted.ncols() {
            weighted[(i, j)] *= w;
        }
    }
    let meat = x.tr_mul(&weighted);
    xtx_inv * meat * xtx_inv
}

/// Residual degrees of freedom `N − r`
pub fn residual_df(fit: &LeastSquares) -> f64 {
    fit.nobs() as f64 - fit.rank() as f64
}
