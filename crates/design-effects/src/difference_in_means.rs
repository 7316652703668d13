//! Design-based difference in means
//!
//! The estimator and its variance follow the experimental design:
//!
//! | Design | Variance | df |
//! |---|---|---|
//! | standard | Welch `s₁²/n₁ + s₀²/n₀` | Welch–Satterthwaite |
//! | clustered | CR2 regression on `(1, z)` | S − 2 |
//! | blocked | `Σ (N_b/N)² V_b` | N − 2B |
//! | blocked and clustered | `Σ (N_b/N)² V_b`, CR2 per block | S − 2B |
//! | matched pairs | `B/(B−1) Σ (w_b τ̂_b − τ̂/B)²` | B − 1 |
//!
//! Pairs are blocks of exactly two units, or two clusters when clustered.
//! Weighted samples use weighted means and HC2 (or CR2) regression
//! variances in place of Welch.

use crate::effect::{check_outcomes, EffectEstimate};
use design_core::error::{check_finite, check_len};
use design_core::inference::satterthwaite_df;
use design_core::utils::sample_variance;
use design_core::{CoefficientEstimate, ConfidenceLevel, Error, Grouping, Result};
use design_regression::{lm_robust, LmRobustOptions, ModelData};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Which formula produced a [`DimEstimate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimDesign {
    Standard,
    Clustered,
    Blocked,
    BlockedAndClustered,
    MatchedPairs,
    ClusteredMatchedPairs,
}

impl fmt::Display for DimDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::Clustered => "clustered",
            Self::Blocked => "blocked",
            Self::BlockedAndClustered => "blocked and clustered",
            Self::MatchedPairs => "matched pairs",
            Self::ClusteredMatchedPairs => "clustered matched pairs",
        };
        f.write_str(name)
    }
}

/// Result of a difference-in-means estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimEstimate {
    pub coefficient: CoefficientEstimate,
    pub design: DimDesign,
    pub nobs: usize,
    pub n_blocks: Option<usize>,
    pub n_clusters: Option<usize>,
    pub weighted: bool,
}

impl EffectEstimate for DimEstimate {
    fn coefficient(&self) -> &CoefficientEstimate {
        &self.coefficient
    }

    fn nobs(&self) -> usize {
        self.nobs
    }
}

/// Difference-in-means estimator configuration
#[derive(Debug, Clone, Default)]
pub struct DifferenceInMeans {
    blocks: Option<Grouping>,
    clusters: Option<Grouping>,
    weights: Option<Vec<f64>>,
    confidence_level: ConfidenceLevel,
}

/// Estimate, variance and df of one block (or the whole sample)
struct Piece {
    estimate: f64,
    variance: f64,
    df: f64,
}

impl DifferenceInMeans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(mut self, blocks: Grouping) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn with_clusters(mut self, clusters: Grouping) -> Self {
        self.clusters = Some(clusters);
        self
    }

    /// Observation weights; must be finite and strictly positive
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    /// Estimate the average treatment effect of `z` on `y`
    #[instrument(skip(self, y, z), fields(n = y.len(), blocked = self.blocks.is_some(), clustered = self.clusters.is_some()))]
    pub fn estimate(&self, y: &[f64], z: &[f64]) -> Result<DimEstimate> {
        let n = y.len();
        check_outcomes(y, z)?;
        self.check_design(n, z)?;
        let weights = self.weights.as_deref();
        let clusters = self.clusters.as_ref();

        let (piece, design) = match &self.blocks {
            None => {
                let piece = unblocked(y, z, weights, clusters)?;
                let design = if clusters.is_some() {
                    DimDesign::Clustered
                } else {
                    DimDesign::Standard
                };
                (piece, design)
            }
            Some(blocks) => blocked(y, z, weights, blocks, clusters)?,
        };
        debug!("{} difference in means: {} (variance {})", design, piece.estimate, piece.variance);

        let coefficient = CoefficientEstimate::new(
            "z",
            Some(piece.estimate),
            Some(piece.variance.sqrt()),
            Some(piece.df),
            self.confidence_level,
        );
        Ok(DimEstimate {
            coefficient,
            design,
            nobs: n,
            n_blocks: self.blocks.as_ref().map(Grouping::n_groups),
            n_clusters: clusters.map(Grouping::n_groups),
            weighted: weights.is_some(),
        })
    }

    fn check_design(&self, n: usize, z: &[f64]) -> Result<()> {
        if let Some(w) = &self.weights {
            check_len(w.len(), n, "weights")?;
            check_finite(w, "weights")?;
            if let Some(bad) = w.iter().find(|&&v| v <= 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "weights must be strictly positive, found {bad}"
                )));
            }
        }
        if let Some(b) = &self.blocks {
            b.check_units(n, "block labels")?;
        }
        if let Some(c) = &self.clusters {
            c.check_units(n, "cluster labels")?;
            if !c.is_constant_within(z) {
                return Err(Error::DesignMismatch(
                    "treatment must be constant within clusters".to_string(),
                ));
            }
            if let Some(b) = &self.blocks {
                c.check_nested_in(b)?;
            }
        }
        Ok(())
    }
}

fn unblocked(y: &[f64], z: &[f64], weights: Option<&[f64]>, clusters: Option<&Grouping>) -> Result<Piece> {
    check_both_arms(z, "sample")?;
    match (weights, clusters) {
        (None, None) => welch(y, z),
        (_, Some(c)) => {
            let (estimate, variance) = regression(y, z, weights, Some(c))?;
            Ok(Piece {
                estimate,
                variance,
                df: c.n_groups() as f64 - 2.0,
            })
        }
        (Some(_), None) => {
            let (estimate, variance) = regression(y, z, weights, None)?;
            Ok(Piece {
                estimate,
                variance,
                df: y.len() as f64 - 2.0,
            })
        }
    }
}

fn blocked(
    y: &[f64],
    z: &[f64],
    weights: Option<&[f64]>,
    blocks: &Grouping,
    clusters: Option<&Grouping>,
) -> Result<(Piece, DimDesign)> {
    let n_blocks = blocks.n_groups();
    let pair_count = blocks
        .groups()
        .filter(|members| match clusters {
            Some(c) => c.restrict(members).map_or(false, |local| local.n_groups() == 2),
            None => members.len() == 2,
        })
        .count();
    if pair_count != 0 && pair_count != n_blocks {
        return Err(Error::DesignMismatch(format!(
            "{pair_count} of {n_blocks} blocks are pairs; blocks must be all pairs or all larger"
        )));
    }
    let pairs = pair_count == n_blocks;

    let mut estimates = Vec::with_capacity(n_blocks);
    let mut variances = Vec::with_capacity(n_blocks);
    let mut sizes = Vec::with_capacity(n_blocks);
    for (b, members) in blocks.groups().enumerate() {
        let yb: Vec<f64> = members.iter().map(|&u| y[u]).collect();
        let zb: Vec<f64> = members.iter().map(|&u| z[u]).collect();
        let wb: Option<Vec<f64>> = weights.map(|w| members.iter().map(|&u| w[u]).collect());
        check_both_arms(&zb, &format!("block {b}"))?;
        sizes.push(wb.as_ref().map_or(members.len() as f64, |w| w.iter().sum()));

        if pairs {
            estimates.push(mean_difference(&yb, &zb, wb.as_deref()));
        } else {
            let cb = clusters.map(|c| c.restrict(members)).transpose()?;
            let piece = unblocked(&yb, &zb, wb.as_deref(), cb.as_ref())?;
            estimates.push(piece.estimate);
            variances.push(piece.variance);
        }
    }

    let total: f64 = sizes.iter().sum();
    let estimate: f64 = estimates.iter().zip(&sizes).map(|(t, s)| t * s / total).sum();
    let bf = n_blocks as f64;

    if pairs {
        if n_blocks < 2 {
            return Err(Error::DesignMismatch(
                "matched-pair designs need at least two pairs".to_string(),
            ));
        }
        let spread: f64 = estimates
            .iter()
            .zip(&sizes)
            .map(|(t, s)| (s / total * t - estimate / bf).powi(2))
            .sum();
        let design = if clusters.is_some() {
            DimDesign::ClusteredMatchedPairs
        } else {
            DimDesign::MatchedPairs
        };
        return Ok((
            Piece {
                estimate,
                variance: bf / (bf - 1.0) * spread,
                df: bf - 1.0,
            },
            design,
        ));
    }

    let variance: f64 = variances
        .iter()
        .zip(&sizes)
        .map(|(v, s)| (s / total).powi(2) * v)
        .sum();
    let (df, design) = match clusters {
        Some(c) => (c.n_groups() as f64 - 2.0 * bf, DimDesign::BlockedAndClustered),
        None => (y.len() as f64 - 2.0 * bf, DimDesign::Blocked),
    };
    Ok((Piece { estimate, variance, df }, design))
}

fn check_both_arms(z: &[f64], context: &str) -> Result<()> {
    let treated = z.iter().filter(|&&v| v == 1.0).count();
    if treated == 0 || treated == z.len() {
        return Err(Error::DesignMismatch(format!(
            "{context} must contain both treated and control units"
        )));
    }
    Ok(())
}

/// Weighted (or plain) mean of treated minus mean of control
fn mean_difference(y: &[f64], z: &[f64], weights: Option<&[f64]>) -> f64 {
    let arm_mean = |arm: f64| {
        let (mut num, mut den) = (0.0, 0.0);
        for i in (0..y.len()).filter(|&i| z[i] == arm) {
            let w = weights.map_or(1.0, |w| w[i]);
            num += w * y[i];
            den += w;
        }
        num / den
    };
    arm_mean(1.0) - arm_mean(0.0)
}

fn welch(y: &[f64], z: &[f64]) -> Result<Piece> {
    let treated: Vec<f64> = (0..y.len()).filter(|&i| z[i] == 1.0).map(|i| y[i]).collect();
    let control: Vec<f64> = (0..y.len()).filter(|&i| z[i] == 0.0).map(|i| y[i]).collect();
    if treated.len() < 2 || control.len() < 2 {
        return Err(Error::DesignMismatch(
            "each condition needs at least two units to estimate its variance".to_string(),
        ));
    }
    let (n1, n0) = (treated.len() as f64, control.len() as f64);
    let v1 = sample_variance(&treated) / n1;
    let v0 = sample_variance(&control) / n0;
    Ok(Piece {
        estimate: mean_difference(y, z, None),
        variance: v1 + v0,
        df: satterthwaite_df(&[(v1, n1 - 1.0), (v0, n0 - 1.0)]),
    })
}

/// Coefficient on `z` and its HC2 (CR2 with clusters) variance
fn regression(y: &[f64], z: &[f64], weights: Option<&[f64]>, clusters: Option<&Grouping>) -> Result<(f64, f64)> {
    let mut data = ModelData::from_columns(&[("z", z)], y, true)?;
    if let Some(w) = weights {
        data = data.with_weights(w.to_vec())?;
    }
    if let Some(c) = clusters {
        data = data.with_clusters(c.clone())?;
    }
    let fit = lm_robust(&data, &LmRobustOptions::default())?;
    let estimate = fit
        .coefficient("z")
        .and_then(|row| row.estimate)
        .ok_or_else(|| Error::Computation("treatment coefficient is not estimable".to_string()))?;
    let variance = fit
        .vcov
        .as_ref()
        .filter(|v| v.nrows() == 2)
        .map(|v| v[(1, 1)])
        .ok_or_else(|| Error::Computation("treatment variance is not available".to_string()))?;
    Ok((estimate, variance))
}
