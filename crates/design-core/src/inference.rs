//! Asymptotic inference helpers
//!
//! Critical values, p-values and confidence intervals for estimates whose
//! sampling distribution is taken to be Student's t (finite degrees of
//! freedom) or standard normal (infinite degrees of freedom).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fmt;

/// Confidence level type with validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    /// Create a new confidence level in (0, 1)
    pub fn new(level: f64) -> Result<Self> {
        if !(level > 0.0 && level < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "Confidence level {level} must be in (0, 1)"
            )));
        }
        Ok(Self(level))
    }

    /// Create a confidence level from a significance level alpha
    pub fn from_alpha(alpha: f64) -> Result<Self> {
        Self::new(1.0 - alpha)
    }

    /// Get the confidence level value
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Get the alpha level (1 - confidence level)
    pub fn alpha(&self) -> f64 {
        1.0 - self.0
    }

    /// Get the tail probability (alpha/2 for two-tailed)
    pub fn tail_probability(&self) -> f64 {
        self.alpha() / 2.0
    }

    /// Common confidence levels
    pub const NINETY: Self = Self(0.90);
    pub const NINETY_FIVE: Self = Self(0.95);
    pub const NINETY_NINE: Self = Self(0.99);
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self::NINETY_FIVE
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// A confidence interval with lower and upper bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound of the interval
    pub lower: f64,
    /// Upper bound of the interval
    pub upper: f64,
    /// Confidence level (e.g., 0.95 for 95% CI)
    pub confidence_level: f64,
}

impl ConfidenceInterval {
    /// Width of the confidence interval
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Check if a value is contained in the interval
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% CI: [{:.4}, {:.4}]",
            self.confidence_level * 100.0,
            self.lower,
            self.upper
        )
    }
}

/// Upper `1 - alpha/2` quantile of t(df), or of N(0, 1) when `df` is infinite
///
/// Returns `None` when `df` is not a positive number.
pub fn critical_value(level: ConfidenceLevel, df: f64) -> Option<f64> {
    let p = 1.0 - level.tail_probability();
    if df.is_infinite() && df > 0.0 {
        let normal = Normal::new(0.0, 1.0).ok()?;
        return Some(normal.inverse_cdf(p));
    }
    if !(df > 0.0) {
        return None;
    }
    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(t_dist.inverse_cdf(p))
}

/// Two-sided p-value of a test statistic against t(df) or N(0, 1)
pub fn two_sided_p_value(statistic: f64, df: f64) -> Option<f64> {
    if !statistic.is_finite() {
        return None;
    }
    let upper_tail = if df.is_infinite() && df > 0.0 {
        let normal = Normal::new(0.0, 1.0).ok()?;
        1.0 - normal.cdf(statistic.abs())
    } else if df > 0.0 {
        let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
        1.0 - t_dist.cdf(statistic.abs())
    } else {
        return None;
    };
    Some((2.0 * upper_tail).clamp(0.0, 1.0))
}

/// Symmetric interval `estimate ± critical × se`
pub fn confidence_interval(
    estimate: f64,
    std_error: f64,
    df: f64,
    level: ConfidenceLevel,
) -> Option<ConfidenceInterval> {
    if !estimate.is_finite() || !std_error.is_finite() {
        return None;
    }
    let critical = critical_value(level, df)?;
    let margin = critical * std_error;
    Some(ConfidenceInterval {
        lower: estimate - margin,
        upper: estimate + margin,
        confidence_level: level.value(),
    })
}

/// Welch–Satterthwaite degrees of freedom for a sum of independent
/// variance components `v_i` with `df_i` degrees of freedom each
pub fn satterthwaite_df(components: &[(f64, f64)]) -> f64 {
    let total: f64 = components.iter().map(|&(v, _)| v).sum();
    let denom: f64 = components.iter().map(|&(v, df)| v * v / df).sum();
    total * total / denom
}
