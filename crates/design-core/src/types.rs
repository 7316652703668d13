//! Coefficient-level result types

use crate::inference::{self, ConfidenceInterval, ConfidenceLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of a coefficient table
///
/// Every numeric field is optional: a coefficient dropped for rank
/// deficiency has no estimate, a fit without a variance estimator has no
/// standard error, and so on. Missing values propagate to everything
/// derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEstimate {
    /// Term name
    pub term: String,
    /// Point estimate
    pub estimate: Option<f64>,
    /// Standard error
    pub std_error: Option<f64>,
    /// t (or z) statistic
    pub statistic: Option<f64>,
    /// Degrees of freedom; infinite for normal-reference inference
    pub df: Option<f64>,
    /// Two-sided p-value
    pub p_value: Option<f64>,
    /// Confidence interval
    pub ci: Option<ConfidenceInterval>,
}

impl CoefficientEstimate {
    /// Derive statistic, p-value and interval from an estimate, its
    /// standard error and degrees of freedom
    pub fn new(
        term: impl Into<String>,
        estimate: Option<f64>,
        std_error: Option<f64>,
        df: Option<f64>,
        level: ConfidenceLevel,
    ) -> Self {
        let std_error = std_error.filter(|se| se.is_finite());
        let df = df.filter(|d| !d.is_nan());

        let statistic = match (estimate, std_error) {
            (Some(est), Some(se)) if se > 0.0 => Some(est / se),
            _ => None,
        };
        let p_value = statistic
            .zip(df)
            .and_then(|(t, d)| inference::two_sided_p_value(t, d));
        let ci = match (estimate, std_error, df) {
            (Some(est), Some(se), Some(d)) if se > 0.0 => {
                inference::confidence_interval(est, se, d, level)
            }
            _ => None,
        };

        Self {
            term: term.into(),
            estimate,
            std_error,
            statistic,
            df,
            p_value,
            ci,
        }
    }

    /// Lower confidence bound
    pub fn ci_lower(&self) -> Option<f64> {
        self.ci.map(|ci| ci.lower)
    }

    /// Upper confidence bound
    pub fn ci_upper(&self) -> Option<f64> {
        self.ci.map(|ci| ci.upper)
    }

    /// Whether the coefficient was estimable
    pub fn is_estimable(&self) -> bool {
        self.estimate.is_some()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for CoefficientEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: estimate {}, se {}, df {}, p {}",
            self.term,
            fmt_opt(self.estimate),
            fmt_opt(self.std_error),
            fmt_opt(self.df),
            fmt_opt(self.p_value)
        )
    }
}

/// Table of coefficient estimates sharing a confidence level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    rows: Vec<CoefficientEstimate>,
    confidence_level: f64,
}

impl CoefficientTable {
    pub fn new(rows: Vec<CoefficientEstimate>, level: ConfidenceLevel) -> Self {
        Self {
            rows,
            confidence_level: level.value(),
        }
    }

    pub fn rows(&self) -> &[CoefficientEstimate] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Row by position
    pub fn get(&self, index: usize) -> Option<&CoefficientEstimate> {
        self.rows.get(index)
    }

    /// Row by term name
    pub fn term(&self, name: &str) -> Option<&CoefficientEstimate> {
        self.rows.iter().find(|r| r.term == name)
    }

    /// Point estimates in row order
    pub fn estimates(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.estimate).collect()
    }

    /// Standard errors in row order
    pub fn std_errors(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.std_error).collect()
    }

    /// Degrees of freedom in row order
    pub fn dfs(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.df).collect()
    }
}

impl fmt::Display for CoefficientTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_row() {
        let row = CoefficientEstimate::new(
            "x",
            Some(2.0),
            Some(0.5),
            Some(20.0),
            ConfidenceLevel::NINETY_FIVE,
        );
        assert_relative_eq!(row.statistic.unwrap(), 4.0);
        assert!(row.p_value.unwrap() < 0.001);
        let ci = row.ci.unwrap();
        assert!(ci.lower < 2.0 && ci.upper > 2.0);
        assert_relative_eq!(ci.upper - 2.0, 2.0 - ci.lower, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_std_error_has_no_interval() {
        let row = CoefficientEstimate::new(
            "x",
            Some(2.0),
            Some(0.0),
            Some(20.0),
            ConfidenceLevel::NINETY_FIVE,
        );
        assert_eq!(row.std_error, Some(0.0));
        assert!(row.statistic.is_none());
        assert!(row.ci.is_none());
    }

    #[test]
    fn test_missing_values_propagate() {
        let dropped = CoefficientEstimate::new(
            "collinear",
            None,
            None,
            Some(10.0),
            ConfidenceLevel::NINETY_FIVE,
        );
        assert!(!dropped.is_estimable());
        assert!(dropped.statistic.is_none());
        assert!(dropped.ci_lower().is_none());

        let no_se = CoefficientEstimate::new("x", Some(1.0), None, Some(10.0), ConfidenceLevel::NINETY_FIVE);
        assert!(no_se.p_value.is_none());
        assert!(no_se.ci.is_none());

        let no_df = CoefficientEstimate::new("x", Some(1.0), Some(0.1), None, ConfidenceLevel::NINETY_FIVE);
        assert!(no_df.statistic.is_some());
        assert!(no_df.p_value.is_none());
        assert!(no_df.ci.is_none());
    }

    #[test]
    fn test_non_finite_se_is_missing() {
        let row = CoefficientEstimate::new(
            "x",
            Some(1.0),
            Some(f64::INFINITY),
            Some(3.0),
            ConfidenceLevel::NINETY_FIVE,
        );
        assert!(row.std_error.is_none());
    }

    #[test]
    fn test_table_lookup() {
        let level = ConfidenceLevel::NINETY_FIVE;
        let table = CoefficientTable::new(
            vec![
                CoefficientEstimate::new("(Intercept)", Some(1.0), Some(0.1), Some(5.0), level),
                CoefficientEstimate::new("z", Some(2.0), Some(0.2), Some(5.0), level),
            ],
            level,
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.term("z").unwrap().estimate, Some(2.0));
        assert!(table.term("w").is_none());
        assert_eq!(table.estimates(), vec![Some(1.0), Some(2.0)]);
        assert!(format!("{table}").contains("(Intercept)"));
    }
}
