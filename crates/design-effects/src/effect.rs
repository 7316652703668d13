//! Shared pieces of the treatment-effect estimators

use design_core::error::{check_binary, check_finite, check_len};
use design_core::{CoefficientEstimate, ConfidenceInterval, Error, Result};

/// Common read access to a treatment-effect estimate
///
/// Implemented by [`HtEstimate`](crate::HtEstimate) and
/// [`DimEstimate`](crate::DimEstimate) so callers can report either
/// without matching on the estimator.
pub trait EffectEstimate {
    /// Full coefficient row
    fn coefficient(&self) -> &CoefficientEstimate;

    /// Number of units used
    fn nobs(&self) -> usize;

    fn estimate(&self) -> Option<f64> {
        self.coefficient().estimate
    }

    fn std_error(&self) -> Option<f64> {
        self.coefficient().std_error
    }

    fn df(&self) -> Option<f64> {
        self.coefficient().df
    }

    fn statistic(&self) -> Option<f64> {
        self.coefficient().statistic
    }

    fn p_value(&self) -> Option<f64> {
        self.coefficient().p_value
    }

    fn confidence_interval(&self) -> Option<ConfidenceInterval> {
        self.coefficient().ci
    }
}

/// Validate an outcome vector against a 0/1 treatment vector
pub(crate) fn check_outcomes(y: &[f64], z: &[f64]) -> Result<()> {
    if y.is_empty() {
        return Err(Error::empty_input("outcome vector"));
    }
    check_len(z.len(), y.len(), "treatment vector")?;
    check_finite(y, "outcome vector")?;
    check_binary(z, "treatment vector")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_outcomes() {
        assert!(check_outcomes(&[1.0, 2.0], &[1.0, 0.0]).is_ok());
        assert!(matches!(check_outcomes(&[], &[]), Err(Error::InputShape(_))));
        assert!(matches!(check_outcomes(&[1.0], &[1.0, 0.0]), Err(Error::InputShape(_))));
        assert!(matches!(check_outcomes(&[1.0, f64::NAN], &[1.0, 0.0]), Err(Error::InputShape(_))));
        assert!(matches!(check_outcomes(&[1.0, 2.0], &[1.0, 0.5]), Err(Error::InputShape(_))));
    }
}
