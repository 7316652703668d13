//! Error types for design-based estimation
//!
//! Provides a unified error type for all design-stats crates.
//!
//! Structural problems (shape mismatches, designs that contradict their own
//! declaration) are fatal. Numerical degeneracies such as rank deficiency or
//! zero joint assignment probabilities are not errors; they are handled where
//! they occur.

use thiserror::Error;

/// Core error type for design-based estimation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Mismatched vector lengths, empty inputs or malformed entries
    #[error("Input shape error: {0}")]
    InputShape(String),

    /// The declared design contradicts the probabilities or labels supplied
    #[error("Design mismatch: {0}")]
    DesignMismatch(String),

    /// The variance estimator cannot be used with (or without) clusters
    #[error("Unsupported variance type: {se_type} cannot be used {}", cluster_context(.clustered))]
    UnsupportedVarianceType { se_type: String, clustered: bool },

    /// Cluster-robust inference needs at least two clusters
    #[error("Insufficient clusters: cluster-robust inference requires at least 2 clusters, found {found}")]
    InsufficientClusters { found: usize },

    /// Invalid parameter provided to a function
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

fn cluster_context(clustered: &bool) -> &'static str {
    if *clustered {
        "with clusters"
    } else {
        "without clusters"
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for size mismatch
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::InputShape(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Create an error for empty input
    pub fn empty_input(context: &str) -> Self {
        Self::InputShape(format!("{context} must not be empty"))
    }

    /// Create an error for NaN/Inf values
    pub fn non_finite(context: &str) -> Self {
        Self::InputShape(format!("{context} contains NaN or infinite values"))
    }

    /// Create an error for a probability outside [0, 1]
    pub fn invalid_probability(p: f64, context: &str) -> Self {
        Self::InvalidParameter(format!("Probability {p} in {context} must be in [0, 1]"))
    }
}

/// Check that a slice has the expected length
pub fn check_len(actual: usize, expected: usize, context: &str) -> Result<()> {
    if actual != expected {
        return Err(Error::size_mismatch(expected, actual, context));
    }
    Ok(())
}

/// Check that every value in a slice is finite
pub fn check_finite(data: &[f64], context: &str) -> Result<()> {
    if data.iter().any(|x| !x.is_finite()) {
        return Err(Error::non_finite(context));
    }
    Ok(())
}

/// Check that every value is exactly 0.0 or 1.0
pub fn check_binary(data: &[f64], context: &str) -> Result<()> {
    if let Some(bad) = data.iter().find(|&&x| x != 0.0 && x != 1.0) {
        return Err(Error::InputShape(format!(
            "{context} must contain only 0 and 1, found {bad}"
        )));
    }
    Ok(())
}
