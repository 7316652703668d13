//! Core types for design-based estimation
//!
//! This crate provides the pieces shared by the regression, probability and
//! effect-estimation crates:
//!
//! - [`Error`] and [`Result`]: the error taxonomy for the whole workspace
//! - [`Grouping`]: cluster and block partitions of units
//! - [`inference`]: critical values, p-values and confidence intervals
//! - [`CoefficientEstimate`] / [`CoefficientTable`]: per-coefficient results
//!
//! # Example
//!
//! ```rust
//! use design_core::{CoefficientEstimate, ConfidenceLevel, Grouping};
//!
//! let clusters = Grouping::from_labels(&["a", "a", "b", "b"]).unwrap();
//! assert_eq!(clusters.n_groups(), 2);
//!
//! let row = CoefficientEstimate::new("z", Some(4.0), Some(1.0), Some(2.0), ConfidenceLevel::NINETY_FIVE);
//! assert!(row.p_value.is_some());
//! ```

pub mod error;
pub mod grouping;
pub mod inference;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use grouping::Grouping;
pub use inference::{ConfidenceInterval, ConfidenceLevel};
pub use types::{CoefficientEstimate, CoefficientTable};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
