//! Design-based estimation for randomized experiments
//!
//! This crate re-exports the workspace crates:
//!
//! - [`core`]: errors, unit groupings and inference helpers
//! - [`regression`]: least squares with HC and cluster-robust standard errors
//! - [`probability`]: design declarations and condition probability matrices
//! - [`effects`]: Horvitz-Thompson and difference-in-means estimators
//!
//! # Example
//!
//! ```rust
//! use design_stats::prelude::*;
//!
//! let y = [5.0, 3.0, 7.0, 1.0];
//! let z = [1.0, 0.0, 1.0, 0.0];
//!
//! // Robust regression of y on treatment
//! let data = ModelData::from_columns(&[("z", &z)], &y, true)?;
//! let fit = lm_robust(&data, &LmRobustOptions::default())?;
//! assert_eq!(fit.se_type, VarianceType::HC2);
//!
//! // Horvitz-Thompson under complete random assignment of two units
//! let declaration = Declaration::complete_uniform(4, 0.5)?;
//! let ht = HorvitzThompson::new().estimate(&y, &z, &declaration)?;
//! assert!((ht.estimate().unwrap() - 4.0).abs() < 1e-12);
//! # Ok::<(), design_stats::Error>(())
//! ```

pub use design_core as core;
pub use design_effects as effects;
pub use design_probability as probability;
pub use design_regression as regression;

pub use design_core::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use design_core::{
        CoefficientEstimate, CoefficientTable, ConfidenceInterval, ConfidenceLevel, Error,
        Grouping, Result,
    };

    pub use design_regression::{
        lm_robust, LmRobustFit, LmRobustOptions, ModelData, SolverAlgorithm, VarianceType,
    };

    pub use design_probability::{
        declaration_to_condition_pr_mat, permutations_to_condition_pr_mat, Condition,
        ConditionPrMatrix, Declaration,
    };

    pub use design_effects::{
        DifferenceInMeans, DimDesign, EffectEstimate, HorvitzThompson, HtVariance,
    };
}
