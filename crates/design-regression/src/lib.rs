//! Linear models with robust standard errors
//!
//! This crate fits least-squares models and estimates the sampling variance
//! of their coefficients without assuming homoskedastic, independent errors:
//!
//! - **Solver**: rank-revealing pivoted QR (default) or Cholesky
//! - **HC estimators**: classical, HC0, HC1, HC2, HC3
//! - **Cluster-robust estimators**: CR0, stata and the bias-reduced CR2 with
//!   per-coefficient Satterthwaite degrees of freedom
//! - **`lm_robust`**: fit plus coefficient table, R², and a robust Wald F
//!
//! # Example
//!
//! ```rust
//! use design_core::Grouping;
//! use design_regression::{lm_robust, LmRobustOptions, ModelData, VarianceType};
//!
//! let z = [1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
//! let y = [4.0, 5.5, 1.0, 2.0, 6.0, 4.5, 0.5, 2.5];
//! let clusters = Grouping::from_labels(&[1, 1, 2, 2, 3, 3, 4, 4]).unwrap();
//!
//! let data = ModelData::from_columns(&[("z", &z)], &y, true)
//!     .unwrap()
//!     .with_clusters(clusters)
//!     .unwrap();
//! let fit = lm_robust(&data, &LmRobustOptions::default()).unwrap();
//!
//! assert_eq!(fit.se_type, VarianceType::CR2);
//! let row = fit.coefficient("z").unwrap();
//! println!("{row}");
//! ```

pub mod cluster;
pub mod hc;
pub mod lm;
pub mod solver;
pub mod variance;

pub use cluster::{cluster_vcov, ClusterType, ClusterVcov};
pub use hc::{heteroskedastic_vcov, HcType};
pub use lm::{lm_robust, FStatistic, LmRobustFit, LmRobustOptions, ModelData};
pub use solver::{solve, LeastSquares, RankDeficiency, SolverAlgorithm};
pub use variance::VarianceType;
