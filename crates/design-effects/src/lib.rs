//! Design-based estimators of average treatment effects
//!
//! - [`HorvitzThompson`]: inverse-probability weighting with variances from
//!   the condition probability matrix of the design.
//! - [`DifferenceInMeans`]: the difference of arm means with a variance
//!   chosen by the design (Welch, CR2, blocked or matched pairs).
//!
//! Both return estimates implementing [`EffectEstimate`].
//!
//! # Example
//!
//! ```rust
//! use design_effects::{DifferenceInMeans, EffectEstimate, HorvitzThompson};
//! use design_probability::Declaration;
//!
//! let y = [5.0, 3.0, 7.0, 1.0];
//! let z = [1.0, 0.0, 1.0, 0.0];
//!
//! let declaration = Declaration::complete_uniform(4, 0.5).unwrap();
//! let ht = HorvitzThompson::new().estimate(&y, &z, &declaration).unwrap();
//! let dim = DifferenceInMeans::new().estimate(&y, &z).unwrap();
//!
//! assert!((ht.estimate().unwrap() - 4.0).abs() < 1e-12);
//! assert!((dim.estimate().unwrap() - 4.0).abs() < 1e-12);
//! ```

pub mod difference_in_means;
pub mod effect;
pub mod horvitz_thompson;

pub use difference_in_means::{DifferenceInMeans, DimDesign, DimEstimate};
pub use effect::EffectEstimate;
pub use horvitz_thompson::{HorvitzThompson, HtEstimate, HtVariance};
