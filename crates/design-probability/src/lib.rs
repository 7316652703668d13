//! Treatment-assignment probabilities for randomized designs
//!
//! A [`Declaration`] describes how treatment was assigned. From it,
//! [`declaration_to_condition_pr_mat`] builds the [`ConditionPrMatrix`]: the
//! probability that any two units land in any two conditions. Designs that
//! have no closed form can be described by simulated assignments and
//! passed to [`permutations_to_condition_pr_mat`].
//!
//! # Example
//!
//! ```rust
//! use design_core::Grouping;
//! use design_probability::{declaration_to_condition_pr_mat, Condition, Declaration};
//!
//! let blocks = Grouping::from_labels(&["a", "a", "b", "b"]).unwrap();
//! let declaration = Declaration::blocked(blocks, vec![0.5; 4]).unwrap();
//! let pr = declaration_to_condition_pr_mat(&declaration).unwrap();
//!
//! // Exactly one of the two units in block "a" is treated
//! assert_eq!(pr.joint(Condition::Treatment, 0, Condition::Treatment, 1), 0.0);
//! assert_eq!(pr.joint(Condition::Treatment, 0, Condition::Treatment, 2), 0.25);
//! ```

pub mod builder;
pub mod complete;
pub mod declaration;
pub mod matrix;

pub use builder::{declaration_to_condition_pr_mat, permutations_to_condition_pr_mat};
pub use complete::{complete_joint, complete_matrix, CompleteJoint};
pub use declaration::{ClusterAssignment, Declaration, Design};
pub use matrix::{Condition, ConditionPrMatrix};
