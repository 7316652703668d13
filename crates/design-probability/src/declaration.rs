//! Randomization declarations
//!
//! A [`Declaration`] records how treatment was assigned: the mechanism
//! ([`Design`]) and each unit's probability of treatment. Declarations are
//! built through validating constructors and never change afterwards, so
//! every consumer can rely on the checks below having passed:
//!
//! | Design | Requirement |
//! |---|---|
//! | simple | probabilities in `[0, 1]` |
//! | complete | one probability shared by all units |
//! | clustered | probabilities constant within clusters; uniform if complete |
//! | blocked | probabilities uniform within each block |
//! | blocked and clustered | clusters nest in blocks; uniform within blocks |
//! | custom | permutation matrix of exact 0/1 entries |

use design_core::error::{check_binary, check_finite};
use design_core::utils::all_equal;
use design_core::{Error, Grouping, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How clusters are assigned in a clustered design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterAssignment {
    /// Independent Bernoulli draw per cluster
    Simple,
    /// Fixed number of treated clusters
    #[default]
    Complete,
}

/// Assignment mechanism
#[derive(Debug, Clone, PartialEq)]
pub enum Design {
    /// Independent Bernoulli draw per unit
    Simple,
    /// Fixed number of treated units
    Complete,
    /// Whole clusters assigned together
    Clustered {
        clusters: Grouping,
        assignment: ClusterAssignment,
    },
    /// Complete randomization within each block
    Blocked { blocks: Grouping },
    /// Complete randomization of clusters within each block
    BlockedAndClustered { blocks: Grouping, clusters: Grouping },
    /// Empirical distribution over R observed assignments (N × R)
    Custom { permutations: DMatrix<f64> },
}

impl Design {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Complete => "complete",
            Self::Clustered {
                assignment: ClusterAssignment::Simple,
                ..
            } => "clustered (simple)",
            Self::Clustered {
                assignment: ClusterAssignment::Complete,
                ..
            } => "clustered (complete)",
            Self::Blocked { .. } => "blocked",
            Self::BlockedAndClustered { .. } => "blocked and clustered",
            Self::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for Design {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated randomization scheme over N units
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    design: Design,
    prob_treat: Vec<f64>,
}

impl Declaration {
    /// Independent Bernoulli assignment with per-unit probabilities
    pub fn simple(prob_treat: Vec<f64>) -> Result<Self> {
        check_probabilities(&prob_treat)?;
        Ok(Self {
            design: Design::Simple,
            prob_treat,
        })
    }

    /// Independent Bernoulli assignment with a common probability
    pub fn simple_uniform(n: usize, prob: f64) -> Result<Self> {
        Self::simple(vec![prob; n])
    }

    /// Complete randomization; all units must share one probability
    pub fn complete(prob_treat: Vec<f64>) -> Result<Self> {
        check_probabilities(&prob_treat)?;
        if !all_equal(&prob_treat) {
            return Err(Error::DesignMismatch(
                "complete randomization requires the same treatment probability for every unit"
                    .to_string(),
            ));
        }
        Ok(Self {
            design: Design::Complete,
            prob_treat,
        })
    }

    /// Complete randomization of `n` units, expecting `prob · n` treated
    pub fn complete_uniform(n: usize, prob: f64) -> Result<Self> {
        Self::complete(vec![prob; n])
    }

    /// Cluster randomization
    pub fn clustered(
        clusters: Grouping,
        prob_treat: Vec<f64>,
        assignment: ClusterAssignment,
    ) -> Result<Self> {
        check_probabilities(&prob_treat)?;
        clusters.check_units(prob_treat.len(), "cluster labels")?;
        if !clusters.is_constant_within(&prob_treat) {
            return Err(Error::DesignMismatch(
                "treatment probabilities must be constant within clusters".to_string(),
            ));
        }
        if assignment == ClusterAssignment::Complete && !all_equal(&prob_treat) {
            return Err(Error::DesignMismatch(
                "complete cluster randomization requires the same probability for every cluster"
                    .to_string(),
            ));
        }
        Ok(Self {
            design: Design::Clustered {
                clusters,
                assignment,
            },
            prob_treat,
        })
    }

    /// Block randomization with complete assignment inside each block
    pub fn blocked(blocks: Grouping, prob_treat: Vec<f64>) -> Result<Self> {
        check_probabilities(&prob_treat)?;
        blocks.check_units(prob_treat.len(), "block labels")?;
        check_uniform_within_blocks(&blocks, &prob_treat)?;
        Ok(Self {
            design: Design::Blocked { blocks },
            prob_treat,
        })
    }

    /// Block randomization of whole clusters
    pub fn blocked_and_clustered(
        blocks: Grouping,
        clusters: Grouping,
        prob_treat: Vec<f64>,
    ) -> Result<Self> {
        check_probabilities(&prob_treat)?;
        blocks.check_units(prob_treat.len(), "block labels")?;
        clusters.check_units(prob_treat.len(), "cluster labels")?;
        clusters.check_nested_in(&blocks)?;
        check_uniform_within_blocks(&blocks, &prob_treat)?;
        Ok(Self {
            design: Design::BlockedAndClustered { blocks, clusters },
            prob_treat,
        })
    }

    /// Design given by R observed assignment vectors (N × R of 0/1)
    ///
    /// Treatment probabilities are the row means.
    pub fn custom(permutations: DMatrix<f64>) -> Result<Self> {
        if permutations.nrows() == 0 || permutations.ncols() == 0 {
            return Err(Error::empty_input("permutation matrix"));
        }
        check_binary(permutations.as_slice(), "permutation matrix")?;
        let r = permutations.ncols() as f64;
        let prob_treat = (0..permutations.nrows())
            .map(|i| permutations.row(i).sum() / r)
            .collect();
        Ok(Self {
            design: Design::Custom { permutations },
            prob_treat,
        })
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn n_units(&self) -> usize {
        self.prob_treat.len()
    }

    /// Per-unit probability of treatment
    pub fn treatment_probs(&self) -> &[f64] {
        &self.prob_treat
    }

    /// Per-unit probability of control
    pub fn control_probs(&self) -> Vec<f64> {
        self.prob_treat.iter().map(|p| 1.0 - p).collect()
    }

    pub fn blocks(&self) -> Option<&Grouping> {
        match &self.design {
            Design::Blocked { blocks } | Design::BlockedAndClustered { blocks, .. } => Some(blocks),
            _ => None,
        }
    }

    pub fn clusters(&self) -> Option<&Grouping> {
        match &self.design {
            Design::Clustered { clusters, .. } | Design::BlockedAndClustered { clusters, .. } => {
                Some(clusters)
            }
            _ => None,
        }
    }
}

fn check_probabilities(prob_treat: &[f64]) -> Result<()> {
    if prob_treat.is_empty() {
        return Err(Error::empty_input("treatment probabilities"));
    }
    check_finite(prob_treat, "treatment probabilities")?;
    if let Some(&bad) = prob_treat.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(Error::invalid_probability(bad, "treatment probabilities"));
    }
    Ok(())
}

fn check_uniform_within_blocks(blocks: &Grouping, prob_treat: &[f64]) -> Result<()> {
    if let Some(b) = blocks
        .groups()
        .position(|members| members.iter().any(|&u| prob_treat[u] != prob_treat[members[0]]))
    {
        return Err(Error::DesignMismatch(format!(
            "treatment probabilities vary within block {b}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_rejects_bad_probability() {
        assert!(matches!(
            Declaration::simple(vec![0.5, 1.2]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(Declaration::simple(vec![]).is_err());
    }

    #[test]
    fn test_complete_requires_uniform() {
        assert!(Declaration::complete_uniform(4, 0.5).is_ok());
        let err = Declaration::complete(vec![0.5, 0.5, 0.4]).unwrap_err();
        assert!(matches!(err, Error::DesignMismatch(_)));
    }

    #[test]
    fn test_clustered_constant_within() {
        let clusters = Grouping::from_labels(&[1, 1, 2, 2]).unwrap();
        let err = Declaration::clustered(
            clusters.clone(),
            vec![0.5, 0.4, 0.5, 0.5],
            ClusterAssignment::Simple,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DesignMismatch(_)));

        // Simple cluster assignment allows different cluster probabilities
        let decl = Declaration::clustered(
            clusters.clone(),
            vec![0.5, 0.5, 0.3, 0.3],
            ClusterAssignment::Simple,
        )
        .unwrap();
        assert_eq!(decl.clusters(), Some(&clusters));
        assert!(decl.blocks().is_none());

        assert!(Declaration::clustered(clusters, vec![0.5, 0.5, 0.3, 0.3], ClusterAssignment::Complete).is_err());
    }

    #[test]
    fn test_blocked_checks() {
        let blocks = Grouping::from_labels(&["a", "a", "b", "b"]).unwrap();
        assert!(Declaration::blocked(blocks.clone(), vec![0.5, 0.5, 0.25, 0.25]).is_ok());
        assert!(matches!(
            Declaration::blocked(blocks.clone(), vec![0.5, 0.4, 0.25, 0.25]),
            Err(Error::DesignMismatch(_))
        ));

        let crossing = Grouping::from_labels(&[1, 2, 2, 3]).unwrap();
        assert!(matches!(
            Declaration::blocked_and_clustered(blocks, crossing, vec![0.5; 4]),
            Err(Error::DesignMismatch(_))
        ));
    }

    #[test]
    fn test_custom_probabilities_are_row_means() {
        let perms = DMatrix::from_row_slice(2, 4, &[1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        let decl = Declaration::custom(perms).unwrap();
        assert_eq!(decl.treatment_probs(), &[0.75, 0.25]);
        assert_eq!(decl.design().name(), "custom");

        let bad = DMatrix::from_row_slice(1, 2, &[1.0, 0.5]);
        assert!(matches!(Declaration::custom(bad), Err(Error::InputShape(_))));
    }
}
