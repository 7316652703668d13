//! Construction of condition probability matrices from declarations

use crate::complete::complete_matrix;
use crate::declaration::{ClusterAssignment, Declaration, Design};
use crate::matrix::{broadcast, embed, ConditionPrMatrix};
use design_core::error::check_binary;
use design_core::{Error, Grouping, Result};
use nalgebra::DMatrix;
use tracing::{debug, instrument, warn};

/// Build the condition probability matrix implied by a declaration
#[instrument(skip(declaration), fields(design = declaration.design().name(), n = declaration.n_units()))]
pub fn declaration_to_condition_pr_mat(declaration: &Declaration) -> Result<ConditionPrMatrix> {
    let probs = declaration.treatment_probs();
    let n = probs.len();

    let degenerate = probs.iter().filter(|&&p| p == 0.0 || p == 1.0).count();
    if degenerate > 0 {
        warn!(
            "{} of {} units have treatment probability 0 or 1; inverse-probability weights will be undefined for them",
            degenerate, n
        );
    }

    let matrix = match declaration.design() {
        Design::Simple => simple_matrix(probs),
        Design::Complete => complete_matrix(n, probs[0]),
        Design::Clustered {
            clusters,
            assignment,
        } => clustered_matrix(clusters, probs, *assignment),
        Design::Blocked { blocks } => blocked_matrix(blocks, None, probs)?,
        Design::BlockedAndClustered { blocks, clusters } => {
            blocked_matrix(blocks, Some(clusters), probs)?
        }
        Design::Custom { permutations } => permutation_matrix(permutations),
    };
    debug!("built {}x{} condition probability matrix", matrix.nrows(), matrix.ncols());
    ConditionPrMatrix::from_raw(matrix)
}

impl Declaration {
    /// Condition probability matrix of this declaration
    pub fn condition_pr_matrix(&self) -> Result<ConditionPrMatrix> {
        declaration_to_condition_pr_mat(self)
    }
}

/// Estimate the condition probability matrix from R observed assignments
///
/// `permutations` is N × R with exact 0/1 entries; each column is one draw
/// of the treatment vector.
pub fn permutations_to_condition_pr_mat(permutations: &DMatrix<f64>) -> Result<ConditionPrMatrix> {
    if permutations.nrows() == 0 || permutations.ncols() == 0 {
        return Err(Error::empty_input("permutation matrix"));
    }
    check_binary(permutations.as_slice(), "permutation matrix")?;
    debug!(
        "condition probabilities from {} permutations of {} units",
        permutations.ncols(),
        permutations.nrows()
    );
    ConditionPrMatrix::from_raw(permutation_matrix(permutations))
}

/// Independent assignment: `vvᵗ` with marginals on the diagonal
fn simple_matrix(prob_treat: &[f64]) -> DMatrix<f64> {
    let n = prob_treat.len();
    let v: Vec<f64> = prob_treat
        .iter()
        .map(|p| 1.0 - p)
        .chain(prob_treat.iter().copied())
        .collect();
    let mut m = DMatrix::from_fn(2 * n, 2 * n, |i, j| v[i] * v[j]);
    for i in 0..2 * n {
        m[(i, i)] = v[i];
    }
    for i in 0..n {
        m[(i, n + i)] = 0.0;
        m[(n + i, i)] = 0.0;
    }
    m
}

fn clustered_matrix(clusters: &Grouping, prob_treat: &[f64], assignment: ClusterAssignment) -> DMatrix<f64> {
    let cluster_probs: Vec<f64> = clusters.first_units().iter().map(|&u| prob_treat[u]).collect();
    let cluster_level = match assignment {
        ClusterAssignment::Simple => simple_matrix(&cluster_probs),
        ClusterAssignment::Complete => complete_matrix(cluster_probs.len(), cluster_probs[0]),
    };
    broadcast(&cluster_level, clusters)
}

/// Independent across blocks, complete within each block
fn blocked_matrix(blocks: &Grouping, clusters: Option<&Grouping>, prob_treat: &[f64]) -> Result<DMatrix<f64>> {
    let n = prob_treat.len();
    let mut m = simple_matrix(prob_treat);

    let pieces = map_blocks(blocks, |members| -> Result<DMatrix<f64>> {
        let p = prob_treat[members[0]];
        match clusters {
            None => Ok(complete_matrix(members.len(), p)),
            Some(clusters) => {
                let local = clusters.restrict(members)?;
                let cluster_level = complete_matrix(local.n_groups(), p);
                Ok(broadcast(&cluster_level, &local))
            }
        }
    });

    for (members, piece) in blocks.groups().zip(pieces) {
        embed(&mut m, &piece?, members, n);
    }
    Ok(m)
}

/// `(1/R) M Mᵗ` with `M` stacking `1 − perm` over `perm`
fn permutation_matrix(permutations: &DMatrix<f64>) -> DMatrix<f64> {
    let (n, r) = permutations.shape();
    let mut stacked = DMatrix::zeros(2 * n, r);
    for i in 0..n {
        for k in 0..r {
            let z = permutations[(i, k)];
            stacked[(i, k)] = 1.0 - z;
            stacked[(n + i, k)] = z;
        }
    }
    (&stacked * stacked.transpose()) / r as f64
}

#[cfg(feature = "parallel")]
fn map_blocks<F, R>(blocks: &Grouping, f: F) -> Vec<R>
where
    F: Fn(&[usize]) -> R + Sync + Send,
    R: Send,
{
    use rayon::prelude::*;

    let groups: Vec<&[usize]> = blocks.groups().collect();
    groups.par_iter().map(|members| f(members)).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_blocks<F, R>(blocks: &Grouping, f: F) -> Vec<R>
where
    F: Fn(&[usize]) -> R,
{
    blocks.groups().map(f).collect()
}
