//! Cluster-robust variance estimators
//!
//! - CR0: `M Σₛ XₛᵗeₛeₛᵗXₛ M`, df = S − 1
//! - stata: CR0 × `((N−1)/(N−r)) (S/(S−1))`, df = S − 1
//! - CR2: bias-reduced linearization. Each cluster's residuals are
//!   premultiplied by `Aₛ = Bₛ^(-1/2)` with `Bₛ = I − XₛMXₛᵗ`, and every
//!   coefficient gets its own Satterthwaite df.
//!
//! Here `M = (XᵗX)⁻¹` over the retained columns.
//!
//! `Bₛ` is the diagonal block of `(I−H)(I−H)ᵗ = I−H` for cluster `s`, so it
//! is built from the cluster's rows alone. The CR2 df uses the Gram matrix
//! of the N-vectors `pₛ = (I−H)ₛᵗAₛXₛMzₖ`, which reduces to
//!
//! ```text
//! pₛᵗpₜ = δₛₜ ‖Gₛzₖ‖² − (Qₛzₖ)ᵗ M (Qₜzₖ)
//! ```
//!
//! with `Gₛ = AₛXₛM` and `Qₛ = XₛᵗGₛ`. No N × N matrix is formed.

use crate::solver::LeastSquares;
use design_core::{Error, Grouping, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Eigenvalues at or below this are treated as zero in the pseudoinverse
pub const EIGEN_TOLERANCE: f64 = 1e-12;

/// Cluster-robust variance estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterType {
    CR0,
    Stata,
    CR2,
}

/// Cluster-robust variance matrix with per-coefficient degrees of freedom
#[derive(Debug, Clone)]
pub struct ClusterVcov {
    /// rank × rank variance matrix of the retained coefficients
    pub vcov: DMatrix<f64>,
    /// One entry per retained coefficient
    pub df: Vec<f64>,
    /// Number of clusters
    pub n_clusters: usize,
}

/// Per-cluster contributions to the CR2 meat and df
struct Cr2Piece {
    /// Xₛᵗ Aₛ eₛ
    score: DVector<f64>,
    /// Squared column norms of Gₛ = AₛXₛM
    g_norms: Vec<f64>,
    /// Qₛ = XₛᵗGₛ
    q: DMatrix<f64>,
}

/// Compute a cluster-robust variance for a fitted model
pub fn cluster_vcov(
    fit: &LeastSquares,
    clusters: &Grouping,
    cluster_type: ClusterType,
) -> Result<ClusterVcov> {
    clusters.check_units(fit.nobs(), "cluster labels")?;
    let s = clusters.n_groups();
    if s < 2 {
        return Err(Error::InsufficientClusters { found: s });
    }
    debug!("{:?} variance over {} clusters", cluster_type, s);

    match cluster_type {
        ClusterType::CR0 => Ok(cr0(fit, clusters)),
        ClusterType::Stata => {
            let mut out = cr0(fit, clusters);
            let n = fit.nobs() as f64;
            let r = fit.rank() as f64;
            let sf = s as f64;
            out.vcov *= ((n - 1.0) / (n - r)) * (sf / (sf - 1.0));
            Ok(out)
        }
        ClusterType::CR2 => Ok(cr2(fit, clusters)),
    }
}

fn cr0(fit: &LeastSquares, clusters: &Grouping) -> ClusterVcov {
    let x = fit.x_kept();
    let e = fit.residuals();
    let r = fit.rank();

    let scores = map_clusters(clusters, |members| {
        let xs = x.select_rows(members.iter());
        let es = DVector::from_iterator(members.len(), members.iter().map(|&i| e[i]));
        xs.tr_mul(&es)
    });

    let mut meat = DMatrix::zeros(r, r);
    for u in &scores {
        meat += u * u.transpose();
    }
    let m = fit.xtx_inv();
    let s = clusters.n_groups();
    ClusterVcov {
        vcov: m * meat * m,
        df: vec![(s - 1) as f64; r],
        n_clusters: s,
    }
}

fn cr2(fit: &LeastSquares, clusters: &Grouping) -> ClusterVcov {
    let x = fit.x_kept();
    let e = fit.residuals();
    let m = fit.xtx_inv();
    let r = fit.rank();
    let s = clusters.n_groups();

    let pieces = map_clusters(clusters, |members| {
        let xs = x.select_rows(members.iter());
        let es = DVector::from_iterator(members.len(), members.iter().map(|&i| e[i]));
        let xsm = &xs * m;
        let b = DMatrix::identity(members.len(), members.len()) - &xsm * xs.transpose();
        let a = sqrt_pinv(&b);

        let score = xs.tr_mul(&(&a * es));
        let g = &a * xsm;
        let g_norms = (0..r).map(|k| g.column(k).norm_squared()).collect();
        let q = xs.tr_mul(&g);
        Cr2Piece { score, g_norms, q }
    });

    let mut meat = DMatrix::zeros(r, r);
    for piece in &pieces {
        meat += &piece.score * piece.score.transpose();
    }

    let df = (0..r).map(|k| cr2_df(&pieces, m, k)).collect();
    ClusterVcov {
        vcov: m * meat * m,
        df,
        n_clusters: s,
    }
}

/// Satterthwaite df for coefficient `k` from the cluster Gram matrix
fn cr2_df(pieces: &[Cr2Piece], m: &DMatrix<f64>, k: usize) -> f64 {
    let s = pieces.len();
    let r = m.nrows();
    let mut qk = DMatrix::zeros(r, s);
    for (t, piece) in pieces.iter().enumerate() {
        qk.set_column(t, &piece.q.column(k));
    }
    let mut gram = -(qk.tr_mul(&(m * &qk)));
    for (t, piece) in pieces.iter().enumerate() {
        gram[(t, t)] += piece.g_norms[k];
    }

    let trace = gram.trace();
    let frobenius2 = gram.norm_squared();
    trace * trace / frobenius2
}

/// Symmetric square root of the Moore–Penrose pseudoinverse of a symmetric
/// positive semidefinite matrix
pub fn sqrt_pinv(b: &DMatrix<f64>) -> DMatrix<f64> {
    let eigen = b.clone().symmetric_eigen();
    let inv_sqrt = eigen.eigenvalues.map(|lambda| {
        if lambda > EIGEN_TOLERANCE {
            1.0 / lambda.sqrt()
        } else {
            0.0
        }
    });
    let v = &eigen.eigenvectors;
    v * DMatrix::from_diagonal(&inv_sqrt) * v.transpose()
}

#[cfg(feature = "parallel")]
fn map_clusters<F, R>(clusters: &Grouping, f: F) -> Vec<R>
where
    F: Fn(&[usize]) -> R + Sync + Send,
    R: Send,
{
    use rayon::prelude::*;

    let groups: Vec<&[usize]> = clusters.groups().collect();
    groups.par_iter().map(|members| f(members)).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_clusters<F, R>(clusters: &Grouping, f: F) -> Vec<R>
where
    F: Fn(&[usize]) -> R,
{
    clusters.groups().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hc::{heteroskedastic_vcov, HcType};
    use crate::solver::{solve, SolverAlgorithm};
    use approx::assert_relative_eq;

    fn data() -> (DMatrix<f64>, DVector<f64>, Grouping) {
        let x = DMatrix::from_row_slice(
            9,
            2,
            &[
                1.0, 0.3, //
                1.0, 1.2, //
                1.0, 2.1, //
                1.0, 0.8, //
                1.0, 3.3, //
                1.0, 1.9, //
                1.0, 4.4, //
                1.0, 2.6, //
                1.0, 0.1,
            ],
        );
        let y = DVector::from_vec(vec![1.1, 2.0, 3.9, 1.5, 5.2, 2.4, 7.9, 3.1, 0.6]);
        let clusters = Grouping::from_labels(&[1, 1, 2, 2, 2, 3, 3, 4, 4]).unwrap();
        (x, y, clusters)
    }

    /// df from the explicit N-vectors pₛ = (I−H)ₛᵗ Aₛ Xₛ M zₖ
    fn brute_force_df(fit: &LeastSquares, clusters: &Grouping, k: usize) -> f64 {
        let x = fit.x_kept();
        let m = fit.xtx_inv();
        let n = x.nrows();
        let ih = DMatrix::identity(n, n) - x * m * x.transpose();

        let ps: Vec<DVector<f64>> = clusters
            .groups()
            .map(|members| {
                let ih_s = ih.select_rows(members.iter());
                let b = &ih_s * ih_s.transpose();
                let a = sqrt_pinv(&b);
                let xs = x.select_rows(members.iter());
                let gk = (&a * &xs * m).column(k).into_owned();
                ih_s.tr_mul(&gk)
            })
            .collect();

        let num: f64 = ps.iter().map(|p| p.norm_squared()).sum();
        let mut den = 0.0;
        for p in &ps {
            for q in &ps {
                den += p.dot(q).powi(2);
            }
        }
        num * num / den
    }

    #[test]
    fn test_single_cluster_rejected() {
        let (x, y, _) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let one = Grouping::from_labels(&[0; 9]).unwrap();
        for ct in [ClusterType::CR0, ClusterType::Stata, ClusterType::CR2] {
            let err = cluster_vcov(&fit, &one, ct).unwrap_err();
            assert_eq!(err, Error::InsufficientClusters { found: 1 });
        }
    }

    #[test]
    fn test_cluster_length_mismatch() {
        let (x, y, _) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let short = Grouping::from_labels(&[0, 1, 1]).unwrap();
        assert!(matches!(
            cluster_vcov(&fit, &short, ClusterType::CR2),
            Err(Error::InputShape(_))
        ));
    }

    #[test]
    fn test_singleton_clusters_reduce_to_hc() {
        let (x, y, _) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let singletons = Grouping::singletons(9);

        let cr0 = cluster_vcov(&fit, &singletons, ClusterType::CR0).unwrap();
        let hc0 = heteroskedastic_vcov(&fit, HcType::HC0);
        assert_relative_eq!(cr0.vcov, hc0, epsilon = 1e-10);

        let cr2 = cluster_vcov(&fit, &singletons, ClusterType::CR2).unwrap();
        let hc2 = heteroskedastic_vcov(&fit, HcType::HC2);
        assert_relative_eq!(cr2.vcov, hc2, epsilon = 1e-10);

        // (N-1)/(N-r) · N/(N-1) = N/(N-r)
        let stata = cluster_vcov(&fit, &singletons, ClusterType::Stata).unwrap();
        let hc1 = heteroskedastic_vcov(&fit, HcType::HC1);
        assert_relative_eq!(stata.vcov, hc1, epsilon = 1e-10);
    }

    #[test]
    fn test_stata_scales_cr0() {
        let (x, y, clusters) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let cr0 = cluster_vcov(&fit, &clusters, ClusterType::CR0).unwrap();
        let stata = cluster_vcov(&fit, &clusters, ClusterType::Stata).unwrap();
        let factor = (8.0 / 7.0) * (4.0 / 3.0);
        assert_relative_eq!(stata.vcov, cr0.vcov * factor, epsilon = 1e-10);
        assert_eq!(cr0.df, vec![3.0, 3.0]);
        assert_eq!(stata.n_clusters, 4);
    }

    #[test]
    fn test_cr2_df_matches_brute_force() {
        let (x, y, clusters) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let cr2 = cluster_vcov(&fit, &clusters, ClusterType::CR2).unwrap();
        for k in 0..2 {
            let expected = brute_force_df(&fit, &clusters, k);
            assert_relative_eq!(cr2.df[k], expected, epsilon = 1e-8, max_relative = 1e-8);
            assert!(cr2.df[k] > 0.0 && cr2.df[k] <= 4.0 + 1e-9);
        }
    }

    #[test]
    fn test_bs_is_block_of_residual_maker() {
        let (x, y, clusters) = data();
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();
        let xk = fit.x_kept();
        let m = fit.xtx_inv();
        let ih = DMatrix::identity(9, 9) - xk * m * xk.transpose();
        for members in clusters.groups() {
            let ih_s = ih.select_rows(members.iter());
            let full = &ih_s * ih_s.transpose();
            let xs = xk.select_rows(members.iter());
            let local = DMatrix::identity(members.len(), members.len()) - &xs * m * xs.transpose();
            assert_relative_eq!(full, local, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cluster_fixed_effects_are_handled() {
        // Cluster dummies make every Bₛ singular
        let (x, y, clusters) = data();
        let mut design = DMatrix::zeros(9, 4);
        for i in 0..9 {
            design[(i, 0)] = x[(i, 1)];
        }
        for (g, members) in clusters.groups().enumerate().take(3) {
            for &i in members {
                design[(i, g + 1)] = 1.0;
            }
        }
        let mut full = DMatrix::zeros(9, 5);
        full.set_column(0, &DVector::from_element(9, 1.0));
        for j in 0..4 {
            full.set_column(j + 1, &design.column(j));
        }

        let fit = solve(&full, &y, SolverAlgorithm::PivotedQr).unwrap();
        assert_eq!(fit.rank(), 5);
        let cr2 = cluster_vcov(&fit, &clusters, ClusterType::CR2).unwrap();
        assert!(cr2.vcov[(1, 1)].is_finite());
        assert!(cr2.vcov[(1, 1)] >= 0.0);
        assert!(cr2.df[1].is_finite());
    }

    #[test]
    fn test_sqrt_pinv_squares_to_pinv() {
        let b = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        let a = sqrt_pinv(&b);
        let a2 = &a * &a;
        // B A² B = B for the pseudoinverse
        assert_relative_eq!(&b * &a2 * &b, b.clone(), epsilon = 1e-10);
        assert_relative_eq!(a.clone(), a.transpose(), epsilon = 1e-12);
    }
}
