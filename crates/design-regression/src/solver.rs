//! Least-squares solver with rank detection
//!
//! Two factorizations are available:
//!
//! - [`SolverAlgorithm::PivotedQr`] (default): Householder QR with limited
//!   column pivoting. Columns are processed left to right; a column whose
//!   remaining norm drops below `RANK_TOLERANCE` times its original norm is
//!   moved to the end and excluded. Retained columns keep their relative
//!   order, so the later member of a collinear set is the one dropped.
//!   `XᵗX` is never formed. nalgebra's `col_piv_qr` pivots on the largest
//!   remaining norm and reorders columns, so the factorization is written
//!   out here.
//! - [`SolverAlgorithm::Cholesky`]: Cholesky factorization of `XᵗX`. Faster,
//!   but only valid for full column rank. It never drops columns, so under
//!   rank deficiency the two algorithms disagree: QR drops columns while
//!   Cholesky fails (or, near singularity, returns unreliable numbers).

use design_core::error::{check_finite, check_len};
use design_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Relative column-norm threshold below which a column is treated as
/// linearly dependent on the columns before it
pub const RANK_TOLERANCE: f64 = 1e-7;

/// Factorization used to solve the normal equations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverAlgorithm {
    /// Rank-revealing Householder QR with column pivoting
    #[default]
    PivotedQr,
    /// Cholesky factorization of XᵗX; full column rank only
    Cholesky,
}

/// Columns dropped because they are linear combinations of earlier columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankDeficiency {
    /// Achieved rank
    pub rank: usize,
    /// Number of columns in the design matrix
    pub n_columns: usize,
    /// Original indices of the dropped columns, ascending
    pub dropped: Vec<usize>,
}

/// Solution of a least-squares problem
#[derive(Debug, Clone)]
pub struct LeastSquares {
    coefficients: Vec<Option<f64>>,
    kept: Vec<usize>,
    x_kept: DMatrix<f64>,
    xtx_inv: DMatrix<f64>,
    fitted: DVector<f64>,
    residuals: DVector<f64>,
}

impl LeastSquares {
    /// Coefficients for all K columns; `None` for dropped columns
    pub fn coefficients(&self) -> &[Option<f64>] {
        &self.coefficients
    }

    /// Coefficients of the retained columns only
    pub fn kept_coefficients(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.kept.len(),
            self.kept.iter().map(|&j| self.coefficients[j].unwrap_or(f64::NAN)),
        )
    }

    /// Original indices of the retained columns, ascending
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// Achieved rank
    pub fn rank(&self) -> usize {
        self.kept.len()
    }

    /// Number of observations
    pub fn nobs(&self) -> usize {
        self.x_kept.nrows()
    }

    /// Number of columns in the original design matrix
    pub fn n_columns(&self) -> usize {
        self.coefficients.len()
    }

    /// Design matrix restricted to the retained columns (N × rank)
    pub fn x_kept(&self) -> &DMatrix<f64> {
        &self.x_kept
    }

    /// `(X_rᵗX_r)⁻¹` for the retained columns (rank × rank)
    pub fn xtx_inv(&self) -> &DMatrix<f64> {
        &self.xtx_inv
    }

    pub fn fitted(&self) -> &DVector<f64> {
        &self.fitted
    }

    pub fn residuals(&self) -> &DVector<f64> {
        &self.residuals
    }

    /// Dropped columns, if any
    pub fn rank_deficiency(&self) -> Option<RankDeficiency> {
        if self.kept.len() == self.coefficients.len() {
            return None;
        }
        let dropped = (0..self.coefficients.len())
            .filter(|j| self.coefficients[*j].is_none())
            .collect();
        Some(RankDeficiency {
            rank: self.kept.len(),
            n_columns: self.coefficients.len(),
            dropped,
        })
    }

    /// Diagonal of the hat matrix `X(XᵗX)⁻¹Xᵗ`
    pub fn leverage(&self) -> DVector<f64> {
        leverage(&self.x_kept, &self.xtx_inv)
    }
}

/// Diagonal of `X M Xᵗ` without forming the N × N product
pub fn leverage(x: &DMatrix<f64>, xtx_inv: &DMatrix<f64>) -> DVector<f64> {
    let xm = x * xtx_inv;
    DVector::from_iterator(
        x.nrows(),
        (0..x.nrows()).map(|i| xm.row(i).dot(&x.row(i))),
    )
}

/// Solve `min ‖y − Xβ‖²`
pub fn solve(x: &DMatrix<f64>, y: &DVector<f64>, algorithm: SolverAlgorithm) -> Result<LeastSquares> {
    check_len(y.len(), x.nrows(), "outcome vector")?;
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(Error::empty_input("design matrix"));
    }
    check_finite(x.as_slice(), "design matrix")?;
    check_finite(y.as_slice(), "outcome vector")?;

    let solution = match algorithm {
        SolverAlgorithm::PivotedQr => solve_qr(x, y)?,
        SolverAlgorithm::Cholesky => solve_cholesky(x, y)?,
    };

    if let Some(deficiency) = solution.rank_deficiency() {
        warn!(
            "design matrix is rank deficient (rank {} of {}); dropping columns {:?}",
            deficiency.rank, deficiency.n_columns, deficiency.dropped
        );
    }
    Ok(solution)
}

fn solve_qr(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<LeastSquares> {
    let (n, k) = x.shape();
    let factor = PivotedQr::factorize(x, y);
    let rank = factor.rank;
    debug!("pivoted QR: n={}, k={}, rank={}", n, k, rank);

    let mut kept = factor.order[..rank].to_vec();
    kept.sort_unstable();

    let r = factor.r();
    let beta = r
        .solve_upper_triangular(&factor.qty.rows(0, rank).into_owned())
        .ok_or_else(|| Error::Computation("triangular solve failed in QR".to_string()))?;
    let r_inv = r
        .solve_upper_triangular(&DMatrix::identity(rank, rank))
        .ok_or_else(|| Error::Computation("triangular inverse failed in QR".to_string()))?;

    // Limited pivoting keeps retained columns in their original order,
    // so R's column order already matches `kept`.
    let xtx_inv = &r_inv * r_inv.transpose();

    let mut coefficients = vec![None; k];
    for (pos, &j) in kept.iter().enumerate() {
        coefficients[j] = Some(beta[pos]);
    }

    Ok(assemble(x, y, coefficients, kept, xtx_inv, &beta))
}

fn solve_cholesky(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<LeastSquares> {
    let k = x.ncols();
    let xtx = x.tr_mul(x);
    let chol = xtx.cholesky().ok_or_else(|| {
        Error::Computation(
            "Cholesky factorization of XᵗX failed; the design matrix is not of full column rank"
                .to_string(),
        )
    })?;
    let beta = chol.solve(&x.tr_mul(y));
    let xtx_inv = chol.inverse();
    debug!("cholesky solve: n={}, k={}", x.nrows(), k);

    let coefficients = beta.iter().map(|&b| Some(b)).collect();
    Ok(assemble(x, y, coefficients, (0..k).collect(), xtx_inv, &beta))
}

fn assemble(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    coefficients: Vec<Option<f64>>,
    kept: Vec<usize>,
    xtx_inv: DMatrix<f64>,
    beta: &DVector<f64>,
) -> LeastSquares {
    let x_kept = x.select_columns(kept.iter());
    let fitted = &x_kept * beta;
    let residuals = y - &fitted;
    LeastSquares {
        coefficients,
        kept,
        x_kept,
        xtx_inv,
        fitted,
        residuals,
    }
}

/// Householder QR with limited column pivoting
struct PivotedQr {
    /// Factored matrix: R in the upper triangle of the leading rank columns
    a: DMatrix<f64>,
    /// Qᵗy
    qty: DVector<f64>,
    /// order[c] = original index of the column now at position c
    order: Vec<usize>,
    rank: usize,
}

impl PivotedQr {
    fn factorize(x: &DMatrix<f64>, y: &DVector<f64>) -> Self {
        let (n, k) = x.shape();
        let mut a = x.clone();
        let mut qty = y.clone();
        let mut order: Vec<usize> = (0..k).collect();
        let original_norms: Vec<f64> = (0..k).map(|j| x.column(j).norm()).collect();

        let mut rank = 0;
        let mut active = k;
        while rank < active && rank < n {
            let remaining = (rank..n)
                .map(|i| a[(i, rank)] * a[(i, rank)])
                .sum::<f64>()
                .sqrt();
            let reference = original_norms[order[rank]];
            if reference == 0.0 || remaining < RANK_TOLERANCE * reference {
                for c in rank..k - 1 {
                    a.swap_columns(c, c + 1);
                    order.swap(c, c + 1);
                }
                active -= 1;
                continue;
            }
            householder_step(&mut a, &mut qty, rank, remaining);
            rank += 1;
        }

        Self { a, qty, order, rank }
    }

    fn r(&self) -> DMatrix<f64> {
        self.a
            .slice((0, 0), (self.rank, self.rank))
            .into_owned()
            .upper_triangle()
    }
}

/// Reflect column `j` below the diagonal onto `e_j`, applying the same
/// reflection to the trailing columns and to `qty`
fn householder_step(a: &mut DMatrix<f64>, qty: &mut DVector<f64>, j: usize, norm: f64) {
    let (n, k) = a.shape();
    let alpha = if a[(j, j)] >= 0.0 { -norm } else { norm };

    let mut v: Vec<f64> = (j..n).map(|i| a[(i, j)]).collect();
    v[0] -= alpha;
    let v_norm2: f64 = v.iter().map(|x| x * x).sum();
    if v_norm2 == 0.0 {
        return;
    }

    for c in j..k {
        let dot: f64 = (j..n).map(|i| v[i - j] * a[(i, c)]).sum();
        let s = 2.0 * dot / v_norm2;
        for i in j..n {
            a[(i, c)] -= s * v[i - j];
        }
    }

    let dot: f64 = (j..n).map(|i| v[i - j] * qty[i]).sum();
    let s = 2.0 * dot / v_norm2;
    for i in j..n {
        qty[i] -= s * v[i - j];
    }

    a[(j, j)] = alpha;
    for i in j + 1..n {
        a[(i, j)] = 0.0;
    }
}
