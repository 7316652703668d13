//! Condition probability matrices

use design_core::{Error, Grouping, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Absolute tolerance used by [`ConditionPrMatrix::validate`]
pub const VALIDATION_TOLERANCE: f64 = 1e-10;

/// Treatment condition of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Control,
    Treatment,
}

impl Condition {
    fn offset(self, n: usize) -> usize {
        match self {
            Self::Control => 0,
            Self::Treatment => n,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Control => "0",
            Self::Treatment => "1",
        }
    }
}

/// Symmetric 2N × 2N matrix of joint assignment probabilities
///
/// Rows and columns `0..N` refer to unit `i` in control, `N..2N` to unit
/// `i` in treatment. Diagonal entries are marginal probabilities; the
/// diagonal of the control-treatment quadrant is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionPrMatrix {
    matrix: DMatrix<f64>,
    n_units: usize,
}

impl ConditionPrMatrix {
    /// Wrap a raw 2N × 2N matrix after validating it
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        let out = Self::from_raw(matrix)?;
        out.validate()?;
        Ok(out)
    }

    pub(crate) fn from_raw(matrix: DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = matrix.shape();
        if rows != cols || rows % 2 != 0 || rows == 0 {
            return Err(Error::InputShape(format!(
                "condition probability matrix must be square with even, positive dimension, got {rows} x {cols}"
            )));
        }
        Ok(Self {
            matrix,
            n_units: rows / 2,
        })
    }

    pub fn n_units(&self) -> usize {
        self.n_units
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn into_inner(self) -> DMatrix<f64> {
        self.matrix
    }

    /// Pr(unit i in control)
    pub fn control_probs(&self) -> Vec<f64> {
        (0..self.n_units).map(|i| self.matrix[(i, i)]).collect()
    }

    /// Pr(unit i in treatment)
    pub fn treatment_probs(&self) -> Vec<f64> {
        let n = self.n_units;
        (0..n).map(|i| self.matrix[(n + i, n + i)]).collect()
    }

    /// Pr(unit i in condition `ci` and unit j in condition `cj`)
    pub fn joint(&self, ci: Condition, i: usize, cj: Condition, j: usize) -> f64 {
        let n = self.n_units;
        self.matrix[(ci.offset(n) + i, cj.offset(n) + j)]
    }

    /// Row labels `0_1 … 0_N, 1_1 … 1_N`
    pub fn labels(&self) -> Vec<String> {
        [Condition::Control, Condition::Treatment]
            .iter()
            .flat_map(|c| (1..=self.n_units).map(move |i| format!("{}_{}", c.prefix(), i)))
            .collect()
    }

    /// Check symmetry, range and that marginals sum to one
    pub fn validate(&self) -> Result<()> {
        let n = self.n_units;
        let m = &self.matrix;
        for i in 0..2 * n {
            for j in 0..2 * n {
                let v = m[(i, j)];
                if !v.is_finite() || v < -VALIDATION_TOLERANCE || v > 1.0 + VALIDATION_TOLERANCE {
                    return Err(Error::invalid_probability(v, "condition probability matrix"));
                }
                if (v - m[(j, i)]).abs() > VALIDATION_TOLERANCE {
                    return Err(Error::InputShape(format!(
                        "condition probability matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        for i in 0..n {
            let total = m[(i, i)] + m[(n + i, n + i)];
            if (total - 1.0).abs() > VALIDATION_TOLERANCE {
                return Err(Error::DesignMismatch(format!(
                    "marginal probabilities of unit {} sum to {total}, not 1",
                    i + 1
                )));
            }
            if m[(i, n + i)].abs() > VALIDATION_TOLERANCE {
                return Err(Error::DesignMismatch(format!(
                    "unit {} has nonzero probability of being in both conditions",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// Sub-matrix for a subset of units, in the order given
    pub fn restrict_to(&self, units: &[usize]) -> Result<Self> {
        let n = self.n_units;
        if let Some(&bad) = units.iter().find(|&&u| u >= n) {
            return Err(Error::InputShape(format!(
                "unit index {bad} is out of range for {n} units"
            )));
        }
        let index: Vec<usize> = units
            .iter()
            .copied()
            .chain(units.iter().map(|&u| n + u))
            .collect();
        let matrix = self.matrix.select_rows(index.iter()).select_columns(index.iter());
        Ok(Self {
            matrix,
            n_units: units.len(),
        })
    }

    /// Cluster-level matrix taken from the first unit of every cluster
    ///
    /// Only meaningful when every cluster is assigned as a whole.
    pub fn collapse_to(&self, clusters: &Grouping) -> Result<Self> {
        clusters.check_units(self.n_units, "cluster labels")?;
        self.restrict_to(&clusters.first_units())
    }
}

/// Place the 2k × 2k matrix of `units` into a 2n × 2n matrix
pub(crate) fn embed(target: &mut DMatrix<f64>, sub: &DMatrix<f64>, units: &[usize], n: usize) {
    let k = units.len();
    for a in 0..2 {
        for b in 0..2 {
            for (i, &ui) in units.iter().enumerate() {
                for (j, &uj) in units.iter().enumerate() {
                    target[(a * n + ui, b * n + uj)] = sub[(a * k + i, b * k + j)];
                }
            }
        }
    }
}

/// Expand a 2S × 2S cluster-level matrix to the 2N × 2N unit level
pub(crate) fn broadcast(cluster_matrix: &DMatrix<f64>, clusters: &Grouping) -> DMatrix<f64> {
    let n = clusters.n_units();
    let s = clusters.n_groups();
    DMatrix::from_fn(2 * n, 2 * n, |row, col| {
        let (a, i) = (row / n, row % n);
        let (b, j) = (col / n, col % n);
        cluster_matrix[(a * s + clusters.group_of(i), b * s + clusters.group_of(j))]
    })
}
