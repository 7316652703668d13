//! Joint assignment probabilities under complete randomization
//!
//! With `n` units and a target of `pr · n` treated, a non-integer target is
//! realized by treating `m = ⌊pr·n⌋` units with probability `1 − ρ` and
//! `m + 1` units with probability `ρ`, where `ρ = pr·n − m`. For a fixed
//! count `c` and two distinct units:
//!
//! ```text
//! Pr(both treated)       = c(c−1) / (n(n−1))
//! Pr(one of each)        = c(n−c) / (n(n−1))
//! Pr(both control)       = (n−c)(n−c−1) / (n(n−1))
//! ```

use nalgebra::DMatrix;

/// Marginal and pairwise probabilities shared by every unit (pair)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompleteJoint {
    /// Pr(unit treated)
    pub treated: f64,
    /// Pr(i treated, j treated), i ≠ j
    pub treated_treated: f64,
    /// Pr(i control, j treated), i ≠ j
    pub control_treated: f64,
    /// Pr(i control, j control), i ≠ j
    pub control_control: f64,
}

/// Pairwise probabilities for complete randomization of `n` units
pub fn complete_joint(n: usize, prob: f64) -> CompleteJoint {
    let nf = n as f64;
    let target = prob * nf;
    let m = target.floor();
    let rho = target - m;

    let mut joint = CompleteJoint {
        treated: prob,
        treated_treated: 0.0,
        control_treated: 0.0,
        control_control: 0.0,
    };
    if n < 2 {
        return joint;
    }

    let pairs = nf * (nf - 1.0);
    let mut add = |c: f64, weight: f64| {
        joint.treated_treated += weight * c * (c - 1.0) / pairs;
        joint.control_treated += weight * c * (nf - c) / pairs;
        joint.control_control += weight * (nf - c) * (nf - c - 1.0) / pairs;
    };
    add(m, 1.0 - rho);
    if rho > 0.0 {
        add(m + 1.0, rho);
    }
    joint
}

/// 2n × 2n condition probability matrix of a complete design
pub fn complete_matrix(n: usize, prob: f64) -> DMatrix<f64> {
    let joint = complete_joint(n, prob);
    let mut m = DMatrix::zeros(2 * n, 2 * n);
    for i in 0..n {
        for j in 0..n {
            if i == j {
                m[(i, i)] = 1.0 - joint.treated;
                m[(n + i, n + i)] = joint.treated;
            } else {
                m[(i, j)] = joint.control_control;
                m[(n + i, n + j)] = joint.treated_treated;
                m[(i, n + j)] = joint.control_treated;
                m[(n + i, j)] = joint.control_treated;
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Average pairwise indicators over every assignment with `c` treated
    fn enumerate(n: usize, c: usize) -> (f64, f64, f64) {
        let (mut tt, mut ct, mut cc, mut count) = (0.0, 0.0, 0.0, 0.0);
        for mask in 0u32..(1 << n) {
            if mask.count_ones() as usize != c {
                continue;
            }
            let z = |i: usize| mask & (1 << i) != 0;
            tt += f64::from(u8::from(z(0) && z(1)));
            ct += f64::from(u8::from(!z(0) && z(1)));
            cc += f64::from(u8::from(!z(0) && !z(1)));
            count += 1.0;
        }
        (tt / count, ct / count, cc / count)
    }

    #[test]
    fn test_integer_target_matches_enumeration() {
        // n = 5, pr = 0.4: every 2-subset equally likely
        let joint = complete_joint(5, 0.4);
        let (tt, ct, cc) = enumerate(5, 2);
        assert_relative_eq!(joint.treated_treated, tt, epsilon = 1e-12);
        assert_relative_eq!(joint.control_treated, ct, epsilon = 1e-12);
        assert_relative_eq!(joint.control_control, cc, epsilon = 1e-12);
        assert_relative_eq!(joint.treated_treated, 0.1, epsilon = 1e-12);
        assert_relative_eq!(joint.control_control, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_fractional_target_mixes_counts() {
        // n = 5, pr = 0.5: half the time 2 treated, half the time 3
        let joint = complete_joint(5, 0.5);
        let (tt2, ct2, cc2) = enumerate(5, 2);
        let (tt3, ct3, cc3) = enumerate(5, 3);
        assert_relative_eq!(joint.treated_treated, 0.5 * tt2 + 0.5 * tt3, epsilon = 1e-12);
        assert_relative_eq!(joint.control_treated, 0.5 * ct2 + 0.5 * ct3, epsilon = 1e-12);
        assert_relative_eq!(joint.control_control, 0.5 * cc2 + 0.5 * cc3, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_rows_are_consistent() {
        let n = 6;
        let m = complete_matrix(n, 0.5);
        // Σ_j Pr(i=1, j=1) over j ≠ i equals E[c − 1 | i treated] · Pr(i treated)
        let row_tt: f64 = (0..n).filter(|&j| j != 0).map(|j| m[(n, n + j)]).sum();
        assert_relative_eq!(row_tt, 0.5 * 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.clone(), m.transpose(), epsilon = 1e-15);
        for i in 0..n {
            assert_eq!(m[(i, n + i)], 0.0);
            assert_relative_eq!(m[(i, i)] + m[(n + i, n + i)], 1.0);
        }
    }

    #[test]
    fn test_single_unit() {
        let joint = complete_joint(1, 0.3);
        assert_relative_eq!(joint.treated, 0.3);
        assert_eq!(joint.treated_treated, 0.0);
        let m = complete_matrix(1, 0.3);
        assert_relative_eq!(m[(0, 0)], 0.7);
        assert_relative_eq!(m[(1, 1)], 0.3);
    }
}
