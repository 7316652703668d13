//! Partitions of units into clusters or blocks
//!
//! A [`Grouping`] maps every unit (row index) to exactly one group and keeps
//! the member list of each group. Groups are numbered in order of first
//! appearance in the label slice, so the same labels always produce the same
//! numbering.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Assignment of N units to S disjoint, nonempty groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    /// group_of[i] = group index of unit i
    group_of: Vec<usize>,
    /// members[g] = unit indices in group g, ascending
    /// Invariant: flatten(members) is a permutation of 0..n
    members: Vec<Vec<usize>>,
}

impl Grouping {
    /// Build a grouping from per-unit labels
    pub fn from_labels<L: Hash + Eq>(labels: &[L]) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::empty_input("group labels"));
        }

        let mut index: HashMap<&L, usize> = HashMap::new();
        let group_of = labels
            .iter()
            .map(|label| {
                let next = index.len();
                *index.entry(label).or_insert(next)
            })
            .collect();
        Self::from_indices(group_of)
    }

    /// Build a grouping from group indices already in `0..S`
    ///
    /// Every index in `0..S` must be used at least once.
    pub fn from_indices(group_of: Vec<usize>) -> Result<Self> {
        if group_of.is_empty() {
            return Err(Error::empty_input("group indices"));
        }
        let n_groups = group_of.iter().max().map_or(0, |&m| m + 1);
        let mut members = vec![Vec::new(); n_groups];
        for (unit, &g) in group_of.iter().enumerate() {
            members[g].push(unit);
        }
        if let Some(empty) = members.iter().position(|m| m.is_empty()) {
            return Err(Error::InputShape(format!(
                "group index {empty} has no members"
            )));
        }
        Ok(Self { group_of, members })
    }

    /// A grouping that puts every unit in its own group
    pub fn singletons(n: usize) -> Self {
        Self {
            group_of: (0..n).collect(),
            members: (0..n).map(|i| vec![i]).collect(),
        }
    }

    /// Number of units
    pub fn n_units(&self) -> usize {
        self.group_of.len()
    }

    /// Number of groups
    pub fn n_groups(&self) -> usize {
        self.members.len()
    }

    /// Group index of a unit
    pub fn group_of(&self, unit: usize) -> usize {
        self.group_of[unit]
    }

    /// Group index of every unit
    pub fn assignments(&self) -> &[usize] {
        &self.group_of
    }

    /// Units in group `g`
    pub fn members(&self, g: usize) -> &[usize] {
        &self.members[g]
    }

    /// Iterate over the member lists of all groups
    pub fn groups(&self) -> impl Iterator<Item = &[usize]> {
        self.members.iter().map(|m| m.as_slice())
    }

    /// Group sizes
    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    /// First unit of every group
    pub fn first_units(&self) -> Vec<usize> {
        self.members.iter().map(|m| m[0]).collect()
    }

    /// Restrict the grouping to a subset of units
    ///
    /// The result is indexed by position in `units` and its groups are
    /// renumbered in order of first appearance.
    pub fn restrict(&self, units: &[usize]) -> Result<Self> {
        let labels: Vec<usize> = units.iter().map(|&u| self.group_of[u]).collect();
        Self::from_labels(&labels)
    }

    /// Check that this grouping has `n` units
    pub fn check_units(&self, n: usize, context: &str) -> Result<()> {
        crate::error::check_len(self.n_units(), n, context)
    }

    /// Check that every group of `self` lies inside a single group of `outer`
    pub fn check_nested_in(&self, outer: &Grouping) -> Result<()> {
        for (g, members) in self.members.iter().enumerate() {
            let o = outer.group_of(members[0]);
            if members.iter().any(|&u| outer.group_of(u) != o) {
                return Err(Error::DesignMismatch(format!(
                    "cluster {g} spans more than one block"
                )));
            }
        }
        Ok(())
    }

    /// Check that a per-unit value is constant within every group
    pub fn is_constant_within(&self, values: &[f64]) -> bool {
        self.members
            .iter()
            .all(|m| m.iter().all(|&u| values[u] == values[m[0]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_first_appearance_order() {
        let g = Grouping::from_labels(&["b", "a", "b", "c", "a"]).unwrap();
        assert_eq!(g.n_units(), 5);
        assert_eq!(g.n_groups(), 3);
        assert_eq!(g.assignments(), &[0, 1, 0, 2, 1]);
        assert_eq!(g.members(0), &[0, 2]);
        assert_eq!(g.members(1), &[1, 4]);
        assert_eq!(g.sizes(), vec![2, 2, 1]);
        assert_eq!(g.first_units(), vec![0, 1, 3]);
    }

    #[test]
    fn test_from_indices_rejects_gaps() {
        assert!(Grouping::from_indices(vec![0, 0, 2]).is_err());
        let g = Grouping::from_indices(vec![1, 0, 1]).unwrap();
        assert_eq!(g.members(1), &[0, 2]);
    }

    #[test]
    fn test_empty_labels() {
        let labels: Vec<i64> = vec![];
        assert!(Grouping::from_labels(&labels).is_err());
    }

    #[test]
    fn test_restrict() {
        let g = Grouping::from_labels(&[7, 7, 8, 9, 9, 8]).unwrap();
        let sub = g.restrict(&[2, 3, 4]).unwrap();
        assert_eq!(sub.n_units(), 3);
        assert_eq!(sub.assignments(), &[0, 1, 1]);
    }

    #[test]
    fn test_nesting() {
        let blocks = Grouping::from_labels(&[1, 1, 1, 2, 2, 2]).unwrap();
        let nested = Grouping::from_labels(&[1, 1, 2, 3, 3, 4]).unwrap();
        assert!(nested.check_nested_in(&blocks).is_ok());

        let crossing = Grouping::from_labels(&[1, 1, 2, 2, 3, 3]).unwrap();
        let err = crossing.check_nested_in(&blocks).unwrap_err();
        assert!(matches!(err, Error::DesignMismatch(_)));
    }

    #[test]
    fn test_constant_within() {
        let g = Grouping::from_labels(&[1, 1, 2, 2]).unwrap();
        assert!(g.is_constant_within(&[0.5, 0.5, 0.2, 0.2]));
        assert!(!g.is_constant_within(&[0.5, 0.4, 0.2, 0.2]));
    }

    #[test]
    fn test_singletons() {
        let g = Grouping::singletons(3);
        assert_eq!(g.n_groups(), 3);
        assert_eq!(g.members(2), &[2]);
    }
}
