//! Property-based tests for unit groupings

use design_core::Grouping;
use proptest::prelude::*;

proptest! {
    // Property: every unit lands in exactly one group
    #[test]
    fn prop_grouping_is_partition(labels in prop::collection::vec(0u8..6, 1..60)) {
        let grouping = Grouping::from_labels(&labels).unwrap();

        let mut seen = vec![0usize; labels.len()];
        for members in grouping.groups() {
            prop_assert!(!members.is_empty());
            for &u in members {
                seen[u] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&c| c == 1));
        prop_assert_eq!(grouping.sizes().iter().sum::<usize>(), labels.len());
    }

    // Property: units share a group exactly when they share a label
    #[test]
    fn prop_grouping_respects_labels(labels in prop::collection::vec(0u8..4, 2..40)) {
        let grouping = Grouping::from_labels(&labels).unwrap();
        for i in 0..labels.len() {
            for j in 0..labels.len() {
                prop_assert_eq!(
                    labels[i] == labels[j],
                    grouping.group_of(i) == grouping.group_of(j)
                );
            }
        }
    }

    // Property: indices round trip through from_indices
    #[test]
    fn prop_from_indices_round_trip(labels in prop::collection::vec(0u8..5, 1..30)) {
        let grouping = Grouping::from_labels(&labels).unwrap();
        let rebuilt = Grouping::from_indices(grouping.assignments().to_vec()).unwrap();
        prop_assert_eq!(grouping, rebuilt);
    }
}
