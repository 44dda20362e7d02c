use cloudfed::core::combinatorics::{LexicographicPartitions, LexicographicSubsets};

#[test]
// Lexicographic order of the characteristic bit-vectors, element 0 in the
// most significant position: every proper subset precedes its supersets.
fn subsets_follow_bit_vector_order() {
    let subsets: Vec<Vec<usize>> = LexicographicSubsets::new(3, false).collect();
    assert_eq!(
        subsets,
        vec![
            vec![2],
            vec![1],
            vec![1, 2],
            vec![0],
            vec![0, 2],
            vec![0, 1],
            vec![0, 1, 2],
        ]
    );
}

#[test]
fn subsets_precede_their_supersets() {
    let subsets: Vec<Vec<usize>> = LexicographicSubsets::new(4, false).collect();
    let position = |needle: &[usize]| subsets.iter().position(|s| s == needle).unwrap();
    for (idx, subset) in subsets.iter().enumerate() {
        for (other_idx, other) in subsets.iter().enumerate() {
            if other_idx != idx && subset.iter().all(|e| other.contains(e)) {
                assert!(
                    idx < other_idx,
                    "{subset:?} (at {idx}) should precede its superset {other:?}"
                );
            }
        }
    }
    assert_eq!(position(&[3]), 0);
    assert_eq!(position(&[0, 1, 2, 3]), subsets.len() - 1);
}

#[test]
fn subsets_optionally_include_the_empty_set() {
    let with_empty: Vec<Vec<usize>> = LexicographicSubsets::new(3, true).collect();
    assert_eq!(with_empty.len(), 8);
    assert_eq!(with_empty[0], Vec::<usize>::new());

    let without_empty: Vec<Vec<usize>> = LexicographicSubsets::new(3, false).collect();
    assert_eq!(without_empty.len(), 7);
}

#[test]
fn subset_enumeration_is_restartable() {
    let first: Vec<Vec<usize>> = LexicographicSubsets::new(4, false).collect();
    let second: Vec<Vec<usize>> = LexicographicSubsets::new(4, false).collect();
    assert_eq!(first, second);
}

#[test]
fn partitions_of_three_elements() {
    let partitions: Vec<Vec<Vec<usize>>> = LexicographicPartitions::new(3).collect();
    assert_eq!(
        partitions,
        vec![
            vec![vec![0, 1, 2]],
            vec![vec![0, 1], vec![2]],
            vec![vec![0, 2], vec![1]],
            vec![vec![0], vec![1, 2]],
            vec![vec![0], vec![1], vec![2]],
        ]
    );
}

#[test]
fn partition_counts_are_bell_numbers() {
    assert_eq!(LexicographicPartitions::new(1).count(), 1);
    assert_eq!(LexicographicPartitions::new(2).count(), 2);
    assert_eq!(LexicographicPartitions::new(4).count(), 15);
    assert_eq!(LexicographicPartitions::new(5).count(), 52);
}

#[test]
fn partitions_cover_every_element_exactly_once() {
    for partition in LexicographicPartitions::new(5) {
        let mut elements: Vec<usize> = partition.into_iter().flatten().collect();
        elements.sort_unstable();
        assert_eq!(elements, vec![0, 1, 2, 3, 4]);
    }
}

#[test]
fn partition_enumeration_is_restartable() {
    let first: Vec<Vec<Vec<usize>>> = LexicographicPartitions::new(4).collect();
    let second: Vec<Vec<Vec<usize>>> = LexicographicPartitions::new(4).collect();
    assert_eq!(first, second);
}
