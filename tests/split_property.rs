//! The splitting law: for any configuration, iterating a link in aligned
//! pieces visits exactly the same multiset of edges as one contiguous
//! iteration, and the near nodes of distinct pieces are disjoint.

use llrt::{AdjListLink, DenseLink, EdgeIndices, End, LinkKind, LinkPattern, Local2dLink};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

type Multiset = BTreeMap<(usize, usize, usize, usize, usize), u32>;

fn collect(kind: &LinkKind, end: End, start: u64, stop: u64) -> Multiset {
    let mut seen = Multiset::new();
    kind.iterate(end, start, stop, |e: EdgeIndices| {
        *seen
            .entry((e.near_node, e.near_edge, e.far_node, e.far_edge, e.info))
            .or_default() += 1;
    });
    seen
}

fn near_nodes(kind: &LinkKind, end: End, start: u64, stop: u64) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    kind.iterate(end, start, stop, |e: EdgeIndices| {
        seen.insert(e.near_node);
    });
    seen
}

/// Split `[0, max)` at two requested points and check the law.
fn check_splits(kind: &LinkKind, end: End, req1: u64, req2: u64) {
    let max = kind.max_progress(end);
    let whole = collect(kind, end, 0, max);
    assert_eq!(
        whole.values().map(|&c| c as u64).sum::<u64>(),
        max,
        "progress units must match edge visits"
    );
    if max == 0 {
        return;
    }

    let s1 = kind.next_split(end, req1.clamp(1, max)).min(max);
    assert!(s1 >= req1.clamp(1, max).min(max) || s1 == max);
    let s2 = kind.next_split(end, (s1 + req2).min(max)).min(max).max(s1);

    let mut pieces = collect(kind, end, 0, s1);
    for (k, v) in collect(kind, end, s1, s2) {
        *pieces.entry(k).or_default() += v;
    }
    for (k, v) in collect(kind, end, s2, max) {
        *pieces.entry(k).or_default() += v;
    }
    assert_eq!(whole, pieces, "split at {s1}, {s2} of {max}");

    let a = near_nodes(kind, end, 0, s1);
    let b = near_nodes(kind, end, s1, s2);
    let c = near_nodes(kind, end, s2, max);
    assert!(a.is_disjoint(&b), "near nodes shared across {s1}");
    assert!(a.is_disjoint(&c) && b.is_disjoint(&c), "near nodes shared across {s2}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn local2d_split_iteration_is_lossless(
        filter_rows in 1usize..=5,
        filter_cols in 1usize..=5,
        stride_rows in 1usize..=3,
        stride_cols in 1usize..=3,
        atrous_rows in 1usize..=3,
        atrous_cols in 1usize..=3,
        end0_rows in 1usize..=6,
        end0_cols in 1usize..=6,
        end0_depth in 1usize..=3,
        end1_rows in 1usize..=6,
        end1_cols in 1usize..=6,
        end1_depth in 1usize..=3,
        start_row in -3i64..=3,
        start_col in -3i64..=3,
        which_end in 0usize..=1,
        req1 in 0u64..2_000,
        req2 in 0u64..2_000,
    ) {
        let mut link = Local2dLink::with_params(
            start_row, start_col,
            filter_rows, filter_cols,
            stride_rows, stride_cols,
            atrous_rows, atrous_cols,
        );
        link.set_dimensions(
            &[end0_rows, end0_cols, end0_depth],
            &[end1_rows, end1_cols, end1_depth],
        );
        let kind = LinkKind::Local2d(link);
        let end = if which_end == 0 { End::Zero } else { End::One };
        check_splits(&kind, end, req1, req2);
    }

    #[test]
    fn adjlist_split_iteration_is_lossless(
        pairs in proptest::collection::vec((0usize..12, 0usize..9), 0..60),
        removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
        defragment in any::<bool>(),
        which_end in 0usize..=1,
        req1 in 0u64..70,
        req2 in 0u64..70,
    ) {
        let mut link = AdjListLink::new();
        link.set_dimensions(&[12], &[9]);
        link.insert_edges(&pairs);
        if !pairs.is_empty() {
            let doomed: Vec<(usize, usize)> =
                removals.iter().map(|ix| pairs[ix.index(pairs.len())]).collect();
            link.remove_edges(&doomed);
        }
        if defragment {
            link.defragment_edges();
        }
        let kind = LinkKind::AdjList(link);
        let end = if which_end == 0 { End::Zero } else { End::One };
        check_splits(&kind, end, req1, req2);
    }

    #[test]
    fn dense_split_iteration_is_lossless(
        n0 in 1usize..=9,
        n1 in 1usize..=9,
        which_end in 0usize..=1,
        req1 in 0u64..90,
        req2 in 0u64..90,
    ) {
        let mut link = DenseLink::new();
        link.set_dimensions(&[n0], &[n1]);
        let kind = LinkKind::Dense(link);
        let end = if which_end == 0 { End::Zero } else { End::One };
        check_splits(&kind, end, req1, req2);
    }
}
