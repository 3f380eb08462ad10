//! Adjacency-list link: arbitrary connectivity, one edge at a time.
//!
//! Edges are inserted and removed explicitly. Removal destructs the edge's
//! data slots in place without moving surviving edges, so indices and
//! references to the survivors stay valid; `defragment_edges` optionally
//! compacts the slots afterwards (renumbering every edge). Both link ends
//! share edge slots: the near and far edge index of an edge are equal.
//!
//! Edits must not overlap a kernel running on the link.

use crate::pattern::{dims_product, EdgeIndices, End, LinkPattern};
use llrt_core::DataVec;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    edge: usize,
    far_node: usize,
}

#[derive(Clone, Default)]
pub struct AdjListLink {
    dim0: Vec<usize>,
    dim1: Vec<usize>,

    // adjacency[e][node] lists the neighbors of `node` as seen from end e.
    adjacency: [Vec<Vec<Neighbor>>; 2],

    // cum[e][node] is the number of edges incident to end-e nodes 0..=node.
    cum: [Vec<u64>; 2],

    // Slot-allocation high-water mark; exceeds the live edge count when
    // edges have been removed since the last defragmentation.
    edge_bound: usize,
    destructed: Vec<bool>,

    edge_data: Option<[Arc<dyn DataVec>; 2]>,
}

impl std::fmt::Debug for AdjListLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AdjListLink({} end-0 nodes, {} end-1 nodes, {} edge slots)",
            self.adjacency[0].len(),
            self.adjacency[1].len(),
            self.edge_bound
        )
    }
}

impl AdjListLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> u64 {
        self.cum[0].last().copied().unwrap_or(0)
    }

    fn recount(&mut self) {
        for e in 0..2 {
            let adj = &self.adjacency[e];
            let cum = &mut self.cum[e];
            cum.clear();
            cum.reserve(adj.len());
            let mut count = 0u64;
            for neighbors in adj {
                count += neighbors.len() as u64;
                cum.push(count);
            }
        }
    }

    fn resize_edge_data(&self) {
        if let Some(stores) = &self.edge_data {
            stores[0].resize(self.edge_bound);
            stores[1].resize(self.edge_bound);
        }
    }

    /// Insert edges given as (end-0 node, end-1 node) pairs. Edge data
    /// storage grows accordingly; existing edge indices are unchanged.
    pub fn insert_edges(&mut self, pairs: &[(usize, usize)]) {
        for &(n0, n1) in pairs {
            self.adjacency[0][n0].push(Neighbor {
                edge: self.edge_bound,
                far_node: n1,
            });
            self.adjacency[1][n1].push(Neighbor {
                edge: self.edge_bound,
                far_node: n0,
            });
            self.edge_bound += 1;
        }
        self.destructed.resize(self.edge_bound, false);
        self.resize_edge_data();
        self.recount();
    }

    /// Remove edges given as (end-0 node, end-1 node) pairs. For each pair
    /// the first matching edge is removed; its data slots are reset in
    /// place and the slot is left unused until the next defragmentation.
    pub fn remove_edges(&mut self, pairs: &[(usize, usize)]) {
        for &(n0, n1) in pairs {
            let list0 = &mut self.adjacency[0][n0];
            let Some(pos) = list0.iter().position(|nb| nb.far_node == n1) else {
                continue;
            };
            let edge = list0[pos].edge;
            list0.remove(pos);
            if let Some(stores) = &self.edge_data {
                stores[0].reset_entry(edge);
                stores[1].reset_entry(edge);
            }
            self.destructed[edge] = true;

            let list1 = &mut self.adjacency[1][n1];
            if let Some(pos) = list1.iter().position(|nb| nb.far_node == n0) {
                list1.remove(pos);
            }
        }
        self.recount();
    }

    /// Compact edge slots by copying surviving edges toward the start of
    /// the edge arrays, overwriting removed ones. Renumbers every edge.
    pub fn defragment_edges(&mut self) {
        // partial[i] = number of surviving edges among slots 0..=i, so a
        // surviving slot i moves to partial[i] - 1.
        let mut partial = vec![0usize; self.edge_bound];
        let mut count = 0usize;
        for i in 0..self.edge_bound {
            if !self.destructed[i] {
                count += 1;
            }
            partial[i] = count;
        }

        for adj in self.adjacency.iter_mut() {
            for neighbors in adj.iter_mut() {
                for nb in neighbors.iter_mut() {
                    nb.edge = partial[nb.edge] - 1;
                }
            }
        }

        if let Some(stores) = &self.edge_data {
            for store in stores.iter() {
                let mut placed = 0usize;
                for i in 0..self.edge_bound.min(store.len()) {
                    if partial[i] > placed {
                        placed = partial[i];
                        if placed - 1 != i {
                            store.move_entry(i, placed - 1);
                        }
                    }
                }
                store.resize(count);
            }
        }

        self.edge_bound = count;
        self.destructed.clear();
        self.destructed.resize(count, false);
        self.recount();
    }

    pub fn iterate<F: FnMut(EdgeIndices)>(&self, end: End, start: u64, stop: u64, mut f: F) {
        let adj = &self.adjacency[end.index()];
        let cum = &self.cum[end.index()];
        let mut progress = start;

        let mut ix = cum.partition_point(|&v| v < start + 1);
        while ix < adj.len() {
            progress += adj[ix].len() as u64;
            if progress > stop {
                break;
            }
            for (f_ix, nb) in adj[ix].iter().enumerate() {
                f(EdgeIndices {
                    near_node: ix,
                    near_edge: nb.edge,
                    far_node: nb.far_node,
                    far_edge: nb.edge,
                    info: f_ix,
                });
            }
            ix += 1;
        }
    }
}

impl LinkPattern for AdjListLink {
    fn identifier(&self) -> &'static str {
        "AdjList"
    }

    fn can_connect(&self, _dim0: &[usize], _dim1: &[usize]) -> bool {
        true
    }

    fn set_dimensions(&mut self, dim0: &[usize], dim1: &[usize]) {
        self.dim0 = dim0.to_vec();
        self.dim1 = dim1.to_vec();
        self.adjacency[0] = vec![Vec::new(); dims_product(dim0)];
        self.adjacency[1] = vec![Vec::new(); dims_product(dim1)];
        self.recount();
    }

    fn end_data_len(&self, _near_dims: &[usize], _far_dims: &[usize], _end: End) -> usize {
        // Grows as edges are inserted.
        0
    }

    fn attach_edge_data(&mut self, end0: Arc<dyn DataVec>, end1: Arc<dyn DataVec>) {
        self.edge_data = Some([end0, end1]);
    }

    fn max_progress(&self, _end: End) -> u64 {
        self.edge_count()
    }

    fn next_split(&self, end: End, requested: u64) -> u64 {
        let arr = &self.cum[end.index()];
        if arr.is_empty() {
            return 0;
        }
        let i = arr.partition_point(|&v| v < requested);
        if i == arr.len() {
            arr[arr.len() - 1]
        } else {
            arr[i]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges_of(l: &AdjListLink, end: End) -> Vec<(usize, usize, usize)> {
        let mut out = Vec::new();
        l.iterate(end, 0, l.max_progress(end), |e| {
            out.push((e.near_node, e.far_node, e.near_edge))
        });
        out
    }

    fn link_with(pairs: &[(usize, usize)]) -> AdjListLink {
        let mut l = AdjListLink::new();
        l.set_dimensions(&[4], &[3]);
        l.insert_edges(pairs);
        l
    }

    #[test]
    fn insert_and_iterate_both_ends() {
        let l = link_with(&[(0, 1), (0, 2), (3, 1)]);
        assert_eq!(l.max_progress(End::Zero), 3);
        assert_eq!(edges_of(&l, End::Zero), vec![(0, 1, 0), (0, 2, 1), (3, 1, 2)]);
        assert_eq!(edges_of(&l, End::One), vec![(1, 0, 0), (1, 3, 2), (2, 0, 1)]);
    }

    #[test]
    fn remove_keeps_survivor_indices() {
        let mut l = link_with(&[(0, 1), (0, 2), (3, 1)]);
        l.remove_edges(&[(0, 1)]);
        assert_eq!(l.max_progress(End::Zero), 2);
        assert_eq!(edges_of(&l, End::Zero), vec![(0, 2, 1), (3, 1, 2)]);
    }

    #[test]
    fn defragment_compacts_and_preserves_edges() {
        let mut l = link_with(&[(0, 1), (0, 2), (3, 1), (2, 0)]);
        l.remove_edges(&[(0, 2), (3, 1)]);
        l.defragment_edges();
        assert_eq!(l.edge_count(), 2);
        assert_eq!(edges_of(&l, End::Zero), vec![(0, 1, 0), (2, 0, 1)]);
        // Slots are dense again.
        let max_slot = edges_of(&l, End::Zero)
            .iter()
            .map(|&(_, _, e)| e)
            .max()
            .unwrap();
        assert_eq!(max_slot, 1);
    }

    #[test]
    fn split_is_node_aligned() {
        let l = link_with(&[(0, 0), (0, 1), (1, 0), (1, 1), (2, 2)]);
        assert_eq!(l.next_split(End::Zero, 1), 2);
        assert_eq!(l.next_split(End::Zero, 2), 2);
        assert_eq!(l.next_split(End::Zero, 3), 4);
        assert_eq!(l.next_split(End::Zero, 5), 5);
        assert_eq!(l.next_split(End::Zero, 9), 5);

        let mut parts = Vec::new();
        l.iterate(End::Zero, 0, 2, |e| parts.push((e.near_node, e.far_node)));
        l.iterate(End::Zero, 2, 5, |e| parts.push((e.near_node, e.far_node)));
        let mut whole = Vec::new();
        l.iterate(End::Zero, 0, 5, |e| whole.push((e.near_node, e.far_node)));
        assert_eq!(parts, whole);
    }
}
