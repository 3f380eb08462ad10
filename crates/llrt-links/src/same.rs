//! Same-shape link: node (i, j, ...) connects to node (i, j, ...).
//!
//! Also the pattern behind every component's self link, which is what node
//! (as opposed to edge) operations iterate.

use crate::pattern::{dims_product, EdgeIndices, End, LinkPattern};

#[derive(Debug, Clone, Default)]
pub struct SameLink {
    dim0: Vec<usize>,
    dim1: Vec<usize>,
}

impl SameLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterate<F: FnMut(EdgeIndices)>(&self, _end: End, start: u64, stop: u64, mut f: F) {
        for i in start..stop {
            let i = i as usize;
            f(EdgeIndices {
                near_node: i,
                near_edge: i,
                far_node: i,
                far_edge: i,
                info: 0,
            });
        }
    }
}

impl LinkPattern for SameLink {
    fn identifier(&self) -> &'static str {
        "Same"
    }

    fn can_connect(&self, dim0: &[usize], dim1: &[usize]) -> bool {
        dim0 == dim1
    }

    fn deduce_dims(&self, far_dims: &[usize], _near: End) -> Option<Vec<usize>> {
        Some(far_dims.to_vec())
    }

    fn set_dimensions(&mut self, dim0: &[usize], dim1: &[usize]) {
        self.dim0 = dim0.to_vec();
        self.dim1 = dim1.to_vec();
    }

    fn end_data_len(&self, near_dims: &[usize], _far_dims: &[usize], _end: End) -> usize {
        dims_product(near_dims)
    }

    fn max_progress(&self, _end: End) -> u64 {
        dims_product(&self.dim0) as u64
    }

    // Every node boundary is a legal split.
    fn next_split(&self, end: End, requested: u64) -> u64 {
        requested.min(self.max_progress(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_diagonal() {
        let mut l = SameLink::new();
        l.set_dimensions(&[2, 3], &[2, 3]);
        assert_eq!(l.max_progress(End::Zero), 6);
        let mut seen = Vec::new();
        l.iterate(End::Zero, 2, 5, |e| {
            assert_eq!(e.near_node, e.far_node);
            assert_eq!(e.near_edge, e.near_node);
            seen.push(e.near_node);
        });
        assert_eq!(seen, vec![2, 3, 4]);
    }
}
