//! The closed set of link patterns.
//!
//! Keeping the set closed (an enum rather than a trait object) lets edge
//! iteration stay generic over the kernel type: each kernel × pattern pair
//! monomorphizes to its own inner loop with the per-edge callback inlined.

use crate::adjlist::AdjListLink;
use crate::dense::DenseLink;
use crate::local2d::Local2dLink;
use crate::pattern::{EdgeIndices, End, LinkPattern};
use crate::same::SameLink;
use llrt_core::DataVec;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum LinkKind {
    Same(SameLink),
    Dense(DenseLink),
    Local2d(Local2dLink),
    AdjList(AdjListLink),
}

macro_rules! each_kind {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            LinkKind::Same($inner) => $body,
            LinkKind::Dense($inner) => $body,
            LinkKind::Local2d($inner) => $body,
            LinkKind::AdjList($inner) => $body,
        }
    };
}

impl LinkKind {
    pub fn iterate<F: FnMut(EdgeIndices)>(&self, end: End, start: u64, stop: u64, f: F) {
        each_kind!(self, l => l.iterate(end, start, stop, f))
    }

    /// Discriminant for operation-type keys.
    pub fn tag(&self) -> u8 {
        match self {
            LinkKind::Same(_) => 0,
            LinkKind::Dense(_) => 1,
            LinkKind::Local2d(_) => 2,
            LinkKind::AdjList(_) => 3,
        }
    }

    pub fn as_adj_list(&self) -> Option<&AdjListLink> {
        match self {
            LinkKind::AdjList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_adj_list_mut(&mut self) -> Option<&mut AdjListLink> {
        match self {
            LinkKind::AdjList(l) => Some(l),
            _ => None,
        }
    }
}

impl LinkPattern for LinkKind {
    fn identifier(&self) -> &'static str {
        each_kind!(self, l => l.identifier())
    }

    fn can_connect(&self, dim0: &[usize], dim1: &[usize]) -> bool {
        each_kind!(self, l => l.can_connect(dim0, dim1))
    }

    fn deduce_dims(&self, far_dims: &[usize], near: End) -> Option<Vec<usize>> {
        each_kind!(self, l => l.deduce_dims(far_dims, near))
    }

    fn set_dimensions(&mut self, dim0: &[usize], dim1: &[usize]) {
        each_kind!(self, l => l.set_dimensions(dim0, dim1))
    }

    fn end_data_len(&self, near_dims: &[usize], far_dims: &[usize], end: End) -> usize {
        each_kind!(self, l => l.end_data_len(near_dims, far_dims, end))
    }

    fn attach_edge_data(&mut self, end0: Arc<dyn DataVec>, end1: Arc<dyn DataVec>) {
        each_kind!(self, l => l.attach_edge_data(end0, end1))
    }

    fn max_progress(&self, end: End) -> u64 {
        each_kind!(self, l => l.max_progress(end))
    }

    fn next_split(&self, end: End, requested: u64) -> u64 {
        each_kind!(self, l => l.next_split(end, requested))
    }
}

impl From<SameLink> for LinkKind {
    fn from(l: SameLink) -> Self {
        LinkKind::Same(l)
    }
}

impl From<DenseLink> for LinkKind {
    fn from(l: DenseLink) -> Self {
        LinkKind::Dense(l)
    }
}

impl From<Local2dLink> for LinkKind {
    fn from(l: Local2dLink) -> Self {
        LinkKind::Local2d(l)
    }
}

impl From<AdjListLink> for LinkKind {
    fn from(l: AdjListLink) -> Self {
        LinkKind::AdjList(l)
    }
}
