//! Kernel contexts and traits.
//!
//! An edge kernel sees one edge per invocation: exclusive references to the
//! near node and both edge-data slots, a shared reference to the far node,
//! the flat indices, the pattern's `edge_info` tag, and a per-chunk RNG.
//!
//! What makes the exclusive references work without locks: chunks split only
//! between whole near nodes, no two jobs with the same near component share
//! a barrier, each edge (hence each edge-data slot) is visited exactly once
//! per iteration, and the two ends of one link never share a barrier either
//! (both ends write into the same edge arrays, so the scheduler excludes on
//! the link as well as on the near component). Far-node data is handed out
//! read-only; when another
//! job in the same barrier is writing that component's nodes, the kernels
//! must touch disjoint parts of the node value (the usual two-phase state
//! layout). The framework does not serialize far reads against near
//! writes, exactly like reading a neighbor's previous-step state while
//! writing your own next-step state.

use llrt_core::KernelRng;

pub struct EdgeCtx<'a, N, E, FN, FE> {
    /// Node data at the near end.
    pub near: &'a mut N,
    /// Edge data at the near end.
    pub edge: &'a mut E,
    /// Node data at the far end (read-only).
    pub far: &'a FN,
    /// Edge data at the far end.
    pub far_edge: &'a mut FE,
    pub near_index: usize,
    pub far_index: usize,
    pub near_edge_index: usize,
    pub far_edge_index: usize,
    /// Pattern-specific tag: far-node index for dense links, filter
    /// position for local-2d links, per-node neighbor ordinal for
    /// adjacency lists.
    pub info: usize,
    pub rng: &'a mut KernelRng,
}

pub struct NodeCtx<'a, N> {
    pub node: &'a mut N,
    pub index: usize,
    pub rng: &'a mut KernelRng,
}

/// A kernel applied at every edge of a link iteration. Implement this on a
/// struct when the kernel carries state to be combined; plain closures work
/// directly.
pub trait EdgeKernel<N, E, FN, FE>: Send + 'static {
    fn edge(&mut self, cx: &mut EdgeCtx<'_, N, E, FN, FE>);
}

impl<F, N, E, FN, FE> EdgeKernel<N, E, FN, FE> for F
where
    F: FnMut(&mut EdgeCtx<'_, N, E, FN, FE>) + Send + 'static,
    N: 'static,
    E: 'static,
    FN: 'static,
    FE: 'static,
{
    fn edge(&mut self, cx: &mut EdgeCtx<'_, N, E, FN, FE>) {
        self(cx)
    }
}

/// A kernel applied at every node of a component.
pub trait NodeKernel<N>: Send + 'static {
    fn node(&mut self, cx: &mut NodeCtx<'_, N>);
}

impl<F, N> NodeKernel<N> for F
where
    F: FnMut(&mut NodeCtx<'_, N>) + Send + 'static,
    N: 'static,
{
    fn node(&mut self, cx: &mut NodeCtx<'_, N>) {
        self(cx)
    }
}
