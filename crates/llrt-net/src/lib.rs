//! llrt-net: the user-facing network.
//!
//! A network is a fixed set of components (dense typed arrays of node data)
//! joined by links (typed connectivity patterns with their own edge data).
//! Kernels are dispatched across a link's edges from either end, or across a
//! component's nodes, and run either inline or on the scheduler's worker
//! threads.
//!
//! The structure is expected to be built once and then left unchanged while
//! kernels run; only adjacency-list edge sets may be edited, and only
//! between batches.

mod dispatch;
mod kernel;
mod link;
mod network;
mod options;

pub use kernel::{EdgeCtx, EdgeKernel, NodeCtx, NodeKernel};
pub use link::{Link, LinkEnd};
pub use network::{Component, Network, RunSummary};
pub use options::OpOptions;
