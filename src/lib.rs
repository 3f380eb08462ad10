//! llrt: parallel kernel execution over networks of node- and edge-data
//! components.
//!
//! Declare components (dense typed arrays of node data), join them with
//! links whose type dictates the connectivity pattern, then dispatch kernels
//! across the edges or nodes. The engine chops each operation into
//! near-node-aligned chunks and balances them across worker threads; within
//! a barrier no two jobs update the same near component or iterate the same
//! link, so kernels need no synchronization.
//!
//! ```no_run
//! use llrt::{DenseLink, End, Network, OpOptions};
//!
//! let mut net = Network::new(4);
//! let input = net.add_component::<f32>("input", &[500]);
//! let output = net.connect_new::<(), f32, f32>(input, DenseLink::new(), "output", &[500], false)?;
//! let link = net.component(output)?.links(End::One)[0];
//!
//! net.process_link(
//!     link,
//!     End::One,
//!     &mut |cx: &mut llrt::EdgeCtx<'_, f32, f32, f32, ()>| {
//!         *cx.near += *cx.edge * *cx.far;
//!     },
//!     &OpOptions::parallel().kernel_name("EdgeSum"),
//! )?;
//! # llrt::Result::Ok(())
//! ```

pub use llrt_core::{
    hash_bytes, hash_f32s, CmpId, Error, Hash256, KernelRng, LinkId, NetConfig, OpTypeId, Result,
};
pub use llrt_exec::{Scheduler, TraceLog, IMMEDIATE_BATCH};
pub use llrt_links::{
    AdjListLink, DenseLink, EdgeIndices, End, LinkKind, LinkPattern, Local2dLink, Padding,
    SameLink,
};
pub use llrt_net::{
    Component, EdgeCtx, EdgeKernel, Link, LinkEnd, Network, NodeCtx, NodeKernel, OpOptions,
    RunSummary,
};
