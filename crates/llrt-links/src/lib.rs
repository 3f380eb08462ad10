#![forbid(unsafe_code)]
//! llrt-links: connectivity patterns between two components.
//!
//! A link pattern relates node indices of the component at end 0 to node
//! indices of the component at end 1, and knows how to iterate the resulting
//! edge set from either end as a single monotone progress counter. The
//! iteration protocol every pattern honors:
//!
//! - `max_progress(end)` is the total units of work (≈ edge count);
//!   partitioning `[0, max)` into aligned ranges visits every edge exactly
//!   once.
//! - `next_split(end, requested)` returns the smallest aligned point that is
//!   at least `requested` (clamped to `max_progress`). Aligned means the
//!   range boundary falls between whole near nodes, so two ranges never
//!   touch the same near node. This is the property the scheduler's lock-free
//!   kernels rely on.
//! - `iterate(end, start, stop, f)` invokes `f` once per edge in
//!   `[start, stop)` with near/far node and edge indices plus a
//!   pattern-specific `edge_info` tag.

pub mod adjlist;
pub mod dense;
pub mod kind;
pub mod local2d;
pub mod pattern;
pub mod same;

pub use adjlist::AdjListLink;
pub use dense::DenseLink;
pub use kind::LinkKind;
pub use local2d::{Local2dLink, Padding};
pub use pattern::{dims_product, EdgeIndices, End, LinkPattern};
pub use same::SameLink;
