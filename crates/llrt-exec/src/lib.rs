//! llrt-exec: the scheduling and execution engine.
//!
//! Three kinds of threads cooperate here. Client threads submit batches of
//! jobs; a job is one kernel application over one link iteration, with a
//! near-component id, a total amount of work, a factory for per-chunk kernel
//! clones, and a near-node-aligned split function. The scheduler thread
//! plans each batch into one or more barriers and pours the work into
//! per-worker chunk lists sized by adaptive per-operation timing. Within a
//! barrier no two jobs share a near component or a link, which is what lets
//! user kernels run without locks. Worker threads drain their chunk lists,
//! synchronize at each barrier, run combiners, and move straight on to the
//! next barrier when one is already published.
//!
//! Everything blocks on mutex + condition variable; there are no spin
//! loops. In deterministic mode the adaptive timing is bypassed so chunk
//! boundaries are a pure function of the submitted jobs.

mod barrier;
mod job;
mod perf;
mod placement;
mod scheduler;
mod trace;
mod worker;

pub use job::{JobSpec, KernelInstance, Reduction};
pub use scheduler::Scheduler;
pub use trace::TraceLog;

/// Batch number reported for operations that completed inline; waiting on it
/// never blocks.
pub const IMMEDIATE_BATCH: u64 = 0;
