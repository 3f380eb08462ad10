//! Jobs: one dispatched kernel application, as the scheduler sees it.
//!
//! The scheduler is fully type-erased: it never sees the kernel, the link,
//! or the data, only a factory for chunk runners and a split function. The
//! dispatch front-end packages those up from the typed world.

use llrt_core::{CmpId, LinkId, OpTypeId};
use std::any::Any;
use std::sync::mpsc::Sender;

/// A per-chunk clone of a kernel, bound to one link iteration. `run`
/// executes the kernel over `[start, end)` progress units; `into_state`
/// surrenders the kernel state afterwards for the combiner pass.
pub trait KernelInstance: Send {
    fn run(&mut self, start: u64, end: u64);
    fn into_state(self: Box<Self>) -> Box<dyn Any + Send>;
}

pub type SpawnFn = Box<dyn FnMut() -> Box<dyn KernelInstance> + Send>;
pub type SplitFn = Box<dyn Fn(u64) -> u64 + Send>;
pub type FoldFn = Box<dyn FnMut(&mut Box<dyn Any + Send>, Box<dyn Any + Send>) + Send>;

/// Reduction of per-chunk kernel states. The accumulator is seeded from the
/// first chunk's state and every further chunk is folded in; when the job's
/// barrier completes the accumulated state is delivered to the waiting
/// client.
pub struct Reduction {
    state: Option<Box<dyn Any + Send>>,
    fold: FoldFn,
    deliver: Option<Sender<Box<dyn Any + Send>>>,
}

impl Reduction {
    pub fn new(fold: FoldFn, deliver: Option<Sender<Box<dyn Any + Send>>>) -> Self {
        Self {
            state: None,
            fold,
            deliver,
        }
    }
}

/// Everything the front-end hands the scheduler for one operation.
pub struct JobSpec {
    /// Stable key (kernel type ⊕ link iterator ⊕ end) for timing lookups.
    pub op_type: OpTypeId,
    /// Near-component mutual-exclusion key: jobs sharing it never run in the
    /// same barrier.
    pub cmp: CmpId,
    /// Second exclusion key for link operations. A link's edge arrays are
    /// shared by both of its ends, so two jobs iterating the same link (from
    /// either end) must not run in the same barrier even when their near
    /// components differ. Node operations carry `None`.
    pub link: Option<LinkId>,
    /// Total units of work; the job is consumed when `progress` reaches it.
    pub max_progress: u64,
    /// Refuse chunking; the whole job becomes a single chunk.
    pub indivisible: bool,
    pub spawn: SpawnFn,
    /// Smallest aligned split point at or after the requested progress.
    pub next_split: SplitFn,
    pub reduction: Option<Reduction>,
    /// Index from `TraceLog::log_op`, when profiling.
    pub trace_op: Option<usize>,
}

pub(crate) struct Job {
    pub spec: JobSpec,
    /// Units already handed out as chunks. Monotone, terminal at
    /// `spec.max_progress`.
    pub progress: u64,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        Self { spec, progress: 0 }
    }

    /// Fold one finished chunk's kernel state into the reduction, if any.
    pub fn absorb(&mut self, runner: Box<dyn KernelInstance>) {
        if let Some(red) = self.spec.reduction.as_mut() {
            let state = runner.into_state();
            match red.state.as_mut() {
                None => red.state = Some(state),
                Some(acc) => (red.fold)(acc, state),
            }
        }
    }

    /// Deliver the accumulated reduction state to the client, once.
    pub fn finish_reduction(&mut self) {
        if let Some(red) = self.spec.reduction.as_mut() {
            if let Some(tx) = red.deliver.take() {
                if let Some(state) = red.state.take() {
                    let _ = tx.send(state);
                }
            }
        }
    }
}
