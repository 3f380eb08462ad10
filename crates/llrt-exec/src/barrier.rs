//! Barriers and worker channels.
//!
//! A barrier is one synchronization unit: a set of jobs with pairwise
//! distinct near components and pairwise distinct links, a chunk list per
//! worker, and a completion counter. Barriers form a singly-linked list;
//! the scheduler appends and
//! publishes by bumping each worker channel's `latest` sequence, workers
//! follow `next` pointers. A barrier is reclaimed when the scheduler and
//! every worker have dropped their references to it.

use crate::job::{Job, KernelInstance};
use llrt_core::OpTypeId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Instant;

pub(crate) struct WorkChunk {
    pub job: Arc<Mutex<Job>>,
    pub op_type: OpTypeId,
    pub trace_op: Option<usize>,
    pub start: u64,
    pub end: u64,
    /// Taken by the combiner pass when the barrier completes.
    pub runner: Option<Box<dyn KernelInstance>>,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

pub(crate) struct WorkerSlot {
    pub chunks: Mutex<Vec<WorkChunk>>,
}

pub(crate) struct Barrier {
    pub sequence: u64,
    pub single_threaded: bool,
    /// Which worker runs a single-threaded barrier: first CAS wins.
    pub claimed: AtomicBool,
    pub done_workers: AtomicUsize,
    pub jobs: Vec<Arc<Mutex<Job>>>,
    pub slots: Vec<WorkerSlot>,
    pub next: OnceLock<Arc<Barrier>>,
}

impl Barrier {
    pub fn new(
        sequence: u64,
        n_workers: usize,
        jobs: Vec<Arc<Mutex<Job>>>,
        chunks: Vec<Vec<WorkChunk>>,
        single_threaded: bool,
    ) -> Self {
        debug_assert!(chunks.len() <= n_workers);
        let mut slots: Vec<WorkerSlot> = chunks
            .into_iter()
            .map(|c| WorkerSlot {
                chunks: Mutex::new(c),
            })
            .collect();
        slots.resize_with(n_workers, || WorkerSlot {
            chunks: Mutex::new(Vec::new()),
        });
        Self {
            sequence,
            single_threaded,
            claimed: AtomicBool::new(false),
            done_workers: AtomicUsize::new(0),
            jobs,
            slots,
            next: OnceLock::new(),
        }
    }

    /// The barrier workers start on before any work exists: already
    /// complete, so everyone immediately waits for a successor.
    pub fn bootstrap(n_workers: usize) -> Self {
        let b = Self::new(0, n_workers, Vec::new(), Vec::new(), false);
        b.done_workers.store(n_workers, Ordering::SeqCst);
        b
    }

    pub fn finished(&self, n_workers: usize) -> bool {
        let done = self.done_workers.load(Ordering::SeqCst);
        if self.single_threaded {
            done >= 1
        } else {
            done == n_workers
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    pub terminate: bool,
    /// Highest published barrier sequence.
    pub latest: u64,
    /// Highest fully-completed barrier sequence.
    pub completed: u64,
}

pub(crate) struct WorkerChannel {
    pub state: Mutex<WorkerState>,
    pub cv: Condvar,
}

impl WorkerChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::default()),
            cv: Condvar::new(),
        }
    }
}
