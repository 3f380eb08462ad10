//! Worker threads.
//!
//! Each worker follows the barrier chain. For a normal barrier it drains its
//! own chunk list, stamping start/end times per chunk; the worker whose
//! completion raises the done counter to the worker count runs every job's
//! combiner (under the scheduler lock, so job state is never touched
//! concurrently) and broadcasts completion. A single-threaded barrier is
//! claimed by one worker, which runs every job whole and combines inline.
//!
//! After broadcasting, the notifier checks whether a successor barrier was
//! already published and, if so, moves straight to it without sleeping.

use crate::barrier::{Barrier, WorkChunk};
use crate::placement;
use crate::scheduler::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

pub(crate) fn work_loop(shared: Arc<Shared>, start: Arc<Barrier>, worker: usize) {
    if shared.pin_workers && worker < placement::core_count() {
        placement::pin_current(worker);
    }
    tracing::trace!(worker, "worker running");

    let n = shared.n_workers;
    let mut barrier = start;
    let mut ready = false;
    loop {
        let next = if ready {
            ready = false;
            barrier.next.get().cloned()
        } else {
            wait_for_next(&shared, &barrier, worker)
        };
        let Some(next_barrier) = next else {
            break;
        };
        barrier = next_barrier;

        if !barrier.single_threaded {
            {
                let mut chunks = barrier.slots[worker].chunks.lock().unwrap();
                for chunk in chunks.iter_mut() {
                    chunk.started = Some(Instant::now());
                    if let Some(runner) = chunk.runner.as_mut() {
                        runner.run(chunk.start, chunk.end);
                    }
                    chunk.finished = Some(Instant::now());
                }
            }
            let guard = shared.chan.lock().unwrap();
            let done = barrier.done_workers.fetch_add(1, Ordering::SeqCst) + 1;
            if done == n {
                run_combiners(&barrier);
                drop(guard);
                ready = shared.broadcast_completed(barrier.sequence, worker);
                shared.chan_cv.notify_all();
            }
        } else if !barrier.claimed.swap(true, Ordering::SeqCst) {
            run_single_threaded(&barrier, worker);
            ready = shared.broadcast_completed(barrier.sequence, worker);
            {
                let _guard = shared.chan.lock().unwrap();
                barrier.done_workers.store(1, Ordering::SeqCst);
            }
            shared.chan_cv.notify_all();
        }
    }
    tracing::trace!(worker, "worker terminating");
}

/// Sleep until the current barrier is complete and a successor has been
/// published, or termination is requested.
fn wait_for_next(shared: &Shared, barrier: &Arc<Barrier>, worker: usize) -> Option<Arc<Barrier>> {
    let chan = &shared.workers[worker];
    let mut st = chan.state.lock().unwrap();
    loop {
        if st.terminate {
            return None;
        }
        if st.completed >= barrier.sequence && st.latest > barrier.sequence {
            // Publication happens before the latest-sequence broadcast, so
            // the link is visible here.
            if let Some(next) = barrier.next.get() {
                return Some(Arc::clone(next));
            }
        }
        st = chan.cv.wait(st).unwrap();
    }
}

/// Merge every chunk's kernel state into its job and deliver reductions.
/// Caller holds the scheduler lock; chunk order (worker 0 first, then each
/// slot in assignment order) is deterministic given deterministic planning.
pub(crate) fn run_combiners(barrier: &Barrier) {
    for slot in &barrier.slots {
        let mut chunks = slot.chunks.lock().unwrap();
        for chunk in chunks.iter_mut() {
            if let Some(runner) = chunk.runner.take() {
                chunk.job.lock().unwrap().absorb(runner);
            }
        }
    }
    for job in &barrier.jobs {
        job.lock().unwrap().finish_reduction();
    }
}

fn run_single_threaded(barrier: &Barrier, worker: usize) {
    for job_arc in &barrier.jobs {
        let mut job = job_arc.lock().unwrap();
        let max = job.spec.max_progress;
        let mut runner = (job.spec.spawn)();
        let started = Some(Instant::now());
        runner.run(0, max);
        let finished = Some(Instant::now());
        job.absorb(runner);
        job.finish_reduction();
        let chunk = WorkChunk {
            job: Arc::clone(job_arc),
            op_type: job.spec.op_type,
            trace_op: job.spec.trace_op,
            start: 0,
            end: max,
            runner: None,
            started,
            finished,
        };
        drop(job);
        barrier.slots[worker].chunks.lock().unwrap().push(chunk);
    }
}
