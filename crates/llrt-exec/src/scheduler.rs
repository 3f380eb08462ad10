//! The scheduler: client batches in, barriers out.
//!
//! One client batch is a set of jobs that may run in any order and in
//! parallel, except that jobs sharing a near component (or iterating the
//! same link, whose edge arrays both ends share) must not run at the same
//! time. Planning repeatedly peels off a maximal subset of jobs with
//! pairwise-distinct near components and pairwise-distinct links (one
//! barrier), estimates its total time, and either hands the whole barrier
//! to a single worker (tiny batches) or "pours" the jobs across workers:
//! each worker's column is filled up to the common water level, splitting
//! jobs at near-node-aligned points sized by the per-operation-type timing
//! model.
//!
//! The scheduler thread alternates between planning ready batches and
//! finalizing completed barriers (collecting chunk timings, advancing the
//! client-visible completed-batch number, pruning consumed batches).

use crate::barrier::{Barrier, WorkChunk, WorkerChannel};
use crate::job::{Job, JobSpec};
use crate::perf::PerfTracker;
use crate::trace::TraceLog;
use crate::worker;
use llrt_core::{Error, NetConfig, OpTypeId, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct ClientBatch {
    pub number: u64,
    pub jobs: Vec<Arc<Mutex<Job>>>,
    pub ready: bool,
    pub scheduled: bool,
}

pub(crate) struct SchedState {
    pub shutdown: bool,
    /// Number of the most recently created batch; batch numbers start at 1
    /// (0 is the immediate-completion sentinel).
    pub last_batch_number: u64,
    pub batches: VecDeque<ClientBatch>,
}

pub(crate) struct Shared {
    pub chan: Mutex<SchedState>,
    pub chan_cv: Condvar,
    /// Batches with this number or lower are finished; guarded separately so
    /// clients can wait without touching the scheduler channel.
    pub completed: Mutex<u64>,
    pub completed_cv: Condvar,
    pub workers: Vec<WorkerChannel>,
    pub n_workers: usize,
    pub deterministic: AtomicBool,
    pub threshold: Duration,
    pub pin_workers: bool,
    pub trace: Option<Arc<Mutex<TraceLog>>>,
}

impl Shared {
    /// Tell every worker a new barrier is available.
    pub fn broadcast_latest(&self, latest: u64) {
        for chan in &self.workers {
            let mut st = chan.state.lock().unwrap();
            st.latest = st.latest.max(latest);
            drop(st);
            chan.cv.notify_all();
        }
    }

    /// Tell every worker a barrier is fully complete. Returns whether the
    /// notifying worker already has a successor barrier to move to.
    pub fn broadcast_completed(&self, completed: u64, notifier: usize) -> bool {
        let mut ready = false;
        for (i, chan) in self.workers.iter().enumerate() {
            let mut st = chan.state.lock().unwrap();
            st.completed = st.completed.max(completed);
            if i == notifier {
                ready = st.latest > completed;
            }
            drop(st);
            chan.cv.notify_all();
        }
        ready
    }

    pub fn broadcast_terminate(&self) {
        for chan in &self.workers {
            let mut st = chan.state.lock().unwrap();
            st.terminate = true;
            drop(st);
            chan.cv.notify_all();
        }
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(cfg: &NetConfig, trace: Option<Arc<Mutex<TraceLog>>>) -> Self {
        let n_workers = cfg.workers.max(1);
        let shared = Arc::new(Shared {
            chan: Mutex::new(SchedState {
                shutdown: false,
                last_batch_number: 0,
                batches: VecDeque::new(),
            }),
            chan_cv: Condvar::new(),
            completed: Mutex::new(0),
            completed_cv: Condvar::new(),
            workers: (0..n_workers).map(|_| WorkerChannel::new()).collect(),
            n_workers,
            deterministic: AtomicBool::new(cfg.deterministic),
            threshold: Duration::from_micros(cfg.single_thread_threshold_us),
            pin_workers: cfg.pin_workers,
            trace,
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("llrt-sched".into())
            .spawn(move || SchedThread::run(thread_shared))
            .expect("spawn scheduler thread");
        tracing::debug!(workers = n_workers, "scheduler started");
        Self {
            shared,
            thread: Some(thread),
        }
    }

    pub fn n_workers(&self) -> usize {
        self.shared.n_workers
    }

    /// Disable (or re-enable) adaptive timing. With it disabled, planning is
    /// a pure function of the submitted jobs.
    pub fn set_deterministic(&self, on: bool) {
        self.shared.deterministic.store(on, Ordering::SeqCst);
    }

    /// Append a job to the open client batch (creating one if needed).
    /// `end_of_batch` seals the batch so planning can start; `blocking`
    /// implies it and waits for the batch to finish before returning.
    pub fn submit(&self, spec: JobSpec, end_of_batch: bool, blocking: bool) -> Result<u64> {
        let end_of_batch = end_of_batch || blocking;
        let number;
        {
            let mut st = self.shared.chan.lock().unwrap();
            if st.shutdown {
                return Err(Error::Shutdown);
            }
            if st.batches.back().map_or(true, |b| b.ready) {
                st.last_batch_number += 1;
                let n = st.last_batch_number;
                st.batches.push_back(ClientBatch {
                    number: n,
                    jobs: Vec::new(),
                    ready: false,
                    scheduled: false,
                });
            }
            let batch = st.batches.back_mut().expect("open batch");
            number = batch.number;
            batch.jobs.push(Arc::new(Mutex::new(Job::new(spec))));
            if end_of_batch {
                batch.ready = true;
            }
        }
        if end_of_batch {
            self.shared.chan_cv.notify_all();
        }
        if blocking {
            self.finish_batch(number);
        }
        Ok(number)
    }

    /// Seal the open batch, if any. Returns whether a batch was sealed.
    pub fn seal_batch(&self) -> bool {
        let sealed = {
            let mut st = self.shared.chan.lock().unwrap();
            match st.batches.back_mut() {
                Some(b) if !b.ready => {
                    b.ready = true;
                    true
                }
                _ => false,
            }
        };
        if sealed {
            self.shared.chan_cv.notify_all();
        }
        sealed
    }

    /// Block until the batch with the given number has completed (including
    /// combiners). Batch number 0 is trivially complete.
    pub fn finish_batch(&self, number: u64) {
        let mut done = self.shared.completed.lock().unwrap();
        while *done < number {
            done = self.shared.completed_cv.wait(done).unwrap();
        }
    }

    /// Block until every batch submitted so far has completed.
    pub fn finish_batches(&self) {
        let number = self.shared.chan.lock().unwrap().last_batch_number;
        self.finish_batch(number);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut st = self.shared.chan.lock().unwrap();
            st.shutdown = true;
        }
        self.shared.chan_cv.notify_all();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        tracing::debug!("scheduler stopped");
    }
}

/// State owned by the scheduler thread.
struct SchedThread {
    shared: Arc<Shared>,
    /// Sequence of the most recently planned barrier.
    sequence: u64,
    last: Arc<Barrier>,
    /// The barrier to finalize next once its workers are done.
    sched_barrier: Arc<Barrier>,
    sched_finalized: bool,
    /// Barrier sequence → client batch completed by that barrier.
    seq_to_batch: BTreeMap<u64, u64>,
    perf: HashMap<OpTypeId, PerfTracker>,
}

enum Wake {
    Shutdown,
    Plan(u64, Vec<Arc<Mutex<Job>>>),
    Finalize,
}

impl SchedThread {
    fn run(shared: Arc<Shared>) {
        let n = shared.n_workers;
        let first = Arc::new(Barrier::bootstrap(n));

        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let worker_shared = Arc::clone(&shared);
            let start = Arc::clone(&first);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("llrt-worker-{i}"))
                    .spawn(move || worker::work_loop(worker_shared, start, i))
                    .expect("spawn worker thread"),
            );
        }

        let mut me = SchedThread {
            shared: Arc::clone(&shared),
            sequence: 0,
            last: Arc::clone(&first),
            sched_barrier: first,
            sched_finalized: false,
            seq_to_batch: BTreeMap::new(),
            perf: HashMap::new(),
        };
        me.main_loop();

        shared.broadcast_terminate();
        for w in workers {
            let _ = w.join();
        }
        // Release clients blocked on batches that will never finish now.
        {
            let mut done = shared.completed.lock().unwrap();
            *done = u64::MAX;
        }
        shared.completed_cv.notify_all();
    }

    fn main_loop(&mut self) {
        loop {
            let wake = {
                let mut st = self.shared.chan.lock().unwrap();
                loop {
                    if st.shutdown {
                        break Wake::Shutdown;
                    }
                    if let Some(b) = st.batches.iter_mut().find(|b| b.ready && !b.scheduled) {
                        b.scheduled = true;
                        break Wake::Plan(b.number, b.jobs.clone());
                    }
                    if !self.sched_finalized && self.sched_barrier.finished(self.shared.n_workers)
                    {
                        break Wake::Finalize;
                    }
                    st = self.shared.chan_cv.wait(st).unwrap();
                }
            };

            if !self.sched_finalized && self.sched_barrier.finished(self.shared.n_workers) {
                self.finalize_barrier();
                self.sched_finalized = true;
                self.advance_sched_barrier();
            }

            match wake {
                Wake::Shutdown => break,
                Wake::Finalize => {}
                Wake::Plan(number, jobs) => {
                    tracing::debug!(batch = number, jobs = jobs.len(), "planning client batch");
                    self.plan_all_stages(jobs);
                    self.advance_sched_barrier();
                    // The last planned barrier completes this batch.
                    self.seq_to_batch.insert(self.sequence, number);
                }
            }
        }
    }

    fn advance_sched_barrier(&mut self) {
        if self.sched_finalized {
            if let Some(next) = self.sched_barrier.next.get() {
                self.sched_barrier = Arc::clone(next);
                self.sched_finalized = false;
            }
        }
    }

    // ---- timing model ----

    fn estimate_time(&self, op: OpTypeId, ops: u64) -> Duration {
        if self.shared.deterministic.load(Ordering::Relaxed) {
            return Duration::from_micros(ops);
        }
        let us = self.perf.get(&op).map_or(1.0, PerfTracker::us_per_op);
        Duration::from_nanos((us * ops as f64 * 1e3) as u64)
    }

    fn estimate_ops(&self, op: OpTypeId, time: Duration) -> u64 {
        let us = time.as_secs_f64() * 1e6;
        let per_op = if self.shared.deterministic.load(Ordering::Relaxed) {
            1.0
        } else {
            self.perf.get(&op).map_or(1.0, PerfTracker::us_per_op)
        };
        ((us / per_op) as u64).max(1)
    }

    // ---- planning ----

    fn plan_all_stages(&mut self, jobs: Vec<Arc<Mutex<Job>>>) {
        for job in &jobs {
            let op = job.lock().unwrap().spec.op_type;
            self.perf.entry(op).or_default();
        }

        #[cfg(debug_assertions)]
        let all = jobs.clone();

        let mut buckets: VecDeque<Arc<Mutex<Job>>> = jobs.into();
        while !buckets.is_empty() {
            let (stage, tot_water) = self.select_water(&mut buckets);
            if tot_water < self.shared.threshold {
                self.single_threaded_schedule(stage);
            } else {
                self.pour_water(stage, tot_water);
            }
        }

        #[cfg(debug_assertions)]
        for job in &all {
            let job = job.lock().unwrap();
            debug_assert_eq!(job.progress, job.spec.max_progress, "planning left work behind");
        }
    }

    /// Peel off a maximal subset of the remaining jobs with pairwise
    /// distinct near components and pairwise distinct links. The second
    /// exclusion keeps the two ends of one link out of the same barrier:
    /// they write into the same edge arrays. Returns the subset and its
    /// estimated total time.
    fn select_water(
        &self,
        buckets: &mut VecDeque<Arc<Mutex<Job>>>,
    ) -> (Vec<Arc<Mutex<Job>>>, Duration) {
        let mut cmp_ids = HashSet::new();
        let mut link_ids = HashSet::new();
        let mut stage = Vec::new();
        let mut tot_water = Duration::ZERO;
        let mut i = 0;
        while i < buckets.len() {
            let (cmp, link, est) = {
                let job = buckets[i].lock().unwrap();
                (
                    job.spec.cmp,
                    job.spec.link,
                    self.estimate_time(job.spec.op_type, job.spec.max_progress),
                )
            };
            let blocked =
                cmp_ids.contains(&cmp) || link.is_some_and(|l| link_ids.contains(&l));
            if blocked {
                i += 1;
            } else {
                cmp_ids.insert(cmp);
                if let Some(l) = link {
                    link_ids.insert(l);
                }
                tot_water += est;
                stage.push(buckets.remove(i).expect("index in range"));
            }
        }
        (stage, tot_water)
    }

    fn publish_barrier(&mut self, barrier: Barrier) {
        let arc = Arc::new(barrier);
        if self.last.next.set(Arc::clone(&arc)).is_err() {
            unreachable!("barrier {} already linked", self.last.sequence);
        }
        self.last = arc;
        self.shared.broadcast_latest(self.sequence);
    }

    /// Distribute one barrier's jobs across workers by estimated duration.
    fn pour_water(&mut self, stage: Vec<Arc<Mutex<Job>>>, tot_water: Duration) {
        self.sequence += 1;
        let n = self.shared.n_workers;
        let water_level = tot_water / n as u32;
        let mut slots: Vec<Vec<WorkChunk>> = (0..n).map(|_| Vec::new()).collect();
        let mut queue: VecDeque<Arc<Mutex<Job>>> = stage.into();
        let mut barrier_jobs = Vec::new();

        for i in 0..n {
            let mut column = Duration::ZERO;
            loop {
                let Some(job_arc) = queue.front().cloned() else {
                    break;
                };
                let est = {
                    let job = job_arc.lock().unwrap();
                    self.estimate_time(job.spec.op_type, job.spec.max_progress - job.progress)
                };
                if column + est < water_level || i == n - 1 {
                    // Pour the whole bucket; the last worker takes all that
                    // remains.
                    queue.pop_front();
                    self.assign_job(&job_arc, &mut slots[i], Duration::ZERO);
                    column += est;
                    barrier_jobs.push(job_arc);
                } else {
                    // Pour as much of the bucket as fits under the level.
                    let available = water_level - column;
                    self.assign_job(&job_arc, &mut slots[i], available);
                    let full = {
                        let job = job_arc.lock().unwrap();
                        job.progress == job.spec.max_progress
                    };
                    if full {
                        queue.pop_front();
                        barrier_jobs.push(job_arc);
                    }
                    break;
                }
            }
        }
        debug_assert!(queue.is_empty(), "pour_water left jobs unassigned");

        tracing::trace!(sequence = self.sequence, jobs = barrier_jobs.len(), "barrier planned");
        let barrier = Barrier::new(self.sequence, n, barrier_jobs, slots, false);
        self.publish_barrier(barrier);
    }

    /// Everything in one barrier handed to whichever worker claims it.
    fn single_threaded_schedule(&mut self, stage: Vec<Arc<Mutex<Job>>>) {
        self.sequence += 1;
        for job_arc in &stage {
            let mut job = job_arc.lock().unwrap();
            job.progress = job.spec.max_progress;
        }
        tracing::trace!(
            sequence = self.sequence,
            jobs = stage.len(),
            "single-threaded barrier planned"
        );
        let n = self.shared.n_workers;
        let barrier = Barrier::new(self.sequence, n, stage, Vec::new(), true);
        self.publish_barrier(barrier);
    }

    /// Carve the next chunk off a job. A zero `desired` duration (or an
    /// indivisible job) takes the whole remainder; otherwise the chunk is
    /// sized from the timing model and snapped to the next aligned split
    /// point. Returns the chunk's estimated duration.
    fn assign_job(
        &self,
        job_arc: &Arc<Mutex<Job>>,
        slot: &mut Vec<WorkChunk>,
        desired: Duration,
    ) -> Duration {
        let mut job = job_arc.lock().unwrap();
        let assigned = if job.spec.indivisible || desired.is_zero() {
            job.spec.max_progress - job.progress
        } else {
            let units = self.estimate_ops(job.spec.op_type, desired);
            let aligned = (job.spec.next_split)(job.progress + units);
            let mut units = aligned.saturating_sub(job.progress);
            if job.progress + units > job.spec.max_progress {
                units = job.spec.max_progress - job.progress;
            }
            units
        };
        let runner = (job.spec.spawn)();
        slot.push(WorkChunk {
            job: Arc::clone(job_arc),
            op_type: job.spec.op_type,
            trace_op: job.spec.trace_op,
            start: job.progress,
            end: job.progress + assigned,
            runner: Some(runner),
            started: None,
            finished: None,
        });
        job.progress += assigned;
        self.estimate_time(job.spec.op_type, assigned)
    }

    // ---- finalization ----

    fn finalize_barrier(&mut self) {
        let barrier = Arc::clone(&self.sched_barrier);
        let deterministic = self.shared.deterministic.load(Ordering::Relaxed);
        for (worker, slot) in barrier.slots.iter().enumerate() {
            let mut chunks = slot.chunks.lock().unwrap();
            for chunk in chunks.drain(..) {
                let (Some(t0), Some(t1)) = (chunk.started, chunk.finished) else {
                    continue;
                };
                if !deterministic {
                    self.perf
                        .entry(chunk.op_type)
                        .or_default()
                        .track(t1 - t0, chunk.end - chunk.start);
                }
                if let (Some(trace), Some(op)) = (&self.shared.trace, chunk.trace_op) {
                    trace
                        .lock()
                        .unwrap()
                        .log_chunk(op, chunk.end - chunk.start, t0, t1, worker + 2);
                }
            }
        }

        if let Some(number) = self.seq_to_batch.remove(&barrier.sequence) {
            {
                let mut done = self.shared.completed.lock().unwrap();
                *done = number;
            }
            self.shared.completed_cv.notify_all();
            tracing::debug!(batch = number, "client batch completed");

            // Consumed batches (and their jobs) can go.
            let mut st = self.shared.chan.lock().unwrap();
            st.batches.retain(|b| b.number > number);
        }
    }
}
