//! Dispatch front-end: from typed kernels to type-erased jobs.
//!
//! Every user-visible dispatch funnels through here. An operation either
//! runs inline on the calling thread (no scheduler, or options without
//! `parallel`) or becomes a `JobSpec`: a spawn closure that clones the
//! kernel and binds it to the link's stores, a split closure that quantizes
//! progress at near-node boundaries, and optionally a reduction that folds
//! per-chunk kernel states back together.
//!
//! An operation whose kernel parameter types do not match what a link or
//! component actually stores is skipped and reports the immediate batch
//! number; net-wide dispatch over heterogeneous data relies on this.

use crate::kernel::{EdgeCtx, EdgeKernel, NodeCtx, NodeKernel};
use crate::link::Link;
use crate::network::Network;
use crate::options::OpOptions;
use llrt_core::{downcast_store, Error, KernelRng, OpTypeId, Result, SharedVec};
use llrt_exec::{JobSpec, KernelInstance, Reduction, IMMEDIATE_BATCH};
use llrt_links::{End, LinkKind, LinkPattern};
use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;

type Delivered = Box<dyn Any + Send>;

/// Stable key for the timing model: kernel type ⊕ link kind ⊕ end. Node
/// operations pass no end and a sentinel tag.
fn op_type_of<K: 'static>(kind_tag: u8, end: Option<End>) -> OpTypeId {
    let mut h = DefaultHasher::new();
    TypeId::of::<K>().hash(&mut h);
    kind_tag.hash(&mut h);
    end.map_or(2, End::index).hash(&mut h);
    OpTypeId::new(h.finish())
}

/// Label for performance records when the user supplied none. Closure type
/// names are long and garbled, so fall back to a hash.
fn kernel_label<K>(explicit: Option<&str>) -> String {
    if let Some(name) = explicit {
        return name.to_string();
    }
    let full = std::any::type_name::<K>();
    let short = full.rsplit("::").next().unwrap_or(full);
    if short.len() < 24 && !short.contains("closure") {
        short.to_string()
    } else {
        let mut h = DefaultHasher::new();
        full.hash(&mut h);
        format!("kernel_{:x}", h.finish())
    }
}

/// Invoke an edge visitor for every edge of `[start, stop)`.
///
/// The unsafe element access is what the engine's structure pays for:
/// near-node and edge slots are exclusive to this call because ranges split
/// only between whole near nodes, an edge is visited exactly once per
/// iteration, and no two jobs sharing a near component or a link run in the
/// same barrier (the link exclusion is what keeps the opposite end's
/// iteration, which addresses the same edge arrays, out of this barrier).
/// Far nodes are handed out read-only; kernels that read a far component
/// while another job writes it must keep to disjoint parts of the node
/// value, which the engine does not (and cannot) check.
fn drive_edges<N, E, FN, FE, F>(
    kind: &LinkKind,
    end: End,
    start: u64,
    stop: u64,
    near: &SharedVec<N>,
    edge: &SharedVec<E>,
    far: &SharedVec<FN>,
    far_edge: &SharedVec<FE>,
    rng: &mut KernelRng,
    mut f: F,
) where
    F: FnMut(&mut EdgeCtx<'_, N, E, FN, FE>),
{
    kind.iterate(end, start, stop, |ix| {
        let mut cx = unsafe {
            EdgeCtx {
                near: near.index_mut(ix.near_node),
                edge: edge.index_mut(ix.near_edge),
                far: far.index_ref(ix.far_node),
                far_edge: far_edge.index_mut(ix.far_edge),
                near_index: ix.near_node,
                far_index: ix.far_node,
                near_edge_index: ix.near_edge,
                far_edge_index: ix.far_edge,
                info: ix.info,
                rng: &mut *rng,
            }
        };
        f(&mut cx);
    });
}

fn drive_nodes<N, F>(nodes: &SharedVec<N>, start: u64, stop: u64, rng: &mut KernelRng, mut f: F)
where
    F: FnMut(&mut NodeCtx<'_, N>),
{
    for i in start..stop {
        let i = i as usize;
        // SAFETY: node ranges are split per index and near-component
        // exclusion keeps concurrent jobs off this component.
        let mut cx = unsafe {
            NodeCtx {
                node: nodes.index_mut(i),
                index: i,
                rng: &mut *rng,
            }
        };
        f(&mut cx);
    }
}

/// Per-chunk clone of an edge kernel, bound to one link end.
struct LinkChunk<K, N, E, FN, FE> {
    kernel: K,
    rng: KernelRng,
    link: Arc<Link>,
    end: End,
    near: Arc<SharedVec<N>>,
    edge: Arc<SharedVec<E>>,
    far: Arc<SharedVec<FN>>,
    far_edge: Arc<SharedVec<FE>>,
}

impl<K, N, E, FN, FE> KernelInstance for LinkChunk<K, N, E, FN, FE>
where
    K: EdgeKernel<N, E, FN, FE>,
    N: Send + Sync + 'static,
    E: Send + Sync + 'static,
    FN: Send + Sync + 'static,
    FE: Send + Sync + 'static,
{
    fn run(&mut self, start: u64, stop: u64) {
        let link = Arc::clone(&self.link);
        let kind = link.kind.read().unwrap();
        let end = self.end;
        let kernel = &mut self.kernel;
        drive_edges(
            &kind,
            end,
            start,
            stop,
            &self.near,
            &self.edge,
            &self.far,
            &self.far_edge,
            &mut self.rng,
            |cx| kernel.edge(cx),
        );
    }

    fn into_state(self: Box<Self>) -> Box<dyn Any + Send> {
        Box::new(self.kernel)
    }
}

/// Per-chunk clone of a node kernel.
struct NodeChunk<K, N> {
    kernel: K,
    rng: KernelRng,
    nodes: Arc<SharedVec<N>>,
}

impl<K, N> KernelInstance for NodeChunk<K, N>
where
    K: NodeKernel<N>,
    N: Send + Sync + 'static,
{
    fn run(&mut self, start: u64, stop: u64) {
        let kernel = &mut self.kernel;
        drive_nodes(&self.nodes, start, stop, &mut self.rng, |cx| {
            kernel.node(cx)
        });
    }

    fn into_state(self: Box<Self>) -> Box<dyn Any + Send> {
        Box::new(self.kernel)
    }
}

fn make_reduction<K: Clone + Send + 'static>(
    opts: &OpOptions<K>,
) -> (Option<Reduction>, Option<Receiver<Delivered>>) {
    match &opts.combiner {
        Some(comb) => {
            let comb = Arc::clone(comb);
            let (tx, rx) = mpsc::channel();
            let fold = Box::new(move |acc: &mut Delivered, state: Delivered| {
                let acc = acc.downcast_mut::<K>().expect("reduction state type");
                let state = *state.downcast::<K>().expect("chunk kernel state type");
                comb(acc, state);
            });
            (Some(Reduction::new(fold, Some(tx))), Some(rx))
        }
        None => (None, None),
    }
}

impl Network {
    fn fold_delivered<K>(&self, kernel: &mut K, opts: &OpOptions<K>, rx: Option<Receiver<Delivered>>)
    where
        K: Clone + Send + 'static,
    {
        if let (Some(rx), Some(comb)) = (rx, &opts.combiner) {
            // The barrier's combiner pass ran before the batch was reported
            // complete, so the state (if any chunk ran) is already here.
            if let Ok(state) = rx.try_recv() {
                let merged = *state.downcast::<K>().expect("merged kernel state type");
                comb(kernel, merged);
            }
        }
    }

    /// Apply an edge kernel across a link from the given end.
    ///
    /// Returns the batch number to wait on (0 when the operation ran inline
    /// or was skipped for data-type mismatch).
    pub fn process_link<N, E, FN, FE, K>(
        &self,
        link: llrt_core::LinkId,
        end: End,
        kernel: &mut K,
        opts: &OpOptions<K>,
    ) -> Result<u64>
    where
        K: EdgeKernel<N, E, FN, FE> + Clone,
        N: Default + Send + Sync + 'static,
        E: Default + Send + Sync + 'static,
        FN: Default + Send + Sync + 'static,
        FE: Default + Send + Sync + 'static,
    {
        let link = Arc::clone(self.link(link)?);
        let blocking = opts.wants_blocking();
        let seal = opts.end_of_batch || blocking;
        let (number, rx) = self.queue_link_op(&link, end, kernel, opts, seal)?;
        if blocking && number != IMMEDIATE_BATCH {
            self.finish_batch(number);
            self.fold_delivered(kernel, opts, rx);
        }
        Ok(number)
    }

    /// Apply a node kernel across one component.
    pub fn process_cmp<N, K>(
        &self,
        cmp: llrt_core::CmpId,
        kernel: &mut K,
        opts: &OpOptions<K>,
    ) -> Result<u64>
    where
        K: NodeKernel<N> + Clone,
        N: Default + Send + Sync + 'static,
    {
        let blocking = opts.wants_blocking();
        let seal = opts.end_of_batch || blocking;
        let (number, rx) = self.queue_cmp_op(cmp, kernel, opts, seal)?;
        if blocking && number != IMMEDIATE_BATCH {
            self.finish_batch(number);
            self.fold_delivered(kernel, opts, rx);
        }
        Ok(number)
    }

    /// Apply an edge kernel across every matching link end in the network,
    /// as one client batch. Ends are filtered by the axon/dendrite marking
    /// and the near/far component predicates; links whose data types do not
    /// match the kernel are skipped.
    pub fn process_net_links<N, E, FN, FE, K>(
        &self,
        kernel: &mut K,
        opts: &OpOptions<K>,
    ) -> Result<u64>
    where
        K: EdgeKernel<N, E, FN, FE> + Clone,
        N: Default + Send + Sync + 'static,
        E: Default + Send + Sync + 'static,
        FN: Default + Send + Sync + 'static,
        FE: Default + Send + Sync + 'static,
    {
        let mut targets: Vec<(Arc<Link>, End)> = Vec::new();
        for c in &self.components {
            if let Some(f) = &opts.near_filter {
                if !f(c) {
                    continue;
                }
            }
            for end in [End::Zero, End::One] {
                for link_id in c.links(end) {
                    let link = &self.links[link_id.get() as usize];
                    let near_end = link.end(end);
                    if opts.only_axons && !near_end.is_axon() {
                        continue;
                    }
                    if opts.only_dendrites && !near_end.is_dendrite() {
                        continue;
                    }
                    if let Some(f) = &opts.far_filter {
                        let far = &self.components[link.end(end.other()).cmp().get() as usize];
                        if !f(far) {
                            continue;
                        }
                    }
                    targets.push((Arc::clone(link), end));
                }
            }
        }

        let mut number = IMMEDIATE_BATCH;
        let mut receivers = Vec::new();
        for (link, end) in &targets {
            let (n, rx) = self.queue_link_op(link, *end, kernel, opts, false)?;
            number = number.max(n);
            receivers.push(rx);
        }
        self.finish_net_op(kernel, opts, number, receivers)
    }

    /// Apply a node kernel across every matching component, as one client
    /// batch. Components whose node type does not match are skipped.
    pub fn process_net_cmps<N, K>(&self, kernel: &mut K, opts: &OpOptions<K>) -> Result<u64>
    where
        K: NodeKernel<N> + Clone,
        N: Default + Send + Sync + 'static,
    {
        let mut ids = Vec::new();
        for c in &self.components {
            if let Some(f) = &opts.near_filter {
                if !f(c) {
                    continue;
                }
            }
            ids.push(c.id());
        }

        let mut number = IMMEDIATE_BATCH;
        let mut receivers = Vec::new();
        for id in ids {
            let (n, rx) = self.queue_cmp_op(id, kernel, opts, false)?;
            number = number.max(n);
            receivers.push(rx);
        }
        self.finish_net_op(kernel, opts, number, receivers)
    }

    fn finish_net_op<K>(
        &self,
        kernel: &mut K,
        opts: &OpOptions<K>,
        number: u64,
        receivers: Vec<Option<Receiver<Delivered>>>,
    ) -> Result<u64>
    where
        K: Clone + Send + 'static,
    {
        let blocking = opts.wants_blocking();
        if opts.parallel && self.sched.is_some() {
            if opts.end_of_batch || blocking {
                self.seal_batch();
            }
            if blocking {
                self.finish_batches();
                for rx in receivers {
                    self.fold_delivered(kernel, opts, rx);
                }
            }
        }
        Ok(number)
    }

    /// Visit every node of a component inline, with a borrowing closure.
    pub fn for_each_node<N, F>(&self, cmp: llrt_core::CmpId, f: F) -> Result<()>
    where
        N: Default + Send + Sync + 'static,
        F: FnMut(&mut NodeCtx<'_, N>),
    {
        let c = self.component(cmp)?;
        let nodes = downcast_store::<N>(&c.data).ok_or_else(|| {
            Error::DataType(format!(
                "component {} does not store {}",
                c.name(),
                std::any::type_name::<N>()
            ))
        })?;
        self.kernels_run
            .fetch_add(nodes.len() as u64, Ordering::Relaxed);
        let mut rng = self.rng.lock().unwrap();
        drive_nodes(&nodes, 0, nodes.len() as u64, &mut *rng, f);
        Ok(())
    }

    /// Visit every edge of a link inline, with a borrowing closure.
    pub fn for_each_edge<N, E, FN, FE, F>(
        &self,
        link: llrt_core::LinkId,
        end: End,
        f: F,
    ) -> Result<()>
    where
        N: Default + Send + Sync + 'static,
        E: Default + Send + Sync + 'static,
        FN: Default + Send + Sync + 'static,
        FE: Default + Send + Sync + 'static,
        F: FnMut(&mut EdgeCtx<'_, N, E, FN, FE>),
    {
        let link = self.link(link)?;
        self.reject_self_ends(link)?;
        let (near, edge, far, far_edge) = self
            .bind_link::<N, E, FN, FE>(link, end)
            .ok_or_else(|| Error::DataType(format!("link {} stores other types", link.name())))?;
        let max = link.max_progress(end);
        self.kernels_run.fetch_add(max, Ordering::Relaxed);
        let kind = link.kind.read().unwrap();
        let mut rng = self.rng.lock().unwrap();
        drive_edges(&kind, end, 0, max, &near, &edge, &far, &far_edge, &mut *rng, f);
        Ok(())
    }

    /// Edge kernels take an exclusive near-node reference and a shared
    /// far-node reference; a link whose two ends are the same component
    /// (only a component's internal self link is, `connect` rejects the
    /// rest) would alias them over one array. Node work goes through
    /// `process_cmp` / `for_each_node` instead.
    fn reject_self_ends(&self, link: &Arc<Link>) -> Result<()> {
        if link.end(End::Zero).cmp() == link.end(End::One).cmp() {
            return Err(Error::Topology(format!(
                "link {} has the same component at both ends; edge kernels need \
                 distinct near and far components",
                link.name()
            )));
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn bind_link<N, E, FN, FE>(
        &self,
        link: &Arc<Link>,
        end: End,
    ) -> Option<(
        Arc<SharedVec<N>>,
        Arc<SharedVec<E>>,
        Arc<SharedVec<FN>>,
        Arc<SharedVec<FE>>,
    )>
    where
        N: Default + Send + Sync + 'static,
        E: Default + Send + Sync + 'static,
        FN: Default + Send + Sync + 'static,
        FE: Default + Send + Sync + 'static,
    {
        let near_end = link.end(end);
        let far_end = link.end(end.other());
        let near_cmp = &self.components[near_end.cmp().get() as usize];
        let far_cmp = &self.components[far_end.cmp().get() as usize];
        Some((
            downcast_store::<N>(&near_cmp.data)?,
            downcast_store::<E>(near_end.data())?,
            downcast_store::<FN>(&far_cmp.data)?,
            downcast_store::<FE>(far_end.data())?,
        ))
    }

    /// The single funnel for link operations. Runs inline, or submits a job
    /// (sealing the batch when asked) and returns the batch number plus the
    /// reduction receiver.
    fn queue_link_op<N, E, FN, FE, K>(
        &self,
        link: &Arc<Link>,
        end: End,
        kernel: &mut K,
        opts: &OpOptions<K>,
        seal: bool,
    ) -> Result<(u64, Option<Receiver<Delivered>>)>
    where
        K: EdgeKernel<N, E, FN, FE> + Clone,
        N: Default + Send + Sync + 'static,
        E: Default + Send + Sync + 'static,
        FN: Default + Send + Sync + 'static,
        FE: Default + Send + Sync + 'static,
    {
        self.reject_self_ends(link)?;
        let Some((near, edge, far, far_edge)) = self.bind_link::<N, E, FN, FE>(link, end) else {
            // The kernel does not apply to this link's data.
            return Ok((IMMEDIATE_BATCH, None));
        };
        let max_progress = link.max_progress(end);
        self.kernels_run.fetch_add(max_progress, Ordering::Relaxed);
        let link_label = link.end_label(end);
        let k_label = kernel_label::<K>(opts.kernel_name.as_deref());

        if self.sched.is_none() || !opts.parallel {
            let t0 = Instant::now();
            {
                let kind = link.kind.read().unwrap();
                let mut rng = self.rng.lock().unwrap();
                drive_edges(
                    &kind,
                    end,
                    0,
                    max_progress,
                    &near,
                    &edge,
                    &far,
                    &far_edge,
                    &mut *rng,
                    |cx| kernel.edge(cx),
                );
            }
            if let Some(trace) = &self.trace {
                let mut t = trace.lock().unwrap();
                let op = t.log_op(&link_label, &k_label, max_progress);
                t.log_chunk(op, max_progress, t0, Instant::now(), 0);
            }
            return Ok((IMMEDIATE_BATCH, None));
        }

        let sched = self.sched.as_ref().expect("scheduler present");
        let trace_op = self
            .trace
            .as_ref()
            .map(|t| t.lock().unwrap().log_op(&link_label, &k_label, max_progress));

        let spawn = {
            let proto = kernel.clone();
            let mut parent_rng = self.rng.lock().unwrap().fork();
            let link = Arc::clone(link);
            Box::new(move || -> Box<dyn KernelInstance> {
                Box::new(LinkChunk {
                    kernel: proto.clone(),
                    rng: parent_rng.fork(),
                    link: Arc::clone(&link),
                    end,
                    near: Arc::clone(&near),
                    edge: Arc::clone(&edge),
                    far: Arc::clone(&far),
                    far_edge: Arc::clone(&far_edge),
                })
            })
        };
        let next_split = {
            let link = Arc::clone(link);
            Box::new(move |requested| link.kind.read().unwrap().next_split(end, requested))
        };
        let (reduction, rx) = make_reduction(opts);
        let kind_tag = link.kind.read().unwrap().tag();
        let spec = JobSpec {
            op_type: op_type_of::<K>(kind_tag, Some(end)),
            cmp: link.end(end).cmp(),
            // Both ends of a link share its edge arrays; the scheduler keeps
            // jobs with the same link id out of one barrier.
            link: Some(link.id()),
            max_progress,
            indivisible: false,
            spawn,
            next_split,
            reduction,
            trace_op,
        };
        let number = sched.submit(spec, seal, false)?;
        Ok((number, rx))
    }

    /// The funnel for node operations; iterates the component's self link.
    fn queue_cmp_op<N, K>(
        &self,
        cmp: llrt_core::CmpId,
        kernel: &mut K,
        opts: &OpOptions<K>,
        seal: bool,
    ) -> Result<(u64, Option<Receiver<Delivered>>)>
    where
        K: NodeKernel<N> + Clone,
        N: Default + Send + Sync + 'static,
    {
        let c = self.component(cmp)?;
        let Some(nodes) = downcast_store::<N>(&c.data) else {
            return Ok((IMMEDIATE_BATCH, None));
        };
        let max_progress = nodes.len() as u64;
        self.kernels_run.fetch_add(max_progress, Ordering::Relaxed);
        let self_link = Arc::clone(&self.links[c.self_link().get() as usize]);
        let link_label = self_link.end_label(End::Zero);
        let k_label = kernel_label::<K>(opts.kernel_name.as_deref());

        if self.sched.is_none() || !opts.parallel {
            let t0 = Instant::now();
            {
                let mut rng = self.rng.lock().unwrap();
                drive_nodes(&nodes, 0, max_progress, &mut *rng, |cx| kernel.node(cx));
            }
            if let Some(trace) = &self.trace {
                let mut t = trace.lock().unwrap();
                let op = t.log_op(&link_label, &k_label, max_progress);
                t.log_chunk(op, max_progress, t0, Instant::now(), 0);
            }
            return Ok((IMMEDIATE_BATCH, None));
        }

        let sched = self.sched.as_ref().expect("scheduler present");
        let trace_op = self
            .trace
            .as_ref()
            .map(|t| t.lock().unwrap().log_op(&link_label, &k_label, max_progress));

        let spawn = {
            let proto = kernel.clone();
            let mut parent_rng = self.rng.lock().unwrap().fork();
            Box::new(move || -> Box<dyn KernelInstance> {
                Box::new(NodeChunk {
                    kernel: proto.clone(),
                    rng: parent_rng.fork(),
                    nodes: Arc::clone(&nodes),
                })
            })
        };
        let (reduction, rx) = make_reduction(opts);
        let spec = JobSpec {
            op_type: op_type_of::<K>(u8::MAX, None),
            cmp,
            link: None,
            max_progress,
            indivisible: false,
            spawn,
            // Any node boundary is a legal split.
            next_split: Box::new(move |requested| requested.min(max_progress)),
            reduction,
            trace_op,
        };
        let number = sched.submit(spec, seal, false)?;
        Ok((number, rx))
    }
}
