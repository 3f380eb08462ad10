//! The network: components, links, and lifecycle.
//!
//! Construction is single-threaded (`&mut self`); once kernels are being
//! dispatched the topology is immutable, apart from adjacency-list edge
//! edits between batches.

use crate::link::{Link, LinkEnd};
use llrt_core::{
    downcast_store, CmpId, DataVec, Error, KernelRng, LinkId, NetConfig, Result, SharedVec,
};
use llrt_exec::{Scheduler, TraceLog};
use llrt_links::{AdjListLink, End, LinkKind, LinkPattern};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

pub struct Component {
    pub(crate) id: CmpId,
    pub(crate) name: String,
    pub(crate) dims: Vec<usize>,
    pub(crate) data: Arc<dyn DataVec>,
    /// links[e] holds the links where this component is at position e.
    pub(crate) links: [Vec<LinkId>; 2],
    pub(crate) self_link: LinkId,
}

impl Component {
    pub fn id(&self) -> CmpId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn node_count(&self) -> usize {
        self.data.len()
    }

    pub fn links(&self, end: End) -> &[LinkId] {
        &self.links[end.index()]
    }

    // The self link backs node dispatch only; its two ends are the same
    // component, so it must never reach the edge path.
    pub(crate) fn self_link(&self) -> LinkId {
        self.self_link
    }

    /// Name plus dimensions, e.g. `input(25x20)`.
    pub fn display_name(&self) -> String {
        let dims = self
            .dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        format!("{}({})", self.name, dims)
    }
}

pub struct Network {
    pub(crate) cfg: NetConfig,
    pub(crate) components: Vec<Component>,
    pub(crate) links: Vec<Arc<Link>>,
    pub(crate) sched: Option<Scheduler>,
    pub(crate) rng: Mutex<KernelRng>,
    pub(crate) trace: Option<Arc<Mutex<TraceLog>>>,
    pub(crate) kernels_run: AtomicU64,
    started: Instant,
}

impl Network {
    /// A network with the given number of worker threads; zero means every
    /// operation runs inline on the calling thread.
    pub fn new(workers: usize) -> Self {
        Self::with_config(NetConfig::with_workers(workers))
    }

    pub fn with_config(cfg: NetConfig) -> Self {
        let trace = cfg.profile.then(|| Arc::new(Mutex::new(TraceLog::new())));
        let sched = (cfg.workers > 0).then(|| Scheduler::new(&cfg, trace.clone()));
        let rng = match cfg.seed {
            Some(seed) => KernelRng::seeded(seed),
            None => KernelRng::from_entropy(),
        };
        Self {
            cfg,
            components: Vec::new(),
            links: Vec::new(),
            sched,
            rng: Mutex::new(rng),
            trace,
            kernels_run: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.cfg
    }

    /// Worker thread count (0 when running inline).
    pub fn workers(&self) -> usize {
        self.sched.as_ref().map_or(0, Scheduler::n_workers)
    }

    /// Reseed the master RNG; kernels fork their generators from it.
    pub fn seed(&self, seed: u64) {
        *self.rng.lock().unwrap() = KernelRng::seeded(seed);
    }

    /// Make planning a pure function of the submitted jobs: chunk sizing
    /// stops consulting wall-clock timing.
    pub fn set_determinism(&self) {
        if let Some(s) = &self.sched {
            s.set_deterministic(true);
        }
    }

    /// Wait for the batch with the given number (0 never blocks).
    pub fn finish_batch(&self, number: u64) {
        if let Some(s) = &self.sched {
            s.finish_batch(number);
        }
    }

    /// Wait for every batch submitted so far.
    pub fn finish_batches(&self) {
        if let Some(s) = &self.sched {
            s.finish_batches();
        }
    }

    /// Seal the open batch (the explicit alternative to passing a sealing
    /// dispatch). Returns whether there was one.
    pub fn seal_batch(&self) -> bool {
        self.sched.as_ref().is_some_and(|s| s.seal_batch())
    }

    // ---- topology ----

    pub fn add_component<T>(&mut self, name: &str, dims: &[usize]) -> CmpId
    where
        T: Default + Send + Sync + 'static,
    {
        let id = CmpId::new(self.components.len() as u64);
        let node_count = llrt_links::dims_product(dims);
        let data: Arc<dyn DataVec> = Arc::new(SharedVec::<T>::with_len(node_count));

        // Every component carries a self link; node operations iterate it.
        let mut kind = LinkKind::Same(llrt_links::SameLink::new());
        kind.set_dimensions(dims, dims);
        let self_link = LinkId::new(self.links.len() as u64);
        let self_end = || -> Arc<dyn DataVec> { Arc::new(SharedVec::<()>::with_len(node_count)) };
        self.links.push(Arc::new(Link {
            id: self_link,
            name: format!("Same_{}", self_link.get()),
            kind: RwLock::new(kind),
            ends: [
                LinkEnd {
                    cmp: id,
                    data: self_end(),
                    axon: true,
                },
                LinkEnd {
                    cmp: id,
                    data: self_end(),
                    axon: false,
                },
            ],
            is_self: true,
        }));

        self.components.push(Component {
            id,
            name: name.to_string(),
            dims: dims.to_vec(),
            data,
            links: [Vec::new(), Vec::new()],
            self_link,
        });
        id
    }

    /// Link two existing components, `c0` at end 0 and `c1` at end 1, with
    /// edge data of type `E0`/`E1` on the respective ends. By default end 0
    /// is the axon; `swap_axon` flips the marking.
    pub fn connect<E0, E1>(
        &mut self,
        c0: CmpId,
        c1: CmpId,
        kind: impl Into<LinkKind>,
        swap_axon: bool,
    ) -> Result<LinkId>
    where
        E0: Default + Send + Sync + 'static,
        E1: Default + Send + Sync + 'static,
    {
        if c0 == c1 {
            return Err(Error::Topology(
                "a link cannot join a component to itself".into(),
            ));
        }
        let mut kind = kind.into();
        let d0 = self.component(c0)?.dims.clone();
        let d1 = self.component(c1)?.dims.clone();
        if !kind.can_connect(&d0, &d1) {
            return Err(Error::Topology(format!(
                "link type {} can't connect {:?} to {:?}",
                kind.identifier(),
                d0,
                d1
            )));
        }
        kind.set_dimensions(&d0, &d1);

        let e0: Arc<dyn DataVec> = Arc::new(SharedVec::<E0>::with_len(
            kind.end_data_len(&d0, &d1, End::Zero),
        ));
        let e1: Arc<dyn DataVec> = Arc::new(SharedVec::<E1>::with_len(
            kind.end_data_len(&d1, &d0, End::One),
        ));
        kind.attach_edge_data(Arc::clone(&e0), Arc::clone(&e1));

        let id = LinkId::new(self.links.len() as u64);
        let name = format!("{}_{}", kind.identifier(), id.get());
        tracing::debug!(link = %name, c0 = %c0, c1 = %c1, "link added");
        self.links.push(Arc::new(Link {
            id,
            name,
            kind: RwLock::new(kind),
            ends: [
                LinkEnd {
                    cmp: c0,
                    data: e0,
                    axon: !swap_axon,
                },
                LinkEnd {
                    cmp: c1,
                    data: e1,
                    axon: swap_axon,
                },
            ],
            is_self: false,
        }));
        self.components[c0.get() as usize].links[0].push(id);
        self.components[c1.get() as usize].links[1].push(id);
        Ok(id)
    }

    /// Create a new component of the given dimensions at end 1 of a new
    /// link from `from`.
    pub fn connect_new<E0, E1, N>(
        &mut self,
        from: CmpId,
        kind: impl Into<LinkKind>,
        name: &str,
        dims: &[usize],
        swap_axon: bool,
    ) -> Result<CmpId>
    where
        E0: Default + Send + Sync + 'static,
        E1: Default + Send + Sync + 'static,
        N: Default + Send + Sync + 'static,
    {
        let kind = kind.into();
        let d_from = self.component(from)?.dims.clone();
        if !kind.can_connect(&d_from, dims) {
            return Err(Error::Topology(format!(
                "link type {} can't connect {:?} to {:?}",
                kind.identifier(),
                d_from,
                dims
            )));
        }
        let c = self.add_component::<N>(name, dims);
        self.connect::<E0, E1>(from, c, kind, swap_axon)?;
        Ok(c)
    }

    /// Like [`Self::connect_new`], with the new component's dimensions
    /// deduced by the link pattern.
    pub fn connect_new_deduced<E0, E1, N>(
        &mut self,
        from: CmpId,
        kind: impl Into<LinkKind>,
        name: &str,
        swap_axon: bool,
    ) -> Result<CmpId>
    where
        E0: Default + Send + Sync + 'static,
        E1: Default + Send + Sync + 'static,
        N: Default + Send + Sync + 'static,
    {
        let kind = kind.into();
        let d_from = self.component(from)?.dims.clone();
        let dims = kind.deduce_dims(&d_from, End::One).ok_or_else(|| {
            Error::Topology(format!(
                "link type {} couldn't deduce dimensions of end 1 when end 0 has dimensions {:?}",
                kind.identifier(),
                d_from
            ))
        })?;
        let c = self.add_component::<N>(name, &dims);
        self.connect::<E0, E1>(from, c, kind, swap_axon)?;
        Ok(c)
    }

    // ---- lookup ----

    pub fn component(&self, id: CmpId) -> Result<&Component> {
        self.components
            .get(id.get() as usize)
            .ok_or_else(|| Error::Missing(format!("{id}")))
    }

    pub fn link(&self, id: LinkId) -> Result<&Arc<Link>> {
        self.links
            .get(id.get() as usize)
            .ok_or_else(|| Error::Missing(format!("{id}")))
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// User-created links, in creation order.
    pub fn user_links(&self) -> impl Iterator<Item = &Arc<Link>> {
        self.links.iter().filter(|l| !l.is_self)
    }

    // ---- data access (no kernel may be in flight; finish batches first) ----

    pub fn write_nodes<T>(&self, cmp: CmpId, values: &[T]) -> Result<()>
    where
        T: Default + Clone + Send + Sync + 'static,
    {
        let c = self.component(cmp)?;
        let store = downcast_store::<T>(&c.data).ok_or_else(|| {
            Error::DataType(format!(
                "component {} does not store {}",
                c.name,
                std::any::type_name::<T>()
            ))
        })?;
        if !store.fill_from(values) {
            return Err(Error::DataType(format!(
                "component {} holds {} nodes, got {}",
                c.name,
                store.len(),
                values.len()
            )));
        }
        Ok(())
    }

    pub fn read_nodes<T>(&self, cmp: CmpId) -> Result<Vec<T>>
    where
        T: Default + Clone + Send + Sync + 'static,
    {
        let c = self.component(cmp)?;
        let store = downcast_store::<T>(&c.data).ok_or_else(|| {
            Error::DataType(format!(
                "component {} does not store {}",
                c.name,
                std::any::type_name::<T>()
            ))
        })?;
        Ok(store.snapshot())
    }

    pub fn write_edges<T>(&self, link: LinkId, end: End, values: &[T]) -> Result<()>
    where
        T: Default + Clone + Send + Sync + 'static,
    {
        let l = self.link(link)?;
        let store = downcast_store::<T>(&l.ends[end.index()].data).ok_or_else(|| {
            Error::DataType(format!(
                "link {} end {} does not store {}",
                l.name,
                end.index(),
                std::any::type_name::<T>()
            ))
        })?;
        if !store.fill_from(values) {
            return Err(Error::DataType(format!(
                "link {} end {} holds {} entries, got {}",
                l.name,
                end.index(),
                store.len(),
                values.len()
            )));
        }
        Ok(())
    }

    pub fn read_edges<T>(&self, link: LinkId, end: End) -> Result<Vec<T>>
    where
        T: Default + Clone + Send + Sync + 'static,
    {
        let l = self.link(link)?;
        let store = downcast_store::<T>(&l.ends[end.index()].data).ok_or_else(|| {
            Error::DataType(format!(
                "link {} end {} does not store {}",
                l.name,
                end.index(),
                std::any::type_name::<T>()
            ))
        })?;
        Ok(store.snapshot())
    }

    /// Edit an adjacency-list link's edge set. Must not overlap a kernel
    /// running on the link; call `finish_batches` first.
    pub fn edit_adj_list<R>(
        &self,
        link: LinkId,
        f: impl FnOnce(&mut AdjListLink) -> R,
    ) -> Result<R> {
        let l = self.link(link)?;
        let mut kind = l.kind.write().unwrap();
        let adj = kind.as_adj_list_mut().ok_or_else(|| {
            Error::Topology(format!("link {} is not an adjacency-list link", l.name))
        })?;
        Ok(f(adj))
    }

    // ---- reporting ----

    /// One line per user link: components, edge data types, link kind.
    pub fn display(&self) -> String {
        let mut out = String::new();
        for l in self.user_links() {
            let c0 = &self.components[l.ends[0].cmp.get() as usize];
            let c1 = &self.components[l.ends[1].cmp.get() as usize];
            out.push_str(&format!(
                "{} \u{2500}\u{2500}{}\u{2500}({})\u{2500}{}\u{2500}\u{2500}> {}\n",
                c0.display_name(),
                l.ends[0].data.type_label(),
                l.name,
                l.ends[1].data.type_label(),
                c1.display_name(),
            ));
        }
        out
    }

    /// Wait for outstanding batches, then summarize the run. The chrome
    /// trace is present when the network was built with `profile` set.
    pub fn perf_report(&self) -> RunSummary {
        self.finish_batches();
        RunSummary {
            workers: self.workers(),
            kernels: self.kernels_run.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
            trace_json: self
                .trace
                .as_ref()
                .map(|t| t.lock().unwrap().to_chrome_trace()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workers: usize,
    /// Total kernel applications dispatched (edges and nodes visited).
    pub kernels: u64,
    pub elapsed: Duration,
    pub trace_json: Option<String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = self.elapsed.as_secs_f64() * 1e3;
        let rate = if ms > 0.0 {
            self.kernels as f64 / ms * 1e3
        } else {
            0.0
        };
        write!(
            f,
            "Executed {} kernels in {:.3} ms ({:.0} kernels/s) on {} workers",
            self.kernels, ms, rate, self.workers
        )
    }
}
