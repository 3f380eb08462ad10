//! Dispatch options.
//!
//! Built fluently from one of the scheduling-mode constructors:
//!
//! ```ignore
//! net.process_link(link, End::One, &mut k,
//!     &OpOptions::parallel().kernel_name("EdgeSum").combiner(|a, b| a.sum += b.sum))?;
//! ```
//!
//! Default options run the operation inline on the calling thread. The end
//! filters (`axons`/`dendrites`) and the component filters apply to
//! net-wide dispatch and AND together.

use crate::network::Component;
use std::sync::Arc;

pub struct OpOptions<K> {
    pub(crate) parallel: bool,
    pub(crate) blocking: bool,
    pub(crate) end_of_batch: bool,
    pub(crate) kernel_name: Option<String>,
    pub(crate) only_axons: bool,
    pub(crate) only_dendrites: bool,
    pub(crate) combiner: Option<Arc<dyn Fn(&mut K, K) + Send + Sync>>,
    pub(crate) near_filter: Option<Arc<dyn Fn(&Component) -> bool>>,
    pub(crate) far_filter: Option<Arc<dyn Fn(&Component) -> bool>>,
}

impl<K> Default for OpOptions<K> {
    fn default() -> Self {
        Self {
            parallel: false,
            blocking: true,
            end_of_batch: true,
            kernel_name: None,
            only_axons: false,
            only_dendrites: false,
            combiner: None,
            near_filter: None,
            far_filter: None,
        }
    }
}

impl<K> OpOptions<K> {
    /// Run inline on the calling thread (also the behavior of a network
    /// built with zero workers, whatever the options say).
    pub fn inline() -> Self {
        Self::default()
    }

    /// Submit to the scheduler and wait for the batch to finish.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    /// Submit to the scheduler and return the batch number immediately.
    pub fn parallel_non_blocking() -> Self {
        Self {
            parallel: true,
            blocking: false,
            ..Self::default()
        }
    }

    /// Submit without sealing the batch; the next sealing submission (or an
    /// explicit `Network::seal_batch`) completes it.
    pub fn parallel_part() -> Self {
        Self {
            parallel: true,
            blocking: false,
            end_of_batch: false,
            ..Self::default()
        }
    }

    /// Net-wide dispatch: run only on link ends marked as axons.
    pub fn axons(mut self) -> Self {
        self.only_axons = true;
        self
    }

    /// Net-wide dispatch: run only on link ends marked as dendrites.
    pub fn dendrites(mut self) -> Self {
        self.only_dendrites = true;
        self
    }

    /// Label for performance records (otherwise derived from the kernel
    /// type).
    pub fn kernel_name(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = Some(name.into());
        self
    }

    /// Merge each per-chunk kernel clone back into the caller's kernel once
    /// the operation completes. Registering a combiner makes the dispatch
    /// blocking so the merged state can be written back before returning.
    /// The final state is independent of chunk order when the combiner is
    /// associative and commutative.
    pub fn combiner(mut self, f: impl Fn(&mut K, K) + Send + Sync + 'static) -> Self {
        self.combiner = Some(Arc::new(f));
        self
    }

    /// Net-wide dispatch: only operate where the near component matches.
    pub fn near_cmp(mut self, f: impl Fn(&Component) -> bool + 'static) -> Self {
        self.near_filter = Some(Arc::new(f));
        self
    }

    /// Net-wide dispatch: only operate where the far component matches.
    pub fn far_cmp(mut self, f: impl Fn(&Component) -> bool + 'static) -> Self {
        self.far_filter = Some(Arc::new(f));
        self
    }

    pub(crate) fn wants_blocking(&self) -> bool {
        self.blocking || self.combiner.is_some()
    }
}
