//! Links: two ends plus a connectivity pattern.

use llrt_core::{CmpId, DataVec, LinkId};
use llrt_links::{End, LinkKind, LinkPattern};
use std::sync::{Arc, RwLock};

pub struct LinkEnd {
    pub(crate) cmp: CmpId,
    pub(crate) data: Arc<dyn DataVec>,
    pub(crate) axon: bool,
}

impl LinkEnd {
    pub fn cmp(&self) -> CmpId {
        self.cmp
    }

    pub fn is_axon(&self) -> bool {
        self.axon
    }

    pub fn is_dendrite(&self) -> bool {
        !self.axon
    }

    pub fn data(&self) -> &Arc<dyn DataVec> {
        &self.data
    }
}

pub struct Link {
    pub(crate) id: LinkId,
    pub(crate) name: String,
    // Chunk iteration takes read locks; adjacency edits take the write
    // lock. Everything else about a link is immutable after construction.
    pub(crate) kind: RwLock<LinkKind>,
    pub(crate) ends: [LinkEnd; 2],
    /// Component self links are internal (they back node operations) and
    /// are skipped by net-wide link enumeration.
    pub(crate) is_self: bool,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn end(&self, end: End) -> &LinkEnd {
        &self.ends[end.index()]
    }

    /// Label for one end, used in performance records.
    pub fn end_label(&self, end: End) -> String {
        format!("{}_{}", self.name, end.index())
    }

    pub fn max_progress(&self, end: End) -> u64 {
        self.kind.read().unwrap().max_progress(end)
    }
}
