//! llrt-core: shared foundations for the llrt engine.
//!
//! Holds the pieces every other crate needs: strongly-typed ids, the error
//! enum, the engine configuration, the shared node/edge storage cells, the
//! forkable kernel RNG, and digest helpers for determinism checks.
//!
//! No threads, no scheduling, no link geometry here.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod rng;
pub mod store;

pub use config::NetConfig;
pub use error::{Error, Result};
pub use hash::{hash_bytes, hash_f32s, Hash256};
pub use id::{CmpId, LinkId, OpTypeId};
pub use rng::KernelRng;
pub use store::{downcast_store, DataVec, SharedVec};

/// Engine version, surfaced in performance reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
