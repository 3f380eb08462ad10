//! Engine configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Number of worker threads. 0 runs every operation inline on the
    /// calling thread (no scheduler, no worker threads).
    pub workers: usize,

    /// Batches whose total estimated time is below this threshold are
    /// executed by a single worker to avoid synchronization overhead.
    pub single_thread_threshold_us: u64,

    /// Disable adaptive timing so that chunk boundaries are a pure function
    /// of the submitted jobs. Repeated runs then produce identical results
    /// (given deterministic kernels and a fixed seed).
    pub deterministic: bool,

    /// Record per-chunk timing for the chrome-tracing dump.
    pub profile: bool,

    /// Pin worker i to CPU i where the platform supports it.
    pub pin_workers: bool,

    /// Seed for the network master RNG. Unseeded networks draw from entropy.
    pub seed: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            single_thread_threshold_us: 30,
            deterministic: false,
            profile: false,
            pin_workers: true,
            seed: None,
        }
    }
}

impl NetConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }
}
