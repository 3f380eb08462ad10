//! Forkable kernel RNG.
//!
//! Every parallel job forks a generator from the network master RNG, and
//! every per-chunk kernel clone forks again from the job's generator. Each
//! worker thread therefore owns an independent stream and kernels never
//! contend on a shared generator.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug, Clone)]
pub struct KernelRng {
    inner: SmallRng,
}

impl KernelRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            inner: SmallRng::from_entropy(),
        }
    }

    /// Derive a child generator. The child's stream is a function of the
    /// parent's current position, so forking twice gives distinct streams,
    /// and a reseeded parent reproduces the same family of children.
    pub fn fork(&mut self) -> KernelRng {
        KernelRng::seeded(self.inner.next_u64())
    }
}

impl RngCore for KernelRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
