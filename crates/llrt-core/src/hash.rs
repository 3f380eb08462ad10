//! Stable digest helpers.
//!
//! Determinism tests hash component state after a run and require the digest
//! to be bit-identical across runs with the same seed.

use blake3::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Digest a float slice bit-exactly (little-endian bit patterns).
pub fn hash_f32s(values: &[f32]) -> Hash256 {
    let mut h = Hasher::new();
    for v in values {
        h.update(&v.to_bits().to_le_bytes());
    }
    Hash256(h.finalize().into())
}
