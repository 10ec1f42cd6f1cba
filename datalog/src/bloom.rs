use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use shared::triple::Triple;

/// Approximate membership filter over stored triples.
///
/// A negative answer is exact: the triple was never inserted, so the trie
/// probe can be skipped entirely. A positive answer only means "maybe" and
/// falls through to the exact existence check. Kirsch-Mitzenmacher double
/// hashing with k=3 probes, ~10 bits per expected entry. Facts are never
/// deleted, so the filter never needs rebuilding.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
}

const BITS_PER_ENTRY: usize = 10;
const NUM_PROBES: usize = 3;

impl BloomFilter {
    pub fn new(expected_entries: usize) -> Self {
        let num_bits = (expected_entries * BITS_PER_ENTRY).max(1024);
        let num_words = num_bits.div_ceil(64);
        BloomFilter {
            bits: vec![0; num_words],
            num_bits,
        }
    }

    pub fn insert(&mut self, triple: &Triple) {
        let (h1, h2) = Self::hash_pair(triple);
        for i in 0..NUM_PROBES {
            let idx = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    /// False only when the triple was definitely never inserted.
    pub fn may_contain(&self, triple: &Triple) -> bool {
        let (h1, h2) = Self::hash_pair(triple);
        (0..NUM_PROBES).all(|i| {
            let idx = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            self.bits[idx / 64] & (1 << (idx % 64)) != 0
        })
    }

    fn hash_pair(triple: &Triple) -> (usize, usize) {
        let mut hasher = DefaultHasher::new();
        triple.hash(&mut hasher);
        let h = hasher.finish();
        (h as usize, (h >> 32) as usize)
    }
}
