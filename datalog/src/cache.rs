/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use shared::triple::Triple;

use crate::bloom::BloomFilter;

/// Read-through / write-through front for triple existence checks.
///
/// The hot path of deduplication asks "is this triple already stored?" far
/// more often than the trie changes, so answers are memoised in a bounded
/// LRU. A bloom filter sits in front as a fast negative filter: it sees every
/// installed triple, so a miss there settles the question without touching
/// the LRU or the trie. Both structures are serialized by their own lock and
/// neither is held across the exact probe.
pub struct ExistenceCache {
    cache: Mutex<LruCache<Triple, bool>>,
    bloom: Mutex<BloomFilter>,
}

impl ExistenceCache {
    pub fn new(capacity: usize, expected_triples: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        ExistenceCache {
            cache: Mutex::new(LruCache::new(capacity)),
            bloom: Mutex::new(BloomFilter::new(expected_triples)),
        }
    }

    /// Answer the existence question, calling `probe` for the exact check
    /// only on a cache miss that the bloom filter could not reject.
    pub fn check(&self, triple: &Triple, probe: impl FnOnce() -> bool) -> bool {
        if !self.bloom.lock().unwrap().may_contain(triple) {
            return false;
        }
        if let Some(&known) = self.cache.lock().unwrap().get(triple) {
            return known;
        }
        let exists = probe();
        self.cache.lock().unwrap().put(triple.clone(), exists);
        exists
    }

    /// Record that `triple` has just been installed in the store.
    pub fn record_insert(&self, triple: &Triple) {
        self.bloom.lock().unwrap().insert(triple);
        self.cache.lock().unwrap().put(triple.clone(), true);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
