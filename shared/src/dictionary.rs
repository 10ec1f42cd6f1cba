/*
 * Copyright © 2024 ladroid
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::sync::RwLock;

use crate::triple::Triple;

// RDF workloads touch the same few million strings billions of times, so
// terms are interned once and compared as u32 from then on.
const INITIAL_CAPACITY: usize = 1 << 20;

/// Dictionary for encoding and decoding strings.
///
/// IDs are assigned monotonically from zero and are never reused. Lookups of
/// already-interned strings only take the read lock; the first insert of a
/// string takes the write lock and re-checks under it, so a racing insert of
/// the same string cannot assign two IDs.
#[derive(Debug, Default)]
pub struct Dictionary {
    inner: RwLock<DictionaryInner>,
}

#[derive(Debug, Default)]
struct DictionaryInner {
    string_to_id: HashMap<String, u32>,
    id_to_string: Vec<String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            inner: RwLock::new(DictionaryInner {
                string_to_id: HashMap::with_capacity(INITIAL_CAPACITY),
                id_to_string: Vec::with_capacity(INITIAL_CAPACITY),
            }),
        }
    }

    /// Return the ID for `value`, interning it if it has not been seen yet.
    pub fn encode(&self, value: &str) -> u32 {
        {
            let inner = self.inner.read().unwrap();
            if let Some(&id) = inner.string_to_id.get(value) {
                return id;
            }
        }

        let mut inner = self.inner.write().unwrap();
        // Another thread may have inserted while we waited for the write lock.
        if let Some(&id) = inner.string_to_id.get(value) {
            return id;
        }

        if inner.id_to_string.len() >= u32::MAX as usize {
            // 32-bit IDs cap the distinct-term count; running past the cap
            // would silently alias terms.
            panic!("dictionary exhausted the 32-bit ID space");
        }
        let id = inner.id_to_string.len() as u32;
        inner.string_to_id.insert(value.to_string(), id);
        inner.id_to_string.push(value.to_string());
        id
    }

    /// Return the ID for `value` without interning it.
    pub fn encode_if_present(&self, value: &str) -> Option<u32> {
        self.inner.read().unwrap().string_to_id.get(value).copied()
    }

    pub fn decode(&self, id: u32) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .id_to_string
            .get(id as usize)
            .cloned()
    }

    pub fn decode_triple(&self, triple: &Triple) -> String {
        let s = self.decode(triple.subject).unwrap_or_else(|| "unknown".to_string());
        let p = self.decode(triple.predicate).unwrap_or_else(|| "unknown".to_string());
        let o = self.decode(triple.object).unwrap_or_else(|| "unknown".to_string());
        format!("{} {} {} .", s, p, o)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().id_to_string.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn encode_decode_round_trip() {
        let dict = Dictionary::new();
        let id = dict.encode("http://example.org/Alice");
        assert_eq!(dict.decode(id), Some("http://example.org/Alice".to_string()));
    }

    #[test]
    fn ids_are_stable_and_monotonic() {
        let dict = Dictionary::new();
        let a = dict.encode("a");
        let b = dict.encode("b");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(dict.encode("a"), a);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn encode_if_present_does_not_intern() {
        let dict = Dictionary::new();
        assert_eq!(dict.encode_if_present("missing"), None);
        assert_eq!(dict.len(), 0);
        let id = dict.encode("present");
        assert_eq!(dict.encode_if_present("present"), Some(id));
    }

    #[test]
    fn concurrent_encode_assigns_one_id_per_string() {
        let dict = Arc::new(Dictionary::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let dict = Arc::clone(&dict);
            handles.push(thread::spawn(move || {
                (0..100)
                    .map(|i| dict.encode(&format!("term{}", i)))
                    .collect::<Vec<_>>()
            }));
        }
        let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        assert_eq!(dict.len(), 100);
    }
}
