/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use shared::dictionary::Dictionary;
use shared::triple::Triple;

use crate::cache::ExistenceCache;
use crate::trie::TrieNode;

/// Number of predicate shards; concurrent installs of the same predicate
/// serialize on one shard mutex, different predicates mostly proceed in
/// parallel.
pub const SHARD_COUNT: usize = 24;

const EXISTENCE_CACHE_CAPACITY: usize = 100_000;
const EXPECTED_TRIPLES: usize = 1 << 20;

/// Append-only fact container with ID-keyed component indexes and the two
/// tries the join engine navigates.
///
/// Insertion is the only mutator. An install runs under the predicate's
/// shard lock: existence check first, then the structural update under the
/// store write lock. Readers take a [`snapshot`](TripleStore::snapshot)
/// (a read guard) for the whole lifetime of any trie iterators they build,
/// so no iterator ever observes a mutation.
pub struct TripleStore {
    dictionary: Arc<Dictionary>,
    inner: RwLock<StoreInner>,
    shards: Vec<Mutex<()>>,
    cache: ExistenceCache,
}

#[derive(Debug, Default)]
pub struct StoreInner {
    triples: Vec<Triple>,
    subject_index: HashMap<u32, Vec<u32>>,
    predicate_index: HashMap<u32, Vec<u32>>,
    object_index: HashMap<u32, Vec<u32>>,
    pso: TrieNode,
    pos: TrieNode,
}

impl StoreInner {
    fn insert_unchecked(&mut self, triple: Triple) {
        let index = self.triples.len() as u32;
        self.subject_index.entry(triple.subject).or_default().push(index);
        self.predicate_index.entry(triple.predicate).or_default().push(index);
        self.object_index.entry(triple.object).or_default().push(index);
        self.pso.insert([triple.predicate, triple.subject, triple.object]);
        self.pos.insert([triple.predicate, triple.object, triple.subject]);
        self.triples.push(triple);
    }

    /// Leaf of the PSO trie for `triple`, if the fact is stored.
    pub fn node_by_triple(&self, triple: &Triple) -> Option<&TrieNode> {
        self.pso
            .descend(&[triple.predicate, triple.subject, triple.object])
            .filter(|node| node.is_end())
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.node_by_triple(triple).is_some()
    }

    pub fn pso_root(&self) -> &TrieNode {
        &self.pso
    }

    pub fn pos_root(&self) -> &TrieNode {
        &self.pos
    }

    /// Insertion indexes of facts with the given subject ID.
    pub fn query_by_subject(&self, subject: u32) -> &[u32] {
        self.subject_index.get(&subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn query_by_predicate(&self, predicate: u32) -> &[u32] {
        self.predicate_index.get(&predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn query_by_object(&self, object: u32) -> &[u32] {
        self.object_index.get(&object).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fact count for one predicate; the selectivity estimator's input.
    pub fn predicate_count(&self, predicate: u32) -> usize {
        self.query_by_predicate(predicate).len()
    }

    pub fn triple_at(&self, index: u32) -> Option<&Triple> {
        self.triples.get(index as usize)
    }

    /// Wildcard lookup: `None` components match anything. Candidates come
    /// from the narrowest applicable component index, then the remaining
    /// components are filtered.
    pub fn query(
        &self,
        subject: Option<u32>,
        predicate: Option<u32>,
        object: Option<u32>,
    ) -> Vec<Triple> {
        let matches = |t: &Triple| {
            subject.is_none_or(|s| t.subject == s)
                && predicate.is_none_or(|p| t.predicate == p)
                && object.is_none_or(|o| t.object == o)
        };
        let candidates: &[u32] = match (subject, predicate, object) {
            (Some(s), _, _) => self.query_by_subject(s),
            (None, Some(p), _) => self.query_by_predicate(p),
            (None, None, Some(o)) => self.query_by_object(o),
            (None, None, None) => {
                return self.triples.clone();
            }
        };
        candidates
            .iter()
            .filter_map(|&idx| self.triples.get(idx as usize))
            .filter(|t| matches(t))
            .cloned()
            .collect()
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl TripleStore {
    pub fn new() -> Self {
        TripleStore {
            dictionary: Arc::new(Dictionary::new()),
            inner: RwLock::new(StoreInner::default()),
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
            cache: ExistenceCache::new(EXISTENCE_CACHE_CAPACITY, EXPECTED_TRIPLES),
        }
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Insert `triple` unless it is already present; returns whether it was
    /// new. Safe to call from any thread: the check and the install happen
    /// atomically under the predicate's shard lock.
    pub fn insert(&self, triple: Triple) -> bool {
        let _shard = self.shard(triple.predicate).lock().unwrap();
        let exists = self
            .cache
            .check(&triple, || self.inner.read().unwrap().contains(&triple));
        if exists {
            return false;
        }
        self.inner.write().unwrap().insert_unchecked(triple.clone());
        self.cache.record_insert(&triple);
        true
    }

    /// Loader convenience: intern the three terms, then insert.
    pub fn insert_str(&self, subject: &str, predicate: &str, object: &str) -> bool {
        let triple = Triple {
            subject: self.dictionary.encode(subject),
            predicate: self.dictionary.encode(predicate),
            object: self.dictionary.encode(object),
        };
        self.insert(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.cache
            .check(triple, || self.inner.read().unwrap().contains(triple))
    }

    /// Read access for the evaluator; holding the guard pins the tries for
    /// the lifetime of any iterators built from it.
    pub fn snapshot(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap()
    }

    /// String-level wildcard lookup. A constant that was never interned
    /// cannot occur in any fact, so the result is empty.
    pub fn query_str(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<Triple> {
        let encode = |term: Option<&str>| -> Option<Option<u32>> {
            match term {
                Some(text) => self.dictionary.encode_if_present(text).map(Some),
                None => Some(None),
            }
        };
        let (Some(s), Some(p), Some(o)) = (encode(subject), encode(predicate), encode(object))
        else {
            return Vec::new();
        };
        self.inner.read().unwrap().query(s, p, o)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard(&self, predicate: u32) -> &Mutex<()> {
        // Predicate IDs are stable per string, so sharding on the ID keeps
        // every install of one predicate on the same mutex.
        &self.shards[predicate as usize % SHARD_COUNT]
    }
}

impl Default for TripleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_deduplicates() {
        let store = TripleStore::new();
        assert!(store.insert_str("s", "p", "o"));
        assert!(!store.insert_str("s", "p", "o"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn both_tries_reach_every_fact() {
        let store = TripleStore::new();
        store.insert_str("s", "p", "o");
        let s = store.dictionary().encode_if_present("s").unwrap();
        let p = store.dictionary().encode_if_present("p").unwrap();
        let o = store.dictionary().encode_if_present("o").unwrap();

        let inner = store.snapshot();
        assert!(inner.pso_root().descend(&[p, s, o]).is_some_and(TrieNode::is_end));
        assert!(inner.pos_root().descend(&[p, o, s]).is_some_and(TrieNode::is_end));
    }

    #[test]
    fn component_indexes_return_insertion_order() {
        let store = TripleStore::new();
        store.insert_str("a", "p", "b");
        store.insert_str("c", "p", "d");
        store.insert_str("a", "q", "e");
        let p = store.dictionary().encode_if_present("p").unwrap();
        let a = store.dictionary().encode_if_present("a").unwrap();

        let inner = store.snapshot();
        assert_eq!(inner.query_by_predicate(p), &[0, 1]);
        assert_eq!(inner.query_by_subject(a), &[0, 2]);
        assert_eq!(inner.predicate_count(p), 2);
        assert_eq!(inner.triple_at(1).unwrap().predicate, p);
    }

    #[test]
    fn query_filters_on_every_bound_component() {
        let store = TripleStore::new();
        store.insert_str("a", "p", "b");
        store.insert_str("a", "q", "c");
        store.insert_str("d", "p", "b");
        let dict = store.dictionary();
        let a = dict.encode_if_present("a").unwrap();
        let p = dict.encode_if_present("p").unwrap();
        let b = dict.encode_if_present("b").unwrap();

        let inner = store.snapshot();
        assert_eq!(inner.query(Some(a), None, None).len(), 2);
        assert_eq!(inner.query(None, Some(p), None).len(), 2);
        assert_eq!(inner.query(None, None, Some(b)).len(), 2);
        assert_eq!(inner.query(Some(a), Some(p), Some(b)).len(), 1);
        assert_eq!(inner.query(None, None, None).len(), 3);
    }

    #[test]
    fn query_str_with_unknown_term_is_empty() {
        let store = TripleStore::new();
        store.insert_str("a", "p", "b");
        assert_eq!(store.query_str(Some("a"), None, None).len(), 1);
        assert!(store.query_str(Some("never-seen"), None, None).is_empty());
        assert_eq!(store.query_str(None, None, None).len(), 1);
    }

    #[test]
    fn contains_tracks_inserts() {
        let store = TripleStore::new();
        store.insert_str("s", "p", "o");
        let t = Triple {
            subject: store.dictionary().encode("s"),
            predicate: store.dictionary().encode("p"),
            object: store.dictionary().encode("o"),
        };
        assert!(store.contains(&t));
        let absent = Triple::new(t.subject, t.predicate, t.subject);
        assert!(!store.contains(&absent));
    }

    #[test]
    fn concurrent_inserts_install_once() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TripleStore::new());
        let t = Triple {
            subject: store.dictionary().encode("s"),
            predicate: store.dictionary().encode("p"),
            object: store.dictionary().encode("o"),
        };
        let winners: usize = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let t = t.clone();
                thread::spawn(move || store.insert(t) as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
