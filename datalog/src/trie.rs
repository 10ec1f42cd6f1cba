/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::btree_map::{BTreeMap, Range};

/// A node of the three-level triple trie.
///
/// Children are kept in a `BTreeMap` so that every level iterates in
/// ascending ID order; leapfrog join depends on that ordering and on
/// logarithmic lower-bound seeks.
#[derive(Debug, Default, Clone)]
pub struct TrieNode {
    children: BTreeMap<u32, TrieNode>,
    is_end: bool,
}

impl TrieNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a three-key path, marking the final node as a stored fact.
    pub fn insert(&mut self, keys: [u32; 3]) {
        let mut curr = self;
        for key in keys {
            curr = curr.children.entry(key).or_default();
        }
        curr.is_end = true;
    }

    /// Follow `keys` down the trie, returning the node they lead to.
    pub fn descend(&self, keys: &[u32]) -> Option<&TrieNode> {
        let mut curr = self;
        for key in keys {
            curr = curr.children.get(key)?;
        }
        Some(curr)
    }

    pub fn is_end(&self) -> bool {
        self.is_end
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn iter(&self) -> TrieIterator<'_> {
        TrieIterator::new(self)
    }
}

/// Ordered cursor over one node's children.
///
/// Supports the leapfrog capability set: `key`, `next`, `seek` (first child
/// with key >= target) and `open` (descend into the current child). The
/// iterator borrows the node, so the trie cannot be mutated while any
/// iterator is live on it.
pub struct TrieIterator<'a> {
    node: &'a TrieNode,
    range: Range<'a, u32, TrieNode>,
    current: Option<(u32, &'a TrieNode)>,
}

impl<'a> TrieIterator<'a> {
    pub fn new(node: &'a TrieNode) -> Self {
        let mut range = node.children.range(..);
        let current = range.next().map(|(&k, v)| (k, v));
        TrieIterator { node, range, current }
    }

    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    /// The current child key, or `None` past the last child.
    pub fn key(&self) -> Option<u32> {
        self.current.map(|(k, _)| k)
    }

    pub fn next(&mut self) {
        self.current = self.range.next().map(|(&k, v)| (k, v));
    }

    /// Position at the first child with key >= `target`.
    pub fn seek(&mut self, target: u32) {
        self.range = self.node.children.range(target..);
        self.current = self.range.next().map(|(&k, v)| (k, v));
    }

    /// An iterator over the current child's children.
    pub fn open(&self) -> Option<TrieIterator<'a>> {
        self.current.map(|(_, child)| TrieIterator::new(child))
    }
}

/// Leapfrog intersection over a set of iterators positioned at one level.
///
/// Yields exactly the keys present in every iterator, in ascending order:
/// the laggards repeatedly seek to the current maximum until all keys agree,
/// then one emission advances a rotating iterator and the search re-converges.
pub struct LeapfrogJoin<'a> {
    iterators: Vec<TrieIterator<'a>>,
    p: usize,
    done: bool,
}

impl<'a> LeapfrogJoin<'a> {
    pub fn new(mut iterators: Vec<TrieIterator<'a>>) -> Self {
        let done = iterators.is_empty() || iterators.iter().any(|it| it.at_end());
        if !done {
            iterators.sort_by_key(|it| it.key());
        }
        let mut join = LeapfrogJoin { iterators, p: 0, done };
        if !join.done {
            join.search();
        }
        join
    }

    pub fn at_end(&self) -> bool {
        self.done
    }

    /// The key all iterators currently agree on, or `None` when exhausted.
    pub fn key(&self) -> Option<u32> {
        if self.done {
            None
        } else {
            self.iterators[self.p].key()
        }
    }

    pub fn next(&mut self) {
        if self.done {
            return;
        }
        self.iterators[self.p].next();
        if self.iterators[self.p].at_end() {
            self.done = true;
            return;
        }
        self.p = (self.p + 1) % self.iterators.len();
        self.search();
    }

    /// Descend into the child the join is currently positioned on.
    pub fn open(&self) -> Option<TrieIterator<'a>> {
        if self.done {
            None
        } else {
            self.iterators[self.p].open()
        }
    }

    fn search(&mut self) {
        loop {
            let mut max_key = 0;
            for it in &self.iterators {
                match it.key() {
                    Some(k) if k > max_key => max_key = k,
                    Some(_) => {}
                    None => {
                        self.done = true;
                        return;
                    }
                }
            }
            let mut all_equal = true;
            for it in &mut self.iterators {
                if it.key().is_some_and(|k| k < max_key) {
                    it.seek(max_key);
                    if it.at_end() {
                        self.done = true;
                        return;
                    }
                    all_equal = false;
                }
            }
            if all_equal {
                break;
            }
        }
    }
}
