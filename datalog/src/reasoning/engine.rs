/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Semi-naive parallel fixpoint driver.
//!
//! Reasoning runs in two phases. The initial pass evaluates every rule
//! against the loaded facts, in parallel across rules. Every new fact it
//! installs then flows through a work queue: a pool of workers dequeues
//! facts and re-evaluates exactly the (rule, premise) pairs whose premise
//! predicate matches, seeding each evaluation with the binding obtained by
//! unifying the fact against that premise. Derived facts are installed under
//! the predicate's shard lock (the single deduplication point) and fed back
//! into the queue. The run ends at the natural fixpoint: queue drained and
//! every worker idle.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::scope;
use log::{debug, info};
use rayon::prelude::*;

use shared::rule::Rule;
use shared::rule_index::RuleIndex;
use shared::triple::Triple;

use crate::reasoning::evaluator::{evaluate_rule, unify_fact, Bindings};
use crate::store::TripleStore;

/// What one `reason` run did, reported alongside the populated store.
#[derive(Debug, Clone, Default)]
pub struct ReasoningStats {
    /// Facts installed by the initial per-rule pass.
    pub seeded: usize,
    /// Facts installed during propagation.
    pub derived: usize,
    /// Queued facts whose propagation completed.
    pub processed: usize,
    /// Wall-clock time of the whole run.
    pub duration: Duration,
}

pub struct DatalogEngine<'a> {
    store: &'a TripleStore,
    rules: Vec<Rule>,
    rule_index: RuleIndex,
    processed: Mutex<HashSet<Triple>>,
}

impl<'a> DatalogEngine<'a> {
    pub fn new(store: &'a TripleStore, rules: Vec<Rule>) -> Self {
        let rule_index = RuleIndex::build(&rules);
        DatalogEngine {
            store,
            rules,
            rule_index,
            processed: Mutex::new(HashSet::new()),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run forward chaining to the least fixpoint.
    pub fn reason(&self) -> ReasoningStats {
        let start = Instant::now();
        let queue = WorkQueue::new();

        // Phase 1: every rule once over the full fact set, fanned out
        // across rules.
        let seeded: Vec<Vec<Triple>> = self
            .rules
            .par_iter()
            .map(|rule| {
                let snapshot = self.store.snapshot();
                let mut bindings = Bindings::new();
                let mut derived = Vec::new();
                evaluate_rule(&snapshot, rule, &mut bindings, &mut derived);
                derived
            })
            .collect();

        let mut fresh = 0usize;
        for fact in seeded.into_iter().flatten() {
            if self.store.insert(fact.clone()) {
                queue.push(fact);
                fresh += 1;
            }
        }
        debug!("initial pass installed {} new facts", fresh);

        // Phase 2: propagate until the queue is drained and all workers
        // are idle.
        let installed = AtomicUsize::new(0);
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| self.propagate(&queue, &installed));
            }
            while !queue.idle() {
                queue.wake_all();
                thread::yield_now();
            }
            queue.shutdown();
        })
        .unwrap();

        let stats = ReasoningStats {
            seeded: fresh,
            derived: installed.load(Ordering::SeqCst),
            processed: self.processed.lock().unwrap().len(),
            duration: start.elapsed(),
        };
        info!(
            "fixpoint reached in {:?}: {} seeded, {} derived, {} triples in store",
            stats.duration,
            stats.seeded,
            stats.derived,
            self.store.len()
        );
        stats
    }

    /// Worker loop: consume queued facts until shutdown.
    fn propagate(&self, queue: &WorkQueue, installed: &AtomicUsize) {
        while let Some(triple) = queue.pop() {
            if self.mark_processed(&triple) {
                self.derive_from(&triple, queue, installed);
            }
            queue.task_done();
        }
    }

    fn derive_from(&self, triple: &Triple, queue: &WorkQueue, installed: &AtomicUsize) {
        for &(rule_id, premise_idx) in self.rule_index.candidates(triple.predicate) {
            let rule = &self.rules[rule_id];
            let Some(mut bindings) = unify_fact(&rule.premise[premise_idx], triple) else {
                continue;
            };
            let mut derived = Vec::new();
            {
                let snapshot = self.store.snapshot();
                evaluate_rule(&snapshot, rule, &mut bindings, &mut derived);
            }
            // The enqueue happens after `insert` has released the shard
            // lock, keeping the shard and queue locks disjoint.
            for fact in derived {
                if self.store.insert(fact.clone()) {
                    installed.fetch_add(1, Ordering::SeqCst);
                    queue.push(fact);
                }
            }
        }
    }

    fn mark_processed(&self, triple: &Triple) -> bool {
        self.processed.lock().unwrap().insert(triple.clone())
    }
}

/// Work queue shared by the propagation workers.
///
/// The `active` counter is bumped while the queue lock is still held, so an
/// observer that sees "empty and zero active" under that lock has witnessed
/// true quiescence: no fact is queued and none is being processed.
struct WorkQueue {
    items: Mutex<VecDeque<Triple>>,
    ready: Condvar,
    active: AtomicUsize,
    done: AtomicBool,
}

impl WorkQueue {
    fn new() -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            active: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    fn push(&self, triple: Triple) {
        self.items.lock().unwrap().push_back(triple);
        self.ready.notify_one();
    }

    /// Block until an item is available or the queue is shut down.
    fn pop(&self) -> Option<Triple> {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(triple) = items.pop_front() {
                self.active.fetch_add(1, Ordering::SeqCst);
                return Some(triple);
            }
            if self.done.load(Ordering::SeqCst) {
                return None;
            }
            items = self.ready.wait(items).unwrap();
        }
    }

    fn task_done(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn idle(&self) -> bool {
        let items = self.items.lock().unwrap();
        items.is_empty() && self.active.load(Ordering::SeqCst) == 0
    }

    fn wake_all(&self) {
        self.ready.notify_all();
    }

    fn shutdown(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_hands_out_items_in_order() {
        let queue = WorkQueue::new();
        queue.push(Triple::new(1, 1, 1));
        queue.push(Triple::new(2, 2, 2));
        assert_eq!(queue.pop(), Some(Triple::new(1, 1, 1)));
        assert_eq!(queue.pop(), Some(Triple::new(2, 2, 2)));
        assert!(!queue.idle(), "two tasks are still active");
        queue.task_done();
        queue.task_done();
        assert!(queue.idle());
    }

    #[test]
    fn shutdown_releases_blocked_workers() {
        use std::sync::Arc;

        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        queue.shutdown();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn drained_queue_with_done_flag_returns_none() {
        let queue = WorkQueue::new();
        queue.push(Triple::new(3, 3, 3));
        queue.shutdown();
        assert_eq!(queue.pop(), Some(Triple::new(3, 3, 3)));
        queue.task_done();
        assert_eq!(queue.pop(), None);
    }
}
