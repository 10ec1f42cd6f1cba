/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Variable-at-a-time rule-body evaluation over the store's tries.
//!
//! A rule body is answered as a sequence of leapfrog intersections, one per
//! variable: the next variable is chosen by selectivity, one trie iterator is
//! built per occurrence of that variable, and every key the intersection
//! emits is bound before recursing into the remaining variables. With all
//! variables bound, the conclusion is substituted and emitted as a candidate
//! fact. All scratch state lives in the caller's stack frame; the store is
//! only reached through the read snapshot passed in.

use std::collections::{BTreeSet, HashMap};

use shared::rule::Rule;
use shared::terms::{Term, TriplePattern};
use shared::triple::Triple;

use crate::reasoning::selectivity::select_next_variable;
use crate::store::StoreInner;
use crate::trie::{LeapfrogJoin, TrieIterator};

/// Variable name -> bound constant ID.
pub type Bindings = HashMap<String, u32>;

/// Variable name -> occurrences as (premise index, component position),
/// position 0 = subject, 1 = predicate, 2 = object.
pub type VarPositions = HashMap<String, Vec<(usize, usize)>>;

/// Collect every body variable of `rule` with its occurrence list. The
/// variable set is ordered so that selectivity ties resolve by name.
pub fn variable_positions(rule: &Rule) -> (BTreeSet<String>, VarPositions) {
    let mut variables = BTreeSet::new();
    let mut positions: VarPositions = HashMap::new();
    for (idx, premise) in rule.premise.iter().enumerate() {
        for (pos, term) in [&premise.0, &premise.1, &premise.2].into_iter().enumerate() {
            if let Term::Variable(name) = term {
                variables.insert(name.clone());
                positions.entry(name.clone()).or_default().push((idx, pos));
            }
        }
    }
    (variables, positions)
}

/// The constant a term denotes under `bindings`, if any.
pub(crate) fn resolve(term: &Term, bindings: &Bindings) -> Option<u32> {
    match term {
        Term::Constant(id) => Some(*id),
        Term::Variable(name) => bindings.get(name).copied(),
    }
}

/// Unify a ground fact against one premise pattern, producing the partial
/// binding that makes them equal. Constant components must match exactly; a
/// variable appearing twice must take the same value both times.
pub fn unify_fact(pattern: &TriplePattern, fact: &Triple) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    bind_component(&pattern.0, fact.subject, &mut bindings)?;
    bind_component(&pattern.1, fact.predicate, &mut bindings)?;
    bind_component(&pattern.2, fact.object, &mut bindings)?;
    Some(bindings)
}

fn bind_component(term: &Term, value: u32, bindings: &mut Bindings) -> Option<()> {
    match term {
        Term::Constant(id) => (*id == value).then_some(()),
        Term::Variable(name) => match bindings.get(name) {
            Some(&bound) => (bound == value).then_some(()),
            None => {
                bindings.insert(name.clone(), value);
                Some(())
            }
        },
    }
}

/// Evaluate `rule` under a possibly-partial binding, appending every
/// conclusion instantiation consistent with the body to `out`. The binding
/// is left as it was found.
pub fn evaluate_rule(
    inner: &StoreInner,
    rule: &Rule,
    bindings: &mut Bindings,
    out: &mut Vec<Triple>,
) {
    let (variables, var_positions) = variable_positions(rule);
    if !premises_satisfiable(inner, rule, bindings) {
        return;
    }
    let suspects = suspect_premises(rule);
    join_by_variable(inner, rule, &variables, &var_positions, &suspects, bindings, out);
}

/// Reject binding/rule combinations that cannot succeed before any join
/// work: every premise that is already fully ground under the incoming
/// binding (all-constant premises included) must be a stored fact.
fn premises_satisfiable(inner: &StoreInner, rule: &Rule, bindings: &Bindings) -> bool {
    rule.premise.iter().all(|premise| {
        match (
            resolve(&premise.0, bindings),
            resolve(&premise.1, bindings),
            resolve(&premise.2, bindings),
        ) {
            (Some(s), Some(p), Some(o)) => inner.contains(&Triple::new(s, p, o)),
            _ => true,
        }
    })
}

/// Premises the join cannot fully constrain through iterators: a variable
/// occupying both subject and object of one premise is bound in a single
/// step, and a variable predicate is enumerated from the trie's top level
/// without consulting the other components. Instantiations of these
/// premises are re-probed against the store before a conclusion is emitted.
fn suspect_premises(rule: &Rule) -> Vec<usize> {
    rule.premise
        .iter()
        .enumerate()
        .filter(|(_, premise)| {
            let same_var_twice = match (&premise.0, &premise.2) {
                (Term::Variable(s), Term::Variable(o)) => s == o,
                _ => false,
            };
            same_var_twice || premise.1.is_variable()
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn join_by_variable(
    inner: &StoreInner,
    rule: &Rule,
    variables: &BTreeSet<String>,
    var_positions: &VarPositions,
    suspects: &[usize],
    bindings: &mut Bindings,
    out: &mut Vec<Triple>,
) {
    let Some(variable) = select_next_variable(inner, rule, variables, var_positions, bindings)
    else {
        emit_conclusion(inner, rule, suspects, bindings, out);
        return;
    };

    let Some(iterators) =
        iterators_for_variable(inner, rule, &var_positions[&variable], bindings)
    else {
        return;
    };

    let mut join = LeapfrogJoin::new(iterators);
    while let Some(key) = join.key() {
        bindings.insert(variable.clone(), key);
        join_by_variable(inner, rule, variables, var_positions, suspects, bindings, out);
        join.next();
    }
    bindings.remove(&variable);
}

/// One iterator per occurrence of the chosen variable. `None` means some
/// occurrence cannot match at all (a missed seek, or an unresolvable
/// predicate), so the whole join for this variable is empty.
fn iterators_for_variable<'a>(
    inner: &'a StoreInner,
    rule: &Rule,
    occurrences: &[(usize, usize)],
    bindings: &Bindings,
) -> Option<Vec<TrieIterator<'a>>> {
    let mut iterators = Vec::with_capacity(occurrences.len());
    for &(idx, position) in occurrences {
        let premise = &rule.premise[idx];
        match position {
            // Predicate variables enumerate the first trie level.
            1 => iterators.push(inner.pso_root().iter()),
            0 => {
                let predicate = resolve(&premise.1, bindings)?;
                match resolve(&premise.2, bindings) {
                    Some(object) => {
                        let mut top = inner.pos_root().iter();
                        let mut objects = open_exact(&mut top, predicate)?;
                        iterators.push(open_exact(&mut objects, object)?);
                    }
                    None => {
                        let mut top = inner.pso_root().iter();
                        iterators.push(open_exact(&mut top, predicate)?);
                    }
                }
            }
            2 => {
                let predicate = resolve(&premise.1, bindings)?;
                match resolve(&premise.0, bindings) {
                    Some(subject) => {
                        let mut top = inner.pso_root().iter();
                        let mut subjects = open_exact(&mut top, predicate)?;
                        iterators.push(open_exact(&mut subjects, subject)?);
                    }
                    None => {
                        let mut top = inner.pos_root().iter();
                        iterators.push(open_exact(&mut top, predicate)?);
                    }
                }
            }
            _ => unreachable!("component position is always 0, 1 or 2"),
        }
    }
    Some(iterators)
}

/// Seek `key` on the iterator and descend into it on an exact hit.
fn open_exact<'a>(it: &mut TrieIterator<'a>, key: u32) -> Option<TrieIterator<'a>> {
    it.seek(key);
    if it.key() == Some(key) {
        it.open()
    } else {
        None
    }
}

fn emit_conclusion(
    inner: &StoreInner,
    rule: &Rule,
    suspects: &[usize],
    bindings: &Bindings,
    out: &mut Vec<Triple>,
) {
    for &idx in suspects {
        let premise = &rule.premise[idx];
        match (
            resolve(&premise.0, bindings),
            resolve(&premise.1, bindings),
            resolve(&premise.2, bindings),
        ) {
            (Some(s), Some(p), Some(o)) => {
                if !inner.contains(&Triple::new(s, p, o)) {
                    return;
                }
            }
            _ => return,
        }
    }

    let (s, p, o) = (
        resolve(&rule.conclusion.0, bindings),
        resolve(&rule.conclusion.1, bindings),
        resolve(&rule.conclusion.2, bindings),
    );
    // An unbound conclusion variable means the rule violates range
    // restriction; it instantiates nothing.
    if let (Some(s), Some(p), Some(o)) = (s, p, o) {
        out.push(Triple::new(s, p, o));
    }
}
