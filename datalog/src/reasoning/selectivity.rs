use std::collections::BTreeSet;

use shared::rule::Rule;

use crate::reasoning::evaluator::{resolve, Bindings, VarPositions};
use crate::store::StoreInner;

/// Estimate assigned to a variable none of whose occurrences has a
/// resolvable predicate; such variables are joined last.
const UNKNOWN_CANDIDATES: usize = 1_000_000;

/// Pick the unbound variable expected to take the fewest values.
///
/// The estimate for a variable is the smallest fact count among the
/// predicates of its occurrences. Any order is correct; binding
/// high-selectivity variables first shrinks the intermediate result.
/// Ties break towards the lexicographically smallest name. Returns `None`
/// when every variable is bound.
pub fn select_next_variable(
    inner: &StoreInner,
    rule: &Rule,
    variables: &BTreeSet<String>,
    var_positions: &VarPositions,
    bindings: &Bindings,
) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for variable in variables {
        if bindings.contains_key(variable) {
            continue;
        }
        let mut estimate = usize::MAX;
        for &(idx, _) in &var_positions[variable] {
            if let Some(predicate) = resolve(&rule.premise[idx].1, bindings) {
                estimate = estimate.min(inner.predicate_count(predicate));
            }
        }
        if estimate == usize::MAX {
            estimate = UNKNOWN_CANDIDATES;
        }
        if best.is_none_or(|(_, count)| estimate < count) {
            best = Some((variable, estimate));
        }
    }
    best.map(|(variable, _)| variable.clone())
}
