use std::collections::HashMap;

use crate::rule::Rule;
use crate::terms::Term;

pub type RuleId = usize;

/// Index from a predicate ID to the rule premises that mention it.
///
/// Built once from the rule set: for every premise whose predicate is a
/// constant, the index records which rule and which premise position it
/// occupies. A freshly derived fact then triggers exactly the (rule,
/// premise) pairs that can consume it. Premises with a variable predicate
/// are not indexed; such rules still run during the initial full pass.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    by_predicate: HashMap<u32, Vec<(RuleId, usize)>>,
}

impl RuleIndex {
    pub fn new() -> Self {
        Self {
            by_predicate: HashMap::new(),
        }
    }

    pub fn build(rules: &[Rule]) -> Self {
        let mut index = Self::new();
        for (rule_id, rule) in rules.iter().enumerate() {
            for (premise_idx, premise) in rule.premise.iter().enumerate() {
                index.insert_premise_pattern(premise, rule_id, premise_idx);
            }
        }
        index
    }

    pub fn insert_premise_pattern(
        &mut self,
        pattern: &(Term, Term, Term),
        rule_id: RuleId,
        premise_idx: usize,
    ) {
        if let Term::Constant(predicate) = pattern.1 {
            self.by_predicate
                .entry(predicate)
                .or_default()
                .push((rule_id, premise_idx));
        }
    }

    /// All (rule, premise position) pairs whose premise predicate is `predicate`.
    pub fn candidates(&self, predicate: u32) -> &[(RuleId, usize)] {
        self.by_predicate
            .get(&predicate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_predicate.is_empty()
    }
}
