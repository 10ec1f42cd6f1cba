use crate::terms::TriplePattern;

/// A Datalog rule: a conjunction of premise patterns implying one conclusion.
///
/// Every variable in the conclusion is assumed to occur in the premise
/// (range restriction); violations are not detected here, a violating head
/// variable simply never produces an instantiation.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    pub premise: Vec<TriplePattern>,
    pub conclusion: TriplePattern,
}
