/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Line-oriented loaders for the three triple formats and the Datalog rule
//! syntax. Malformed lines are skipped with a warning; they never abort a
//! load. Unknown prefixes are left unexpanded, so the affected terms simply
//! never match anything downstream.

use std::collections::HashMap;

use log::warn;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{alphanumeric1, char, multispace0, multispace1},
    combinator::{map, recognize},
    multi::separated_list1,
    sequence::{delimited, preceded, terminated},
    IResult,
};

use shared::dictionary::Dictionary;
use shared::rule::Rule;
use shared::terms::{Term, TriplePattern, UnresolvedTerm, UnresolvedTriple};

/// A triple still in textual form, as produced by the loaders.
pub type TripleText = (String, String, String);

// IRIs are stored without their angle brackets so that the same node gets
// the same dictionary ID whether it occurs as subject or object. Literals
// keep their quotes and blank nodes their `_:` marker, which keeps the
// three term kinds distinct in the pool.
fn iri(input: &str) -> IResult<&str, &str> {
    delimited(tag("<"), take_until(">"), tag(">"))(input)
}

fn literal(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('"'), take_until("\""), char('"')))(input)
}

fn blank_node(input: &str) -> IResult<&str, &str> {
    recognize(preceded(tag("_:"), take_while1(|c: char| !c.is_whitespace())))(input)
}

fn bare_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn ntriples_object(input: &str) -> IResult<&str, String> {
    alt((
        map(iri, str::to_string),
        map(literal, str::to_string),
        map(blank_node, str::to_string),
    ))(input)
}

fn ntriples_line(input: &str) -> IResult<&str, TripleText> {
    let (input, _) = multispace0(input)?;
    let (input, subject) = iri(input)?;
    let (input, _) = multispace1(input)?;
    let (input, predicate) = iri(input)?;
    let (input, _) = multispace1(input)?;
    let (input, object) = ntriples_object(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(".")(input)?;
    Ok((input, (subject.to_string(), predicate.to_string(), object)))
}

/// Parse N-Triples text, one triple per line.
pub fn parse_ntriples(input: &str) -> Vec<TripleText> {
    let mut triples = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match ntriples_line(line) {
            Ok((_, triple)) => triples.push(triple),
            Err(_) => warn!("skipping malformed N-Triples line {}: {}", line_no + 1, line),
        }
    }
    triples
}

// Parsing prefix declarations, `@prefix ex: <http://example.org/> .`
fn turtle_prefix(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = tag("@prefix")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, prefix) = terminated(alphanumeric1, tag(":"))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, uri) = iri(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(".")(input)?;
    Ok((input, (prefix, uri)))
}

fn turtle_term(input: &str) -> IResult<&str, String> {
    alt((
        map(iri, str::to_string),
        map(literal, str::to_string),
        map(blank_node, str::to_string),
        map(bare_token, str::to_string),
    ))(input)
}

fn turtle_line(input: &str) -> IResult<&str, TripleText> {
    let (input, _) = multispace0(input)?;
    let (input, subject) = turtle_term(input)?;
    let (input, _) = multispace1(input)?;
    let (input, predicate) = turtle_term(input)?;
    let (input, _) = multispace1(input)?;
    let (input, object) = turtle_term(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(".")(input)?;
    Ok((input, (subject, predicate, object)))
}

fn expand_prefix(term: &str, prefixes: &HashMap<String, String>) -> String {
    if term.starts_with('"') || term.starts_with("_:") {
        return term.to_string();
    }
    if let Some((prefix, suffix)) = term.split_once(':') {
        if let Some(uri) = prefixes.get(prefix) {
            return format!("{}{}", uri, suffix);
        }
    }
    term.to_string()
}

/// Parse a line-oriented Turtle subset: global `@prefix` declarations,
/// comments, and one triple per line with `prefix:suffix` expansion.
pub fn parse_turtle(input: &str) -> Vec<TripleText> {
    let mut prefixes: HashMap<String, String> = HashMap::new();
    let mut triples = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Ok((_, (prefix, uri))) = turtle_prefix(line) {
            prefixes.insert(prefix.to_string(), uri.to_string());
            continue;
        }
        match turtle_line(line) {
            Ok((_, (s, p, o))) => triples.push((
                expand_prefix(&s, &prefixes),
                expand_prefix(&p, &prefixes),
                expand_prefix(&o, &prefixes),
            )),
            Err(_) => warn!("skipping malformed Turtle line {}: {}", line_no + 1, line),
        }
    }
    triples
}

/// Parse comma-separated subject,predicate,object lines. Fields are taken
/// verbatim; anything after the third comma is ignored.
pub fn parse_csv(input: &str) -> Vec<TripleText> {
    let mut triples = Vec::new();
    for line in input.lines() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        if let (Some(s), Some(p), Some(o)) = (fields.next(), fields.next(), fields.next()) {
            triples.push((s.to_string(), p.to_string(), o.to_string()));
        } else {
            warn!("skipping short CSV line: {}", line);
        }
    }
    triples
}

// Rule syntax: optional `PREFIX ex: <http://example.org/>` lines, then
// `head(a, b) :- body1(c, d), body2(e, f) .` with `?`-prefixed variables.
fn rule_prefix(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = tag("PREFIX")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, prefix) = terminated(alphanumeric1, tag(":"))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, uri) = iri(input)?;
    Ok((input, (prefix, uri)))
}

fn rule_term(input: &str) -> IResult<&str, UnresolvedTerm> {
    alt((
        map(
            preceded(tag("?"), take_while1(|c: char| c.is_alphanumeric() || c == '_')),
            |name: &str| UnresolvedTerm::Var(name.to_string()),
        ),
        map(iri, |s| UnresolvedTerm::Constant(s.to_string())),
        map(
            take_while1(|c: char| !c.is_whitespace() && !"(),.".contains(c)),
            |s: &str| UnresolvedTerm::Constant(s.to_string()),
        ),
    ))(input)
}

/// One atom, `functor(arg1, arg2)`, mapped to the triple pattern
/// `(arg1, functor, arg2)`.
fn rule_atom(input: &str) -> IResult<&str, UnresolvedTriple> {
    let (input, _) = multispace0(input)?;
    let (input, functor) = rule_term(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("(")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, arg1) = rule_term(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, arg2) = rule_term(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(")")(input)?;
    Ok((input, (arg1, functor, arg2)))
}

fn rule_line(input: &str) -> IResult<&str, (UnresolvedTriple, Vec<UnresolvedTriple>)> {
    let (input, head) = rule_atom(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(":-")(input)?;
    let (input, body) = separated_list1(tag(","), rule_atom)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(".")(input)?;
    Ok((input, (head, body)))
}

fn to_term(
    term: UnresolvedTerm,
    prefixes: &HashMap<String, String>,
    dictionary: &Dictionary,
) -> Term {
    match term {
        UnresolvedTerm::Var(name) => Term::Variable(name),
        UnresolvedTerm::Constant(text) => {
            Term::Constant(dictionary.encode(&expand_prefix(&text, prefixes)))
        }
    }
}

fn to_pattern(
    triple: UnresolvedTriple,
    prefixes: &HashMap<String, String>,
    dictionary: &Dictionary,
) -> TriplePattern {
    (
        to_term(triple.0, prefixes, dictionary),
        to_term(triple.1, prefixes, dictionary),
        to_term(triple.2, prefixes, dictionary),
    )
}

/// Parse Datalog rules, interning constants through `dictionary`. Rules are
/// named `rule1`, `rule2`, ... in input order.
pub fn parse_rules(input: &str, dictionary: &Dictionary) -> Vec<Rule> {
    let mut prefixes: HashMap<String, String> = HashMap::new();
    let mut rules = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Ok((_, (prefix, uri))) = rule_prefix(line) {
            prefixes.insert(prefix.to_string(), uri.to_string());
            continue;
        }
        match rule_line(line) {
            Ok((_, (head, body))) => {
                let premise = body
                    .into_iter()
                    .map(|atom| to_pattern(atom, &prefixes, dictionary))
                    .collect();
                let conclusion = to_pattern(head, &prefixes, dictionary);
                rules.push(Rule {
                    name: Some(format!("rule{}", rules.len() + 1)),
                    premise,
                    conclusion,
                });
            }
            Err(_) => warn!("skipping malformed rule at line {}: {}", line_no + 1, line),
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntriples_parses_the_three_object_kinds() {
        let input = "\
<http://example.org/a> <http://example.org/p> <http://example.org/b> .
<http://example.org/a> <http://example.org/label> \"a label\" .
<http://example.org/a> <http://example.org/rel> _:blank1 .
not a triple
";
        let triples = parse_ntriples(input);
        assert_eq!(triples.len(), 3);
        assert_eq!(
            triples[0],
            (
                "http://example.org/a".to_string(),
                "http://example.org/p".to_string(),
                "http://example.org/b".to_string()
            )
        );
        assert_eq!(triples[1].2, "\"a label\"");
        assert_eq!(triples[2].2, "_:blank1");
    }

    #[test]
    fn subject_and_object_iris_share_spelling() {
        let input = "\
<http://example.org/a> <http://example.org/p> <http://example.org/b> .
<http://example.org/b> <http://example.org/p> <http://example.org/c> .
";
        let triples = parse_ntriples(input);
        assert_eq!(triples[0].2, triples[1].0);
    }

    #[test]
    fn turtle_expands_declared_prefixes() {
        let input = "\
@prefix ex: <http://example.org/> .
# a comment line

ex:alice ex:knows ex:bob .
ex:alice ex:age \"42\" .
";
        let triples = parse_turtle(input);
        assert_eq!(triples.len(), 2);
        assert_eq!(
            triples[0],
            (
                "http://example.org/alice".to_string(),
                "http://example.org/knows".to_string(),
                "http://example.org/bob".to_string()
            )
        );
        assert_eq!(triples[1].2, "\"42\"");
    }

    #[test]
    fn turtle_leaves_unknown_prefixes_alone() {
        let triples = parse_turtle("ex:a ex:b ex:c .\n");
        assert_eq!(
            triples,
            vec![("ex:a".to_string(), "ex:b".to_string(), "ex:c".to_string())]
        );
    }

    #[test]
    fn csv_takes_first_three_fields() {
        let triples = parse_csv("a,p,b\nc,q\nx,y,z,extra\n");
        assert_eq!(
            triples,
            vec![
                ("a".to_string(), "p".to_string(), "b".to_string()),
                ("x".to_string(), "y".to_string(), "z".to_string()),
            ]
        );
    }

    #[test]
    fn rule_atoms_map_functor_to_predicate() {
        let dict = Dictionary::new();
        let rules = parse_rules("knows(?x, ?y) :- friendOf(?x, ?y) .", &dict);
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.name.as_deref(), Some("rule1"));
        assert_eq!(rule.premise.len(), 1);

        let friend_of = dict.encode_if_present("friendOf").unwrap();
        let knows = dict.encode_if_present("knows").unwrap();
        assert_eq!(
            rule.premise[0],
            (
                Term::Variable("x".to_string()),
                Term::Constant(friend_of),
                Term::Variable("y".to_string())
            )
        );
        assert_eq!(
            rule.conclusion,
            (
                Term::Variable("x".to_string()),
                Term::Constant(knows),
                Term::Variable("y".to_string())
            )
        );
    }

    #[test]
    fn rule_prefixes_expand_functors_and_constants() {
        let input = "\
PREFIX ex: <http://example.org/>
ex:knows(?x, ex:bob) :- ex:friendOf(?x, ex:bob) .
";
        let dict = Dictionary::new();
        let rules = parse_rules(input, &dict);
        assert_eq!(rules.len(), 1);
        assert!(dict.encode_if_present("http://example.org/knows").is_some());
        assert!(dict.encode_if_present("http://example.org/bob").is_some());
        assert_eq!(dict.encode_if_present("ex:knows"), None);
    }

    #[test]
    fn multi_premise_rules_keep_body_order() {
        let dict = Dictionary::new();
        let rules = parse_rules("knows(?x, ?z) :- knows(?x, ?y), knows(?y, ?z) .", &dict);
        assert_eq!(rules[0].premise.len(), 2);
        assert_eq!(
            rules[0].premise[0].0,
            Term::Variable("x".to_string())
        );
        assert_eq!(
            rules[0].premise[1].0,
            Term::Variable("y".to_string())
        );
    }

    #[test]
    fn malformed_rules_are_skipped() {
        let dict = Dictionary::new();
        let rules = parse_rules(
            "knows(?x ?y) :- friendOf(?x, ?y) .\nknows(?a, ?b) :- friendOf(?a, ?b) .",
            &dict,
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name.as_deref(), Some("rule1"));
    }
}
