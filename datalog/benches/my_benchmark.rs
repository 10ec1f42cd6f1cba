extern crate criterion;
extern crate datalog;
extern crate shared;

use criterion::*;
use datalog::reasoning::engine::DatalogEngine;
use datalog::store::TripleStore;
use shared::rule::Rule;
use shared::terms::Term;

const CHAIN_LENGTH: usize = 50;

fn setup_store() -> TripleStore {
    let store = TripleStore::new();
    for i in 0..CHAIN_LENGTH {
        store.insert_str(&format!("n{}", i), "knows", &format!("n{}", i + 1));
    }
    store
}

fn transitive_rule(store: &TripleStore) -> Rule {
    let knows = store.dictionary().encode("knows");
    Rule {
        name: Some("transitive".to_string()),
        premise: vec![
            (
                Term::Variable("x".to_string()),
                Term::Constant(knows),
                Term::Variable("y".to_string()),
            ),
            (
                Term::Variable("y".to_string()),
                Term::Constant(knows),
                Term::Variable("z".to_string()),
            ),
        ],
        conclusion: (
            Term::Variable("x".to_string()),
            Term::Constant(knows),
            Term::Variable("z".to_string()),
        ),
    }
}

fn materialise_chain() {
    let store = setup_store();
    let rules = vec![transitive_rule(&store)];
    DatalogEngine::new(&store, rules).reason();
}

fn my_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("reasoning");
    group.sample_size(10);
    group.bench_function("transitive_closure_chain_50", |b| {
        b.iter(|| materialise_chain())
    });
    group.finish();
}

criterion_group!(benches, my_benchmark);
criterion_main!(benches);
