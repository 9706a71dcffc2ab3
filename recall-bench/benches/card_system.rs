//! Recall benchmark suite.
//!
//! Hot paths:
//!   identify ........................ one id per heading
//!   next_state ...................... one review
//!   upsert_existing_1000 ............ re-index of an unchanged document
//!   list_due_from_5000 .............. due query over a large store
//!   reconcile_200_headings .......... single-document re-index

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use recall_core::config::StalePolicy;
use recall_core::identity::identify;
use recall_core::persistence::MemoryBackend;
use recall_core::reconcile::reconcile_document;
use recall_core::scheduler::{self, ReviewInput};
use recall_core::{CardStore, DAY_MS, FlushPolicy, Heading, Rating};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime")
}

fn populated_store(rt: &tokio::runtime::Runtime, docs: usize, per_doc: usize) -> CardStore {
    let store = rt.block_on(CardStore::open(
        Arc::new(MemoryBackend::new()),
        FlushPolicy::default(),
    ));
    for d in 0..docs {
        let path = format!("notes/doc{d}.md");
        for h in 0..per_doc {
            let heading = format!("Heading {h} of document {d}");
            let due = i64::try_from(d * per_doc + h).unwrap_or(i64::MAX) * DAY_MS / 10;
            store.upsert_at(&identify(&path, &heading), &path, &heading, due);
        }
    }
    store
}

/// Benchmark: identity derivation for a typical heading.
fn bench_identify(c: &mut Criterion) {
    c.bench_function("identify", |b| {
        b.iter(|| identify(black_box("notes/rust/ownership.md"), black_box("Borrowing rules")));
    });
}

/// Benchmark: one scheduling update per rating.
fn bench_next_state(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let input = ReviewInput {
        interval: Some(12),
        ease: Some(2.36),
    };
    let mut group = c.benchmark_group("next_state");
    for rating in [Rating::Hard, Rating::Good, Rating::Easy] {
        group.bench_with_input(BenchmarkId::from_parameter(rating), &rating, |b, &rating| {
            b.iter(|| scheduler::next_state_at(black_box(input), rating, 0, &mut rng));
        });
    }
    group.finish();
}

/// Benchmark: upserting cards that already exist (question unchanged).
fn bench_upsert_existing(c: &mut Criterion) {
    let rt = runtime();
    let store = populated_store(&rt, 10, 100);
    let cards = store.all_cards();
    c.bench_function("upsert_existing_1000", |b| {
        b.iter(|| {
            for card in &cards {
                black_box(store.upsert(&card.id, &card.document_path, &card.question));
            }
        });
    });
}

/// Benchmark: due query over 5000 cards, half of them due.
fn bench_list_due(c: &mut Criterion) {
    let rt = runtime();
    let store = populated_store(&rt, 50, 100);
    let as_of = 2500 * DAY_MS / 10;
    c.bench_function("list_due_from_5000", |b| {
        b.iter(|| black_box(store.list_due(black_box(as_of))));
    });
}

/// Benchmark: reconciling a 200-heading document against itself.
fn bench_reconcile(c: &mut Criterion) {
    let rt = runtime();
    let store = populated_store(&rt, 0, 0);
    let headings: Vec<Heading> = (0..200)
        .map(|i| Heading::new(format!("Section {i}"), 2))
        .collect();
    reconcile_document(&store, "big.md", &headings, StalePolicy::Retain);
    c.bench_function("reconcile_200_headings", |b| {
        b.iter(|| reconcile_document(&store, "big.md", black_box(&headings), StalePolicy::Retain));
    });
}

criterion_group!(
    benches,
    bench_identify,
    bench_next_state,
    bench_upsert_existing,
    bench_list_due,
    bench_reconcile,
);
criterion_main!(benches);
