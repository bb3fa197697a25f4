//! Benchmarks for the tuple engine.
//!
//! Setup (record generation, compilation) is kept out of the measured loop
//! with `iter_batched`; what is measured is tuple building from record sets.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use kvorm_core::Record;
use kvorm_query::{compile, InMemorySource, QueryExecutor};

/// Authors `0..count`, each owning four books.
fn library(count: i64) -> InMemorySource {
    let authors = (1..=count)
        .map(|i| Record::with_id(i).field("name", format!("Author{}", i)))
        .collect();
    let books = (1..=count * 4)
        .map(|i| {
            Record::with_id(i)
                .field("author_id", (i - 1) / 4 + 1)
                .field("title", format!("Book{}", i))
        })
        .collect();
    InMemorySource::new()
        .with_table("authors", authors)
        .with_table("books", books)
}

fn bench_inner_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("inner_join");
    let tree = compile("SELECT * FROM authors a, books b WHERE a.id = b.author_id").unwrap();
    for size in [100i64, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || library(size),
                |mut source| black_box(QueryExecutor::new().execute(&tree, &mut source).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_filtered_join(c: &mut Criterion) {
    let tree = compile(
        "SELECT b.* FROM authors a, books b WHERE a.id = b.author_id AND a.name = 'Author7'",
    )
    .unwrap();
    c.bench_function("filtered_join_1000", |b| {
        b.iter_batched(
            || library(1_000),
            |mut source| black_box(QueryExecutor::new().execute(&tree, &mut source).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let tree = compile("SELECT count(*), max(b.id) FROM authors a LEFT JOIN books b ON a.id = b.author_id")
        .unwrap();
    c.bench_function("left_join_aggregate_1000", |b| {
        b.iter_batched(
            || library(1_000),
            |mut source| black_box(QueryExecutor::new().execute(&tree, &mut source).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_compile(c: &mut Criterion) {
    let sql = "SELECT a.name, b.title FROM authors a LEFT JOIN books b ON a.id = b.author_id \
               WHERE a.name LIKE 'Author1%' AND b.id IN (SELECT id FROM books WHERE id < 50)";
    c.bench_function("compile", |b| b.iter(|| black_box(compile(black_box(sql)).unwrap())));
}

criterion_group!(
    benches,
    bench_inner_join,
    bench_filtered_join,
    bench_aggregate,
    bench_compile
);
criterion_main!(benches);
