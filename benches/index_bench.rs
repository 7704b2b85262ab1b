use criterion::{criterion_group, criterion_main, Criterion};
use neosearch::{BackendRegistry, Engine, Index, IndexConfig, Metadata};
use rand::prelude::*;
use tempfile::TempDir;

fn add_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");

    for backend in ["log", "sled"] {
        group.bench_function(backend, |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let engine = Engine::new(dir.path(), BackendRegistry::with_builtins(), backend, 32);
                    let index = Index::new(
                        "products",
                        IndexConfig {
                            data_dir: dir.path().to_path_buf(),
                            debug: false,
                        },
                        true,
                    )
                    .unwrap();
                    (dir, engine, index)
                },
                |(_dir, engine, index)| {
                    for i in 0..100u64 {
                        let doc = format!(r#"{{"name": "item number {i}", "price": {i}}}"#);
                        index.add(&engine, i, doc.as_bytes(), &Metadata::new()).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn filter_term_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_term");

    group.bench_function("log", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = Engine::new(dir.path(), BackendRegistry::with_builtins(), "log", 32);
                let index = Index::new(
                    "products",
                    IndexConfig {
                        data_dir: dir.path().to_path_buf(),
                        debug: false,
                    },
                    true,
                )
                .unwrap();
                for i in 0..1000u64 {
                    index
                        .add(&engine, i, br#"{"name": "red shoes"}"#, &Metadata::new())
                        .unwrap();
                }
                (dir, engine, index)
            },
            |(_dir, engine, index)| {
                index.filter_term(&engine, "name", b"shoes", 0).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn get_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    group.bench_function("log", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = Engine::new(dir.path(), BackendRegistry::with_builtins(), "log", 1024);
                let index = Index::new(
                    "products",
                    IndexConfig {
                        data_dir: dir.path().to_path_buf(),
                        debug: false,
                    },
                    true,
                )
                .unwrap();
                for i in 0..1000u64 {
                    let doc = format!(r#"{{"name": "item number {i}"}}"#);
                    index.add(&engine, i, doc.as_bytes(), &Metadata::new()).unwrap();
                }
                let mut rng = rand::thread_rng();
                let lookups: Vec<u64> = (0..100).map(|_| rng.gen_range(0..1000)).collect();
                (dir, engine, index, lookups)
            },
            |(_dir, engine, index, lookups)| {
                for id in lookups {
                    index.get(&engine, id).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, add_bench, filter_term_bench, get_bench);
criterion_main!(benches);
