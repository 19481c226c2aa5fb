use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use tryton_xref::backend::MemoryBackend;
use tryton_xref::reference::{ObjectReference, ObjectType};
use tryton_xref::registry::Registry;
use tryton_xref::resolver::Resolver;

fn catalog() -> MemoryBackend {
    let mut backend = MemoryBackend::new();
    for i in 0..200i64 {
        backend.add(
            "ir.model",
            i,
            vec![("model", format!("bench.model{}", i).into()), ("name", format!("Model {}", i).into())],
        );
        backend.add(
            "ir.model.field",
            i,
            vec![
                ("model", i.into()),
                ("name", "state".into()),
                ("field_description", "State".into()),
            ],
        );
    }
    backend
}

fn parse_references(c: &mut Criterion) {
    c.bench_function("parse decorated field reference", |b| {
        b.iter(|| ObjectReference::parse(ObjectType::Field, black_box("!~sale.sale.description|help")))
    });
    c.bench_function("parse option reference", |b| {
        b.iter(|| ObjectReference::parse(ObjectType::Option, black_box("sale.sale.state.draft")))
    });
}

fn cached_resolution(c: &mut Criterion) {
    let resolver = Resolver::new(catalog());
    for i in 0..200 {
        let _ = resolver.get_property(ObjectType::Field, &format!("bench.model{}.state", i), None);
    }
    c.bench_function("cached field resolution", |b| {
        b.iter(|| resolver.get_property(ObjectType::Field, black_box("bench.model199.state"), None))
    });
    c.bench_function("uncached model resolution", |b| {
        b.iter(|| {
            let backend = single_model_catalog();
            let resolver = Resolver::new(&backend);
            resolver.get_property(ObjectType::Model, black_box("bench.model199"), None)
        })
    });
}

fn single_model_catalog() -> MemoryBackend {
    let mut backend = MemoryBackend::new();
    backend.add("ir.model", 199, vec![("model", "bench.model199".into()), ("name", "Model 199".into())]);
    backend
}

fn registry_merge(c: &mut Criterion) {
    let shards: Vec<(Registry, Vec<String>)> = (0..8)
        .map(|shard| {
            let mut registry = Registry::new();
            let documents: Vec<String> = (0..25).map(|d| format!("shard{}/doc{}", shard, d)).collect();
            for (d, document) in documents.iter().enumerate() {
                for o in 0..10 {
                    registry.define(&format!("bench.s{}d{}o{}", shard, d, o), document, ObjectType::Model);
                }
            }
            (registry, documents)
        })
        .collect();
    c.bench_function("merge 8 shards", |b| {
        b.iter(|| {
            let mut merged = Registry::new();
            for (registry, documents) in &shards {
                merged.merge(registry, documents.as_slice());
            }
            merged.len()
        })
    });
}

criterion_group!(benches, parse_references, cached_resolution, registry_merge);
criterion_main!(benches);
