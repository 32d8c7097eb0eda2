//! Performance benchmarks for the Vigil handle registry
//!
//! These benchmarks test performance-critical operations to prevent
//! regressions: the registry sits on every intercepted call, so lookup
//! and registration throughput directly bound the layer's overhead.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use vigil::registry::{HandleNode, HandleRegistry};
use vigil::{HandleKey, ObjectType};

/// Benchmark lookups against registries of different sizes
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for handle_count in [10, 100, 1_000, 10_000].iter() {
        group.bench_with_input(
            format!("lookup_among_{}_handles", handle_count),
            handle_count,
            |b, &handle_count| {
                let registry = HandleRegistry::new();
                for raw in 0..handle_count as u64 {
                    registry
                        .register(HandleNode::root(raw, ObjectType::Session))
                        .unwrap();
                }

                b.iter(|| {
                    for raw in 0..64u64 {
                        let key = HandleKey::new(raw % handle_count as u64, ObjectType::Session);
                        black_box(registry.lookup(key).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark register/unregister churn
fn bench_register_unregister(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_churn");

    group.bench_function("register_unregister_cycle", |b| {
        let registry = HandleRegistry::new();
        b.iter(|| {
            for raw in 0..64u64 {
                registry
                    .register(HandleNode::root(raw, ObjectType::Swapchain))
                    .unwrap();
            }
            for raw in 0..64u64 {
                registry
                    .unregister(HandleKey::new(raw, ObjectType::Swapchain))
                    .unwrap();
            }
        });
    });

    group.finish();
}

/// Benchmark recursive subtree destruction
fn bench_subtree_destruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtree_destruction");

    for children_per_session in [1, 8, 64].iter() {
        group.bench_with_input(
            format!("destroy_instance_with_{}_children_per_session", children_per_session),
            children_per_session,
            |b, &children_per_session| {
                b.iter_batched(
                    || {
                        let registry = HandleRegistry::new();
                        let instance = HandleNode::root(1, ObjectType::Instance);
                        registry.register(instance.clone()).unwrap();

                        let mut raw = 2u64;
                        for _ in 0..8 {
                            let session =
                                registry.child_node(&instance, raw, ObjectType::Session);
                            registry.register(session.clone()).unwrap();
                            raw += 1;
                            for _ in 0..children_per_session {
                                let swapchain =
                                    registry.child_node(&session, raw, ObjectType::Swapchain);
                                registry.register(swapchain).unwrap();
                                raw += 1;
                            }
                        }
                        registry
                    },
                    |registry| {
                        registry
                            .unregister(HandleKey::new(1, ObjectType::Instance))
                            .unwrap();
                        black_box(registry.len())
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_lookup,
    bench_register_unregister,
    bench_subtree_destruction
);
criterion_main!(benches);
