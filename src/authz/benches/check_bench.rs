//! Authorization check benchmarks
//!
//! Role trees of increasing depth, each level granted one direct permission
//! and one group. The user holds the root role, so every check expands the
//! whole tree.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rbac_authz::{pattern, AuthzEngine, EngineConfig, InMemoryCacheStore, InMemoryRbacStore, UserId};
use std::sync::Arc;
use tokio::runtime::Runtime;

async fn build_chain(depth: usize) -> (Arc<InMemoryRbacStore>, UserId) {
    let store = Arc::new(InMemoryRbacStore::new());
    let mut parent = None;

    for level in 0..depth {
        let role = store
            .create_role(format!("role-{}", level), None, parent)
            .await
            .unwrap();
        let perm = store
            .create_permission(format!("resource-{}", level), "*", None)
            .await
            .unwrap();
        store.grant_permission(role.id, perm.id).await.unwrap();

        let group = store.create_group(format!("group-{}", level), None).await.unwrap();
        let grouped = store
            .create_permission(format!("/api/v1/level-{}/*", level), "read", None)
            .await
            .unwrap();
        store.add_permission_to_group(group.id, grouped.id).await.unwrap();
        store.grant_group(role.id, group.id).await.unwrap();

        parent = Some(role.id);
    }

    let user = UserId::new();
    if let Some(root) = store.role_by_name("role-0").await {
        store.assign_role(user, root.id).await.unwrap();
    }
    (store, user)
}

fn engine(store: Arc<InMemoryRbacStore>, enable_cache: bool) -> AuthzEngine {
    let config = EngineConfig {
        enable_cache,
        enable_metrics: false,
        ..Default::default()
    };
    AuthzEngine::new(config, store.clone(), store, Arc::new(InMemoryCacheStore::new()))
}

fn bench_check_uncached(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("check_uncached");

    for depth in [1usize, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, &depth| {
            let (store, user) = rt.block_on(build_chain(depth));
            let engine = engine(store, false);
            let resource = format!("resource-{}", depth - 1);

            b.to_async(&rt).iter(|| async {
                let outcome = engine
                    .check_permission(black_box(user), black_box(&resource), "delete")
                    .await
                    .unwrap();
                black_box(outcome);
            });
        });
    }

    group.finish();
}

fn bench_check_cached(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, user) = rt.block_on(build_chain(10));
    let engine = engine(store, true);
    rt.block_on(engine.check_permission(user, "resource-9", "delete")).unwrap();

    c.bench_function("check_cached_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = engine
                .check_permission(black_box(user), "resource-9", "delete")
                .await
                .unwrap();
            black_box(outcome);
        });
    });
}

fn bench_pattern_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_match");

    group.bench_function("literal", |b| {
        b.iter(|| pattern::matches(black_box("users"), black_box("users")))
    });
    group.bench_function("wildcard", |b| {
        b.iter(|| pattern::matches(black_box("/api/v1/users/*"), black_box("/api/v1/users/123")))
    });

    let matcher = pattern::PatternMatcher::new();
    group.bench_function("wildcard_memoized", |b| {
        b.iter(|| matcher.matches(black_box("/api/v1/users/*"), black_box("/api/v1/users/123")))
    });

    group.finish();
}

criterion_group!(benches, bench_check_uncached, bench_check_cached, bench_pattern_match);
criterion_main!(benches);
