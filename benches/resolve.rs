use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use shardseek::{
    ClusterConfig, Entity, EntityCache, Identifier, InMemoryProfileStore, LocalCluster,
    ResolverConfig, UserId,
};

const SEEDED_USERS: u64 = 4096;

fn seeded_cache() -> EntityCache {
    let cache = EntityCache::with_capacity(SEEDED_USERS as usize * 2);
    cache.extend((0..SEEDED_USERS).map(|i| {
        Entity::with_tag(UserId::new(1_000_000 + i), format!("user{i}"), format!("{:04}", i % 10_000))
    }));
    cache
}

fn bench_identifier_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("identifier");
    group.throughput(Throughput::Elements(3));
    group.bench_function("parse_mixed", |b| {
        b.iter(|| {
            let a = Identifier::parse("<@!356091260429402122>");
            let t = Identifier::parse("Adrian#0001");
            let n = Identifier::parse("Adrian");
            (a, t, n)
        });
    });
    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let cache = seeded_cache();
    let by_id = Identifier::parse("1002048");
    let by_tag = Identifier::parse("user2048#2048");

    c.bench_function("cache/lookup_id", |b| b.iter(|| cache.lookup(&by_id)));
    c.bench_function("cache/lookup_tag", |b| b.iter(|| cache.lookup(&by_tag)));
}

fn bench_resolve(c: &mut Criterion) {
    let cluster = LocalCluster::start(&ClusterConfig {
        shard_count: 4,
        ..ClusterConfig::default()
    })
    .unwrap();
    for (i, shard) in (0..SEEDED_USERS).zip((0..4u32).cycle()) {
        cluster.cache(shard).unwrap().insert(Entity::with_tag(
            UserId::new(1_000_000 + i),
            format!("user{i}"),
            format!("{:04}", i % 10_000),
        ));
    }
    let profiles = Arc::new(InMemoryProfileStore::new());
    let config = ResolverConfig::default();

    let local = cluster.resolver(0, &config, profiles.clone()).unwrap();
    c.bench_function("resolve/local_hit", |b| {
        b.iter(|| local.resolve_user("user0#0000").unwrap());
    });

    // Fresh resolver cache per batch so every iteration goes remote.
    c.bench_function("resolve/remote_hit", |b| {
        b.iter_batched(
            || {
                shardseek::Resolver::new(
                    &config,
                    Arc::new(EntityCache::default()),
                    Arc::new(cluster.transport(0)),
                    profiles.clone(),
                )
            },
            |resolver| resolver.resolve_user("user1#0001").unwrap(),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("resolve/remote_absent", |b| {
        b.iter(|| local.resolve_user("nobody#9999").unwrap_err());
    });
}

criterion_group!(benches, bench_identifier_parse, bench_cache_lookup, bench_resolve);
criterion_main!(benches);
