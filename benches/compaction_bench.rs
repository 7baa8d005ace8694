use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fragstore::{EngineOptions, FragmentStore};
use tempfile::tempdir;

fn bench_upsert_throughput(c: &mut Criterion) {
    c.bench_function("upsert_1000_fragments", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("bench.frag");
            let mut store = FragmentStore::open_with_versions(
                &path,
                vec!["public".into(), "private".into()],
                "public",
            )
            .unwrap();
            for i in 0u16..1000 {
                store
                    .upsert(i, black_box("some fragment body text"), None)
                    .unwrap();
            }
        });
    });
}

fn bench_compaction_under_churn(c: &mut Criterion) {
    c.bench_function("churn_then_compact_32_fragments", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("bench.frag");
            let opts = EngineOptions {
                compaction_min_fragments: 4,
                compaction_min_bytes: 4096,
                ..EngineOptions::new(vec!["public".into(), "private".into()], "public")
            };
            let mut store = FragmentStore::open(&path, opts).unwrap();
            let big = "x".repeat(4096);
            for i in 0u16..32 {
                store.upsert(i, black_box(&big), None).unwrap();
            }
            for i in 0u16..20 {
                store.upsert(i, "", None).unwrap();
            }
            for i in 20u16..32 {
                store.upsert(i, &big, None).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_upsert_throughput, bench_compaction_under_churn);
criterion_main!(benches);
