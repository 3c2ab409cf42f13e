use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logos_store::keys::{self, Segment};
use logos_store::{DocumentStore, MergeEngine, RocksConfig, StoreConfig, YrsEngine};
use uuid::Uuid;
use yrs::{Doc, GetString, ReadTxn, Text, Transact, WriteTxn};

/// Produce `count` small sequential text deltas.
fn make_deltas(count: usize) -> Vec<Vec<u8>> {
    let doc = Doc::new();
    (0..count)
        .map(|i| {
            let sv = doc.transact().state_vector();
            {
                let mut txn = doc.transact_mut();
                let text = txn.get_or_insert_text("content");
                let len = text.get_string(&txn).len() as u32;
                text.insert(&mut txn, len, &format!("edit {i} "));
            }
            doc.transact().encode_state_as_update_v1(&sv)
        })
        .collect()
}

fn bench_key_encode(c: &mut Criterion) {
    let name = Uuid::new_v4().to_string();

    c.bench_function("key_encode_update", |b| {
        b.iter(|| black_box(keys::update_key(black_box(&name), black_box(42))))
    });
}

fn bench_key_decode(c: &mut Criterion) {
    let key = keys::encode(&[
        Segment::from("v1"),
        Segment::from("a#name$with\"escapes"),
        Segment::from(1234u32),
    ]);

    c.bench_function("key_decode_escaped", |b| {
        b.iter(|| black_box(keys::decode(black_box(&key)).unwrap()))
    });
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_updates");
    for count in [10usize, 100, 300] {
        let deltas = make_deltas(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &deltas, |b, deltas| {
            b.iter(|| black_box(YrsEngine.merge(deltas.iter().map(Vec::as_slice)).unwrap()))
        });
    }
    group.finish();
}

fn bench_store_update_memory(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = {
        let _guard = rt.enter();
        DocumentStore::in_memory(StoreConfig::default()).unwrap()
    };
    let delta = make_deltas(1).remove(0);

    c.bench_function("store_update_memory", |b| {
        b.to_async(&rt).iter(|| {
            // Fresh document per iteration keeps the log from growing unbounded
            let name = Uuid::new_v4().to_string();
            let pending = store.store_update(&name, &delta);
            async move { black_box(pending.await.unwrap()) }
        })
    });
}

fn bench_get_document_with_compaction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = {
        let _guard = rt.enter();
        DocumentStore::in_memory(StoreConfig::default()).unwrap()
    };
    let deltas = make_deltas(310);

    c.bench_function("get_document_compacts_310", |b| {
        b.iter(|| {
            rt.block_on(async {
                let name = Uuid::new_v4().to_string();
                for delta in &deltas {
                    store.store_update(&name, delta).await.unwrap();
                }
                black_box(store.get_document(&name).await.unwrap());
            });
        })
    });
}

fn bench_state_vector_cached(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = {
        let _guard = rt.enter();
        DocumentStore::open(RocksConfig::for_testing(dir.path()), StoreConfig::default())
            .unwrap()
    };
    rt.block_on(async {
        for delta in make_deltas(50) {
            store.store_update("cached", &delta).await.unwrap();
        }
        // First read compacts and tags the summary
        store.get_state_vector("cached").await.unwrap();
    });

    c.bench_function("state_vector_cached_rocks", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.get_state_vector("cached").await.unwrap());
            });
        })
    });
}

criterion_group!(
    benches,
    bench_key_encode,
    bench_key_decode,
    bench_merge,
    bench_store_update_memory,
    bench_get_document_with_compaction,
    bench_state_vector_cached,
);

criterion_main!(benches);
