//! Property-based tests for the history document
//! **Properties: append idempotence, series ordering, wire round-trip**

use std::collections::BTreeSet;

use benchtrail::history::DocumentCodec;
use benchtrail::{
    AppendError, Commit, HistoryDocument, HistoryStore, Identity, Measurement, MeasurementBatch,
    MemoryBackend,
};
use proptest::prelude::*;

fn commit(id: &str) -> Commit {
    Commit {
        author: Identity::named("octo"),
        committer: Identity::named("octo"),
        distinct: None,
        id: id.to_string(),
        message: format!("commit {}", id),
        timestamp: None,
        tree_id: None,
        url: format!("https://github.com/acme/widgets/commit/{}", id),
    }
}

/// Values with short exact decimal forms (n / 4)
fn value_strategy() -> impl Strategy<Value = f64> {
    (0u64..4_000_000_000).prop_map(|n| n as f64 / 4.0)
}

/// Strategy for one run's measurements with unique names
fn measurements_strategy() -> impl Strategy<Value = Vec<Measurement>> {
    prop::collection::btree_set(prop::string::string_regex("[a-z][a-z0-9 _/]{0,12}").unwrap(), 1..5)
        .prop_flat_map(|names: BTreeSet<String>| {
            let n = names.len();
            (
                Just(names),
                prop::collection::vec((value_strategy(), value_strategy()), n),
                prop::sample::select(vec!["ns/iter", "ms/iter"]),
            )
        })
        .prop_map(|(names, values, unit)| {
            names
                .into_iter()
                .zip(values)
                .map(|(name, (value, range))| Measurement::new(name, value, range, unit))
                .collect()
        })
}

/// Strategy for a batch with an arbitrary commit id, date and suite
fn batch_strategy() -> impl Strategy<Value = MeasurementBatch> {
    (
        0u8..8,
        0i64..40,
        prop::sample::select(vec!["cargo", "Rust Benchmark"]),
        measurements_strategy(),
    )
        .prop_map(|(commit_idx, date, suite, measurements)| {
            let mut batch = MeasurementBatch::new("cargo", commit(&format!("c{}", commit_idx)), date)
                .with_suite(suite);
            batch.measurements = measurements;
            batch
        })
}

/// Fold batches into a document, skipping the ones it rejects
fn build(batches: Vec<MeasurementBatch>) -> HistoryDocument {
    let mut doc = HistoryDocument::default();
    for batch in batches {
        let _ = doc.append(batch);
    }
    doc
}

/// Property: For any document and batch, appending the batch twice SHALL leave
/// the document exactly as a single append did.
#[test]
fn prop_append_is_idempotent() {
    proptest!(|(
        history in prop::collection::vec(batch_strategy(), 0..10),
        batch in batch_strategy(),
    )| {
        let mut once = build(history);
        let first = once.append(batch.clone());

        let mut twice = once.clone();
        let second = twice.append(batch);

        prop_assert_eq!(&twice, &once);
        if first.is_ok() {
            let is_duplicate = matches!(second, Err(AppendError::DuplicateCommit { .. }));
            prop_assert!(is_duplicate);
        }
    });
}

/// Property: For any sequence of appends, every projected series SHALL be
/// strictly increasing by date and free of repeated commits.
#[test]
fn prop_series_strictly_increasing() {
    proptest!(|(batches in prop::collection::vec(batch_strategy(), 0..30))| {
        let doc = build(batches);

        for suite in doc.entries.keys() {
            for name in doc.bench_names(suite) {
                let series = doc.series(suite, name, None);
                for pair in series.points.windows(2) {
                    prop_assert!(pair[0].date < pair[1].date);
                    prop_assert_ne!(&pair[0].commit.id, &pair[1].commit.id);
                }
            }
        }
        prop_assert!(doc.check().iter().all(|f| !f.is_violation()));
    });
}

/// Property: For any document, decoding its encoding SHALL yield the same
/// document, and re-encoding SHALL reproduce the same bytes.
#[test]
fn prop_wire_roundtrip() {
    proptest!(|(
        batches in prop::collection::vec(batch_strategy(), 0..12),
        last_update in 0i64..2_000_000_000_000,
    )| {
        let mut doc = build(batches);
        doc.last_update = last_update;
        let codec = DocumentCodec::default();

        let encoded = codec.encode(&doc).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        prop_assert_eq!(&decoded, &doc);
        prop_assert_eq!(codec.encode(&decoded).unwrap(), encoded);
    });
}

/// Property: For any document persisted through the store, a reload SHALL
/// return the same document.
#[test]
fn prop_store_persist_reload() {
    proptest!(|(batches in prop::collection::vec(batch_strategy(), 1..8))| {
        let store = HistoryStore::new(MemoryBackend::new());

        let (original, reloaded) = tokio_test::block_on(async {
            let (mut doc, token) = store.load().await.unwrap();
            for batch in batches {
                let _ = store.append(&mut doc, batch);
            }
            store.persist(&doc, &token).await.unwrap();
            let (reloaded, _) = store.load().await.unwrap();
            (doc, reloaded)
        });

        prop_assert_eq!(reloaded, original);
    });
}
