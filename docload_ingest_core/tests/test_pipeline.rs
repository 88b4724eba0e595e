use std::time::Duration;

use common::{EndlessSource, create_importer, numbered_records, test_namespace};
use docload_ingest_core::{IngestError, IngestOptions};
use docload_source::{SourceError, VecSource};
use docload_store_core::{
    TopologyKind, WriteConcernError, WriteFailureKind, WriteMode, bson::doc,
};
use docload_store_memory::{InMemoryStore, WriteKind};
use tokio_util::sync::CancellationToken;

mod common;

/// Index of the record that collides with the seeded one.
const DUPLICATE_INDEX: i32 = 1499;

async fn store_with_duplicate() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .seed(&test_namespace(), vec![doc! { "_id": DUPLICATE_INDEX }])
        .await;
    store
}

#[tokio::test]
async fn test_continue_mode_skips_duplicate() {
    let store = store_with_duplicate().await;
    let options = IngestOptions {
        bulk_buffer_size: 1000,
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(2500)), CancellationToken::new())
        .await;

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    assert_eq!(result.inserted, 2499);
    assert_eq!(store.batch_sizes().await, [1000, 1000, 500]);
    assert_eq!(store.count(&test_namespace()).await, 2500);

    let calls = store.write_calls().await;
    assert!(calls.iter().all(|call| !call.ordered));
}

#[tokio::test]
async fn test_stop_on_error_aborts_at_duplicate() {
    let store = store_with_duplicate().await;
    let options = IngestOptions {
        bulk_buffer_size: 1000,
        stop_on_error: true,
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(2500)), CancellationToken::new())
        .await;

    assert_eq!(result.inserted, 1499);
    let err = result.error.expect("duplicate key error");
    assert_eq!(err.failure_kind(), Some(WriteFailureKind::DuplicateKey));

    // the third batch is never flushed
    assert_eq!(store.batch_sizes().await, [1000, 1000]);
    assert!(store.write_calls().await.iter().all(|call| call.ordered));
}

#[tokio::test]
async fn test_stop_on_error_with_unordered_batches() {
    let store = store_with_duplicate().await;
    let options = IngestOptions {
        bulk_buffer_size: 1000,
        stop_on_error: true,
        unordered: true,
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(2500)), CancellationToken::new())
        .await;

    // the failing batch is written in full except for the duplicate
    assert_eq!(result.inserted, 1999);
    assert!(matches!(
        result.error,
        Some(IngestError::WriteRejected {
            acknowledged: 999,
            ..
        })
    ));
    assert_eq!(store.batch_sizes().await, [1000, 1000]);
}

#[tokio::test]
async fn test_cancellation_stops_writes() {
    let store = InMemoryStore::new().with_write_delay(Duration::from_millis(5));
    let options = IngestOptions {
        num_insertion_workers: 2,
        bulk_buffer_size: 10,
        ..IngestOptions::default()
    };
    let importer = create_importer(&store, options);
    let ct = CancellationToken::new();

    let run = tokio::spawn({
        let ct = ct.clone();
        async move { importer.run(EndlessSource::default(), ct).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.write_calls().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("writes started");

    ct.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run stops after cancellation")
        .expect("run task");

    assert!(result.error.is_none());

    let calls = store.write_calls().await.len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.write_calls().await.len(), calls);

    // buffered records of cancelled workers are never written
    let written = store.count(&test_namespace()).await as u64;
    assert_eq!(written, result.inserted);
    assert_eq!(written % 10, 0);
}

#[tokio::test]
async fn test_worker_failure_cancels_the_run() {
    let store = InMemoryStore::new().with_connection_lost_after(2);
    let options = IngestOptions {
        num_insertion_workers: 4,
        bulk_buffer_size: 10,
        ..IngestOptions::default()
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        create_importer(&store, options).run(EndlessSource::default(), CancellationToken::new()),
    )
    .await
    .expect("run stops after a worker failure");

    let err = result.error.expect("connection error");
    assert!(err.is_connection_error());
    assert_eq!(result.inserted, 20);
}

#[tokio::test]
async fn test_connection_loss_is_fatal_in_continue_mode() {
    let store = InMemoryStore::new().with_connection_lost_after(1);
    let options = IngestOptions {
        bulk_buffer_size: 1000,
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(2500)), CancellationToken::new())
        .await;

    assert!(result.error.expect("connection error").is_connection_error());
    assert_eq!(result.inserted, 1000);
}

#[tokio::test]
async fn test_maintain_insertion_order_uses_one_worker() {
    let store = InMemoryStore::new();
    let options = IngestOptions {
        num_insertion_workers: 4,
        maintain_insertion_order: true,
        bulk_buffer_size: 100,
        ..IngestOptions::default()
    };

    let importer = create_importer(&store, options);
    assert_eq!(importer.options().num_insertion_workers, 1);

    let records = numbered_records(450);
    let result = importer
        .run(VecSource::new(records.clone()), CancellationToken::new())
        .await;

    assert_eq!(result.into_result().unwrap(), 450);
    assert_eq!(store.sessions_opened().await, 1);
    assert_eq!(store.records(&test_namespace()).await, records);
}

#[tokio::test]
async fn test_upsert_replaces_existing_records() {
    let store = InMemoryStore::new();
    store
        .seed(
            &test_namespace(),
            vec![doc! { "_id": 1, "sku": "a", "qty": 1 }],
        )
        .await;
    let options = IngestOptions {
        upsert_fields: vec!["sku".to_string()],
        ..IngestOptions::default()
    };

    let source = VecSource::new(vec![
        doc! { "sku": "a", "qty": 5 },
        doc! { "sku": "b", "qty": 2 },
        doc! { "qty": 9 },
    ]);
    let result = create_importer(&store, options)
        .run(source, CancellationToken::new())
        .await;

    assert_eq!(result.into_result().unwrap(), 3);

    let records = store.records(&test_namespace()).await;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], doc! { "_id": 1, "sku": "a", "qty": 5 });

    let kinds: Vec<_> = store
        .write_calls()
        .await
        .iter()
        .map(|call| call.kind)
        .collect();
    assert_eq!(
        kinds,
        [WriteKind::Upsert, WriteKind::Upsert, WriteKind::InsertOne]
    );
}

#[tokio::test]
async fn test_decode_error_is_terminal() {
    let store = InMemoryStore::new();
    let source = VecSource::new(numbered_records(30)).then_fail(SourceError::Decoder {
        message: "truncated input".to_string(),
    });

    let result = create_importer(&store, IngestOptions::default())
        .run(source, CancellationToken::new())
        .await;

    assert!(matches!(result.error, Some(IngestError::Source { .. })));
    assert_eq!(result.inserted, 30);
}

#[tokio::test]
async fn test_write_concern_is_resolved_against_topology() {
    let store = InMemoryStore::new().with_topology(TopologyKind::ReplicaSet);
    let options = IngestOptions {
        write_concern: r#"{"w": 2, "j": true}"#.to_string(),
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(5)), CancellationToken::new())
        .await;
    assert_eq!(result.into_result().unwrap(), 5);

    let call = &store.write_calls().await[0];
    assert_eq!(
        call.write_concern.as_ref().map(ToString::to_string),
        Some("w=2 j=true".to_string())
    );
}

#[tokio::test]
async fn test_incompatible_write_concern_fails_before_writing() {
    let store = InMemoryStore::new();
    let options = IngestOptions {
        write_concern: "dc1".to_string(),
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(5)), CancellationToken::new())
        .await;

    assert!(matches!(
        result.error,
        Some(IngestError::WriteConcern {
            source: WriteConcernError::IncompatibleTopology { .. }
        })
    ));
    assert_eq!(store.sessions_opened().await, 0);
}

#[tokio::test]
async fn test_standalone_lowers_write_concern() {
    let store = InMemoryStore::new();

    create_importer(&store, IngestOptions::default())
        .run(VecSource::new(numbered_records(1)), CancellationToken::new())
        .await
        .into_result()
        .unwrap();

    let call = &store.write_calls().await[0];
    assert!(matches!(
        call.write_concern,
        Some(docload_store_core::WriteConcern::Acknowledged {
            w: WriteMode::Nodes(1),
            ..
        })
    ));
}

#[tokio::test]
async fn test_write_concern_timeout() {
    let options = IngestOptions {
        write_concern: r#"{"w": 1, "wtimeout": 100}"#.to_string(),
        ..IngestOptions::default()
    };

    // continue mode logs and skips the timed out batch
    let store = InMemoryStore::new().with_write_concern_timeout();
    let result = create_importer(&store, options.clone())
        .run(VecSource::new(numbered_records(10)), CancellationToken::new())
        .await;
    assert!(result.error.is_none());
    assert_eq!(result.inserted, 10);

    let store = InMemoryStore::new().with_write_concern_timeout();
    let options = IngestOptions {
        stop_on_error: true,
        ..options
    };
    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(10)), CancellationToken::new())
        .await;
    let err = result.error.expect("write concern timeout");
    assert_eq!(
        err.failure_kind(),
        Some(WriteFailureKind::WriteConcernTimeout)
    );
}

#[tokio::test]
async fn test_drop_before_import() {
    let store = InMemoryStore::new();
    store
        .seed(&test_namespace(), vec![doc! { "_id": "old" }])
        .await;
    let options = IngestOptions {
        drop: true,
        ..IngestOptions::default()
    };

    let result = create_importer(&store, options.clone())
        .run(VecSource::new(numbered_records(3)), CancellationToken::new())
        .await;
    assert_eq!(result.into_result().unwrap(), 3);
    assert_eq!(store.count(&test_namespace()).await, 3);

    // a missing collection is not an error
    let store = InMemoryStore::new();
    let result = create_importer(&store, options)
        .run(VecSource::new(numbered_records(3)), CancellationToken::new())
        .await;
    assert_eq!(result.into_result().unwrap(), 3);
}

#[tokio::test]
async fn test_validation_failures_are_skipped() {
    let store = InMemoryStore::new().with_validator(|record| {
        (record.get_i32("_id").is_ok_and(|id| id % 100 == 0)).then(|| "round ids".to_string())
    });

    let result = create_importer(&store, IngestOptions::default())
        .run(VecSource::new(numbered_records(1000)), CancellationToken::new())
        .await;

    assert!(result.error.is_none());
    assert_eq!(result.inserted, 990);
}
