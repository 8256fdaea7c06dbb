mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{BUCKET, Harness, SCHEMA, md5_hex};
use futures::stream::BoxStream;
use std::sync::Arc;
use storage_catalog::{
    PipelineError,
    services::{ReconcileReport, Scope, catalog_store},
    storage::{ListedObject, MemoryStorage, ObjectStat, ObjectStorage, StorageResult},
};
use tokio_util::sync::CancellationToken;

const JPEG: &str = "image/jpeg";

fn seed_three(h: &Harness) {
    h.put("a.jpg", b"same bytes", JPEG);
    h.put("b.jpg", b"same bytes", JPEG);
    h.put("c.jpg", b"different bytes", JPEG);
}

#[tokio::test]
async fn dedups_by_content_and_is_idempotent() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();

    let first = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(
        first,
        ReconcileReport {
            objects_created: 3,
            blobs_created: 2,
            blobs_linked: 3,
            stat_calls: 2,
            ..Default::default()
        }
    );
    assert_eq!(h.storage.call_stats().stat_calls, 2);

    let counts = h.counts().await;
    assert_eq!((counts.live_objects, counts.blobs, counts.links), (3, 2, 3));

    let second = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert!(second.is_unchanged(), "{:?}", second);
    assert_eq!(h.storage.call_stats().stat_calls, 2);
    assert_eq!(h.counts().await, counts);
}

#[tokio::test]
async fn removed_objects_are_deleted_and_orphans_pruned() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    // One of the two identical objects: its blob is still referenced.
    h.remove("b.jpg");
    let report = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(report.objects_deleted, 1);
    assert_eq!(report.blobs_pruned, 0);
    assert_eq!(h.counts().await.blobs, 2);

    // The differing object: its blob has no links left.
    h.remove("c.jpg");
    let report = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(report.objects_deleted, 1);
    assert_eq!(report.blobs_pruned, 1);

    let counts = h.counts().await;
    assert_eq!((counts.live_objects, counts.deleted_objects), (1, 2));
    assert_eq!((counts.blobs, counts.links), (1, 1));
}

#[tokio::test]
async fn reappearing_paths_are_revived() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    h.remove("a.jpg");
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    h.put("a.jpg", b"same bytes", JPEG);
    let report = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(report.objects_created, 1);
    assert_eq!(report.blobs_linked, 1);
    assert_eq!(report.stat_calls, 0);
    assert_eq!(h.counts().await.deleted_objects, 0);
}

#[tokio::test]
async fn overwritten_content_gets_a_new_blob_without_a_new_object() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    h.put("c.jpg", b"brand new bytes", JPEG);
    let report = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            blobs_created: 1,
            blobs_linked: 1,
            blobs_pruned: 1,
            stat_calls: 1,
            ..Default::default()
        }
    );

    let counts = h.counts().await;
    assert_eq!((counts.live_objects, counts.blobs, counts.links), (3, 2, 3));
    h.blob_id(&md5_hex(b"brand new bytes")).await;
}

#[tokio::test]
async fn builds_the_directory_tree() {
    let h = Harness::new().await;
    h.put("2024/trip/a.jpg", b"a", JPEG);
    h.put("2024/trip/b.jpg", b"b", JPEG);
    h.put("2024/c.jpg", b"c", JPEG);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    let pool = h.pipeline.catalog().pool(SCHEMA).await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let bucket = catalog_store::find_bucket(&mut conn, BUCKET)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.provider.as_deref(), Some("memory"));

    let dirs = catalog_store::list_directories(&mut conn, bucket.id)
        .await
        .unwrap();
    let tree: Vec<(Option<i64>, &str)> = dirs.iter().map(|d| (d.parent_id, d.name.as_str())).collect();
    assert_eq!(
        tree,
        vec![
            (None, ""),
            (Some(dirs[0].id), "2024"),
            (Some(dirs[1].id), "trip"),
        ]
    );

    let object = catalog_store::find_object(&mut conn, bucket.id, "2024/trip/b.jpg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!((object.directory_id, object.name.as_str()), (dirs[2].id, "b.jpg"));
}

#[tokio::test]
async fn prefix_limits_listing_and_deletion() {
    let h = Harness::new().await;
    h.put("a/1.jpg", b"one", JPEG);
    h.put("b/2.jpg", b"two", JPEG);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    h.remove("b/2.jpg");
    h.put("a/3.jpg", b"three", JPEG);
    let report = h
        .pipeline
        .reconcile(&h.scope, Some("a/"), &cancel)
        .await
        .unwrap();
    assert_eq!(report.objects_created, 1);
    assert_eq!(report.objects_deleted, 0);

    let report = h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();
    assert_eq!(report.objects_deleted, 1);
}

#[tokio::test]
async fn ledger_counts_every_state_change() {
    let h = Harness::new().await;
    h.put("a.jpg", b"x", JPEG);
    h.put("b.jpg", b"x", JPEG);
    h.put("c.jpg", b"y", JPEG);
    h.put("d.jpg", b"y", JPEG);
    let cancel = CancellationToken::new();
    h.pipeline.reconcile(&h.scope, None, &cancel).await.unwrap();

    let tasks = h.pipeline.ledger().recent(10).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.initiator, "importer");
    assert_eq!(task.schema_name, SCHEMA);
    assert_eq!(task.status, "completed");
    // 4 objects + 2 blobs + 4 links
    assert_eq!(task.operations, 10);
    assert!(task.is_complete());
}

#[tokio::test]
async fn configuration_errors_fail_before_any_io() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();

    let bad_schema = Scope {
        schema: "Not-Valid".into(),
        bucket: BUCKET.into(),
    };
    assert!(matches!(
        h.pipeline.reconcile(&bad_schema, None, &cancel).await,
        Err(PipelineError::InvalidScope(_))
    ));

    let escaping_bucket = Scope {
        schema: SCHEMA.into(),
        bucket: "../outside".into(),
    };
    assert!(matches!(
        h.pipeline.reconcile(&escaping_bucket, None, &cancel).await,
        Err(PipelineError::InvalidScope(_))
    ));
    assert!(matches!(
        h.pipeline
            .run_metadata(&escaping_bucket, &[], None, &cancel)
            .await,
        Err(PipelineError::InvalidScope(_))
    ));

    let missing_bucket = Scope::new(SCHEMA, "nope").unwrap();
    assert!(matches!(
        h.pipeline.reconcile(&missing_bucket, None, &cancel).await,
        Err(PipelineError::BucketNotFound(_))
    ));

    assert!(h.pipeline.ledger().recent(10).await.unwrap().is_empty());
    assert_eq!(h.storage.call_stats().stat_calls, 0);
}

#[tokio::test]
async fn cancellation_rolls_everything_back() {
    let h = Harness::new().await;
    seed_three(&h);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.pipeline.reconcile(&h.scope, None, &cancel).await;
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(h.counts().await, Default::default());

    let task = &h.pipeline.ledger().recent(1).await.unwrap()[0];
    assert!(!task.is_complete());
    assert_eq!(task.status, "existing state scanned");
}

/// Reports a different content hash from stat than from the listing.
struct TamperedStat(MemoryStorage);

#[async_trait]
impl ObjectStorage for TamperedStat {
    fn provider(&self) -> &str {
        self.0.provider()
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        self.0.bucket_exists(bucket).await
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, StorageResult<ListedObject>> {
        self.0.list_objects(bucket, prefix)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.0.get_object(bucket, key).await
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStat> {
        let mut stat = self.0.stat_object(bucket, key).await?;
        stat.content_hash = "0123456789abcdef0123456789abcdef".into();
        Ok(stat)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.0.put_object(bucket, key, body, content_type).await
    }
}

#[tokio::test]
async fn hash_mismatch_aborts_the_sweep() {
    let storage = MemoryStorage::new();
    storage.create_bucket(BUCKET);
    let h = Harness::with_storage(storage.clone(), Arc::new(TamperedStat(storage))).await;
    seed_three(&h);

    let result = h
        .pipeline
        .reconcile(&h.scope, None, &CancellationToken::new())
        .await;
    match result {
        Err(PipelineError::Integrity { key, listed, stat }) => {
            assert_eq!(key, "data/a.jpg");
            assert_eq!(listed, md5_hex(b"same bytes"));
            assert_eq!(stat, "0123456789abcdef0123456789abcdef");
        }
        other => panic!("expected an integrity error, got {:?}", other),
    }

    assert_eq!(h.counts().await, Default::default());
    let task = &h.pipeline.ledger().recent(1).await.unwrap()[0];
    assert!(!task.is_complete());
    assert_eq!(task.operations, 1);
}
