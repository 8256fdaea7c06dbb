//! Import reconciliation: make the catalog mirror a bucket listing.
//!
//! One transaction covers the whole sweep. Progress goes to the task ledger
//! as it happens; the ledger row is only marked complete after commit, so an
//! aborted sweep leaves it showing the last step reached.

use crate::{
    errors::PipelineError,
    models::{blob::normalize_hash, object::split_key},
    services::{
        catalog_store as store,
        pipeline::{Pipeline, ReconcileReport, Scope},
    },
    storage::ListedObject,
};
use futures::StreamExt;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INITIATOR: &str = "importer";

/// Directory ids resolved during one sweep, keyed by `(parent, name)`.
#[derive(Default)]
struct DirectoryCache {
    root: Option<i64>,
    children: HashMap<(i64, String), i64>,
}

impl DirectoryCache {
    async fn resolve(
        &mut self,
        conn: &mut SqliteConnection,
        bucket_id: i64,
        segments: &[&str],
    ) -> Result<i64, sqlx::Error> {
        let mut current = match self.root {
            Some(root) => root,
            None => {
                let root = store::find_or_create_directory(conn, bucket_id, None, "").await?;
                self.root = Some(root);
                root
            }
        };

        for segment in segments {
            let cache_key = (current, segment.to_string());
            current = match self.children.get(&cache_key) {
                Some(id) => *id,
                None => {
                    let id =
                        store::find_or_create_directory(conn, bucket_id, Some(current), segment)
                            .await?;
                    self.children.insert(cache_key, id);
                    id
                }
            };
        }
        Ok(current)
    }
}

impl Pipeline {
    /// Bring the catalog for `scope` in line with the live bucket listing.
    ///
    /// With `prefix`, only keys under that prefix (relative to the data
    /// prefix) are listed and only those are candidates for deletion.
    pub async fn reconcile(
        &self,
        scope: &Scope,
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, PipelineError> {
        scope.validate()?;
        let prefix = prefix.unwrap_or_default();
        let bucket_name = scope.bucket.as_str();

        if !self.storage.bucket_exists(bucket_name).await? {
            return Err(PipelineError::BucketNotFound(bucket_name.to_string()));
        }

        let task = self.ledger.start(INITIATOR, &scope.schema).await?;
        let mut tx = self.catalog.begin(&scope.schema).await?;
        self.ledger.update(task, "transaction created").await?;

        let bucket = store::find_or_create_bucket(&mut tx, bucket_name, self.storage.provider()).await?;
        let mut directories = DirectoryCache::default();
        let mut missing = store::live_object_keys(&mut tx, bucket.id, prefix).await?;
        self.ledger.update(task, "existing state scanned").await?;
        info!(
            schema = %scope.schema,
            bucket = bucket_name,
            prefix,
            known = missing.len(),
            "reconciling bucket"
        );

        let mut report = ReconcileReport::default();
        let list_prefix = self.content_key(prefix);
        let mut listing = self.storage.list_objects(bucket_name, &list_prefix);

        while let Some(listed) = listing.next().await {
            if cancel.is_cancelled() {
                warn!(schema = %scope.schema, "reconcile cancelled, rolling back");
                return Err(PipelineError::Cancelled);
            }
            let listed: ListedObject = listed?;

            let Some(key) = listed.key.strip_prefix(&self.data_prefix) else {
                continue;
            };
            if key.is_empty() || key.ends_with('/') {
                continue;
            }
            missing.remove(key);

            let (segments, name) = split_key(key);
            if name.is_empty() {
                continue;
            }
            let directory_id = directories.resolve(&mut tx, bucket.id, &segments).await?;
            let (object_id, created) =
                store::upsert_object(&mut tx, bucket.id, directory_id, name, key).await?;
            if created {
                report.objects_created += 1;
                self.ledger.increment(task, "object created").await?;
            }

            let listed_hash = normalize_hash(&listed.content_hash);
            let blob_id = match store::find_blob_by_hash(&mut tx, &listed_hash).await? {
                Some(blob) => blob.id,
                None => {
                    report.stat_calls += 1;
                    let stat = self.storage.stat_object(bucket_name, &listed.key).await?;
                    let stat_hash = normalize_hash(&stat.content_hash);
                    if stat_hash != listed_hash {
                        return Err(PipelineError::Integrity {
                            key: listed.key.clone(),
                            listed: listed_hash,
                            stat: stat_hash,
                        });
                    }

                    let content_type_id =
                        store::find_or_create_content_type(&mut tx, &stat.content_type).await?;
                    let id = store::insert_blob(
                        &mut tx,
                        &listed_hash,
                        stat.size,
                        listed.last_modified,
                        content_type_id,
                    )
                    .await?;
                    debug!(key, content_hash = %listed_hash, "blob created");
                    report.blobs_created += 1;
                    self.ledger.increment(task, "blob created").await?;
                    id
                }
            };

            if store::link_object_blob(&mut tx, object_id, blob_id).await? {
                report.blobs_linked += 1;
                self.ledger.increment(task, "blob linked").await?;
            }
        }
        drop(listing);

        let mut missing: Vec<String> = missing.into_iter().collect();
        missing.sort();
        for key in missing {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if store::soft_delete_object(&mut tx, bucket.id, &key).await? {
                debug!(key, "object removed");
                report.objects_deleted += 1;
                self.ledger.increment(task, "object deleted").await?;
            }
        }

        report.blobs_pruned = store::prune_disattached_blobs(&mut tx).await?;
        if report.blobs_pruned > 0 {
            self.ledger.update(task, "disattached blobs pruned").await?;
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tx.commit().await?;
        self.ledger.complete(task, "completed").await?;

        info!(schema = %scope.schema, bucket = bucket_name, ?report, "reconcile finished");
        Ok(report)
    }
}
