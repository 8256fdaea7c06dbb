//! Metadata runner: derive artifacts for blobs that are missing them.
//!
//! Every blob is fetched at most once per run no matter how many processors
//! still owe it work. A processor error flags that `(blob, processor)` as
//! `failure` and the run moves on; storage and catalog errors abort the run
//! and roll the flags back.

use crate::{
    errors::PipelineError,
    models::blob::MetadataStatus,
    processors::{MetadataProcessor, ObjectDescriptor, artifact_key},
    services::{
        catalog_store::{self as store, OwedBlob},
        pipeline::{MetadataReport, Pipeline, ProcessingFailure, Scope},
    },
};
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INITIATOR: &str = "metadata";

/// One blob and the processors that still owe it a flag.
struct PendingBlob {
    blob: OwedBlob,
    processors: Vec<Arc<dyn MetadataProcessor>>,
}

impl Pipeline {
    /// Run `processors` over every blob in scope that has no flag for them
    /// yet. `prefix` limits the blobs to those linked from keys under it.
    pub async fn run_metadata(
        &self,
        scope: &Scope,
        processors: &[String],
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MetadataReport, PipelineError> {
        scope.validate()?;
        let processors = self
            .processors
            .resolve(processors)
            .map_err(PipelineError::UnknownProcessor)?;
        let prefix = prefix.unwrap_or_default();

        let mut report = MetadataReport::default();
        for processor in &processors {
            report.counts.insert(processor.name().to_string(), 0);
        }

        let task = self.ledger.start(INITIATOR, &scope.schema).await?;
        let mut tx = self.catalog.begin(&scope.schema).await?;
        self.ledger.update(task, "transaction created").await?;

        let Some(bucket) = store::find_bucket(&mut tx, &scope.bucket).await? else {
            debug!(bucket = %scope.bucket, "bucket not cataloged yet, nothing to do");
            tx.commit().await?;
            self.ledger.complete(task, "completed").await?;
            return Ok(report);
        };

        let mut pending: BTreeMap<String, PendingBlob> = BTreeMap::new();
        for processor in &processors {
            let owed = store::blobs_owing_processor(
                &mut tx,
                bucket.id,
                processor.name(),
                processor.accepted_content_types(),
                prefix,
            )
            .await?;
            debug!(processor = processor.name(), blobs = owed.len(), "blobs owed");

            for blob in owed {
                pending
                    .entry(blob.content_hash.clone())
                    .or_insert_with(|| PendingBlob {
                        blob,
                        processors: Vec::new(),
                    })
                    .processors
                    .push(processor.clone());
            }
        }
        self.ledger
            .update(task, &format!("{} blobs pending", pending.len()))
            .await?;
        info!(
            schema = %scope.schema,
            bucket = %scope.bucket,
            blobs = pending.len(),
            "running metadata processors"
        );

        for (content_hash, PendingBlob { blob, processors }) in pending {
            if cancel.is_cancelled() {
                warn!(schema = %scope.schema, "metadata run cancelled, rolling back");
                return Err(PipelineError::Cancelled);
            }

            let content = self
                .storage
                .get_object(&scope.bucket, &self.content_key(&blob.key))
                .await?;
            report.blobs_fetched += 1;

            let descriptor = ObjectDescriptor {
                key: blob.key.clone(),
                content_hash: content_hash.clone(),
                content_type: blob.content_type.clone(),
                size: blob.size,
            };

            for processor in processors {
                let name = processor.name();
                let outcome = {
                    let descriptor = descriptor.clone();
                    let content = content.clone();
                    tokio::task::spawn_blocking(move || processor.process(&descriptor, &content))
                        .await?
                };

                let status = match outcome {
                    Ok(artifacts) => {
                        for artifact in &artifacts {
                            self.storage
                                .put_object(
                                    &scope.bucket,
                                    &artifact_key(name, &artifact.relative_path),
                                    artifact.content.clone(),
                                    artifact.kind.content_type(),
                                )
                                .await?;
                        }
                        *report.counts.entry(name.to_string()).or_default() +=
                            artifacts.len() as u64;
                        if artifacts.is_empty() {
                            MetadataStatus::Empty
                        } else {
                            MetadataStatus::Success
                        }
                    }
                    Err(err) => {
                        warn!(
                            processor = name,
                            content_hash = %content_hash,
                            key = %blob.key,
                            error = %err,
                            "processor failed"
                        );
                        report.failures.push(ProcessingFailure {
                            processor: name.to_string(),
                            content_hash: content_hash.clone(),
                            key: blob.key.clone(),
                            message: err.to_string(),
                        });
                        MetadataStatus::Failure
                    }
                };

                store::upsert_metadata_status(&mut tx, blob.blob_id, name, status).await?;
                self.ledger
                    .increment(task, &format!("{} {}", name, status))
                    .await?;
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tx.commit().await?;
        self.ledger.complete(task, "completed").await?;

        info!(
            schema = %scope.schema,
            fetched = report.blobs_fetched,
            failures = report.failures.len(),
            "metadata run finished"
        );
        Ok(report)
    }
}
