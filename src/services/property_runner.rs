//! Property runner: turn metadata artifacts into typed property rows.
//!
//! For each enabled source, blobs whose `source` metadata succeeded but which
//! carry no `Done` marker for it are extracted: the artifact is read back from
//! storage, old rows for `(blob, source)` are deleted and the new rows plus
//! the marker are inserted. A missing artifact or an extractor error skips the
//! blob without a marker, so the next run tries it again. Skips are counted per
//! source in the ledger status, so an artifact that never parses stays visible.

use crate::{
    errors::PipelineError,
    services::{
        catalog_store as store,
        pipeline::{Pipeline, ProcessingFailure, PropertyReport, Scope},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INITIATOR: &str = "properties";

impl Pipeline {
    pub async fn run_properties(
        &self,
        scope: &Scope,
        extractors: &[String],
        cancel: &CancellationToken,
    ) -> Result<PropertyReport, PipelineError> {
        scope.validate()?;
        let extractors = self
            .extractors
            .resolve(extractors)
            .map_err(PipelineError::UnknownExtractor)?;

        let mut report = PropertyReport::default();
        for extractor in &extractors {
            report.counts.insert(extractor.name().to_string(), 0);
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

        for extractor in &extractors {
            let source = extractor.name();
            let owed = store::blobs_owing_properties(&mut tx, bucket.id, source).await?;
            info!(schema = %scope.schema, source, blobs = owed.len(), "extracting properties");
            let failures_before = report.failures.len();

            for blob in owed {
                if cancel.is_cancelled() {
                    warn!(schema = %scope.schema, "property run cancelled, rolling back");
                    return Err(PipelineError::Cancelled);
                }

                let artifact = extractor.artifact_key(&blob.content_hash);
                let skip = |message: String| ProcessingFailure {
                    processor: source.to_string(),
                    content_hash: blob.content_hash.clone(),
                    key: blob.key.clone(),
                    message,
                };

                let content = match self.storage.get_object(&scope.bucket, &artifact).await {
                    Ok(content) => content,
                    Err(err) if err.is_not_found() => {
                        warn!(source, artifact = %artifact, "metadata artifact missing");
                        report.failures.push(skip(err.to_string()));
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                let properties = match extractor.extract(&content) {
                    Ok(properties) => properties,
                    Err(err) => {
                        warn!(
                            source,
                            content_hash = %blob.content_hash,
                            error = %err,
                            "extractor failed"
                        );
                        report.failures.push(skip(err.to_string()));
                        continue;
                    }
                };

                store::replace_properties(&mut tx, blob.blob_id, source, &properties).await?;
                *report.counts.entry(source.to_string()).or_default() += properties.len() as u64;
                self.ledger
                    .increment(task, &format!("{} properties extracted", source))
                    .await?;
            }

            let skipped = report.failures.len() - failures_before;
            if skipped > 0 {
                warn!(
                    schema = %scope.schema,
                    source,
                    skipped,
                    "blobs left without properties, they are retried on every run"
                );
                self.ledger
                    .update(task, &format!("{} skipped {} artifacts", source, skipped))
                    .await?;
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tx.commit().await?;
        let status = if report.failures.is_empty() {
            "completed".to_string()
        } else {
            format!("completed, {} skipped", report.failures.len())
        };
        self.ledger.complete(task, &status).await?;

        info!(schema = %scope.schema, failures = report.failures.len(), "property run finished");
        Ok(report)
    }
}
