//! Pipeline entry points and the state they share.
//!
//! A [`Pipeline`] bundles the catalog store, the task ledger, an object
//! storage backend and the processor/extractor registries. The three stages
//! are implemented in `reconciler`, `metadata_runner` and `property_runner`
//! as `impl Pipeline` blocks; [`Pipeline::sync`] chains them.

use crate::{
    errors::PipelineError,
    extractors::ExtractorRegistry,
    processors::{ProcessorRegistry, ProcessorSettings},
    services::{catalog_store::CatalogStore, task_ledger::TaskLedger},
    storage::{ObjectStorage, validate_bucket_name},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_DATA_PREFIX: &str = "data/";

/// Schema names double as database file names.
pub fn validate_schema_name(schema: &str) -> Result<(), PipelineError> {
    if schema.is_empty() {
        return Err(PipelineError::InvalidScope("schema name is required".into()));
    }
    if !schema
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
    {
        return Err(PipelineError::InvalidScope(format!(
            "schema `{}` may only contain lowercase letters, digits and underscores",
            schema
        )));
    }
    Ok(())
}

/// Which catalog schema and which bucket a run works on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub schema: String,
    pub bucket: String,
}

impl Scope {
    pub fn new(schema: impl Into<String>, bucket: impl Into<String>) -> Result<Self, PipelineError> {
        let scope = Self {
            schema: schema.into(),
            bucket: bucket.into(),
        };
        scope.validate()?;
        Ok(scope)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_schema_name(&self.schema)?;
        if self.bucket.trim().is_empty() {
            return Err(PipelineError::InvalidScope("bucket name is required".into()));
        }
        validate_bucket_name(&self.bucket)
            .map_err(|err| PipelineError::InvalidScope(err.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub objects_created: u64,
    pub blobs_created: u64,
    pub blobs_linked: u64,
    pub objects_deleted: u64,
    pub blobs_pruned: u64,
    /// Stat calls issued for content hashes the catalog did not know yet.
    pub stat_calls: u64,
}

impl ReconcileReport {
    /// True when the run changed nothing and made no stat calls.
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }
}

/// A blob skipped by one processor or extractor. The run itself went on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingFailure {
    pub processor: String,
    pub content_hash: String,
    pub key: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReport {
    /// Artifacts written per processor.
    pub counts: BTreeMap<String, u64>,
    /// Distinct blobs whose content was fetched.
    pub blobs_fetched: u64,
    pub failures: Vec<ProcessingFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReport {
    /// Property rows written per source, not counting `Done` markers.
    pub counts: BTreeMap<String, u64>,
    pub failures: Vec<ProcessingFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub reconcile: ReconcileReport,
    pub metadata: MetadataReport,
    pub properties: PropertyReport,
}

/// Schemas with a run in flight in this process.
#[derive(Clone, Default)]
pub struct RunGuard {
    running: Arc<Mutex<HashSet<String>>>,
}

impl RunGuard {
    /// Claim `schema`, or fail with `Busy` if a run already holds it. The
    /// claim is released when the returned value is dropped.
    pub fn claim(&self, schema: &str) -> Result<RunClaim, PipelineError> {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !running.insert(schema.to_string()) {
            return Err(PipelineError::Busy(schema.to_string()));
        }
        Ok(RunClaim {
            schema: schema.to_string(),
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, schema: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(schema)
    }
}

pub struct RunClaim {
    schema: String,
    running: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.schema);
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pub(crate) catalog: CatalogStore,
    pub(crate) ledger: TaskLedger,
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) processors: ProcessorRegistry,
    pub(crate) extractors: ExtractorRegistry,
    pub(crate) data_prefix: String,
    runs: RunGuard,
}

impl Pipeline {
    /// A pipeline with the built-in processors and extractors and the
    /// default `data/` content prefix.
    pub fn new(catalog: CatalogStore, ledger: TaskLedger, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            catalog,
            ledger,
            storage,
            processors: ProcessorRegistry::builtin(&ProcessorSettings::default()),
            extractors: ExtractorRegistry::builtin(),
            data_prefix: DEFAULT_DATA_PREFIX.to_string(),
            runs: RunGuard::default(),
        }
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_data_prefix(mut self, data_prefix: impl Into<String>) -> Self {
        self.data_prefix = data_prefix.into();
        self
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn runs(&self) -> &RunGuard {
        &self.runs
    }

    pub fn check_processors(&self, names: &[String]) -> Result<(), PipelineError> {
        self.processors
            .resolve(names)
            .map(|_| ())
            .map_err(PipelineError::UnknownProcessor)
    }

    pub fn check_extractors(&self, names: &[String]) -> Result<(), PipelineError> {
        self.extractors
            .resolve(names)
            .map(|_| ())
            .map_err(PipelineError::UnknownExtractor)
    }

    /// Storage key of catalog key `key`.
    pub(crate) fn content_key(&self, key: &str) -> String {
        format!("{}{}", self.data_prefix, key)
    }

    /// Reconcile, then derive metadata, then extract properties.
    pub async fn sync(
        &self,
        scope: &Scope,
        processors: &[String],
        extractors: &[String],
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, PipelineError> {
        // Resolve names up front so a typo fails before the bucket is swept.
        self.check_processors(processors)?;
        self.check_extractors(extractors)?;

        let reconcile = self.reconcile(scope, prefix, cancel).await?;
        let metadata = self.run_metadata(scope, processors, prefix, cancel).await?;
        let properties = self.run_properties(scope, extractors, cancel).await?;
        info!(schema = %scope.schema, bucket = %scope.bucket, "sync finished");

        Ok(SyncReport {
            reconcile,
            metadata,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_restricted() {
        assert!(validate_schema_name("storage_console").is_ok());
        assert!(validate_schema_name("tenant42").is_ok());
        for bad in ["", "Upper", "with-dash", "../etc", "a b"] {
            assert!(
                matches!(validate_schema_name(bad), Err(PipelineError::InvalidScope(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn scope_requires_a_valid_bucket() {
        assert!(Scope::new("catalog", "photos").is_ok());
        assert!(matches!(
            Scope::new("catalog", " "),
            Err(PipelineError::InvalidScope(_))
        ));
        for bucket in ["../outside", "/var/data", "a/b", "Photos"] {
            assert!(
                matches!(Scope::new("catalog", bucket), Err(PipelineError::InvalidScope(_))),
                "{:?} should be rejected",
                bucket
            );
        }
    }

    #[test]
    fn run_guard_is_single_flight_per_schema() {
        let guard = RunGuard::default();
        let claim = guard.claim("catalog").unwrap();
        assert!(guard.is_running("catalog"));
        assert!(matches!(guard.claim("catalog"), Err(PipelineError::Busy(_))));
        assert!(guard.claim("other").is_ok());

        drop(claim);
        assert!(!guard.is_running("catalog"));
        assert!(guard.claim("catalog").is_ok());
    }
}
