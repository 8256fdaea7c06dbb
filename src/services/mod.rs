//! Catalog persistence and the three pipeline stages.

pub mod catalog_store;
pub mod metadata_runner;
pub mod pipeline;
pub mod property_runner;
pub mod reconciler;
pub mod task_ledger;

pub use catalog_store::CatalogStore;
pub use pipeline::{
    MetadataReport, Pipeline, ProcessingFailure, PropertyReport, ReconcileReport, RunGuard, Scope,
    SyncReport,
};
pub use task_ledger::TaskLedger;
