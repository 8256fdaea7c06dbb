//! Storage catalog: mirrors an object storage bucket into a relational
//! catalog, deduplicates content by hash and enriches it with derived
//! metadata and typed properties.

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod processors;
pub mod routes;
pub mod services;
pub mod storage;

pub use errors::{AppError, PipelineError};
