//! Core data models for the storage catalog.
//!
//! These entities mirror the catalog tables. They map to rows via
//! `sqlx::FromRow` and serialize as JSON via `serde` for the HTTP surface.

pub mod blob;
pub mod bucket;
pub mod directory;
pub mod object;
pub mod property;
pub mod task;
