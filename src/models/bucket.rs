//! Represents a cataloged bucket, the root scope for directories and objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A bucket mirrored into the catalog.
///
/// Buckets are created the first time a reconciliation sweep references them
/// and are never removed automatically.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Catalog row id.
    pub id: i64,

    /// Bucket name as known to the object storage backend.
    pub name: String,

    /// Name of the storage provider the bucket lives on (e.g. "local").
    pub provider: Option<String>,

    /// When the bucket was first cataloged.
    pub created_at: DateTime<Utc>,
}
