//! Content-addressed blobs and their per-processor metadata flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Unique byte content, keyed by the storage backend's content hash.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Blob {
    pub id: i64,

    /// ETag/MD5 reported by the backend. Immutable and unique.
    pub content_hash: String,

    /// Size in bytes.
    pub size: i64,

    pub last_modified: DateTime<Utc>,

    pub content_type_id: i64,
}

/// Outcome recorded for a (blob, processor) pair.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStatus {
    /// The processor produced at least one artifact.
    Success,
    /// The processor ran cleanly but had nothing to emit (e.g. no EXIF block).
    Empty,
    /// The processor failed on this blob.
    Failure,
}

impl MetadataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Empty => "empty",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completion flag row from `blob_metadata`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct BlobMetadata {
    pub blob_id: i64,
    pub processor: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Normalise a backend ETag for comparison: strip quotes, lowercase.
pub fn normalize_hash(raw: &str) -> String {
    raw.trim().trim_matches('"').to_ascii_lowercase()
}
