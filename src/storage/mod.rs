//! Object storage protocol consumed by the pipeline.
//!
//! The pipeline never talks to a concrete backend directly; it goes through
//! [`ObjectStorage`], which covers exactly what reconciliation and enrichment
//! need: bucket existence, recursive prefix listing, get, stat and put.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::io;
use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// One entry of a recursive listing.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ListedObject {
    /// Full key within the bucket, including any data prefix.
    pub key: String,
    /// Normalised content hash (ETag).
    pub content_hash: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Result of a stat call.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ObjectStat {
    pub content_type: String,
    pub size: i64,
    pub content_hash: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid bucket name `{name}`: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Provider name recorded on cataloged buckets.
    fn provider(&self) -> &str;

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// Recursively list every object whose key starts with `prefix`, in key
    /// order.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, StorageResult<ListedObject>>;

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStat>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;
}

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Check a bucket name against S3-style naming rules.
///
/// Backends map bucket names onto paths, so anything that could name a
/// parent or absolute directory is refused here.
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let reject = |reason: &'static str| -> StorageResult<()> {
        Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason,
        })
    };

    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return reject("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return reject("must start and end with a lowercase letter or digit");
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return reject("cannot contain consecutive dots or dot-hyphen combinations");
    }
    if is_ipv4_like(name) {
        return reject("must not be formatted like an IP address");
    }
    Ok(())
}

fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.parse::<u8>().is_ok())
}

/// Infer a MIME type from a key's extension.
pub fn guess_content_type(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "jp2" => "image/jp2",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
