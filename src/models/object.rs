//! Represents a named object (file) within a cataloged bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A cataloged object.
///
/// `key` is the full path below the data prefix and is unique per bucket;
/// `directory_id` and `name` place it in the directory tree. The content it
/// currently points at is recorded through an `object_blobs` link.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Catalog row id.
    pub id: i64,

    /// Parent bucket.
    pub bucket_id: i64,

    /// Directory holding this object (the bucket root for top-level keys).
    pub directory_id: i64,

    /// Final path segment.
    pub name: String,

    /// Full key below the data prefix, e.g. `photos/2025/img.jpg`.
    pub key: String,

    /// When the object was first observed.
    pub created_at: DateTime<Utc>,

    /// Set when the path disappeared from storage (soft delete).
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Split a key into its directory segments and final name.
///
/// Empty segments (from doubled or leading slashes) are dropped.
pub fn split_key(key: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    let name = segments.pop().unwrap_or("");
    (segments, name)
}

#[cfg(test)]
mod tests {
    use super::split_key;

    #[test]
    fn splits_nested_keys() {
        assert_eq!(split_key("foo/bar/baz.jpg"), (vec!["foo", "bar"], "baz.jpg"));
        assert_eq!(split_key("foo.jpg"), (vec![], "foo.jpg"));
        assert_eq!(split_key("foo//bar.jpg"), (vec!["foo"], "bar.jpg"));
    }
}
