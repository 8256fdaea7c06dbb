//! Directory nodes, derived lazily from object key path segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A node in the per-bucket directory tree.
///
/// Every bucket has a root directory with an empty name and no parent.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Directory {
    pub id: i64,
    pub bucket_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
