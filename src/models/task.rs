//! Task ledger rows: append-only progress records for pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per pipeline invocation.
///
/// `operations` only ever increases, and `completed_at` is set once the run's
/// catalog transaction has committed. A row without `completed_at` belongs to
/// a run that is still going or that aborted.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Task {
    pub id: i64,
    pub initiator: String,
    pub schema_name: String,
    pub status: String,
    pub operations: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
