//! Task ledger polling.

use super::AppState;
use crate::{errors::AppError, models::task::Task};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<u32>,
}

/// `GET /tasks?limit=`, newest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let tasks = state.pipeline.ledger().recent(limit).await?;
    Ok(Json(tasks))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    state
        .pipeline
        .ledger()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("task {} not found", id)))
}
