//! Defines the HTTP surface of the catalog service.
//!
//! ## Structure
//! - **Health checks**
//!   - `GET  /healthz`: liveness
//!   - `GET  /readyz`: ledger database and object storage checks
//!
//! - **Task ledger**
//!   - `GET  /tasks?limit=`: most recent runs first
//!   - `GET  /tasks/{id}`: one run's progress
//!
//! - **Runs**
//!   - `POST /runs/{stage}`: start `reconcile`, `metadata`, `properties` or
//!     `sync` in the background (`202`, or `409` while the schema is busy)

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    run_handlers::start_run,
    task_handlers::{get_task, list_tasks},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router; the caller attaches `AppState` with `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // ledger polling
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        // pipeline runs
        .route("/runs/{stage}", post(start_run))
}
