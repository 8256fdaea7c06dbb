//! HTTP handlers and the state they share.

pub mod health_handlers;
pub mod run_handlers;
pub mod task_handlers;

use crate::services::Pipeline;
use tokio_util::sync::CancellationToken;

/// Values used when a run request leaves them out.
#[derive(Clone, Debug)]
pub struct RunDefaults {
    pub schema: String,
    pub bucket: String,
    pub processors: Vec<String>,
    pub extractors: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub defaults: RunDefaults,
    /// Cancelled on shutdown; background runs roll back when it fires.
    pub shutdown: CancellationToken,
}
