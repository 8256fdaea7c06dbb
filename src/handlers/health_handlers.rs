//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the task ledger and object storage

use super::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /healthz`
///
/// Liveness only; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 1. Round trip against the task ledger database.
/// 2. Existence check for the default bucket against object storage.
///
/// HTTP 200 when every check passes, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let ledger_check = match state.pipeline.ledger().ping().await {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let bucket = &state.defaults.bucket;
    let storage_check = if bucket.is_empty() {
        CheckStatus::failed("no default bucket configured")
    } else {
        match state.pipeline.storage().bucket_exists(bucket).await {
            Ok(true) => CheckStatus::ok(),
            Ok(false) => CheckStatus::failed(format!("bucket `{}` not found", bucket)),
            Err(e) => CheckStatus::failed(format!("error: {}", e)),
        }
    };

    let overall_ok = ledger_check.ok && storage_check.ok;
    let mut checks = BTreeMap::new();
    checks.insert("ledger", ledger_check);
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if overall_ok { "ok".into() } else { "error".into() },
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
