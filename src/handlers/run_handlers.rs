//! Triggering pipeline runs over HTTP.
//!
//! `POST /runs/{stage}` validates the request, claims the schema and returns
//! 202 right away; the run itself continues in the background and reports
//! progress through the task ledger.

use super::AppState;
use crate::{
    config::split_list,
    errors::{AppError, PipelineError},
    services::Scope,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Reconcile,
    Metadata,
    Properties,
    Sync,
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconcile" => Ok(Self::Reconcile),
            "metadata" => Ok(Self::Metadata),
            "properties" => Ok(Self::Properties),
            "sync" => Ok(Self::Sync),
            other => Err(AppError::not_found(format!("unknown stage `{}`", other))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reconcile => "reconcile",
            Self::Metadata => "metadata",
            Self::Properties => "properties",
            Self::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// Query parameters for a run. Anything left out falls back to the
/// server's configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub schema: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    /// Comma-separated processor names.
    pub processors: Option<String>,
    /// Comma-separated extractor names.
    pub extractors: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub stage: Stage,
    pub schema: String,
    pub bucket: String,
    pub status: &'static str,
}

/// `POST /runs/{stage}`
pub async fn start_run(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<impl IntoResponse, AppError> {
    let stage: Stage = stage.parse()?;
    let defaults = &state.defaults;

    let scope = Scope::new(
        query.schema.unwrap_or_else(|| defaults.schema.clone()),
        query.bucket.unwrap_or_else(|| defaults.bucket.clone()),
    )?;
    let processors = query
        .processors
        .as_deref()
        .map(split_list)
        .unwrap_or_else(|| defaults.processors.clone());
    let extractors = query
        .extractors
        .as_deref()
        .map(split_list)
        .unwrap_or_else(|| defaults.extractors.clone());

    let pipeline = state.pipeline.clone();
    if matches!(stage, Stage::Metadata | Stage::Sync) {
        pipeline.check_processors(&processors)?;
    }
    if matches!(stage, Stage::Properties | Stage::Sync) {
        pipeline.check_extractors(&extractors)?;
    }

    let claim = pipeline.runs().claim(&scope.schema)?;
    let cancel = state.shutdown.child_token();
    let prefix = query.prefix;
    let accepted = RunAccepted {
        stage,
        schema: scope.schema.clone(),
        bucket: scope.bucket.clone(),
        status: "accepted",
    };

    info!(%stage, schema = %scope.schema, bucket = %scope.bucket, "run accepted");
    tokio::spawn(async move {
        let _claim = claim;
        let prefix = prefix.as_deref();
        let outcome: Result<String, PipelineError> = match stage {
            Stage::Reconcile => pipeline
                .reconcile(&scope, prefix, &cancel)
                .await
                .map(|r| format!("{:?}", r)),
            Stage::Metadata => pipeline
                .run_metadata(&scope, &processors, prefix, &cancel)
                .await
                .map(|r| format!("{:?}", r)),
            Stage::Properties => pipeline
                .run_properties(&scope, &extractors, &cancel)
                .await
                .map(|r| format!("{:?}", r)),
            Stage::Sync => pipeline
                .sync(&scope, &processors, &extractors, prefix, &cancel)
                .await
                .map(|r| format!("{:?}", r)),
        };

        match outcome {
            Ok(report) => info!(%stage, schema = %scope.schema, report = %report, "run finished"),
            Err(err) => error!(%stage, schema = %scope.schema, error = %err, "run failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_stages() {
        assert_eq!("sync".parse::<Stage>().unwrap(), Stage::Sync);
        assert_eq!(Stage::Properties.to_string(), "properties");
        let err = "import".parse::<Stage>().unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
