use anyhow::Result;
use axum::Router;
use serde::Serialize;
use std::{fs, io::ErrorKind, sync::Arc};
use storage_catalog::{
    config::{AppConfig, Command},
    handlers::{AppState, RunDefaults},
    processors::{
        ProcessorRegistry, ProcessorSettings,
        codec::{self, CodecSettings},
    },
    routes,
    services::{CatalogStore, Pipeline, Scope, TaskLedger},
    storage::LocalStorage,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-catalog with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !cfg.storage_dir.exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir.display());
    }

    codec::init(CodecSettings::default());

    // --- Initialize core services ---
    let catalog = CatalogStore::new(&cfg.data_dir);
    let ledger = TaskLedger::open(&cfg.data_dir).await?;
    let storage =
        Arc::new(LocalStorage::new(&cfg.storage_dir).with_provider(cfg.provider.clone()));
    let settings = ProcessorSettings {
        thumbnail_max_size: cfg.thumbnail_max_size,
    };
    let pipeline = Pipeline::new(catalog, ledger, storage)
        .with_processors(ProcessorRegistry::builtin(&settings))
        .with_data_prefix(cfg.data_prefix.clone());

    // --- Ctrl-C cancels runs and stops the server ---
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match command {
        Command::Serve { .. } => serve(&cfg, pipeline, cancel).await?,
        Command::Reconcile { prefix } => {
            let scope = Scope::new(&cfg.schema, &cfg.bucket)?;
            let report = pipeline.reconcile(&scope, prefix.as_deref(), &cancel).await?;
            print_json(&report)?;
        }
        Command::Metadata { prefix } => {
            let scope = Scope::new(&cfg.schema, &cfg.bucket)?;
            let report = pipeline
                .run_metadata(&scope, &cfg.processors, prefix.as_deref(), &cancel)
                .await?;
            print_json(&report)?;
        }
        Command::Properties => {
            let scope = Scope::new(&cfg.schema, &cfg.bucket)?;
            let report = pipeline
                .run_properties(&scope, &cfg.extractors, &cancel)
                .await?;
            print_json(&report)?;
        }
        Command::Sync { prefix } => {
            let scope = Scope::new(&cfg.schema, &cfg.bucket)?;
            let report = pipeline
                .sync(
                    &scope,
                    &cfg.processors,
                    &cfg.extractors,
                    prefix.as_deref(),
                    &cancel,
                )
                .await?;
            print_json(&report)?;
        }
        Command::Tasks { limit } => {
            let tasks = pipeline.ledger().recent(limit).await?;
            print_json(&tasks)?;
        }
    }

    codec::shutdown();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(cfg: &AppConfig, pipeline: Pipeline, cancel: CancellationToken) -> Result<()> {
    let state = AppState {
        pipeline,
        defaults: RunDefaults {
            schema: cfg.schema.clone(),
            bucket: cfg.bucket.clone(),
            processors: cfg.processors.clone(),
            extractors: cfg.extractors.clone(),
        },
        shutdown: cancel.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
