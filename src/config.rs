use crate::{processors::thumbnail::DEFAULT_MAX_SIZE, services::pipeline::DEFAULT_DATA_PREFIX};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_SCHEMA: &str = "storage_console";
pub const DEFAULT_PROCESSORS: &str = "thumbnail,exif,color";
pub const DEFAULT_EXTRACTORS: &str = "exif,color";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Catalog schema databases and the task ledger live here.
    pub data_dir: PathBuf,
    /// Root of the local object storage backend.
    pub storage_dir: PathBuf,
    pub schema: String,
    pub bucket: String,
    pub provider: String,
    pub data_prefix: String,
    pub thumbnail_max_size: u32,
    pub processors: Vec<String>,
    pub extractors: Vec<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object storage catalog and enrichment pipeline")]
pub struct Args {
    /// Directory for catalog databases (overrides CATALOG_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Root directory of the object storage (overrides CATALOG_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Catalog schema (overrides CATALOG_SCHEMA)
    #[arg(long, global = true)]
    pub schema: Option<String>,

    /// Bucket to catalog (overrides CATALOG_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Provider name recorded on the bucket (overrides CATALOG_PROVIDER)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Prefix under which source content lives (overrides CATALOG_DATA_PREFIX)
    #[arg(long, global = true)]
    pub data_prefix: Option<String>,

    /// Longest thumbnail side in pixels (overrides CATALOG_THUMBNAIL_MAX_SIZE)
    #[arg(long, global = true)]
    pub thumbnail_max_size: Option<u32>,

    /// Comma-separated metadata processors (overrides CATALOG_PROCESSORS)
    #[arg(long, global = true, value_delimiter = ',')]
    pub processors: Option<Vec<String>>,

    /// Comma-separated property extractors (overrides CATALOG_EXTRACTORS)
    #[arg(long, global = true, value_delimiter = ',')]
    pub extractors: Option<Vec<String>>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Host to bind to (overrides CATALOG_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides CATALOG_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Reconcile the catalog with the bucket listing
    Reconcile {
        /// Only reconcile keys under this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Derive metadata artifacts for blobs missing them
    Metadata {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Extract typed properties from metadata artifacts
    Properties,
    /// Reconcile, then run metadata and properties
    Sync {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the most recent task ledger rows
    Tasks {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, Command)> {
        let command = args.command.clone().unwrap_or(Command::Serve {
            host: None,
            port: None,
        });

        // --- Environment fallback ---
        let env_host = env_or("CATALOG_HOST", "0.0.0.0");
        let env_port = env_parsed("CATALOG_PORT", 3000u16)?;
        let env_thumbnail = env_parsed("CATALOG_THUMBNAIL_MAX_SIZE", DEFAULT_MAX_SIZE)?;

        let (host, port) = match &command {
            Command::Serve { host, port } => (host.clone(), *port),
            _ => (None, None),
        };

        // --- Merge ---
        let cfg = Self {
            host: host.unwrap_or(env_host),
            port: port.unwrap_or(env_port),
            data_dir: args
                .data_dir
                .unwrap_or_else(|| env_or("CATALOG_DATA_DIR", "./data/catalog").into()),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("CATALOG_STORAGE_DIR", "./data/objects").into()),
            schema: args
                .schema
                .unwrap_or_else(|| env_or("CATALOG_SCHEMA", DEFAULT_SCHEMA)),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("CATALOG_BUCKET", "")),
            provider: args
                .provider
                .unwrap_or_else(|| env_or("CATALOG_PROVIDER", "local")),
            data_prefix: args
                .data_prefix
                .unwrap_or_else(|| env_or("CATALOG_DATA_PREFIX", DEFAULT_DATA_PREFIX)),
            thumbnail_max_size: args.thumbnail_max_size.unwrap_or(env_thumbnail),
            processors: args
                .processors
                .unwrap_or_else(|| split_list(&env_or("CATALOG_PROCESSORS", DEFAULT_PROCESSORS))),
            extractors: args
                .extractors
                .unwrap_or_else(|| split_list(&env_or("CATALOG_EXTRACTORS", DEFAULT_EXTRACTORS))),
        };

        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lists_and_drops_blanks() {
        assert_eq!(split_list("thumbnail, exif,,color "), vec!["thumbnail", "exif", "color"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn cli_arguments_override_defaults() {
        let args = Args::parse_from([
            "storage-catalog",
            "--schema",
            "tenant_a",
            "--bucket",
            "photos",
            "--processors",
            "exif,color",
            "reconcile",
            "--prefix",
            "2024/",
        ]);
        let (cfg, command) = AppConfig::from_args(args).unwrap();
        assert_eq!(cfg.schema, "tenant_a");
        assert_eq!(cfg.bucket, "photos");
        assert_eq!(cfg.processors, vec!["exif", "color"]);
        assert_eq!(
            command,
            Command::Reconcile {
                prefix: Some("2024/".into())
            }
        );
    }

    #[test]
    fn serve_is_the_default_command() {
        let args = Args::parse_from(["storage-catalog"]);
        let (cfg, command) = AppConfig::from_args(args).unwrap();
        assert!(matches!(command, Command::Serve { .. }));
        assert!(cfg.addr().ends_with(&cfg.port.to_string()));
    }
}
