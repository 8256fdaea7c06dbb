//! Property extractors: turn a metadata artifact into typed property rows.
//!
//! Each extractor is named after the metadata processor whose artifact it
//! reads, so `exif` reads `meta/exif/<hash>.json`.

pub mod color;
pub mod exif;

use crate::models::property::BlobProperty;
use crate::processors::{ArtifactKind, artifact_key};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

pub use self::{color::ColorExtractor, exif::ExifExtractor};

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("could not parse artifact: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait PropertyExtractor: Send + Sync {
    /// Source name; also the metadata processor whose artifact is read.
    fn name(&self) -> &'static str;

    /// Storage key of the artifact this extractor reads for a blob.
    fn artifact_key(&self, content_hash: &str) -> String {
        artifact_key(
            self.name(),
            &format!("{}.{}", content_hash, ArtifactKind::Json.extension()),
        )
    }

    fn extract(&self, content: &[u8]) -> Result<Vec<BlobProperty>, ExtractorError>;
}

#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<&'static str, Arc<dyn PropertyExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExifExtractor));
        registry.register(Arc::new(ColorExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn PropertyExtractor>) {
        self.extractors.insert(extractor.name(), extractor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PropertyExtractor>> {
        self.extractors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.keys().copied().collect()
    }

    /// Resolve names in order, dropping duplicates. The error is the first
    /// unknown name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn PropertyExtractor>>, String> {
        let mut resolved: Vec<Arc<dyn PropertyExtractor>> = Vec::new();
        for name in names {
            let extractor = self.get(name).ok_or_else(|| name.clone())?;
            if !resolved.iter().any(|e| e.name() == extractor.name()) {
                resolved.push(extractor);
            }
        }
        Ok(resolved)
    }
}
