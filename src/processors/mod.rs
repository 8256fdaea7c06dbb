//! Metadata processors: derive artifacts (thumbnails, EXIF JSON, colour
//! analysis) from blob content.
//!
//! The set of processors is fixed. They are registered once in a
//! [`ProcessorRegistry`] and looked up by name; the runner never dispatches on
//! strings itself.

pub mod codec;
pub mod color;
pub mod exif;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod palette;
pub mod thumbnail;

use bytes::Bytes;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

pub use self::{color::ColorProcessor, exif::ExifProcessor, thumbnail::ThumbnailProcessor};

/// Prefix under which artifacts are written, `meta/<processor>/<hash>.<ext>`.
pub const META_PREFIX: &str = "meta/";

/// What a processor knows about the blob it is handed.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectDescriptor {
    /// One key currently linked to the blob (below the data prefix).
    pub key: String,
    pub content_hash: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Jpeg,
    Json,
}

impl ArtifactKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Json => "json",
        }
    }
}

/// A derived file produced by a processor.
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Path relative to the processor's prefix, normally `<hash>.<ext>`.
    pub relative_path: String,
    pub kind: ArtifactKind,
    pub content: Bytes,
}

impl Artifact {
    /// The conventional artifact for a blob: `<hash>.<ext>`.
    pub fn for_blob(object: &ObjectDescriptor, kind: ArtifactKind, content: Vec<u8>) -> Self {
        Self {
            relative_path: format!("{}.{}", object.content_hash, kind.extension()),
            kind,
            content: Bytes::from(content),
        }
    }
}

/// Storage key for an artifact written by `processor`.
pub fn artifact_key(processor: &str, relative_path: &str) -> String {
    format!("{}{}/{}", META_PREFIX, processor, relative_path)
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not read embedded metadata: {0}")]
    Exif(#[from] ::exif::Error),
    #[error("could not serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image codec: {0}")]
    Codec(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait MetadataProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// MIME types this processor accepts.
    fn accepted_content_types(&self) -> &'static [&'static str];

    /// Derive artifacts from `content`. An empty list means there was nothing
    /// to derive; an error marks this blob as failed for this processor.
    fn process(
        &self,
        object: &ObjectDescriptor,
        content: &[u8],
    ) -> Result<Vec<Artifact>, ProcessorError>;
}

/// Image types every built-in processor can decode.
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    /// Longest side of generated thumbnails, in pixels.
    pub thumbnail_max_size: u32,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            thumbnail_max_size: thumbnail::DEFAULT_MAX_SIZE,
        }
    }
}

/// Name → processor map, populated with the built-ins at startup.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<&'static str, Arc<dyn MetadataProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin(settings: &ProcessorSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ThumbnailProcessor::new(settings.thumbnail_max_size)));
        registry.register(Arc::new(ExifProcessor));
        registry.register(Arc::new(ColorProcessor::default()));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn MetadataProcessor>) {
        self.processors.insert(processor.name(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MetadataProcessor>> {
        self.processors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }

    /// Resolve names in the given order, returning the first unknown name as
    /// the error. Duplicates are dropped.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn MetadataProcessor>>, String> {
        let mut resolved: Vec<Arc<dyn MetadataProcessor>> = Vec::new();
        for name in names {
            let processor = self.get(name).ok_or_else(|| name.clone())?;
            if !resolved.iter().any(|p| p.name() == processor.name()) {
                resolved.push(processor);
            }
        }
        Ok(resolved)
    }
}
