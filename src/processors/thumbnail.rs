use super::{
    Artifact, ArtifactKind, IMAGE_CONTENT_TYPES, MetadataProcessor, ObjectDescriptor,
    ProcessorError, codec,
};
use image::imageops::FilterType;

pub const DEFAULT_MAX_SIZE: u32 = 300;

/// Downscaled, upright JPEG preview of an image.
#[derive(Debug, Clone)]
pub struct ThumbnailProcessor {
    pub max_size: u32,
}

impl ThumbnailProcessor {
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size: max_size.max(1),
        }
    }
}

/// Target dimensions so the longer side equals `max_size`, or `None` when the
/// image already fits. Never upscales.
pub fn scaled_dimensions(width: u32, height: u32, max_size: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_size {
        return None;
    }
    let scale = f64::from(max_size) / f64::from(longest);
    let fit = |side: u32| -> u32 {
        if side == longest {
            max_size
        } else {
            ((f64::from(side) * scale).round() as u32).clamp(1, max_size)
        }
    };
    Some((fit(width), fit(height)))
}

impl MetadataProcessor for ThumbnailProcessor {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    fn accepted_content_types(&self) -> &'static [&'static str] {
        IMAGE_CONTENT_TYPES
    }

    fn process(
        &self,
        object: &ObjectDescriptor,
        content: &[u8],
    ) -> Result<Vec<Artifact>, ProcessorError> {
        let mut img = codec::decode_oriented(content)?;
        if let Some((width, height)) = scaled_dimensions(img.width(), img.height(), self.max_size)
        {
            img = img.resize_exact(width, height, FilterType::Lanczos3);
        }
        let jpeg = codec::encode_jpeg(&img)?;
        Ok(vec![Artifact::for_blob(object, ArtifactKind::Jpeg, jpeg)])
    }
}
