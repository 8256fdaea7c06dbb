//! Image codec shared by the image processors.
//!
//! Decoder limits and encoder settings live in one process-wide cell that is
//! initialised once (explicitly through [`init`] or lazily with defaults on
//! first use) and can be torn down with [`shutdown`]. Processors never set up
//! codec state per call.

use super::ProcessorError;
use ::exif::{In, Reader, Tag};
use image::{DynamicImage, codecs::jpeg::JpegEncoder, io::Limits};
use once_cell::sync::Lazy;
use std::{
    io::Cursor,
    sync::{Mutex, MutexGuard},
};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecSettings {
    /// Largest width or height accepted by the decoder.
    pub max_dimension: u32,
    /// Upper bound on decoder allocations, in bytes.
    pub max_alloc: u64,
    /// JPEG quality for encoded output, 1-100.
    pub jpeg_quality: u8,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_dimension: 20_000,
            max_alloc: 512 * 1024 * 1024,
            jpeg_quality: 80,
        }
    }
}

/// Init-once holder for codec settings.
#[derive(Default)]
pub struct CodecCell {
    state: Mutex<Option<CodecSettings>>,
}

impl CodecCell {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CodecSettings>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `settings` unless already initialised. Returns whether this
    /// call did the initialisation.
    pub fn init(&self, settings: CodecSettings) -> bool {
        let mut state = self.lock();
        if state.is_some() {
            return false;
        }
        debug!(?settings, "initialising image codec");
        *state = Some(settings);
        true
    }

    /// Drop the current settings. Returns whether anything was torn down.
    pub fn shutdown(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Current settings, initialising with defaults on first use.
    pub fn settings(&self) -> CodecSettings {
        self.lock().get_or_insert_with(CodecSettings::default).clone()
    }
}

static CODEC: Lazy<CodecCell> = Lazy::new(CodecCell::new);

pub fn init(settings: CodecSettings) -> bool {
    CODEC.init(settings)
}

pub fn shutdown() -> bool {
    CODEC.shutdown()
}

pub fn settings() -> CodecSettings {
    CODEC.settings()
}

/// Decode an image from memory, guessing the format from its magic bytes.
pub fn decode(content: &[u8]) -> Result<DynamicImage, ProcessorError> {
    let settings = settings();
    let mut limits = Limits::default();
    limits.max_image_width = Some(settings.max_dimension);
    limits.max_image_height = Some(settings.max_dimension);
    limits.max_alloc = Some(settings.max_alloc);

    let mut reader = image::io::Reader::new(Cursor::new(content)).with_guessed_format()?;
    reader.limits(limits);
    Ok(reader.decode()?)
}

/// Decode and rotate/flip according to the embedded orientation tag.
pub fn decode_oriented(content: &[u8]) -> Result<DynamicImage, ProcessorError> {
    let img = decode(content)?;
    Ok(Orientation::from_bytes(content).correct(img))
}

/// Encode as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ProcessorError> {
    let settings = settings();
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(out)
}

/// EXIF orientation, as the transform needed to display the image upright.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    CW90,
    CW180,
    CW270,
    MirroredVertical,
    MirroredHorizontal,
    MirroredHorizontalAnd90CW,
    MirroredHorizontalAnd270CW,
}

impl Orientation {
    /// Read the orientation tag; anything unreadable counts as upright.
    pub fn from_bytes(content: &[u8]) -> Self {
        Reader::new()
            .read_from_container(&mut Cursor::new(content))
            .ok()
            .and_then(|exif| {
                exif.get_field(Tag::Orientation, In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .map(Self::from)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn correct(&self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::CW90 => img.rotate90(),
            Self::CW180 => img.rotate180(),
            Self::CW270 => img.rotate270(),
            Self::MirroredHorizontal => img.fliph(),
            Self::MirroredVertical => img.flipv(),
            Self::MirroredHorizontalAnd90CW => img.fliph().rotate90(),
            Self::MirroredHorizontalAnd270CW => img.fliph().rotate270(),
        }
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::CW180,
            4 => Self::MirroredVertical,
            5 => Self::MirroredHorizontalAnd270CW,
            6 => Self::CW90,
            7 => Self::MirroredHorizontalAnd90CW,
            8 => Self::CW270,
            _ => Self::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::fixtures;
    use image::{GenericImageView, ImageOutputFormat, Rgb, RgbImage};

    #[test]
    fn cell_initialises_once() {
        let cell = CodecCell::new();
        assert!(!cell.is_initialized());

        let custom = CodecSettings {
            jpeg_quality: 50,
            ..CodecSettings::default()
        };
        assert!(cell.init(custom.clone()));
        assert!(!cell.init(CodecSettings::default()));
        assert_eq!(cell.settings(), custom);

        assert!(cell.shutdown());
        assert!(!cell.shutdown());
        assert_eq!(cell.settings(), CodecSettings::default());
        assert!(cell.is_initialized());
    }

    #[test]
    fn orientation_rotates_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 10));
        let rotated = Orientation::from(6).correct(img.clone());
        assert_eq!((rotated.width(), rotated.height()), (10, 40));
        let flipped = Orientation::from(2).correct(img);
        assert_eq!((flipped.width(), flipped.height()), (40, 10));
        assert_eq!(Orientation::from(42), Orientation::Normal);
    }

    #[test]
    fn images_without_exif_are_upright() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();
        assert_eq!(Orientation::from_bytes(&png), Orientation::Normal);
        assert_eq!(decode_oriented(&png).unwrap().width(), 4);
    }

    #[test]
    fn exif_orientation_is_applied_on_decode() {
        let jpeg = fixtures::camera_jpeg(40, 10, 6);
        assert_eq!(Orientation::from_bytes(&jpeg), Orientation::CW90);
        assert_eq!(decode(&jpeg).unwrap().dimensions(), (40, 10));
        assert_eq!(decode_oriented(&jpeg).unwrap().dimensions(), (10, 40));

        let upright = fixtures::camera_jpeg(40, 10, 1);
        assert_eq!(Orientation::from_bytes(&upright), Orientation::Normal);
        assert_eq!(decode_oriented(&upright).unwrap().dimensions(), (40, 10));
    }

    #[test]
    fn encodes_jpeg() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([200, 10, 10])));
        let jpeg = encode_jpeg(&img).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(decode(b"hello"), Err(ProcessorError::Decode(_))));
    }
}
