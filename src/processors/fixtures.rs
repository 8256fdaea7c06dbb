//! Camera-style JPEGs for processor tests.

use ::exif::{Field, In, Rational, Tag, Value, experimental::Writer};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

fn primary(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

/// TIFF body of the APP1 segment: camera, capture time, ISO, a southern
/// latitude of 51°30'36" and the given orientation.
fn camera_tiff(orientation: u16) -> Vec<u8> {
    let fields = [
        primary(Tag::Make, ascii("SONY")),
        primary(Tag::Model, ascii("DSC-RX100")),
        primary(Tag::Orientation, Value::Short(vec![orientation])),
        primary(Tag::DateTimeOriginal, ascii("2023:07:14 18:22:05")),
        primary(Tag::PhotographicSensitivity, Value::Short(vec![200])),
        primary(Tag::GPSLatitudeRef, ascii("S")),
        primary(
            Tag::GPSLatitude,
            Value::Rational(vec![
                Rational { num: 51, denom: 1 },
                Rational { num: 30, denom: 1 },
                Rational { num: 36, denom: 1 },
            ]),
        ),
    ];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    tiff.into_inner()
}

/// A solid `width`x`height` JPEG whose EXIF block sits right after SOI.
pub(crate) fn camera_jpeg(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])));
    let mut jpeg = Vec::new();
    img.write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(90))
        .unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let tiff = camera_tiff(orientation);
    let length = u16::try_from(2 + 6 + tiff.len()).unwrap();
    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}
