//! Embedded-metadata (EXIF) extraction.
//!
//! Emits one JSON object mapping tag names from the primary image directory to
//! their decoded values. Rationals become `{"Numerator", "Denominator"}`
//! objects so nothing is lost to float conversion.

use super::{
    Artifact, ArtifactKind, IMAGE_CONTENT_TYPES, MetadataProcessor, ObjectDescriptor,
    ProcessorError,
};
use ::exif::{Error as ExifError, In, Reader, Value};
use serde_json::{Map, Value as Json, json};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifProcessor;

impl MetadataProcessor for ExifProcessor {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn accepted_content_types(&self) -> &'static [&'static str] {
        IMAGE_CONTENT_TYPES
    }

    fn process(
        &self,
        object: &ObjectDescriptor,
        content: &[u8],
    ) -> Result<Vec<Artifact>, ProcessorError> {
        let Some(metadata) = extract(content)? else {
            return Ok(Vec::new());
        };
        let body = serde_json::to_vec(&metadata)?;
        Ok(vec![Artifact::for_blob(object, ArtifactKind::Json, body)])
    }
}

/// Read the EXIF block into a JSON map. `Ok(None)` when the image carries no
/// embedded metadata.
pub fn extract(content: &[u8]) -> Result<Option<Map<String, Json>>, ProcessorError> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(content)) {
        Ok(exif) => exif,
        Err(ExifError::NotFound(_) | ExifError::NotSupported(_) | ExifError::BlankValue(_)) => {
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let mut metadata = Map::new();
    for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
        metadata
            .entry(field.tag.to_string())
            .or_insert_with(|| field_value(&field.value));
    }

    if metadata.is_empty() {
        return Ok(None);
    }
    Ok(Some(metadata))
}

fn rational(num: i64, denom: i64) -> Json {
    json!({ "Numerator": num, "Denominator": denom })
}

/// Convert a raw EXIF value to JSON.
pub fn field_value(value: &Value) -> Json {
    match value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).trim_end_matches('\0').trim().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            Json::String(text)
        }
        Value::Byte(v) => json!(v),
        Value::Short(v) => json!(v),
        Value::Long(v) => json!(v),
        Value::SByte(v) => json!(v),
        Value::SShort(v) => json!(v),
        Value::SLong(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::Rational(v) => Json::Array(
            v.iter()
                .map(|r| rational(i64::from(r.num), i64::from(r.denom)))
                .collect(),
        ),
        Value::SRational(v) => Json::Array(
            v.iter()
                .map(|r| rational(i64::from(r.num), i64::from(r.denom)))
                .collect(),
        ),
        Value::Undefined(bytes, _) => {
            if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                Json::String(String::from_utf8_lossy(bytes).into_owned())
            } else {
                json!(bytes)
            }
        }
        Value::Unknown(..) => Json::Null,
    }
}
