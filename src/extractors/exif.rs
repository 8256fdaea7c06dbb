use super::{ExtractorError, PropertyExtractor};
use crate::models::property::{BlobProperty, PropertyValue};
use chrono::{FixedOffset, NaiveDateTime};
use serde::Deserialize;

const SOURCE: &str = "exif";
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Maps well-known EXIF tags to typed properties. Tags missing from the
/// artifact are simply not emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

#[derive(Deserialize, Debug, Clone, Copy)]
struct Fraction {
    #[serde(rename = "Numerator")]
    numerator: i64,
    #[serde(rename = "Denominator")]
    denominator: i64,
}

impl Fraction {
    fn ratio(&self) -> Option<f64> {
        (self.denominator != 0).then(|| self.numerator as f64 / self.denominator as f64)
    }

    fn value(&self) -> PropertyValue {
        PropertyValue::Fraction {
            numerator: self.numerator,
            denominator: self.denominator,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ExifMetadata {
    #[serde(rename = "ApertureValue")]
    aperture_value: Vec<Fraction>,
    #[serde(rename = "ExposureBiasValue")]
    exposure_bias_value: Vec<Fraction>,
    #[serde(rename = "GPSAltitude")]
    gps_altitude: Vec<Fraction>,
    #[serde(rename = "GPSAltitudeRef")]
    gps_altitude_ref: Vec<u8>,
    #[serde(rename = "Make")]
    make: Option<String>,
    #[serde(rename = "Model")]
    model: Option<String>,
    #[serde(rename = "Software")]
    software: Option<String>,
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<String>,
    #[serde(rename = "OffsetTimeOriginal")]
    offset_time_original: Option<String>,
    #[serde(rename = "ExposureTime")]
    exposure_time: Vec<Fraction>,
    #[serde(rename = "ISOSpeedRatings", alias = "PhotographicSensitivity")]
    iso_speed_ratings: Vec<i64>,
    #[serde(rename = "LensModel")]
    lens_model: Option<String>,
    #[serde(rename = "GPSLatitude")]
    gps_latitude: Vec<Fraction>,
    #[serde(rename = "GPSLatitudeRef")]
    gps_latitude_ref: Option<String>,
    #[serde(rename = "GPSLongitude")]
    gps_longitude: Vec<Fraction>,
    #[serde(rename = "GPSLongitudeRef")]
    gps_longitude_ref: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
pub(crate) fn dms_to_decimal(dms: &[(i64, i64)], reference: &str) -> Option<f64> {
    if dms.len() < 3 {
        return None;
    }
    let part = |(n, d): (i64, i64)| (d != 0).then(|| n as f64 / d as f64);
    let decimal = part(dms[0])? + part(dms[1])? / 60.0 + part(dms[2])? / 3600.0;
    Some(match reference.trim() {
        "S" | "W" => -decimal,
        _ => decimal,
    })
}

fn coordinate(parts: &[Fraction], reference: &Option<String>) -> Option<PropertyValue> {
    let reference = non_empty(reference)?;
    let dms: Vec<(i64, i64)> = parts.iter().map(|f| (f.numerator, f.denominator)).collect();
    PropertyValue::float(dms_to_decimal(&dms, reference)?)
}

impl PropertyExtractor for ExifExtractor {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn extract(&self, content: &[u8]) -> Result<Vec<BlobProperty>, ExtractorError> {
        let em: ExifMetadata = serde_json::from_slice(content)?;
        let mut props = Vec::new();
        let mut push = |property_type: &str, value: PropertyValue| {
            props.push(BlobProperty::new(SOURCE, property_type, value));
        };

        if let Some(value) = em
            .aperture_value
            .first()
            .and_then(Fraction::ratio)
            .and_then(PropertyValue::float)
        {
            push("ApertureValue", value);
        }

        if let Some(bias) = em.exposure_bias_value.first() {
            push("ExposureBiasValue", bias.value());
        }

        if let Some(altitude) = em.gps_altitude.first().and_then(Fraction::ratio) {
            let below_sea_level = em.gps_altitude_ref.first() == Some(&1);
            let metres = altitude.trunc() as i64;
            push(
                "GPSAltitude",
                PropertyValue::Integer(if below_sea_level { -metres } else { metres }),
            );
        }

        for (property_type, value) in [
            ("Make", &em.make),
            ("Model", &em.model),
            ("Software", &em.software),
        ] {
            if let Some(text) = non_empty(value) {
                push(property_type, PropertyValue::Text(text.to_string()));
            }
        }

        let taken = non_empty(&em.date_time_original)
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, EXIF_DATETIME_FORMAT).ok());
        if let Some(taken) = taken {
            push("DateTimeOriginal", PropertyValue::Timestamp(taken));
        }

        if let Some(offset) = non_empty(&em.offset_time_original) {
            push("OffsetTimeOriginal", PropertyValue::Text(offset.to_string()));
            let zoned = taken.zip(offset.parse::<FixedOffset>().ok()).and_then(
                |(taken, offset)| taken.and_local_timezone(offset).single(),
            );
            if let Some(zoned) = zoned {
                push(
                    "DateTimeOriginalWithOffset",
                    PropertyValue::TimestampWithTimeZone(zoned),
                );
            }
        }

        if let Some(exposure) = em.exposure_time.first() {
            push("ExposureTime", exposure.value());
        }

        if let Some(iso) = em.iso_speed_ratings.first() {
            push("ISOSpeedRatings", PropertyValue::Integer(*iso));
        }

        if let Some(lens) = non_empty(&em.lens_model) {
            push("LensModel", PropertyValue::Text(lens.to_string()));
        }

        if let Some(latitude) = coordinate(&em.gps_latitude, &em.gps_latitude_ref) {
            push("GPSLatitude", latitude);
        }

        if let Some(longitude) = coordinate(&em.gps_longitude, &em.gps_longitude_ref) {
            push("GPSLongitude", longitude);
        }

        Ok(props)
    }
}
