//! Typed, searchable properties derived from metadata artifacts.
//!
//! A property row carries exactly one populated value column. In Rust that is
//! the [`PropertyValue`] sum type; the `value_type` column holds its tag and
//! conversion to/from rows goes through [`PropertyColumns`] and
//! [`PropertyRow`].

use crate::processors::palette;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;

/// Property type used for the per-source completion marker.
pub const DONE_PROPERTY: &str = "Done";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
    Integer(i64),
    Float(f64),
    Fraction { numerator: i64, denominator: i64 },
    Timestamp(NaiveDateTime),
    TimestampWithTimeZone(DateTime<FixedOffset>),
}

impl PropertyValue {
    /// The tag stored in `value_type`.
    pub fn value_type(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Text(_) => "Text",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Fraction { .. } => "Fraction",
            Self::Timestamp(_) => "Timestamp",
            Self::TimestampWithTimeZone(_) => "TimestampWithTimeZone",
        }
    }

    /// Finite floats only; SQLite stores NaN as NULL.
    pub fn float(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self::Float(value))
    }

    /// Split into nullable columns, populating only this variant's column(s).
    pub fn columns(&self) -> PropertyColumns {
        let mut cols = PropertyColumns::default();
        match self {
            Self::Bool(v) => cols.value_bool = Some(*v),
            Self::Text(v) => cols.value_text = Some(v.clone()),
            Self::Integer(v) => cols.value_integer = Some(*v),
            Self::Float(v) => cols.value_float = Some(*v),
            Self::Fraction {
                numerator,
                denominator,
            } => {
                cols.value_numerator = Some(*numerator);
                cols.value_denominator = Some(*denominator);
            }
            Self::Timestamp(v) => cols.value_timestamp = Some(*v),
            Self::TimestampWithTimeZone(v) => cols.value_timestamptz = Some(*v),
        }
        cols
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Text(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Fraction {
                numerator,
                denominator,
            } => {
                if *denominator == 1 {
                    write!(f, "{}", numerator)
                } else if *numerator == 0 {
                    f.write_str("0")
                } else {
                    write!(f, "{}/{}", numerator, denominator)
                }
            }
            Self::Timestamp(v) => write!(f, "{}", v),
            Self::TimestampWithTimeZone(v) => write!(f, "{}", v),
        }
    }
}

/// Nullable value columns of a `blob_properties` row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyColumns {
    pub value_bool: Option<bool>,
    pub value_text: Option<String>,
    pub value_integer: Option<i64>,
    pub value_float: Option<f64>,
    pub value_numerator: Option<i64>,
    pub value_denominator: Option<i64>,
    pub value_timestamp: Option<NaiveDateTime>,
    pub value_timestamptz: Option<DateTime<FixedOffset>>,
}

/// A property produced by an extractor, before it is attached to a blob.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlobProperty {
    /// Extractor (and metadata processor) that produced this property.
    pub source: String,

    /// e.g. `Make`, `GPSLatitude`, `ColorCategory1`.
    pub property_type: String,

    pub value: PropertyValue,
}

impl BlobProperty {
    pub fn new(
        source: impl Into<String>,
        property_type: impl Into<String>,
        value: PropertyValue,
    ) -> Self {
        Self {
            source: source.into(),
            property_type: property_type.into(),
            value,
        }
    }

    /// The sentinel row written once a source has been extracted for a blob.
    pub fn done(source: impl Into<String>) -> Self {
        Self::new(source, DONE_PROPERTY, PropertyValue::Bool(true))
    }

    /// Render a colour property as `r,g,b`.
    ///
    /// Category properties hold palette names and are resolved through the
    /// palette; prominent colours already hold an `r,g,b` triple. Returns an
    /// empty string for anything that is not a colour property.
    pub fn color(&self) -> String {
        if self.source != "color" {
            return String::new();
        }
        let PropertyValue::Text(text) = &self.value else {
            return String::new();
        };
        if self.property_type.starts_with("ColorCategory") {
            return match palette::by_name(text) {
                Some(entry) => format!("{},{},{}", entry.rgb[0], entry.rgb[1], entry.rgb[2]),
                None => String::new(),
            };
        }
        text.clone()
    }
}

#[derive(Debug, Error)]
pub enum PropertyValueError {
    #[error("unknown value type `{0}`")]
    UnknownType(String),
    #[error("value type `{0}` has no populated column")]
    MissingValue(String),
}

/// A `blob_properties` row as read back from the catalog.
#[derive(Clone, FromRow, Debug)]
pub struct PropertyRow {
    pub blob_id: i64,
    pub source: String,
    pub property_type: String,
    pub value_type: String,
    pub value_bool: Option<bool>,
    pub value_text: Option<String>,
    pub value_integer: Option<i64>,
    pub value_float: Option<f64>,
    pub value_numerator: Option<i64>,
    pub value_denominator: Option<i64>,
    pub value_timestamp: Option<NaiveDateTime>,
    pub value_timestamptz: Option<DateTime<FixedOffset>>,
}

impl TryFrom<PropertyRow> for BlobProperty {
    type Error = PropertyValueError;

    fn try_from(row: PropertyRow) -> Result<Self, Self::Error> {
        let missing = || PropertyValueError::MissingValue(row.value_type.clone());
        let value = match row.value_type.as_str() {
            "Bool" => PropertyValue::Bool(row.value_bool.ok_or_else(missing)?),
            "Text" => PropertyValue::Text(row.value_text.clone().ok_or_else(missing)?),
            "Integer" => PropertyValue::Integer(row.value_integer.ok_or_else(missing)?),
            "Float" => PropertyValue::Float(row.value_float.ok_or_else(missing)?),
            "Fraction" => match (row.value_numerator, row.value_denominator) {
                (Some(numerator), Some(denominator)) => PropertyValue::Fraction {
                    numerator,
                    denominator,
                },
                _ => return Err(missing()),
            },
            "Timestamp" => PropertyValue::Timestamp(row.value_timestamp.ok_or_else(missing)?),
            "TimestampWithTimeZone" => {
                PropertyValue::TimestampWithTimeZone(row.value_timestamptz.ok_or_else(missing)?)
            }
            other => return Err(PropertyValueError::UnknownType(other.to_string())),
        };

        Ok(BlobProperty {
            source: row.source,
            property_type: row.property_type,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(source: &str, property_type: &str, value: &str) -> BlobProperty {
        BlobProperty::new(source, property_type, PropertyValue::Text(value.into()))
    }

    #[test]
    fn color_resolves_categories_through_palette() {
        assert_eq!(text("color", "ColorCategory1", "orange").color(), "255,165,0");
        assert_eq!(text("color", "ProminentColor1", "1,2,3").color(), "1,2,3");
        assert_eq!(text("exif", "Make", "SONY").color(), "");
    }

    #[test]
    fn renders_values_for_display() {
        let cases = [
            (PropertyValue::Bool(true), "True"),
            (PropertyValue::Text("wow".into()), "wow"),
            (
                PropertyValue::Fraction {
                    numerator: 10,
                    denominator: 100,
                },
                "10/100",
            ),
            (
                PropertyValue::Fraction {
                    numerator: 4,
                    denominator: 1,
                },
                "4",
            ),
            (
                PropertyValue::Fraction {
                    numerator: 0,
                    denominator: 3,
                },
                "0",
            ),
            (PropertyValue::Integer(10), "10"),
            (PropertyValue::Float(1.23), "1.23"),
            (
                PropertyValue::Timestamp(
                    NaiveDate::from_ymd_opt(1996, 6, 2)
                        .unwrap()
                        .and_hms_opt(5, 4, 3)
                        .unwrap(),
                ),
                "1996-06-02 05:04:03",
            ),
        ];

        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected, "{:?}", value);
        }
    }

    #[test]
    fn columns_populate_a_single_variant() {
        let cols = PropertyValue::Fraction {
            numerator: -1,
            denominator: 3,
        }
        .columns();
        assert_eq!(cols.value_numerator, Some(-1));
        assert_eq!(cols.value_denominator, Some(3));
        assert!(cols.value_bool.is_none() && cols.value_text.is_none());
        assert!(cols.value_integer.is_none() && cols.value_float.is_none());
    }

    #[test]
    fn rejects_rows_with_missing_values() {
        let row = PropertyRow {
            blob_id: 1,
            source: "exif".into(),
            property_type: "Make".into(),
            value_type: "Text".into(),
            value_bool: None,
            value_text: None,
            value_integer: None,
            value_float: None,
            value_numerator: None,
            value_denominator: None,
            value_timestamp: None,
            value_timestamptz: None,
        };
        assert!(matches!(
            BlobProperty::try_from(row),
            Err(PropertyValueError::MissingValue(_))
        ));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(PropertyValue::float(f64::NAN).is_none());
        assert_eq!(PropertyValue::float(2.5), Some(PropertyValue::Float(2.5)));
    }
}
