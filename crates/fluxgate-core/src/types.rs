//! Core data types for the fluxgate client

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// A tag is a key-value pair used for series identification
/// Tags are indexed by the server and used for filtering queries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Validate the tag
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(CoreError::EmptyTagKey);
        }
        check_name("Tag key", &self.key)?;
        check_name("Tag value", &self.value)
    }
}

/// Line breaks end a line and a trailing backslash escapes the separator
/// after it; neither survives encoding.
fn check_name(kind: &'static str, name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) || name.ends_with('\\') {
        return Err(CoreError::UnencodableName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => self.value.cmp(&other.value),
            other => other,
        }
    }
}

/// Field value kinds accepted by the write endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit unsigned integer
    UnsignedInteger(u64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(f64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedInteger(v)
    }
}

macro_rules! widen_into_field_value {
    ($variant:ident, $wide:ty, $($narrow:ty),+) => {
        $(
            impl From<$narrow> for FieldValue {
                fn from(v: $narrow) -> Self {
                    FieldValue::$variant(<$wide>::from(v))
                }
            }
        )+
    };
}

widen_into_field_value!(Integer, i64, i32, i16, i8);
widen_into_field_value!(UnsignedInteger, u64, u32, u16, u8);

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// A field is a named value in a data point
/// Fields are not indexed and store the actual measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    /// Create a new field
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Validate the field
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(CoreError::EmptyFieldKey);
        }
        check_name("Field key", &self.key)?;
        if let FieldValue::Float(v) = self.value {
            if !v.is_finite() {
                return Err(CoreError::NonFiniteField(self.key.clone()));
            }
        }
        Ok(())
    }
}

/// A pending time series record.
///
/// Points are values: every builder method consumes `self` and returns the
/// extended point, so a tagged point can be cloned and reused as a template
/// for many writes. Repeating a tag or field key replaces the earlier value
/// in place.
///
/// ```
/// use fluxgate_core::{FieldValue, Point};
///
/// let point = Point::new("cpu")
///     .tag("host", "a1")
///     .field("load", 0.75)
///     .field("load", 0.5);
///
/// assert_eq!(point.get_tag("host"), Some("a1"));
/// assert_eq!(point.get_field("load"), Some(&FieldValue::Float(0.5)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// The measurement name (like a table name)
    pub measurement: String,
    /// Tags for series identification (indexed)
    pub tags: Vec<Tag>,
    /// Field values (not indexed)
    pub fields: Vec<Field>,
    /// Milliseconds since Unix epoch; assigned at write time
    pub timestamp: Option<Timestamp>,
}

impl Point {
    /// Start a point for the given measurement
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    /// Add a tag, replacing any tag with the same key
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let tag = Tag::new(key, value);
        match self.tags.iter_mut().find(|t| t.key == tag.key) {
            Some(existing) => existing.value = tag.value,
            None => self.tags.push(tag),
        }
        self
    }

    /// Add every tag from an iterator of key/value pairs
    pub fn tags<I, K, V>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        tags.into_iter().fold(self, |point, (k, v)| point.tag(k, v))
    }

    /// Add a field, replacing any field with the same key
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let field = Field::new(key, value);
        match self.fields.iter_mut().find(|f| f.key == field.key) {
            Some(existing) => existing.value = field.value,
            None => self.fields.push(field),
        }
        self
    }

    /// Add every field from an iterator of key/value pairs
    pub fn fields<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        fields.into_iter().fold(self, |point, (k, v)| point.field(k, v))
    }

    /// Set the timestamp
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Validate the point
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(CoreError::EmptyMeasurement);
        }
        check_name("Measurement", &self.measurement)?;
        if self.fields.is_empty() {
            return Err(CoreError::NoFields);
        }
        for tag in &self.tags {
            tag.validate()?;
        }
        for field in &self.fields {
            field.validate()?;
        }
        Ok(())
    }

    /// Get a tag value by key
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Get a field value by key
    pub fn get_field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Tags sorted by key, the order the server stores them in
    pub fn sorted_tags(&self) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self.tags.iter().collect();
        tags.sort();
        tags
    }
}
