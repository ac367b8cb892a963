//! Field metadata: declared types, time encodings and flags

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Declared type of a source field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Double,
    /// Variable-length string
    String,
    /// Date or timestamp
    Date,
    /// Type could not be determined
    #[default]
    Unknown,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Double => write!(f, "DOUBLE"),
            FieldType::String => write!(f, "STRING"),
            FieldType::Date => write!(f, "DATE"),
            FieldType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Error when parsing a field type string
#[derive(Debug, Clone)]
pub struct ParseFieldTypeError {
    pub input: String,
}

impl fmt::Display for ParseFieldTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown field type '{}'. Valid options: INTEGER, DOUBLE, STRING, DATE, UNKNOWN",
            self.input
        )
    }
}

impl std::error::Error for ParseFieldTypeError {}

impl FromStr for FieldType {
    type Err = ParseFieldTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "long" | "bigint" => Ok(FieldType::Integer),
            "double" | "float" | "decimal" | "number" => Ok(FieldType::Double),
            "string" | "text" | "varchar" => Ok(FieldType::String),
            "date" | "datetime" | "timestamp" => Ok(FieldType::Date),
            "unknown" => Ok(FieldType::Unknown),
            _ => Err(ParseFieldTypeError { input: s.to_string() }),
        }
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FieldType::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FieldType {
    /// Check if this is a numeric type
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Double)
    }
}

/// How a time value is physically encoded in its column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePattern {
    /// Integer column holding only the year, e.g. 2024
    #[serde(alias = "year_only")]
    Year,
    /// Integer column holding seconds since the Unix epoch
    #[serde(alias = "seconds")]
    EpochSeconds,
    /// Integer column holding milliseconds since the Unix epoch
    #[serde(alias = "millis")]
    EpochMillis,
}

/// Optional field flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldFlag {
    /// Field holds a playable media reference
    Playable,
    /// Field is a partition key of the source table
    Partition,
    /// Field may only appear in raw (non-aggregated) queries
    RawDataOnly,
}

/// Metadata describing one source field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldMetadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Free-form connector parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Physical time encoding, if the field is a time field stored as a number
    pub time_pattern: Option<TimePattern>,
    #[serde(default)]
    pub flags: Vec<FieldFlag>,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            params: HashMap::new(),
            time_pattern: None,
            flags: Vec::new(),
        }
    }

    pub fn with_time_pattern(mut self, pattern: TimePattern) -> Self {
        self.time_pattern = Some(pattern);
        self
    }

    pub fn with_flag(mut self, flag: FieldFlag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    pub fn has_flag(&self, flag: FieldFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_raw_data_only(&self) -> bool {
        self.has_flag(FieldFlag::RawDataOnly)
    }
}

/// Field metadata indexed by field name
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: HashMap<String, FieldMetadata>,
}

impl FieldCatalog {
    pub fn new(fields: impl IntoIterator<Item = FieldMetadata>) -> Self {
        Self {
            fields: fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    /// Declared type of a field, `Unknown` when the field has no metadata
    pub fn field_type(&self, name: &str) -> FieldType {
        self.get(name).map(|f| f.field_type).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'de> Deserialize<'de> for FieldCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            fields: Vec<FieldMetadata>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(FieldCatalog::new(raw.fields))
    }
}
