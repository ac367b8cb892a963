//! Compiler errors

use std::fmt;

use crate::emitter::EmitError;
use crate::query::{FieldType, Granularity, SortTarget};

/// Errors raised while compiling a structured query. All of them are fatal.
#[derive(Debug)]
pub enum CompileError {
    /// Request shape is invalid (missing clauses, conflicting sorts, ...)
    InvalidQuery(String),
    /// Field metadata is required but absent
    UnknownField(String),
    /// Declared or required type disagrees with the field metadata
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },
    /// Filter kind cannot be applied to the given type
    UnsupportedFilter { kind: String, field_type: FieldType },
    /// Literal could not be parsed as the declared type
    InvalidLiteral {
        field: String,
        value: String,
        field_type: FieldType,
    },
    /// Histogram parameters violate `start < end`, `bucket_size > 0`, `end - start > bucket_size`
    InvalidHistogram {
        field: String,
        start: f64,
        end: f64,
        bucket_size: f64,
    },
    /// Field type / time pattern combination cannot be turned into a timestamp
    UnsupportedTimeSource { field: String, reason: String },
    /// Granularity not available for the field's time encoding
    UnsupportedGranularity { field: String, granularity: Granularity },
    /// Metric parameters are invalid
    InvalidMetric(String),
    /// Field is flagged RAW_DATA_ONLY but used in an aggregation
    RawDataOnly(String),
    /// Aggregate sort references a group or metric that was not compiled
    UnresolvedSort(SortTarget),
    /// Too many aliases generated from one name
    AliasExhausted(String),
    /// Rendering failed
    Emit(EmitError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            CompileError::UnknownField(name) => write!(f, "No metadata for field '{}'", name),
            CompileError::TypeMismatch { field, expected, actual } => write!(
                f,
                "Field '{}' has type {} but {} was expected",
                field, actual, expected
            ),
            CompileError::UnsupportedFilter { kind, field_type } => {
                write!(f, "Filter '{}' is not supported for type {}", kind, field_type)
            }
            CompileError::InvalidLiteral { field, value, field_type } => write!(
                f,
                "Value '{}' for field '{}' is not a valid {}",
                value, field, field_type
            ),
            CompileError::InvalidHistogram { field, start, end, bucket_size } => write!(
                f,
                "Invalid histogram on '{}': start={}, end={}, bucket_size={} (need start < end, bucket_size > 0 and at least one full bucket)",
                field, start, end, bucket_size
            ),
            CompileError::UnsupportedTimeSource { field, reason } => {
                write!(f, "Field '{}' cannot be used as time: {}", field, reason)
            }
            CompileError::UnsupportedGranularity { field, granularity } => write!(
                f,
                "Granularity '{}' is not supported for field '{}'",
                granularity, field
            ),
            CompileError::InvalidMetric(msg) => write!(f, "Invalid metric: {}", msg),
            CompileError::RawDataOnly(field) => {
                write!(f, "Field '{}' is raw-data-only and cannot be aggregated", field)
            }
            CompileError::UnresolvedSort(target) => match target {
                SortTarget::Group(i) => write!(f, "Sort references unknown group #{}", i),
                SortTarget::Metric(i) => write!(f, "Sort references unknown metric #{}", i),
            },
            CompileError::AliasExhausted(name) => {
                write!(f, "Alias counter exhausted for '{}'", name)
            }
            CompileError::Emit(err) => write!(f, "SQL rendering failed: {}", err),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Emit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EmitError> for CompileError {
    fn from(err: EmitError) -> Self {
        CompileError::Emit(err)
    }
}
