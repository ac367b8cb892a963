//! Group (dimension) types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A grouping dimension of an aggregate query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Group {
    /// Group by the raw value of a field
    Attribute { field: String },
    /// Group by a field truncated to a time granularity
    Time {
        field: String,
        granularity: Granularity,
    },
    /// Group by the numeric bucket a field falls into
    Histogram {
        field: String,
        start: f64,
        end: f64,
        bucket_size: f64,
    },
}

impl Group {
    pub fn attribute(field: impl Into<String>) -> Self {
        Group::Attribute { field: field.into() }
    }

    pub fn time(field: impl Into<String>, granularity: Granularity) -> Self {
        Group::Time { field: field.into(), granularity }
    }

    pub fn histogram(field: impl Into<String>, start: f64, end: f64, bucket_size: f64) -> Self {
        Group::Histogram { field: field.into(), start, end, bucket_size }
    }

    /// The source field this group reads
    pub fn field(&self) -> &str {
        match self {
            Group::Attribute { field } | Group::Time { field, .. } | Group::Histogram { field, .. } => field,
        }
    }
}

/// Time truncation granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    #[serde(alias = "second")]
    Second,
    #[serde(alias = "minute")]
    Minute,
    #[serde(alias = "hour")]
    Hour,
    #[serde(alias = "day")]
    Day,
    #[serde(alias = "week")]
    Week,
    #[serde(alias = "month")]
    Month,
    #[serde(alias = "quarter")]
    Quarter,
    #[serde(alias = "year")]
    Year,
}

impl Granularity {
    /// Lowercase unit name, as used in aliases and `DATE_TRUNC`
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_groups() {
        let json = r#"[
            {"type": "attribute", "field": "country"},
            {"type": "time", "field": "created", "granularity": "MONTH"},
            {"type": "histogram", "field": "price", "start": 0, "end": 100, "bucket_size": 25}
        ]"#;
        let groups: Vec<Group> = serde_json::from_str(json).unwrap();
        assert_eq!(groups[0], Group::attribute("country"));
        assert_eq!(groups[1], Group::time("created", Granularity::Month));
        assert_eq!(groups[2], Group::histogram("price", 0.0, 100.0, 25.0));
        assert_eq!(groups[2].field(), "price");
    }

    #[test]
    fn test_unknown_granularity_rejected() {
        let json = r#"{"type": "time", "field": "created", "granularity": "FORTNIGHT"}"#;
        assert!(serde_json::from_str::<Group>(json).is_err());
    }
}
