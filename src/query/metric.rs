//! Metric (aggregate) and field statistics types

use serde::{Deserialize, Serialize};

/// An aggregate computed per group
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metric {
    Sum { field: String },
    Min { field: String },
    Max { field: String },
    Avg { field: String },
    /// `COUNT(*)` when no field is given
    Count {
        #[serde(default)]
        field: Option<String>,
    },
    DistinctCount { field: String },
    /// Value of `field` on the row with the greatest `time_field`
    LastValue { field: String, time_field: String },
    /// Smallest value such that at least `margin` percent of rows are <= it
    #[serde(alias = "percentiles")]
    Percentile { field: String, margin: f64 },
    /// Raw aggregate SQL inserted verbatim
    Calc {
        expression: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl Metric {
    pub fn sum(field: impl Into<String>) -> Self {
        Metric::Sum { field: field.into() }
    }

    pub fn count_all() -> Self {
        Metric::Count { field: None }
    }

    pub fn last_value(field: impl Into<String>, time_field: impl Into<String>) -> Self {
        Metric::LastValue { field: field.into(), time_field: time_field.into() }
    }

    pub fn percentile(field: impl Into<String>, margin: f64) -> Self {
        Metric::Percentile { field: field.into(), margin }
    }

    /// Source fields read by this metric
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Metric::Sum { field }
            | Metric::Min { field }
            | Metric::Max { field }
            | Metric::Avg { field }
            | Metric::DistinctCount { field }
            | Metric::Percentile { field, .. } => vec![field.as_str()],
            Metric::Count { field } => field.iter().map(|f| f.as_str()).collect(),
            Metric::LastValue { field, time_field } => vec![field.as_str(), time_field.as_str()],
            Metric::Calc { .. } => Vec::new(),
        }
    }

    pub fn is_percentile(&self) -> bool {
        matches!(self, Metric::Percentile { .. })
    }
}

/// Statistic computed over a whole field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Min,
    Max,
    Count,
    DistinctCount,
    NullCount,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Min => "min",
            StatKind::Max => "max",
            StatKind::Count => "count",
            StatKind::DistinctCount => "distinct_count",
            StatKind::NullCount => "null_count",
        }
    }
}

/// A per-field statistic request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Stat {
    pub field: String,
    pub kind: StatKind,
}

impl Stat {
    pub fn new(field: impl Into<String>, kind: StatKind) -> Self {
        Self { field: field.into(), kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_metrics() {
        let json = r#"[
            {"type": "sum", "field": "amount"},
            {"type": "count"},
            {"type": "last_value", "field": "status", "time_field": "updated"},
            {"type": "percentiles", "field": "latency", "margin": 95},
            {"type": "calc", "expression": "SUM(a) / SUM(b)"}
        ]"#;
        let metrics: Vec<Metric> = serde_json::from_str(json).unwrap();
        assert_eq!(metrics[0], Metric::sum("amount"));
        assert_eq!(metrics[1], Metric::count_all());
        assert_eq!(metrics[2].fields(), vec!["status", "updated"]);
        assert_eq!(metrics[3], Metric::percentile("latency", 95.0));
        assert!(metrics[3].is_percentile());
        assert!(metrics[4].fields().is_empty());
    }
}
