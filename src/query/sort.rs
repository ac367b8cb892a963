//! Sort types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort on a raw field of a non-aggregated query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawSort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// What an aggregate sort orders by: a position in the request's groups or metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortTarget {
    Group(usize),
    Metric(usize),
}

/// Sort on a previously supplied group or metric
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggSort {
    #[serde(flatten)]
    pub target: SortTarget,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sort {
    Raw(RawSort),
    Agg(AggSort),
}

impl Sort {
    pub fn raw(field: impl Into<String>, direction: SortDirection) -> Self {
        Sort::Raw(RawSort { field: field.into(), direction })
    }

    pub fn by_group(index: usize, direction: SortDirection) -> Self {
        Sort::Agg(AggSort { target: SortTarget::Group(index), direction })
    }

    pub fn by_metric(index: usize, direction: SortDirection) -> Self {
        Sort::Agg(AggSort { target: SortTarget::Metric(index), direction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_sorts() {
        let json = r#"[
            {"type": "raw", "field": "name", "direction": "desc"},
            {"type": "agg", "group": 1},
            {"type": "agg", "metric": 0, "direction": "DESC"}
        ]"#;
        let sorts: Vec<Sort> = serde_json::from_str(json).unwrap();
        assert_eq!(sorts[0], Sort::raw("name", SortDirection::Desc));
        assert_eq!(sorts[1], Sort::by_group(1, SortDirection::Asc));
        assert_eq!(sorts[2], Sort::by_metric(0, SortDirection::Desc));
    }
}
