//! Filter tree types

use serde::{Deserialize, Deserializer, Serialize};
use super::field::FieldType;

/// A recursive filter over source fields
///
/// Composite kinds combine child filters; leaf kinds compare one field
/// against literal values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
    Eq(LeafFilter),
    /// Case-insensitive string equality
    Eqi(LeafFilter),
    Ge(LeafFilter),
    Gt(LeafFilter),
    Le(LeafFilter),
    Lt(LeafFilter),
    In(LeafFilter),
    IsNull(LeafFilter),
    Contains(LeafFilter),
    TextSearch(LeafFilter),
}

/// Comparison performed by a leaf filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafOp {
    Eq,
    Eqi,
    Ge,
    Gt,
    Le,
    Lt,
    In,
    IsNull,
    Contains,
    TextSearch,
}

impl LeafOp {
    /// Operators that always compare as strings, whatever the declared type
    pub fn is_string_only(&self) -> bool {
        matches!(self, LeafOp::Eqi | LeafOp::Contains | LeafOp::TextSearch)
    }
}

/// Field reference plus literal values of a leaf filter
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LeafFilter {
    pub field_path: String,
    #[serde(default)]
    pub field_type: FieldType,
    /// Literal values as sent by the caller; `value` is accepted for a single literal
    #[serde(default, alias = "value", deserialize_with = "one_or_many")]
    pub values: Vec<String>,
}

impl LeafFilter {
    pub fn new(field_path: impl Into<String>, field_type: FieldType, values: Vec<String>) -> Self {
        Self {
            field_path: field_path.into(),
            field_type,
            values,
        }
    }
}

impl Filter {
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not { filter: Box::new(filter) }
    }

    /// Build a leaf filter of the given kind
    pub fn leaf(op: LeafOp, field: impl Into<String>, field_type: FieldType, values: Vec<String>) -> Self {
        let leaf = LeafFilter::new(field, field_type, values);
        match op {
            LeafOp::Eq => Filter::Eq(leaf),
            LeafOp::Eqi => Filter::Eqi(leaf),
            LeafOp::Ge => Filter::Ge(leaf),
            LeafOp::Gt => Filter::Gt(leaf),
            LeafOp::Le => Filter::Le(leaf),
            LeafOp::Lt => Filter::Lt(leaf),
            LeafOp::In => Filter::In(leaf),
            LeafOp::IsNull => Filter::IsNull(leaf),
            LeafOp::Contains => Filter::Contains(leaf),
            LeafOp::TextSearch => Filter::TextSearch(leaf),
        }
    }

    /// Split a leaf into its operator and operands; `None` for composites
    pub fn as_leaf(&self) -> Option<(LeafOp, &LeafFilter)> {
        match self {
            Filter::And { .. } | Filter::Or { .. } | Filter::Not { .. } => None,
            Filter::Eq(l) => Some((LeafOp::Eq, l)),
            Filter::Eqi(l) => Some((LeafOp::Eqi, l)),
            Filter::Ge(l) => Some((LeafOp::Ge, l)),
            Filter::Gt(l) => Some((LeafOp::Gt, l)),
            Filter::Le(l) => Some((LeafOp::Le, l)),
            Filter::Lt(l) => Some((LeafOp::Lt, l)),
            Filter::In(l) => Some((LeafOp::In, l)),
            Filter::IsNull(l) => Some((LeafOp::IsNull, l)),
            Filter::Contains(l) => Some((LeafOp::Contains, l)),
            Filter::TextSearch(l) => Some((LeafOp::TextSearch, l)),
        }
    }

    /// All leaf filters of this tree, depth first, left to right
    pub fn leaves(&self) -> Vec<&Filter> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }
}

fn collect_leaves<'a>(filter: &'a Filter, out: &mut Vec<&'a Filter>) {
    match filter {
        Filter::And { filters } | Filter::Or { filters } => {
            for child in filters {
                collect_leaves(child, out);
            }
        }
        Filter::Not { filter } => collect_leaves(filter, out),
        leaf => out.push(leaf),
    }
}

/// Flatten a list of filter trees into their leaves
pub fn flatten_filters(filters: &[Filter]) -> Vec<&Filter> {
    filters.iter().flat_map(|f| f.leaves()).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::String(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Scalar>),
    One(Scalar),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(values) => values.into_iter().map(Scalar::into_string).collect(),
        OneOrMany::One(value) => vec![value.into_string()],
    })
}
