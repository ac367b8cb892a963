//! Filter tree compilation

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::error::CompileError;
use super::Context;
use crate::plan::{BinaryOperator, Expr, TableRef, Value};
use crate::query::{FieldType, Filter, LeafFilter, LeafOp};

/// Compile top-level filters into a single WHERE predicate
///
/// Top-level filters are conjoined. Returns `None` when there are none.
pub(crate) fn compile_filters(
    filters: &[Filter],
    table: &TableRef,
    ctx: &Context<'_>,
) -> Result<Option<Expr>, CompileError> {
    let mut conjuncts = filters
        .iter()
        .map(|f| compile_filter(f, table, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match conjuncts.len() {
        0 => None,
        1 => conjuncts.pop(),
        _ => Some(Expr::And(conjuncts)),
    })
}

pub(crate) fn compile_filter(
    filter: &Filter,
    table: &TableRef,
    ctx: &Context<'_>,
) -> Result<Expr, CompileError> {
    match filter {
        Filter::And { filters } => Ok(Expr::And(
            filters
                .iter()
                .map(|f| compile_filter(f, table, ctx))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Filter::Or { filters } => Ok(Expr::Or(
            filters
                .iter()
                .map(|f| compile_filter(f, table, ctx))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Filter::Not { filter } => Ok(Expr::Not(Box::new(compile_filter(filter, table, ctx)?))),
        Filter::Eq(leaf) => compile_leaf(LeafOp::Eq, leaf, table, ctx),
        Filter::Eqi(leaf) => compile_leaf(LeafOp::Eqi, leaf, table, ctx),
        Filter::Ge(leaf) => compile_leaf(LeafOp::Ge, leaf, table, ctx),
        Filter::Gt(leaf) => compile_leaf(LeafOp::Gt, leaf, table, ctx),
        Filter::Le(leaf) => compile_leaf(LeafOp::Le, leaf, table, ctx),
        Filter::Lt(leaf) => compile_leaf(LeafOp::Lt, leaf, table, ctx),
        Filter::In(leaf) => compile_leaf(LeafOp::In, leaf, table, ctx),
        Filter::IsNull(leaf) => compile_leaf(LeafOp::IsNull, leaf, table, ctx),
        Filter::Contains(leaf) => compile_leaf(LeafOp::Contains, leaf, table, ctx),
        Filter::TextSearch(leaf) => compile_leaf(LeafOp::TextSearch, leaf, table, ctx),
    }
}

fn op_name(op: LeafOp) -> &'static str {
    match op {
        LeafOp::Eq => "eq",
        LeafOp::Eqi => "eqi",
        LeafOp::Ge => "ge",
        LeafOp::Gt => "gt",
        LeafOp::Le => "le",
        LeafOp::Lt => "lt",
        LeafOp::In => "in",
        LeafOp::IsNull => "is_null",
        LeafOp::Contains => "contains",
        LeafOp::TextSearch => "text_search",
    }
}

fn compile_leaf(
    op: LeafOp,
    leaf: &LeafFilter,
    table: &TableRef,
    ctx: &Context<'_>,
) -> Result<Expr, CompileError> {
    let column = table.column(&leaf.field_path);

    if op == LeafOp::IsNull {
        return Ok(Expr::IsNull(Box::new(column)));
    }

    if op.is_string_only() {
        let actual = ctx.catalog.field_type(&leaf.field_path);
        if !matches!(actual, FieldType::String | FieldType::Unknown) {
            return Err(CompileError::UnsupportedFilter {
                kind: op_name(op).to_string(),
                field_type: actual,
            });
        }
        let value = single_value(op, leaf)?;
        return Ok(match op {
            LeafOp::Eqi => Expr::binary(
                Expr::function("LOWER", vec![column]),
                BinaryOperator::Eq,
                Expr::function("LOWER", vec![Expr::Param(Value::String(value.to_string()))]),
            ),
            LeafOp::Contains => Expr::binary(
                column,
                BinaryOperator::Like,
                Expr::Param(Value::String(format!("%{}%", escape_like(value)))),
            ),
            _ => ctx
                .dialect
                .text_search(column, Expr::Param(Value::String(value.to_string()))),
        });
    }

    let field_type = resolve_type(op, leaf, ctx)?;
    if op == LeafOp::In {
        if leaf.values.is_empty() {
            return Err(CompileError::InvalidQuery(format!(
                "'in' filter on '{}' needs at least one value",
                leaf.field_path
            )));
        }
        let values = leaf
            .values
            .iter()
            .map(|v| parse_literal(&leaf.field_path, v, field_type).map(Expr::Param))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::In { expr: Box::new(column), values });
    }

    let value = parse_literal(&leaf.field_path, single_value(op, leaf)?, field_type)?;
    let operator = match op {
        LeafOp::Eq => BinaryOperator::Eq,
        LeafOp::Ge => BinaryOperator::GtEq,
        LeafOp::Gt => BinaryOperator::Gt,
        LeafOp::Le => BinaryOperator::LtEq,
        LeafOp::Lt => BinaryOperator::Lt,
        _ => {
            return Err(CompileError::UnsupportedFilter {
                kind: op_name(op).to_string(),
                field_type,
            })
        }
    };
    Ok(Expr::binary(column, operator, Expr::Param(value)))
}

/// Declared type checked against metadata; an UNKNOWN declaration falls back to metadata
fn resolve_type(op: LeafOp, leaf: &LeafFilter, ctx: &Context<'_>) -> Result<FieldType, CompileError> {
    let actual = ctx.catalog.field_type(&leaf.field_path);
    match (leaf.field_type, actual) {
        (FieldType::Unknown, FieldType::Unknown) => Err(CompileError::UnsupportedFilter {
            kind: op_name(op).to_string(),
            field_type: FieldType::Unknown,
        }),
        (FieldType::Unknown, actual) => Ok(actual),
        (declared, FieldType::Unknown) => Ok(declared),
        (declared, actual) if declared == actual => Ok(declared),
        (declared, actual) => Err(CompileError::TypeMismatch {
            field: leaf.field_path.clone(),
            expected: declared,
            actual,
        }),
    }
}

fn single_value(op: LeafOp, leaf: &LeafFilter) -> Result<&str, CompileError> {
    match leaf.values.as_slice() {
        [value] => Ok(value.as_str()),
        values => Err(CompileError::InvalidQuery(format!(
            "'{}' filter on '{}' needs exactly one value, got {}",
            op_name(op),
            leaf.field_path,
            values.len()
        ))),
    }
}

/// Parse a literal according to the field type
pub(crate) fn parse_literal(field: &str, raw: &str, field_type: FieldType) -> Result<Value, CompileError> {
    let invalid = || CompileError::InvalidLiteral {
        field: field.to_string(),
        value: raw.to_string(),
        field_type,
    };
    match field_type {
        FieldType::Integer => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| invalid()),
        FieldType::Double => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Float)
            .ok_or_else(invalid),
        FieldType::String => Ok(Value::String(raw.to_string())),
        FieldType::Date => parse_date(raw.trim()).ok_or_else(invalid),
        FieldType::Unknown => Err(invalid()),
    }
}

/// ISO-8601 date, local date-time, or RFC 3339 timestamp (normalized to UTC)
fn parse_date(raw: &str) -> Option<Value> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Value::Date(date));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Value::Timestamp(ts));
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| Value::Timestamp(ts.naive_utc()))
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
