//! Group compilation: attributes, time buckets and histograms

use super::alias::AliasGenerator;
use super::error::CompileError;
use super::Context;
use crate::dialect::Dialect;
use crate::plan::{BinaryOperator, Expr, Literal, SelectItem, TableRef};
use crate::query::{FieldType, Granularity, Group, TimePattern};

/// Physical representation of a time field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeSource {
    /// DATE or TIMESTAMP column
    Native,
    /// Integer year; never truncated
    Year,
    EpochSeconds,
    EpochMillis,
}

#[derive(Debug, Clone, PartialEq)]
enum GroupShape {
    Attribute,
    Time {
        source: TimeSource,
        granularity: Granularity,
    },
    Histogram {
        points: Vec<f64>,
    },
}

/// A group resolved against field metadata
///
/// Holds no table binding: the same group is rendered against the outer
/// relation, the percentile derived table and last-value sub-selects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledGroup {
    field: String,
    shape: GroupShape,
    alias: Option<String>,
    output_type: FieldType,
}

impl CompiledGroup {
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn output_type(&self) -> FieldType {
        self.output_type
    }

    /// Group expression without alias, usable in GROUP BY and PARTITION BY
    pub fn expr(&self, table: &TableRef, dialect: Dialect) -> Expr {
        let column = table.column(&self.field);
        match &self.shape {
            GroupShape::Attribute => column,
            GroupShape::Time { source, granularity } => match source {
                TimeSource::Year => column,
                TimeSource::Native => dialect.truncate(column, *granularity),
                TimeSource::EpochSeconds => {
                    dialect.truncate(dialect.epoch_seconds_to_timestamp(column), *granularity)
                }
                TimeSource::EpochMillis => {
                    dialect.truncate(dialect.epoch_millis_to_timestamp(column), *granularity)
                }
            },
            GroupShape::Histogram { points } => histogram_case(column, points),
        }
    }

    pub fn select_item(&self, table: &TableRef, dialect: Dialect) -> SelectItem {
        let expr = self.expr(table, dialect);
        match &self.alias {
            Some(alias) => SelectItem::aliased(expr, alias.clone()),
            None => SelectItem::new(expr),
        }
    }
}

/// Resolve a group against metadata
///
/// Attribute groups only get an alias when `needs_alias` is set (an
/// aggregate sort refers to them); time and histogram groups always do.
pub(crate) fn compile_group(
    group: &Group,
    ctx: &Context<'_>,
    needs_alias: bool,
    aliases: &mut AliasGenerator,
) -> Result<CompiledGroup, CompileError> {
    let field = group.field();
    if ctx.catalog.get(field).is_some_and(|m| m.is_raw_data_only()) {
        return Err(CompileError::RawDataOnly(field.to_string()));
    }

    match group {
        Group::Attribute { field } => Ok(CompiledGroup {
            field: field.clone(),
            shape: GroupShape::Attribute,
            alias: if needs_alias { Some(aliases.generate(field)?) } else { None },
            output_type: ctx.catalog.field_type(field),
        }),
        Group::Time { field, granularity } => {
            let source = resolve_time_source(field, ctx)?;
            if source == TimeSource::Year && *granularity != Granularity::Year {
                return Err(CompileError::UnsupportedGranularity {
                    field: field.clone(),
                    granularity: *granularity,
                });
            }
            let alias = aliases.generate(&format!("time_{}_{}", granularity.as_str(), field))?;
            Ok(CompiledGroup {
                field: field.clone(),
                shape: GroupShape::Time { source, granularity: *granularity },
                alias: Some(alias),
                output_type: if source == TimeSource::Year {
                    FieldType::Integer
                } else {
                    FieldType::Date
                },
            })
        }
        Group::Histogram { field, start, end, bucket_size } => {
            let metadata = ctx
                .catalog
                .get(field)
                .ok_or_else(|| CompileError::UnknownField(field.clone()))?;
            if !metadata.field_type.is_numeric() {
                return Err(CompileError::TypeMismatch {
                    field: field.clone(),
                    expected: FieldType::Double,
                    actual: metadata.field_type,
                });
            }
            let points = histogram_points(*start, *end, *bucket_size).ok_or_else(|| {
                CompileError::InvalidHistogram {
                    field: field.clone(),
                    start: *start,
                    end: *end,
                    bucket_size: *bucket_size,
                }
            })?;
            Ok(CompiledGroup {
                field: field.clone(),
                shape: GroupShape::Histogram { points },
                alias: Some(aliases.generate(&format!("hist_{}", field))?),
                output_type: FieldType::String,
            })
        }
    }
}

/// Work out how a time field must be converted before truncation
pub(crate) fn resolve_time_source(field: &str, ctx: &Context<'_>) -> Result<TimeSource, CompileError> {
    let metadata = ctx
        .catalog
        .get(field)
        .ok_or_else(|| CompileError::UnknownField(field.to_string()))?;
    let unsupported = |reason: String| CompileError::UnsupportedTimeSource {
        field: field.to_string(),
        reason,
    };

    match (metadata.time_pattern, metadata.field_type) {
        (None, FieldType::Date) => Ok(TimeSource::Native),
        (None, other) => Err(unsupported(format!(
            "type {} has no time pattern",
            other
        ))),
        (Some(pattern), FieldType::Integer) => Ok(match pattern {
            TimePattern::Year => TimeSource::Year,
            TimePattern::EpochSeconds => TimeSource::EpochSeconds,
            TimePattern::EpochMillis => TimeSource::EpochMillis,
        }),
        (Some(pattern), other) => Err(unsupported(format!(
            "pattern {:?} requires an INTEGER column, found {}",
            pattern, other
        ))),
    }
}

/// Largest number of buckets a histogram group may produce
pub const MAX_HISTOGRAM_BUCKETS: usize = 10_000;

/// Interior bucket boundaries of a histogram
///
/// Points are `start + k * bucket_size` for k >= 1, strictly below `end`.
/// A point falling on `end` (within rounding) is dropped, so the number of
/// buckets is `ceil((end - start) / bucket_size)`. Returns `None` when the
/// parameters do not describe at least one full bucket, ask for more than
/// [`MAX_HISTOGRAM_BUCKETS`] buckets, or cannot be told apart at the
/// precision of `f64`.
pub fn histogram_points(start: f64, end: f64, bucket_size: f64) -> Option<Vec<f64>> {
    if !(start.is_finite() && end.is_finite() && bucket_size.is_finite()) {
        return None;
    }
    if start >= end || bucket_size <= 0.0 || end - start <= bucket_size {
        return None;
    }

    let buckets = ((end - start) / bucket_size - 1e-9).ceil();
    if !buckets.is_finite() || buckets > MAX_HISTOGRAM_BUCKETS as f64 {
        return None;
    }

    let mut points = Vec::with_capacity(buckets as usize);
    let mut previous = start;
    for k in 1..buckets as u64 {
        let point = round_point(start + k as f64 * bucket_size, bucket_size);
        if point <= previous || point >= end {
            return None;
        }
        points.push(point);
        previous = point;
    }
    Some(points)
}

// strip floating noise such as 0.30000000000000004, keeping six significant
// digits below the bucket size
fn round_point(value: f64, bucket_size: f64) -> f64 {
    let exponent = 6 - bucket_size.log10().floor() as i32;
    if exponent <= 0 {
        return value;
    }
    let scale = 10f64.powi(exponent);
    let scaled = value * scale;
    // already integral at this magnitude
    if !scaled.is_finite() || scaled.abs() >= 9.0e15 {
        return value;
    }
    scaled.round() / scale
}

/// `CASE WHEN v IS NULL THEN NULL WHEN v < p1 THEN ';p1' ... ELSE 'pn;' END`
fn histogram_case(value: Expr, points: &[f64]) -> Expr {
    let mut when_then = vec![(Expr::IsNull(Box::new(value.clone())), Expr::null())];
    let mut lower = String::new();
    for point in points {
        let upper = format!("{}", point);
        when_then.push((
            Expr::binary(value.clone(), BinaryOperator::Lt, Expr::Literal(Literal::Float(*point))),
            Expr::string(format!("{};{}", lower, upper)),
        ));
        lower = upper;
    }
    Expr::Case {
        when_then,
        else_result: Some(Box::new(Expr::string(format!("{};", lower)))),
    }
}
