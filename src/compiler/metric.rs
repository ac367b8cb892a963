//! Metric compilation, including the last-value join and percentile rewrite

use super::alias::AliasGenerator;
use super::error::CompileError;
use super::group::CompiledGroup;
use super::Context;
use crate::dialect::Dialect;
use crate::plan::{
    Aggregation, BinaryOperator, Expr, Join, JoinType, Literal, Relation, Select, SelectItem,
    SortKey, TableRef, WindowFunction,
};
use crate::query::{FieldType, Metric, SortDirection};

const NUMERIC_SENTINEL: i64 = -999_999_999;
const STRING_SENTINEL: &str = "__NULL__";

/// Alias of the derived table produced by the percentile rewrite
pub(crate) const PERCENTILE_ALIAS: &str = "p";
/// Alias of the base table inside last-value sub-selects
pub(crate) const LAST_VALUE_SOURCE_ALIAS: &str = "s";
const MAX_TIME_COLUMN: &str = "max_time";

#[derive(Debug, Clone, PartialEq)]
enum MetricShape {
    Aggregate {
        func: Aggregation,
        field: Option<String>,
    },
    LastValue {
        field: String,
        time_field: String,
        join: usize,
    },
    Percentile {
        field: String,
        margin: f64,
        window: usize,
    },
    Calc {
        expression: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledMetric {
    shape: MetricShape,
    alias: String,
}

/// Row-number and count columns computed once per percentile field
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PercentileWindow {
    field: String,
    rn_alias: String,
    cnt_alias: String,
}

/// Compiled metrics plus the shared structures they depend on
#[derive(Debug, Default)]
pub(crate) struct MetricPlan {
    pub metrics: Vec<CompiledMetric>,
    /// Distinct last-value time fields, in first-use order; index n is join `lv_n`
    pub last_value_times: Vec<String>,
    pub percentile_windows: Vec<PercentileWindow>,
}

impl MetricPlan {
    pub fn has_percentile(&self) -> bool {
        !self.percentile_windows.is_empty()
    }

    pub fn has_last_value(&self) -> bool {
        !self.last_value_times.is_empty()
    }
}

pub(crate) fn compile_metrics(
    metrics: &[Metric],
    ctx: &Context<'_>,
    aliases: &mut AliasGenerator,
) -> Result<MetricPlan, CompileError> {
    let mut plan = MetricPlan::default();
    for metric in metrics {
        for field in metric.fields() {
            if ctx.catalog.get(field).is_some_and(|m| m.is_raw_data_only()) {
                return Err(CompileError::RawDataOnly(field.to_string()));
            }
        }

        let (shape, alias) = match metric {
            Metric::Sum { field } => numeric_aggregate(Aggregation::Sum, "sum", field, ctx)?,
            Metric::Avg { field } => numeric_aggregate(Aggregation::Avg, "avg", field, ctx)?,
            Metric::Min { field } => aggregate(Aggregation::Min, "min", field),
            Metric::Max { field } => aggregate(Aggregation::Max, "max", field),
            Metric::DistinctCount { field } => {
                aggregate(Aggregation::CountDistinct, "distinct_count", field)
            }
            Metric::Count { field: Some(field) } => aggregate(Aggregation::Count, "count", field),
            Metric::Count { field: None } => (
                MetricShape::Aggregate { func: Aggregation::Count, field: None },
                "count_all".to_string(),
            ),
            Metric::LastValue { field, time_field } => {
                let join = match plan.last_value_times.iter().position(|t| t == time_field) {
                    Some(index) => index,
                    None => {
                        plan.last_value_times.push(time_field.clone());
                        plan.last_value_times.len() - 1
                    }
                };
                (
                    MetricShape::LastValue {
                        field: field.clone(),
                        time_field: time_field.clone(),
                        join,
                    },
                    format!("last_value_{}", field),
                )
            }
            Metric::Percentile { field, margin } => {
                if !margin.is_finite() || *margin < 0.0 || *margin > 100.0 {
                    return Err(CompileError::InvalidMetric(format!(
                        "percentile margin for '{}' must be within [0, 100], got {}",
                        field, margin
                    )));
                }
                let window = match plan.percentile_windows.iter().position(|w| &w.field == field) {
                    Some(index) => index,
                    None => {
                        plan.percentile_windows.push(PercentileWindow {
                            field: field.clone(),
                            rn_alias: aliases.generate_for_percentile(&format!("rn_{}", field)),
                            cnt_alias: aliases.generate_for_percentile(&format!("cnt_{}", field)),
                        });
                        plan.percentile_windows.len() - 1
                    }
                };
                (
                    MetricShape::Percentile { field: field.clone(), margin: *margin, window },
                    format!("percentile_{}", field),
                )
            }
            Metric::Calc { expression, name } => {
                if expression.trim().is_empty() {
                    return Err(CompileError::InvalidMetric(
                        "calc metric needs an expression".to_string(),
                    ));
                }
                (
                    MetricShape::Calc { expression: expression.clone() },
                    name.clone().unwrap_or_else(|| "calc".to_string()),
                )
            }
        };

        plan.metrics.push(CompiledMetric {
            shape,
            alias: aliases.generate(&alias)?,
        });
    }
    Ok(plan)
}

fn aggregate(func: Aggregation, prefix: &str, field: &str) -> (MetricShape, String) {
    (
        MetricShape::Aggregate { func, field: Some(field.to_string()) },
        format!("{}_{}", prefix, field),
    )
}

fn numeric_aggregate(
    func: Aggregation,
    prefix: &str,
    field: &str,
    ctx: &Context<'_>,
) -> Result<(MetricShape, String), CompileError> {
    let actual = ctx.catalog.field_type(field);
    if !(actual.is_numeric() || actual == FieldType::Unknown) {
        return Err(CompileError::TypeMismatch {
            field: field.to_string(),
            expected: FieldType::Double,
            actual,
        });
    }
    Ok(aggregate(func, prefix, field))
}

impl CompiledMetric {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn select_item(&self, outer: &TableRef, windows: &[PercentileWindow]) -> SelectItem {
        SelectItem::aliased(self.expr(outer, windows), self.alias.clone())
    }

    fn expr(&self, outer: &TableRef, windows: &[PercentileWindow]) -> Expr {
        match &self.shape {
            MetricShape::Aggregate { func, field: None } => Expr::Aggregate { func: *func, arg: None },
            MetricShape::Aggregate { func, field: Some(field) } => {
                Expr::aggregate(*func, outer.column(field))
            }
            MetricShape::LastValue { field, time_field, join } => {
                let latest = TableRef::new(last_value_alias(*join)).column(MAX_TIME_COLUMN);
                Expr::aggregate(
                    Aggregation::Max,
                    Expr::when_else_null(
                        Expr::binary(outer.column(time_field), BinaryOperator::Eq, latest),
                        outer.column(field),
                    ),
                )
            }
            MetricShape::Percentile { field, margin, window } => {
                let window = &windows[*window];
                let rank = Expr::Multiply(
                    Box::new(Expr::Divide(
                        Box::new(outer.column(&window.rn_alias)),
                        Box::new(outer.column(&window.cnt_alias)),
                    )),
                    Box::new(Expr::int(100)),
                );
                Expr::aggregate(
                    Aggregation::Min,
                    Expr::when_else_null(
                        Expr::binary(rank, BinaryOperator::GtEq, Expr::Literal(Literal::Float(*margin))),
                        outer.column(field),
                    ),
                )
            }
            MetricShape::Calc { expression } => Expr::Sql(expression.clone()),
        }
    }
}

fn last_value_alias(index: usize) -> String {
    format!("lv_{}", index)
}

/// Derived table for the percentile rewrite
///
/// `SELECT t.*, ROW_NUMBER() OVER (...) AS rn_x, COUNT(*) OVER (...) AS cnt_x FROM base AS t WHERE ...`
pub(crate) fn percentile_source(
    base: Relation,
    filter: Option<Expr>,
    groups: &[CompiledGroup],
    windows: &[PercentileWindow],
    dialect: Dialect,
) -> Relation {
    let inner = base.table_ref();
    let partition_by: Vec<Expr> = groups.iter().map(|g| g.expr(&inner, dialect)).collect();

    let mut select = Select::new(base);
    select.items.push(SelectItem::new(Expr::Wildcard(inner.clone())));
    for window in windows {
        select.items.push(SelectItem::aliased(
            Expr::Window {
                func: WindowFunction::RowNumber,
                partition_by: partition_by.clone(),
                order_by: vec![SortKey {
                    expr: inner.column(&window.field),
                    direction: SortDirection::Asc,
                }],
            },
            window.rn_alias.clone(),
        ));
        select.items.push(SelectItem::aliased(
            Expr::Window {
                func: WindowFunction::CountAll,
                partition_by: partition_by.clone(),
                order_by: Vec::new(),
            },
            window.cnt_alias.clone(),
        ));
    }
    select.filter = filter;

    Relation::Derived {
        select: Box::new(select),
        alias: PERCENTILE_ALIAS.to_string(),
    }
}

/// `LEFT JOIN (SELECT <groups>, MAX(time) AS max_time FROM base AS s WHERE ... GROUP BY <groups>) AS lv_n ON ...`
///
/// `source` is the base relation aliased `s`, `filter` the request filters
/// bound to it. The join predicate matches groups null-safely through
/// COALESCE sentinels chosen from each group's output type.
pub(crate) fn last_value_join(
    index: usize,
    time_field: &str,
    source: Relation,
    filter: Option<Expr>,
    groups: &[CompiledGroup],
    outer: &TableRef,
    dialect: Dialect,
) -> Join {
    let inner = source.table_ref();
    let alias = last_value_alias(index);
    let joined = TableRef::new(alias.clone());

    let mut select = Select::new(source);
    let mut on = Vec::with_capacity(groups.len());
    for (i, group) in groups.iter().enumerate() {
        let column = format!("g_{}", i);
        let expr = group.expr(&inner, dialect);
        select.group_by.push(expr.clone());
        select.items.push(SelectItem::aliased(expr, column.clone()));

        let sentinel = sentinel_for(group.output_type(), dialect);
        on.push(Expr::binary(
            Expr::Coalesce(vec![group.expr(outer, dialect), sentinel.clone()]),
            BinaryOperator::Eq,
            Expr::Coalesce(vec![joined.column(&column), sentinel]),
        ));
    }
    select.items.push(SelectItem::aliased(
        Expr::aggregate(Aggregation::Max, inner.column(time_field)),
        MAX_TIME_COLUMN,
    ));
    select.filter = filter;

    let on = if on.is_empty() {
        Expr::binary(Expr::int(1), BinaryOperator::Eq, Expr::int(1))
    } else {
        Expr::And(on)
    };

    Join {
        join_type: JoinType::Left,
        relation: Relation::Derived { select: Box::new(select), alias },
        on,
    }
}

fn sentinel_for(output_type: FieldType, dialect: Dialect) -> Expr {
    match output_type {
        FieldType::Integer | FieldType::Double => Expr::int(NUMERIC_SENTINEL),
        FieldType::Date => dialect.timestamp_sentinel(),
        FieldType::String | FieldType::Unknown => Expr::string(STRING_SENTINEL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FieldCatalog, FieldFlag, FieldMetadata};

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldMetadata::new("amount", FieldType::Double),
            FieldMetadata::new("name", FieldType::String),
            FieldMetadata::new("ssn", FieldType::String).with_flag(FieldFlag::RawDataOnly),
        ])
    }

    fn compile(metrics: &[Metric]) -> Result<MetricPlan, CompileError> {
        let catalog = catalog();
        let ctx = Context { catalog: &catalog, dialect: Dialect::Postgres };
        compile_metrics(metrics, &ctx, &mut AliasGenerator::default())
    }

    #[test]
    fn test_metric_aliases() {
        let plan = compile(&[
            Metric::sum("amount"),
            Metric::sum("amount"),
            Metric::count_all(),
            Metric::DistinctCount { field: "name".into() },
            Metric::Calc { expression: "SUM(a) / SUM(b)".into(), name: Some("ratio".into()) },
            Metric::Calc { expression: "COUNT(*)".into(), name: None },
        ])
        .unwrap();
        let aliases: Vec<_> = plan.metrics.iter().map(|m| m.alias()).collect();
        assert_eq!(
            aliases,
            vec!["sum_amount", "sum_amount_1", "count_all", "distinct_count_name", "ratio", "calc"]
        );
    }

    #[test]
    fn test_count_all_has_no_argument() {
        let plan = compile(&[Metric::count_all()]).unwrap();
        let item = plan.metrics[0].select_item(&TableRef::unqualified(), &plan.percentile_windows);
        assert_eq!(item.expr, Expr::Aggregate { func: Aggregation::Count, arg: None });
    }

    #[test]
    fn test_sum_of_string_rejected() {
        let err = compile(&[Metric::sum("name")]).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn test_percentile_margin_bounds() {
        assert!(compile(&[Metric::percentile("amount", 0.0)]).is_ok());
        assert!(compile(&[Metric::percentile("amount", 100.0)]).is_ok());
        for margin in [-1.0, 100.5, f64::NAN] {
            let err = compile(&[Metric::percentile("amount", margin)]).unwrap_err();
            assert!(matches!(err, CompileError::InvalidMetric(_)));
        }
    }

    #[test]
    fn test_percentile_windows_shared_per_field() {
        let plan = compile(&[
            Metric::percentile("amount", 50.0),
            Metric::percentile("amount", 90.0),
        ])
        .unwrap();
        assert_eq!(plan.percentile_windows.len(), 1);
        assert_eq!(plan.metrics[1].alias(), "percentile_amount_1");
        assert!(plan.has_percentile());
    }

    #[test]
    fn test_last_value_joins_shared_per_time_field() {
        let plan = compile(&[
            Metric::last_value("amount", "created"),
            Metric::last_value("name", "created"),
            Metric::last_value("amount", "updated"),
        ])
        .unwrap();
        assert_eq!(plan.last_value_times, vec!["created".to_string(), "updated".to_string()]);
        assert!(plan.has_last_value());
    }

    #[test]
    fn test_raw_data_only_not_aggregated() {
        let err = compile(&[Metric::Count { field: Some("ssn".into()) }]).unwrap_err();
        assert!(matches!(err, CompileError::RawDataOnly(_)));
    }

    #[test]
    fn test_ungrouped_last_value_join_on_true() {
        let source = Relation::Table {
            schema: "public".into(),
            table: "orders".into(),
            alias: Some(LAST_VALUE_SOURCE_ALIAS.into()),
        };
        let join = last_value_join(0, "created", source, None, &[], &TableRef::new("t"), Dialect::Postgres);
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.on, Expr::binary(Expr::int(1), BinaryOperator::Eq, Expr::int(1)));
    }

    #[test]
    fn test_sentinels_follow_output_type() {
        assert_eq!(sentinel_for(FieldType::Integer, Dialect::Postgres), Expr::int(-999_999_999));
        assert_eq!(sentinel_for(FieldType::String, Dialect::Postgres), Expr::string("__NULL__"));
        assert_eq!(
            sentinel_for(FieldType::Date, Dialect::MySql),
            Dialect::MySql.timestamp_sentinel()
        );
    }
}
