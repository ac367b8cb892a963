//! ORDER BY resolution

use std::collections::HashSet;

use super::error::CompileError;
use super::group::CompiledGroup;
use super::metric::CompiledMetric;
use crate::plan::{Column, Expr, SortKey, TableRef};
use crate::query::{Sort, SortTarget};

/// Indices of groups referenced by aggregate sorts; those groups need an alias
pub(crate) fn sorted_groups(sorts: &[Sort]) -> HashSet<usize> {
    sorts
        .iter()
        .filter_map(|sort| match sort {
            Sort::Agg(agg) => match agg.target {
                SortTarget::Group(index) => Some(index),
                SortTarget::Metric(_) => None,
            },
            Sort::Raw(_) => None,
        })
        .collect()
}

/// Raw sorts order by source columns; aggregate sorts by the unqualified
/// output alias of the group or metric they point at.
pub(crate) fn compile_sorts(
    sorts: &[Sort],
    groups: &[CompiledGroup],
    metrics: &[CompiledMetric],
    table: &TableRef,
) -> Result<Vec<SortKey>, CompileError> {
    sorts
        .iter()
        .map(|sort| match sort {
            Sort::Raw(raw) => Ok(SortKey {
                expr: table.column(&raw.field),
                direction: raw.direction,
            }),
            Sort::Agg(agg) => {
                let alias = match agg.target {
                    SortTarget::Group(index) => groups.get(index).and_then(|g| g.alias()),
                    SortTarget::Metric(index) => metrics.get(index).map(|m| m.alias()),
                }
                .ok_or(CompileError::UnresolvedSort(agg.target))?;
                Ok(SortKey {
                    expr: Expr::Column(Column::unqualified(alias)),
                    direction: agg.direction,
                })
            }
        })
        .collect()
}
