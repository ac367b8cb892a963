//! Whole-field statistics

use super::alias::AliasGenerator;
use super::error::CompileError;
use super::Context;
use crate::plan::{Aggregation, Expr, SelectItem, TableRef};
use crate::query::{Stat, StatKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledStat {
    field: String,
    kind: StatKind,
    alias: String,
}

pub(crate) fn compile_stat(
    stat: &Stat,
    ctx: &Context<'_>,
    aliases: &mut AliasGenerator,
) -> Result<CompiledStat, CompileError> {
    if ctx.catalog.get(&stat.field).is_some_and(|m| m.is_raw_data_only()) {
        return Err(CompileError::RawDataOnly(stat.field.clone()));
    }
    Ok(CompiledStat {
        field: stat.field.clone(),
        kind: stat.kind,
        alias: aliases.generate(&format!("{}_{}", stat.kind.as_str(), stat.field))?,
    })
}

impl CompiledStat {
    pub fn select_item(&self, table: &TableRef) -> SelectItem {
        let column = table.column(&self.field);
        let expr = match self.kind {
            StatKind::Min => Expr::aggregate(Aggregation::Min, column),
            StatKind::Max => Expr::aggregate(Aggregation::Max, column),
            StatKind::Count => Expr::aggregate(Aggregation::Count, column),
            StatKind::DistinctCount => Expr::aggregate(Aggregation::CountDistinct, column),
            StatKind::NullCount => Expr::aggregate(
                Aggregation::Sum,
                Expr::Case {
                    when_then: vec![(Expr::IsNull(Box::new(column)), Expr::int(1))],
                    else_result: Some(Box::new(Expr::int(0))),
                },
            ),
        };
        SelectItem::aliased(expr, self.alias.clone())
    }
}
