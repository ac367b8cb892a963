//! Query builder and the compiled query specification

use tracing::debug;

use super::alias::AliasGenerator;
use super::error::CompileError;
use super::filter::compile_filters;
use super::group::compile_group;
use super::metric::{compile_metrics, last_value_join, percentile_source, LAST_VALUE_SOURCE_ALIAS};
use super::sort::{compile_sorts, sorted_groups};
use super::stats::compile_stat;
use super::{CompileOptions, Context};
use crate::emitter::emit_sql;
use crate::plan::{ParametrizedQuery, Relation, Select, SelectItem};
use crate::query::{
    AggSort, FieldCatalog, Filter, Group, Metric, QueryKind, QueryRequest, RawSort, Sort, Stat,
};

/// Alias of the base relation whenever it is joined, wrapped or user supplied
const BASE_ALIAS: &str = "t";

/// Where rows are read from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A physical table, `schema.table`
    Table { schema: String, table: String },
    /// Caller supplied SQL used as a sub-select
    CustomSql(String),
}

impl Source {
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Source::Table { schema: schema.into(), table: table.into() }
    }

    pub fn custom_sql(sql: impl Into<String>) -> Self {
        Source::CustomSql(sql.into())
    }

    /// Relation for this source; custom SQL always needs an alias
    fn relation(&self, alias: Option<&str>) -> Relation {
        match self {
            Source::Table { schema, table } => Relation::Table {
                schema: schema.clone(),
                table: table.clone(),
                alias: alias.map(str::to_string),
            },
            Source::CustomSql(sql) => Relation::CustomSql {
                sql: sql.clone(),
                alias: alias.unwrap_or(BASE_ALIAS).to_string(),
            },
        }
    }

    fn validate(&self) -> Result<(), CompileError> {
        match self {
            Source::Table { schema, table } if schema.trim().is_empty() || table.trim().is_empty() => {
                Err(CompileError::InvalidQuery(
                    "schema and table names must not be empty".to_string(),
                ))
            }
            Source::CustomSql(sql) if sql.trim().is_empty() => Err(CompileError::InvalidQuery(
                "custom SQL must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Accumulates the clauses of a structured query
///
/// Every `with_*` call returns the updated builder; `build` validates the
/// combination and freezes it into a [`QuerySpec`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    source: Source,
    catalog: FieldCatalog,
    kind: Option<QueryKind>,
    fields: Vec<String>,
    filters: Vec<Filter>,
    groups: Vec<Group>,
    metrics: Vec<Metric>,
    stats: Vec<Stat>,
    sorts: Vec<Sort>,
    offset: Option<u64>,
    limit: Option<u64>,
    distinct: bool,
}

impl QueryBuilder {
    pub fn new(source: Source, catalog: FieldCatalog) -> Self {
        Self {
            source,
            catalog,
            kind: None,
            fields: Vec::new(),
            filters: Vec::new(),
            groups: Vec::new(),
            metrics: Vec::new(),
            stats: Vec::new(),
            sorts: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    /// Declare the expected query shape; checked by `build`
    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = Group>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = Metric>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn with_stats(mut self, stats: impl IntoIterator<Item = Stat>) -> Self {
        self.stats.extend(stats);
        self
    }

    pub fn with_raw_sorts(mut self, sorts: impl IntoIterator<Item = RawSort>) -> Self {
        self.sorts.extend(sorts.into_iter().map(Sort::Raw));
        self
    }

    pub fn with_agg_sorts(mut self, sorts: impl IntoIterator<Item = AggSort>) -> Self {
        self.sorts.extend(sorts.into_iter().map(Sort::Agg));
        self
    }

    pub fn with_sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.sorts.extend(sorts);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Validate the clause combination
    pub fn build(self) -> Result<QuerySpec, CompileError> {
        self.source.validate()?;

        let aggregated = !self.groups.is_empty() || !self.metrics.is_empty() || !self.stats.is_empty();
        if self.fields.is_empty() && !aggregated {
            return Err(CompileError::InvalidQuery(
                "query needs at least one field, group, metric or stat".to_string(),
            ));
        }
        if !self.fields.is_empty() && aggregated {
            return Err(CompileError::InvalidQuery(
                "raw fields cannot be combined with groups, metrics or stats".to_string(),
            ));
        }
        if !self.stats.is_empty() && !self.groups.is_empty() {
            return Err(CompileError::InvalidQuery(
                "stats are computed over whole fields and cannot be grouped".to_string(),
            ));
        }
        if self.fields.iter().any(|f| f.trim().is_empty()) {
            return Err(CompileError::InvalidQuery("field names must not be empty".to_string()));
        }

        let has_raw_sort = self.sorts.iter().any(|s| matches!(s, Sort::Raw(_)));
        let has_agg_sort = self.sorts.iter().any(|s| matches!(s, Sort::Agg(_)));
        if has_raw_sort && has_agg_sort {
            return Err(CompileError::InvalidQuery(
                "raw and aggregate sorts are mutually exclusive".to_string(),
            ));
        }
        if has_raw_sort && aggregated {
            return Err(CompileError::InvalidQuery(
                "raw sorts apply to raw queries only".to_string(),
            ));
        }
        if has_agg_sort && !aggregated {
            return Err(CompileError::InvalidQuery(
                "aggregate sorts apply to aggregated queries only".to_string(),
            ));
        }

        if let Some(kind) = self.kind {
            let matches_kind = match kind {
                QueryKind::Raw => !self.fields.is_empty(),
                QueryKind::Agg => !self.groups.is_empty() || !self.metrics.is_empty(),
                QueryKind::Stats => {
                    !self.stats.is_empty() && self.groups.is_empty() && self.metrics.is_empty()
                }
            };
            if !matches_kind {
                return Err(CompileError::InvalidQuery(format!(
                    "clauses do not match query type {:?}",
                    kind
                )));
            }
        }

        Ok(QuerySpec {
            source: self.source,
            catalog: self.catalog,
            fields: self.fields,
            filters: self.filters,
            groups: self.groups,
            metrics: self.metrics,
            stats: self.stats,
            sorts: self.sorts,
            offset: self.offset,
            limit: self.limit,
            distinct: self.distinct,
        })
    }
}

impl QueryRequest {
    /// Builder pre-populated with this request's clauses
    pub fn into_builder(self, source: Source, catalog: FieldCatalog) -> QueryBuilder {
        let mut builder = QueryBuilder::new(source, catalog)
            .with_fields(self.fields)
            .with_filters(self.filters)
            .with_groups(self.groups)
            .with_metrics(self.metrics)
            .with_stats(self.stats)
            .with_sorts(self.sorts)
            .distinct(self.distinct);
        if let Some(kind) = self.kind {
            builder = builder.with_kind(kind);
        }
        if let Some(offset) = self.offset {
            builder = builder.with_offset(offset);
        }
        if let Some(limit) = self.limit {
            builder = builder.with_limit(limit);
        }
        builder
    }
}

/// A validated, immutable structured query
///
/// Compilation is pure: the same spec and options always produce the same
/// SQL text and parameter list.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    source: Source,
    catalog: FieldCatalog,
    fields: Vec<String>,
    filters: Vec<Filter>,
    groups: Vec<Group>,
    metrics: Vec<Metric>,
    stats: Vec<Stat>,
    sorts: Vec<Sort>,
    offset: Option<u64>,
    limit: Option<u64>,
    distinct: bool,
}

impl QuerySpec {
    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn compile(&self, options: &CompileOptions) -> Result<ParametrizedQuery, CompileError> {
        let ctx = Context { catalog: &self.catalog, dialect: options.dialect };
        let mut aliases = AliasGenerator::new(options.max_alias_length);
        let select = self.plan(&ctx, &mut aliases)?;
        let query = emit_sql(&select, options.dialect)?;
        debug!(
            dialect = %options.dialect,
            params = query.params().len(),
            sql = query.sql(),
            "Compiled query"
        );
        Ok(query)
    }

    fn plan(&self, ctx: &Context<'_>, aliases: &mut AliasGenerator) -> Result<Select, CompileError> {
        let dialect = ctx.dialect;

        let sorted = sorted_groups(&self.sorts);
        let groups = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, group)| compile_group(group, ctx, sorted.contains(&i), aliases))
            .collect::<Result<Vec<_>, _>>()?;
        let metrics = compile_metrics(&self.metrics, ctx, aliases)?;
        let stats = self
            .stats
            .iter()
            .map(|stat| compile_stat(stat, ctx, aliases))
            .collect::<Result<Vec<_>, _>>()?;

        let needs_alias = matches!(self.source, Source::CustomSql(_))
            || metrics.has_percentile()
            || metrics.has_last_value();
        let base = self.source.relation(needs_alias.then_some(BASE_ALIAS));
        let filter = compile_filters(&self.filters, &base.table_ref(), ctx)?;

        // with percentiles the filters move inside the derived table
        let (from, filter) = if metrics.has_percentile() {
            let derived = percentile_source(base, filter, &groups, &metrics.percentile_windows, dialect);
            (derived, None)
        } else {
            (base, filter)
        };
        let outer = from.table_ref();

        let mut select = Select::new(from);
        select.distinct = self.distinct;
        select.filter = filter;

        for field in &self.fields {
            select.items.push(SelectItem::new(outer.column(field)));
        }
        for group in &groups {
            select.items.push(group.select_item(&outer, dialect));
            select.group_by.push(group.expr(&outer, dialect));
        }
        for metric in &metrics.metrics {
            select.items.push(metric.select_item(&outer, &metrics.percentile_windows));
        }
        for stat in &stats {
            select.items.push(stat.select_item(&outer));
        }

        for (index, time_field) in metrics.last_value_times.iter().enumerate() {
            let source = self.source.relation(Some(LAST_VALUE_SOURCE_ALIAS));
            let filter = compile_filters(&self.filters, &source.table_ref(), ctx)?;
            select.joins.push(last_value_join(
                index, time_field, source, filter, &groups, &outer, dialect,
            ));
        }

        select.order_by = compile_sorts(&self.sorts, &groups, &metrics.metrics, &outer)?;
        select.limit = self.limit;
        select.offset = self.offset;
        Ok(select)
    }
}
