//! SQL emitter
//!
//! Transforms a `Select` tree into single-line SQL. Parameters are collected
//! in the order their placeholders appear in the text.

use crate::dialect::Dialect;
use crate::plan::{
    Aggregation, Column, Expr, Join, JoinType, Literal, ParametrizedQuery, Relation, Select,
    SelectItem, SortKey, TableRef, Value, WindowFunction,
};
use super::error::EmitError;

/// Upper bound used where a dialect requires LIMIT alongside OFFSET
const UNBOUNDED_LIMIT: u64 = u64::MAX;

/// Emit parameterized SQL for a select statement
pub fn emit_sql(select: &Select, dialect: Dialect) -> Result<ParametrizedQuery, EmitError> {
    let mut emitter = SqlEmitter {
        dialect,
        params: Vec::new(),
    };
    let sql = emitter.select(select)?;
    Ok(ParametrizedQuery::new(sql, emitter.params))
}

struct SqlEmitter {
    dialect: Dialect,
    params: Vec<Value>,
}

impl SqlEmitter {
    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn select(&mut self, select: &Select) -> Result<String, EmitError> {
        if select.items.is_empty() {
            return Err(EmitError::EmptySelect);
        }

        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }
        let items = select
            .items
            .iter()
            .map(|item| self.select_item(item))
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(&items.join(", "));

        sql.push_str(" FROM ");
        let from = self.relation(&select.from)?;
        sql.push_str(&from);

        for join in &select.joins {
            let join_sql = self.join(join)?;
            sql.push(' ');
            sql.push_str(&join_sql);
        }

        if let Some(filter) = &select.filter {
            let predicate = self.predicate(filter)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }

        if !select.group_by.is_empty() {
            let keys = self.expr_list(&select.group_by)?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys);
        }

        if !select.order_by.is_empty() {
            let keys = self.sort_keys(&select.order_by)?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys);
        }

        match (select.limit, select.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => match self.dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                Dialect::MySql | Dialect::ClickHouse => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", UNBOUNDED_LIMIT, offset))
                }
            },
            (None, None) => {}
        }

        Ok(sql)
    }

    fn select_item(&mut self, item: &SelectItem) -> Result<String, EmitError> {
        let expr = self.expr(&item.expr)?;
        match &item.alias {
            Some(alias) if !is_same_column(&item.expr, alias) => {
                Ok(format!("{} AS {}", expr, self.dialect.quote_identifier(alias)))
            }
            _ => Ok(expr),
        }
    }

    fn relation(&mut self, relation: &Relation) -> Result<String, EmitError> {
        match relation {
            Relation::Table { schema, table, alias } => {
                let mut sql = if schema.is_empty() {
                    self.dialect.quote_identifier(table)
                } else {
                    format!(
                        "{}.{}",
                        self.dialect.quote_identifier(schema),
                        self.dialect.quote_identifier(table)
                    )
                };
                if let Some(alias) = alias {
                    sql.push_str(" AS ");
                    sql.push_str(&self.dialect.quote_identifier(alias));
                }
                Ok(sql)
            }
            Relation::CustomSql { sql, alias } => {
                Ok(format!("({}) AS {}", sql, self.dialect.quote_identifier(alias)))
            }
            Relation::Derived { select, alias } => {
                let inner = self.select(select)?;
                Ok(format!("({}) AS {}", inner, self.dialect.quote_identifier(alias)))
            }
        }
    }

    fn join(&mut self, join: &Join) -> Result<String, EmitError> {
        let kw = match join.join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        };
        let relation = self.relation(&join.relation)?;
        let on = self.predicate(&join.on)?;
        Ok(format!("{} {} ON {}", kw, relation, on))
    }

    /// A top-level conjunction is rendered without enclosing parentheses
    fn predicate(&mut self, expr: &Expr) -> Result<String, EmitError> {
        match expr {
            Expr::And(parts) if !parts.is_empty() => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(" AND "))
            }
            other => self.expr(other),
        }
    }

    fn sort_keys(&mut self, keys: &[SortKey]) -> Result<String, EmitError> {
        let rendered = keys
            .iter()
            .map(|k| Ok(format!("{} {}", self.expr(&k.expr)?, k.direction.as_sql())))
            .collect::<Result<Vec<_>, EmitError>>()?;
        Ok(rendered.join(", "))
    }

    fn expr_list(&mut self, exprs: &[Expr]) -> Result<String, EmitError> {
        let parts = exprs
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(", "))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Result<String, EmitError> {
        match expr {
            Expr::Column(col) => Ok(self.column(col)),
            Expr::Literal(lit) => Ok(emit_literal(lit)),
            Expr::Param(value) => {
                self.params.push(value.clone());
                Ok("?".to_string())
            }
            Expr::BinaryOp { left, op, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                Ok(format!("{} {} {}", l, op.as_str(), r))
            }
            Expr::In { expr, values } => {
                if values.is_empty() {
                    return Err(EmitError::EmptyInList);
                }
                let needle = self.expr(expr)?;
                let vals = self.expr_list(values)?;
                Ok(format!("{} IN ({})", needle, vals))
            }
            Expr::And(exprs) => {
                if exprs.is_empty() {
                    return Ok("1 = 1".to_string());
                }
                let parts = exprs.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
            Expr::Or(exprs) => {
                if exprs.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let parts = exprs.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            Expr::Not(inner) => Ok(format!("NOT ({})", self.expr(inner)?)),
            Expr::Sql(s) => Ok(s.clone()),
            Expr::Add(a, b) => Ok(format!("({} + {})", self.expr(a)?, self.expr(b)?)),
            Expr::Subtract(a, b) => Ok(format!("({} - {})", self.expr(a)?, self.expr(b)?)),
            Expr::Multiply(a, b) => Ok(format!("({} * {})", self.expr(a)?, self.expr(b)?)),
            Expr::Divide(a, b) => {
                let ty = self.dialect.double_type();
                let l = self.expr(a)?;
                let r = self.expr(b)?;
                Ok(format!("(CAST({} AS {}) / CAST({} AS {}))", l, ty, r, ty))
            }
            Expr::IsNull(inner) => Ok(format!("{} IS NULL", self.expr(inner)?)),
            Expr::IsNotNull(inner) => Ok(format!("{} IS NOT NULL", self.expr(inner)?)),
            Expr::Case { when_then, else_result } => {
                let mut sql = String::from("CASE");
                for (cond, then) in when_then {
                    let c = self.expr(cond)?;
                    let t = self.expr(then)?;
                    sql.push_str(&format!(" WHEN {} THEN {}", c, t));
                }
                if let Some(el) = else_result {
                    sql.push_str(&format!(" ELSE {}", self.expr(el)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }
            Expr::Coalesce(exprs) => Ok(format!("COALESCE({})", self.expr_list(exprs)?)),
            Expr::Function { name, args } => Ok(format!("{}({})", name, self.expr_list(args)?)),
            Expr::Cast { expr, type_name } => Ok(format!("CAST({} AS {})", self.expr(expr)?, type_name)),
            Expr::Aggregate { func, arg } => self.aggregate(*func, arg.as_deref()),
            Expr::Window { func, partition_by, order_by } => {
                let call = match func {
                    WindowFunction::RowNumber => "ROW_NUMBER()",
                    WindowFunction::CountAll => "COUNT(*)",
                };
                let mut over = Vec::new();
                if !partition_by.is_empty() {
                    over.push(format!("PARTITION BY {}", self.expr_list(partition_by)?));
                }
                if !order_by.is_empty() {
                    over.push(format!("ORDER BY {}", self.sort_keys(order_by)?));
                }
                Ok(format!("{} OVER ({})", call, over.join(" ")))
            }
            Expr::Wildcard(table) => Ok(self.wildcard(table)),
        }
    }

    fn aggregate(&mut self, func: Aggregation, arg: Option<&Expr>) -> Result<String, EmitError> {
        let Some(arg) = arg else {
            return match func {
                Aggregation::Count => Ok("COUNT(*)".to_string()),
                other => Err(EmitError::MissingAggregateArgument(other)),
            };
        };
        let inner = self.expr(arg)?;
        Ok(match func {
            Aggregation::Sum => format!("SUM({})", inner),
            Aggregation::Avg => format!("AVG({})", inner),
            Aggregation::Count => format!("COUNT({})", inner),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {})", inner),
            Aggregation::Min => format!("MIN({})", inner),
            Aggregation::Max => format!("MAX({})", inner),
        })
    }

    fn column(&self, col: &Column) -> String {
        if col.table.is_empty() {
            self.dialect.quote_identifier(&col.name)
        } else {
            format!(
                "{}.{}",
                self.dialect.quote_identifier(&col.table),
                self.dialect.quote_identifier(&col.name)
            )
        }
    }

    fn wildcard(&self, table: &TableRef) -> String {
        match table.qualifier() {
            Some(q) => format!("{}.*", self.dialect.quote_identifier(q)),
            None => "*".to_string(),
        }
    }
}

fn is_same_column(expr: &Expr, alias: &str) -> bool {
    matches!(expr, Expr::Column(col) if col.name == alias)
}

fn emit_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => format!("{}", f),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}
