//! Select statement types

use super::expr::{Expr, SortKey, TableRef};

/// A SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Relation,
    pub joins: Vec<Join>,
    /// WHERE predicate
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn new(from: Relation) -> Self {
        Self {
            distinct: false,
            items: Vec::new(),
            from,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// A projected expression with its optional output alias
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self { expr, alias: Some(alias.into()) }
    }
}

/// A FROM target
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// schema.table
    Table {
        schema: String,
        table: String,
        alias: Option<String>,
    },
    /// Caller supplied SQL, wrapped in parentheses
    CustomSql { sql: String, alias: String },
    /// Sub-select
    Derived { select: Box<Select>, alias: String },
}

impl Relation {
    /// The reference compiled expressions use for this relation
    pub fn table_ref(&self) -> TableRef {
        match self {
            Relation::Table { alias: Some(alias), .. } => TableRef::new(alias.clone()),
            Relation::Table { alias: None, .. } => TableRef::unqualified(),
            Relation::CustomSql { alias, .. } | Relation::Derived { alias, .. } => {
                TableRef::new(alias.clone())
            }
        }
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

/// A join against the FROM relation
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub relation: Relation,
    pub on: Expr,
}
