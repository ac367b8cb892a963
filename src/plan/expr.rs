//! Scalar expressions of the SELECT tree

use crate::query::SortDirection;
use super::value::Value;

/// A possibly table-qualified column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Table name or alias; empty for an unqualified reference
    pub table: String,
    /// Column name
    pub name: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Column emitted without a qualifier
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
        }
    }
}

/// The relation compiled expressions are bound to
///
/// An empty qualifier yields unqualified column references, used when the
/// query reads a single table with no joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    qualifier: String,
}

impl TableRef {
    pub fn new(qualifier: impl Into<String>) -> Self {
        Self { qualifier: qualifier.into() }
    }

    pub fn unqualified() -> Self {
        Self { qualifier: String::new() }
    }

    pub fn qualifier(&self) -> Option<&str> {
        if self.qualifier.is_empty() {
            None
        } else {
            Some(&self.qualifier)
        }
    }

    pub fn column(&self, name: &str) -> Expr {
        Expr::Column(Column::new(self.qualifier.clone(), name))
    }
}

/// Expressions appearing in select lists, predicates, GROUP BY and ORDER BY
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(Column),
    /// Literal rendered inline
    Literal(Literal),
    /// Literal bound as a positional `?` parameter
    Param(Value),
    /// `left op right`
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// `expr IN (v1, v2, ...)`
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    /// AND of multiple expressions
    And(Vec<Expr>),
    /// OR of multiple expressions
    Or(Vec<Expr>),
    /// NOT of an expression
    Not(Box<Expr>),
    /// Raw SQL fragment, inserted verbatim
    Sql(String),
    Add(Box<Expr>, Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Box<Expr>, Box<Expr>),
    /// Floating point division: a / b
    Divide(Box<Expr>, Box<Expr>),
    /// IS NULL check
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// Searched CASE; the first matching branch wins
    Case {
        when_then: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    /// COALESCE(a, b, ...)
    Coalesce(Vec<Expr>),
    /// Scalar function call: NAME(args)
    Function { name: String, args: Vec<Expr> },
    /// CAST(expr AS type)
    Cast { expr: Box<Expr>, type_name: String },
    /// Aggregate call; `arg: None` is `COUNT(*)`
    Aggregate {
        func: Aggregation,
        arg: Option<Box<Expr>>,
    },
    /// Window function: FUNC() OVER (PARTITION BY ... ORDER BY ...)
    Window {
        func: WindowFunction,
        partition_by: Vec<Expr>,
        order_by: Vec<SortKey>,
    },
    /// All columns of a relation: t.*
    Wildcard(TableRef),
}

impl Expr {
    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function { name: name.into(), args }
    }

    pub fn aggregate(func: Aggregation, arg: Expr) -> Self {
        Expr::Aggregate { func, arg: Some(Box::new(arg)) }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Expr::Literal(Literal::Int(i))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    /// CASE WHEN cond THEN value ELSE NULL END
    pub fn when_else_null(cond: Expr, value: Expr) -> Self {
        Expr::Case {
            when_then: vec![(cond, value)],
            else_result: Some(Box::new(Expr::null())),
        }
    }
}

/// Literal values rendered inline
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Infix operators of [`Expr::BinaryOp`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    /// Postgres full-text match
    TextMatch,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::TextMatch => "@@",
        }
    }
}

/// Aggregation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
}

/// Window functions used by the percentile rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    RowNumber,
    CountAll,
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub direction: SortDirection,
}
