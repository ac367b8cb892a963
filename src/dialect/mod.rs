//! SQL dialects
//!
//! Everything the compiler renders differently per target database:
//! identifier quoting, float casts, epoch conversion, time truncation,
//! full-text predicates and the timestamp join sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::{BinaryOperator, Expr};
use crate::query::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "clickhouse")]
    ClickHouse,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::ClickHouse => write!(f, "clickhouse"),
        }
    }
}

/// Identifiers matching `[a-z_][a-z0-9_]*` are emitted bare
fn is_plain_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl Dialect {
    /// Quote an identifier when it is not a plain lowercase name
    pub fn quote_identifier(&self, ident: &str) -> String {
        if is_plain_identifier(ident) {
            return ident.to_string();
        }
        match self {
            Dialect::Postgres | Dialect::ClickHouse => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Type name used to force floating point division
    pub fn double_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::MySql => "DOUBLE",
            Dialect::ClickHouse => "Float64",
        }
    }

    /// Convert an integer seconds-since-epoch expression to a timestamp
    pub fn epoch_seconds_to_timestamp(&self, expr: Expr) -> Expr {
        match self {
            Dialect::Postgres => Expr::function("TO_TIMESTAMP", vec![expr]),
            Dialect::MySql => Expr::function("FROM_UNIXTIME", vec![expr]),
            Dialect::ClickHouse => Expr::function("toDateTime", vec![expr]),
        }
    }

    /// Convert an integer milliseconds-since-epoch expression to a timestamp
    pub fn epoch_millis_to_timestamp(&self, expr: Expr) -> Expr {
        match self {
            Dialect::Postgres => Expr::function(
                "TO_TIMESTAMP",
                vec![Expr::Divide(Box::new(expr), Box::new(Expr::int(1000)))],
            ),
            Dialect::MySql => Expr::function(
                "FROM_UNIXTIME",
                vec![Expr::Divide(Box::new(expr), Box::new(Expr::int(1000)))],
            ),
            Dialect::ClickHouse => Expr::function(
                "toDateTime",
                vec![Expr::function("intDiv", vec![expr, Expr::int(1000)])],
            ),
        }
    }

    /// Truncate a timestamp expression to the start of its granularity
    pub fn truncate(&self, expr: Expr, granularity: Granularity) -> Expr {
        match self {
            Dialect::Postgres => Expr::function(
                "DATE_TRUNC",
                vec![Expr::string(granularity.as_str()), expr],
            ),
            Dialect::MySql => mysql_truncate(expr, granularity),
            Dialect::ClickHouse => {
                let name = match granularity {
                    Granularity::Second => "toDateTime",
                    Granularity::Minute => "toStartOfMinute",
                    Granularity::Hour => "toStartOfHour",
                    Granularity::Day => "toStartOfDay",
                    Granularity::Week => "toMonday",
                    Granularity::Month => "toStartOfMonth",
                    Granularity::Quarter => "toStartOfQuarter",
                    Granularity::Year => "toStartOfYear",
                };
                Expr::function(name, vec![expr])
            }
        }
    }

    /// Full-text match of `expr` against a bound search string
    pub fn text_search(&self, expr: Expr, query: Expr) -> Expr {
        match self {
            Dialect::Postgres => Expr::binary(
                Expr::function("TO_TSVECTOR", vec![expr]),
                BinaryOperator::TextMatch,
                Expr::function("PLAINTO_TSQUERY", vec![query]),
            ),
            Dialect::MySql => Expr::binary(
                Expr::function(
                    "INSTR",
                    vec![
                        Expr::function("LOWER", vec![expr]),
                        Expr::function("LOWER", vec![query]),
                    ],
                ),
                BinaryOperator::Gt,
                Expr::int(0),
            ),
            Dialect::ClickHouse => Expr::binary(
                Expr::function("positionCaseInsensitive", vec![expr, query]),
                BinaryOperator::Gt,
                Expr::int(0),
            ),
        }
    }

    /// Far-future timestamp standing in for NULL in join predicates
    pub fn timestamp_sentinel(&self) -> Expr {
        match self {
            Dialect::Postgres => Expr::Sql("TIMESTAMP '9999-12-31 23:59:59'".to_string()),
            Dialect::MySql => Expr::Sql("TIMESTAMP('9999-12-31 23:59:59')".to_string()),
            Dialect::ClickHouse => Expr::Sql("toDateTime('2105-12-31 23:59:59')".to_string()),
        }
    }
}

fn mysql_truncate(expr: Expr, granularity: Granularity) -> Expr {
    let formatted = |expr: Expr, format: &str, type_name: &str| Expr::Cast {
        expr: Box::new(Expr::function("DATE_FORMAT", vec![expr, Expr::string(format)])),
        type_name: type_name.to_string(),
    };
    match granularity {
        Granularity::Second => formatted(expr, "%Y-%m-%d %H:%i:%s", "DATETIME"),
        Granularity::Minute => formatted(expr, "%Y-%m-%d %H:%i:00", "DATETIME"),
        Granularity::Hour => formatted(expr, "%Y-%m-%d %H:00:00", "DATETIME"),
        Granularity::Day => Expr::function("DATE", vec![expr]),
        Granularity::Week => Expr::function(
            "SUBDATE",
            vec![
                Expr::function("DATE", vec![expr.clone()]),
                Expr::function("WEEKDAY", vec![expr]),
            ],
        ),
        Granularity::Month => formatted(expr, "%Y-%m-01", "DATE"),
        // No native quarter truncation: rebuild the date from year and first month of the quarter
        Granularity::Quarter => {
            let first_month = Expr::Add(
                Box::new(Expr::Multiply(
                    Box::new(Expr::Subtract(
                        Box::new(Expr::function("QUARTER", vec![expr.clone()])),
                        Box::new(Expr::int(1)),
                    )),
                    Box::new(Expr::int(3)),
                )),
                Box::new(Expr::int(1)),
            );
            Expr::function(
                "STR_TO_DATE",
                vec![
                    Expr::function(
                        "CONCAT",
                        vec![
                            Expr::function("YEAR", vec![expr]),
                            Expr::string("-"),
                            first_month,
                            Expr::string("-01"),
                        ],
                    ),
                    Expr::string("%Y-%c-%d"),
                ],
            )
        }
        Granularity::Year => formatted(expr, "%Y-01-01", "DATE"),
    }
}
