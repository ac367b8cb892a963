//! Integration tests for request compilation
//!
//! Compiles JSON requests and builder-made specs against the fixture
//! catalog and checks the exact SQL text and bind values.

mod common;

use chrono::NaiveDate;
use common::{compile, load_catalog, load_request, orders};
use connectql::query::SortTarget;
use connectql::{
    flatten_filters, parser, CompileError, CompileOptions, Dialect, FieldType, Filter, Granularity,
    Group, LeafOp, Metric, QueryBuilder, QueryKind, QueryRequest, Sort, SortDirection, Source, Stat,
    StatKind, Value,
};

fn pg() -> CompileOptions {
    CompileOptions::new(Dialect::Postgres)
}

fn leaf(op: LeafOp, field: &str, field_type: FieldType, values: &[&str]) -> Filter {
    Filter::leaf(op, field, field_type, values.iter().map(|v| v.to_string()).collect())
}

fn builder() -> QueryBuilder {
    QueryBuilder::new(orders(), load_catalog())
}

// =============================================================================
// Raw queries
// =============================================================================

#[test]
fn test_raw_request_fixture() {
    let request = load_request("adults_by_name.json");
    let query = compile(&request, &pg()).expect("compile should succeed");

    assert_eq!(query.sql(), "SELECT name FROM sales.orders WHERE age >= ? LIMIT 10");
    assert_eq!(query.params(), &[Value::Int(21)]);
}

#[test]
fn test_raw_with_config_fixture() {
    let config = parser::parse_config_file("tests/test_data/config.yaml").unwrap();
    assert_eq!(config.compiler.dialect, Dialect::MySql);
    assert_eq!(config.compiler.max_alias_length, 32);
    assert_eq!(config.engine.default_fetch_size, 250);
    assert_eq!(config.engine.default_fetch_timeout_ms, 30_000);

    let query = compile(&load_request("adults_by_name.json"), &config.compiler).unwrap();
    assert_eq!(query.sql(), "SELECT name FROM sales.orders WHERE age >= ? LIMIT 10");
}

#[test]
fn test_nested_filters_bind_in_order() {
    let query = builder()
        .with_fields(["name"])
        .with_filters(vec![
            Filter::or(vec![
                leaf(LeafOp::Eqi, "country", FieldType::String, &["FR"]),
                leaf(LeafOp::Contains, "name", FieldType::String, &["an"]),
            ]),
            leaf(LeafOp::In, "age", FieldType::Integer, &["1", "2"]),
            Filter::negate(leaf(LeafOp::IsNull, "status", FieldType::Unknown, &[])),
        ])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT name FROM sales.orders WHERE (LOWER(country) = LOWER(?) OR name LIKE ?) \
         AND age IN (?, ?) AND NOT (status IS NULL)"
    );
    assert_eq!(
        query.params(),
        &[
            Value::String("FR".into()),
            Value::String("%an%".into()),
            Value::Int(1),
            Value::Int(2),
        ]
    );
}

#[test]
fn test_unknown_declared_type_uses_catalog() {
    let query = builder()
        .with_fields(["name"])
        .with_filters(vec![
            leaf(LeafOp::Ge, "created", FieldType::Unknown, &["2024-01-31"]),
            leaf(LeafOp::Lt, "amount", FieldType::Unknown, &["9.5"]),
        ])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.params(),
        &[
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            Value::Float(9.5),
        ]
    );
}

#[test]
fn test_text_search_per_dialect() {
    let spec = builder()
        .with_fields(["name"])
        .with_filters(vec![leaf(LeafOp::TextSearch, "name", FieldType::String, &["red shoes"])])
        .build()
        .unwrap();

    let postgres = spec.compile(&pg()).unwrap();
    assert!(postgres.sql().ends_with("WHERE TO_TSVECTOR(name) @@ PLAINTO_TSQUERY(?)"));
    let mysql = spec.compile(&CompileOptions::new(Dialect::MySql)).unwrap();
    assert!(mysql.sql().ends_with("WHERE INSTR(LOWER(name), LOWER(?)) > 0"));
    let clickhouse = spec.compile(&CompileOptions::new(Dialect::ClickHouse)).unwrap();
    assert!(clickhouse.sql().ends_with("WHERE positionCaseInsensitive(name, ?) > 0"));
    assert_eq!(postgres.params(), &[Value::String("red shoes".into())]);
}

#[test]
fn test_raw_sort_distinct_and_offset() {
    let query = builder()
        .with_fields(["country"])
        .with_sorts(vec![Sort::raw("country", SortDirection::Desc)])
        .distinct(true)
        .with_offset(5)
        .build()
        .unwrap()
        .compile(&CompileOptions::new(Dialect::MySql))
        .unwrap();

    assert_eq!(
        query.sql(),
        format!(
            "SELECT DISTINCT country FROM sales.orders ORDER BY country DESC LIMIT {} OFFSET 5",
            u64::MAX
        )
    );
}

#[test]
fn test_custom_sql_source() {
    let query = QueryBuilder::new(Source::custom_sql("SELECT * FROM events WHERE kind = 'x'"), load_catalog())
        .with_fields(["name"])
        .with_filters(vec![leaf(LeafOp::Eq, "status", FieldType::String, &["ok"])])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT t.name FROM (SELECT * FROM events WHERE kind = 'x') AS t WHERE t.status = ?"
    );
}

// =============================================================================
// Aggregate queries
// =============================================================================

#[test]
fn test_group_sorted_by_metric() {
    let query = builder()
        .with_groups(vec![Group::attribute("country")])
        .with_metrics(vec![Metric::sum("amount"), Metric::count_all()])
        .with_sorts(vec![Sort::by_metric(0, SortDirection::Desc)])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT country, SUM(amount) AS sum_amount, COUNT(*) AS count_all FROM sales.orders \
         GROUP BY country ORDER BY sum_amount DESC"
    );
    assert!(query.params().is_empty());
}

#[test]
fn test_agg_request_fixture() {
    let request = load_request("revenue_by_country.json");
    assert_eq!(request.kind, Some(QueryKind::Agg));
    let query = compile(&request, &pg()).unwrap();

    assert_eq!(
        query.sql(),
        "SELECT country, DATE_TRUNC('month', created) AS time_month_created, \
         SUM(amount) AS sum_amount, COUNT(*) AS count_all FROM sales.orders \
         WHERE status IN (?, ?) AND NOT (country IS NULL) \
         GROUP BY country, DATE_TRUNC('month', created) \
         ORDER BY sum_amount DESC, country ASC LIMIT 100"
    );
    assert_eq!(
        query.params(),
        &[Value::String("paid".into()), Value::String("shipped".into())]
    );
}

#[test]
fn test_compilation_is_deterministic() {
    let request = load_request("revenue_by_country.json");
    let first = compile(&request, &pg()).unwrap();
    let second = compile(&request, &pg()).unwrap();
    assert_eq!(first.sql(), second.sql());
    assert_eq!(first.params(), second.params());
}

#[test]
fn test_flatten_request_filters() {
    let request = load_request("revenue_by_country.json");
    let leaves = flatten_filters(&request.filters);
    let ops: Vec<LeafOp> = leaves.iter().filter_map(|f| f.as_leaf()).map(|(op, _)| op).collect();
    assert_eq!(ops, vec![LeafOp::In, LeafOp::IsNull]);
}

#[test]
fn test_epoch_time_group_mysql() {
    let query = builder()
        .with_groups(vec![Group::time("created_ts", Granularity::Day)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&CompileOptions::new(Dialect::MySql))
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT DATE(FROM_UNIXTIME(created_ts)) AS time_day_created_ts, COUNT(*) AS count_all \
         FROM sales.orders GROUP BY DATE(FROM_UNIXTIME(created_ts))"
    );
}

#[test]
fn test_year_time_group_not_truncated() {
    let query = builder()
        .with_groups(vec![Group::time("year", Granularity::Year)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT year AS time_year_year, COUNT(*) AS count_all FROM sales.orders GROUP BY year"
    );
}

#[test]
fn test_histogram_group() {
    let query = builder()
        .with_groups(vec![Group::histogram("amount", 0.0, 30.0, 10.0)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    let bucket = "CASE WHEN amount IS NULL THEN NULL WHEN amount < 10 THEN ';10' \
                  WHEN amount < 20 THEN '10;20' ELSE '20;' END";
    assert_eq!(
        query.sql(),
        format!(
            "SELECT {} AS hist_amount, COUNT(*) AS count_all FROM sales.orders GROUP BY {}",
            bucket, bucket
        )
    );
}

#[test]
fn test_percentile_without_groups() {
    let query = builder()
        .with_metrics(vec![Metric::percentile("latency", 50.0)])
        .with_filters(vec![leaf(LeafOp::Eq, "status", FieldType::String, &["ok"])])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT MIN(CASE WHEN ((CAST(p.rn_latency AS DOUBLE PRECISION) / \
         CAST(p.cnt_latency AS DOUBLE PRECISION)) * 100) >= 50 THEN p.latency ELSE NULL END) \
         AS percentile_latency FROM (SELECT t.*, ROW_NUMBER() OVER (ORDER BY t.latency ASC) AS rn_latency, \
         COUNT(*) OVER () AS cnt_latency FROM sales.orders AS t WHERE t.status = ?) AS p"
    );
    assert_eq!(query.params(), &[Value::String("ok".into())]);
}

#[test]
fn test_percentile_and_last_value_fixture() {
    let query = compile(&load_request("latency_p95.json"), &pg()).unwrap();
    let sql = query.sql();

    assert!(sql.starts_with("SELECT p.country, MIN(CASE WHEN "));
    assert!(sql.contains(">= 95 THEN p.latency ELSE NULL END) AS percentile_latency"));
    assert!(sql.contains(
        "MAX(CASE WHEN p.updated = lv_0.max_time THEN p.status ELSE NULL END) AS last_value_status"
    ));
    assert!(sql.contains(
        "ROW_NUMBER() OVER (PARTITION BY t.country ORDER BY t.latency ASC) AS rn_latency"
    ));
    assert!(sql.contains("COUNT(*) OVER (PARTITION BY t.country) AS cnt_latency"));
    assert!(sql.contains(
        "LEFT JOIN (SELECT s.country AS g_0, MAX(s.updated) AS max_time FROM sales.orders AS s \
         GROUP BY s.country) AS lv_0 ON COALESCE(p.country, '__NULL__') = COALESCE(lv_0.g_0, '__NULL__')"
    ));
    assert!(sql.ends_with("GROUP BY p.country"));
}

#[test]
fn test_last_value_join_repeats_filters() {
    let query = builder()
        .with_groups(vec![Group::attribute("country")])
        .with_metrics(vec![Metric::last_value("amount", "updated")])
        .with_filters(vec![leaf(LeafOp::Ge, "age", FieldType::Integer, &["18"])])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT t.country, MAX(CASE WHEN t.updated = lv_0.max_time THEN t.amount ELSE NULL END) \
         AS last_value_amount FROM sales.orders AS t LEFT JOIN (SELECT s.country AS g_0, \
         MAX(s.updated) AS max_time FROM sales.orders AS s WHERE s.age >= ? GROUP BY s.country) \
         AS lv_0 ON COALESCE(t.country, '__NULL__') = COALESCE(lv_0.g_0, '__NULL__') \
         WHERE t.age >= ? GROUP BY t.country"
    );
    assert_eq!(query.params(), &[Value::Int(18), Value::Int(18)]);
}

#[test]
fn test_last_value_without_groups() {
    let query = builder()
        .with_metrics(vec![
            Metric::last_value("amount", "updated"),
            Metric::last_value("status", "updated"),
        ])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    // one join per time field
    assert_eq!(query.sql().matches("LEFT JOIN").count(), 1);
    assert!(query.sql().contains(") AS lv_0 ON 1 = 1"));
}

#[test]
fn test_duplicate_aliases_within_length() {
    let query = builder()
        .with_groups(vec![Group::attribute("country")])
        .with_metrics(vec![Metric::sum("amount"), Metric::sum("amount")])
        .build()
        .unwrap()
        .compile(&CompileOptions { dialect: Dialect::Postgres, max_alias_length: 10 })
        .unwrap();

    assert!(query.sql().contains("SUM(amount) AS sum_amount, SUM(amount) AS sum_amou_1"));
}

// =============================================================================
// Stats
// =============================================================================

#[test]
fn test_stats_query() {
    let query = builder()
        .with_stats(vec![
            Stat::new("age", StatKind::Min),
            Stat::new("name", StatKind::NullCount),
            Stat::new("country", StatKind::DistinctCount),
        ])
        .build()
        .unwrap()
        .compile(&pg())
        .unwrap();

    assert_eq!(
        query.sql(),
        "SELECT MIN(age) AS min_age, SUM(CASE WHEN name IS NULL THEN 1 ELSE 0 END) AS null_count_name, \
         COUNT(DISTINCT country) AS distinct_count_country FROM sales.orders"
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_fields_with_aggregation_rejected() {
    let request = QueryRequest {
        fields: vec!["name".into()],
        metrics: vec![Metric::count_all()],
        ..Default::default()
    };
    assert!(matches!(compile(&request, &pg()), Err(CompileError::InvalidQuery(_))));
}

#[test]
fn test_declared_kind_must_match() {
    let request = QueryRequest {
        kind: Some(QueryKind::Stats),
        groups: vec![Group::attribute("country")],
        metrics: vec![Metric::count_all()],
        ..Default::default()
    };
    assert!(matches!(compile(&request, &pg()), Err(CompileError::InvalidQuery(_))));
}

#[test]
fn test_raw_data_only_field_in_aggregation() {
    let request = QueryRequest {
        groups: vec![Group::attribute("ssn")],
        metrics: vec![Metric::count_all()],
        ..Default::default()
    };
    assert!(matches!(compile(&request, &pg()), Err(CompileError::RawDataOnly(f)) if f == "ssn"));

    // raw listings may still read it
    let raw = QueryRequest { fields: vec!["ssn".into()], ..Default::default() };
    assert!(compile(&raw, &pg()).is_ok());
}

#[test]
fn test_time_group_errors() {
    let year_by_month = builder()
        .with_groups(vec![Group::time("year", Granularity::Month)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&pg());
    assert!(matches!(year_by_month, Err(CompileError::UnsupportedGranularity { .. })));

    let string_time = builder()
        .with_groups(vec![Group::time("name", Granularity::Day)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&pg());
    assert!(matches!(string_time, Err(CompileError::UnsupportedTimeSource { .. })));
}

#[test]
fn test_invalid_histogram() {
    let result = builder()
        .with_groups(vec![Group::histogram("amount", 10.0, 10.0, 1.0)])
        .with_metrics(vec![Metric::count_all()])
        .build()
        .unwrap()
        .compile(&pg());
    assert!(matches!(result, Err(CompileError::InvalidHistogram { .. })));
}

#[test]
fn test_filter_errors() {
    let compile_filter = |filter: Filter| {
        builder()
            .with_fields(["name"])
            .with_filters(vec![filter])
            .build()
            .unwrap()
            .compile(&pg())
    };

    assert!(matches!(
        compile_filter(leaf(LeafOp::Ge, "age", FieldType::String, &["21"])),
        Err(CompileError::TypeMismatch { .. })
    ));
    assert!(matches!(
        compile_filter(leaf(LeafOp::Contains, "age", FieldType::Integer, &["2"])),
        Err(CompileError::UnsupportedFilter { .. })
    ));
    assert!(matches!(
        compile_filter(leaf(LeafOp::Ge, "age", FieldType::Integer, &["abc"])),
        Err(CompileError::InvalidLiteral { .. })
    ));
    assert!(matches!(
        compile_filter(leaf(LeafOp::In, "age", FieldType::Integer, &[])),
        Err(CompileError::InvalidQuery(_))
    ));
}

#[test]
fn test_percentile_margin_out_of_range() {
    let result = builder()
        .with_metrics(vec![Metric::percentile("latency", 150.0)])
        .build()
        .unwrap()
        .compile(&pg());
    assert!(matches!(result, Err(CompileError::InvalidMetric(_))));
}

#[test]
fn test_unresolved_sort() {
    let result = builder()
        .with_groups(vec![Group::attribute("country")])
        .with_metrics(vec![Metric::count_all()])
        .with_sorts(vec![Sort::by_metric(3, SortDirection::Asc)])
        .build()
        .unwrap()
        .compile(&pg());
    assert!(matches!(result, Err(CompileError::UnresolvedSort(SortTarget::Metric(3)))));
}
