//! Integration tests for parsing and lineage extraction

use pretty_assertions::assert_eq;
use rstest::rstest;
use sqlineage_core::{ColumnLineage, DiagnosticCode, ModelLineage, SourceColumn, TransformKind};
use sqlineage_sql::ast::GroupBy;
use sqlineage_sql::{
    analyze, extract_lineage, parse, parse_with_dialect, Dialect, DuckDbDialect, GenericDialect,
    LineageContext, LineageError, ParseErrorKind, PostgresDialect, SnowflakeDialect, SqlParser,
};
use std::path::Path;

fn lineage(sql: &str) -> ModelLineage {
    extract_lineage(sql, None, None).unwrap()
}

fn src(table: &str, column: &str) -> SourceColumn {
    SourceColumn::new(table, column)
}

fn schema(tables: &[(&str, &[&str])]) -> LineageContext {
    let mut context = LineageContext::new();
    for (table, columns) in tables {
        context.add_table(table, columns.iter().map(|c| c.to_string()).collect());
    }
    context
}

#[test]
fn direct_copy_identity() {
    let result = lineage("SELECT id FROM t");
    assert_eq!(result.sources, vec!["t"]);
    assert_eq!(result.columns, vec![ColumnLineage::direct("id", src("t", "id"))]);
    assert_eq!(result.columns[0].transform.as_str(), "");
}

#[test]
fn aggregate_classification() {
    let result =
        lineage("SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY customer_id");

    let customer_id = result.column("customer_id").unwrap();
    assert_eq!(customer_id.transform, TransformKind::Direct);
    assert_eq!(customer_id.sources, vec![src("orders", "customer_id")]);

    let total = result.column("total").unwrap();
    assert_eq!(total.transform, TransformKind::Expr);
    assert_eq!(total.transform.as_str(), "EXPR");
    assert_eq!(total.function.as_deref(), Some("sum"));
    assert_eq!(total.sources, vec![src("orders", "amount")]);
}

#[test]
fn cte_transparency() {
    let result = lineage("WITH a AS (SELECT id FROM users) SELECT id FROM a");
    assert_eq!(result.sources, vec!["users"]);
    assert_eq!(result.columns, vec![ColumnLineage::direct("id", src("users", "id"))]);
}

#[test]
fn generator_has_no_sources() {
    let result = lineage("SELECT NOW() AS ts FROM t");
    assert!(result.columns[0].sources.is_empty());
    assert_eq!(result.columns[0].transform, TransformKind::Expr);
    assert_eq!(result.sources, vec!["t"]);
}

#[test]
fn scalar_subquery_rejected() {
    let err = parse("SELECT (SELECT 1) AS x FROM t").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::ScalarSubquery);
    assert!(err.message.contains("CTE"));
    assert!(err.message.contains("JOIN"));

    let diagnostic = err.to_diagnostic(None);
    assert_eq!(diagnostic.code, DiagnosticCode::SqlScalarSubquery);
}

#[test]
fn subqueries_outside_select_list_are_accepted() {
    let result = lineage("SELECT a FROM t WHERE b = (SELECT MAX(b) FROM t)");
    assert_eq!(result.column_names(), vec!["a"]);
}

#[test]
fn star_fallback_without_schema() {
    let result = lineage("SELECT * FROM t");
    assert_eq!(result.columns, vec![ColumnLineage::new("*", TransformKind::Direct)]);
}

#[test]
fn star_expands_with_schema() {
    let context = schema(&[("t", &["a", "b"])]);
    let result = extract_lineage("SELECT * FROM t", Some(&context), None).unwrap();
    assert_eq!(
        result.columns,
        vec![
            ColumnLineage::direct("a", src("t", "a")),
            ColumnLineage::direct("b", src("t", "b")),
        ]
    );
}

#[test]
fn qualified_star_expands_through_cte() {
    let result = lineage("WITH c AS (SELECT id, name FROM users) SELECT c.* FROM c");
    assert_eq!(
        result.columns,
        vec![
            ColumnLineage::direct("id", src("users", "id")),
            ColumnLineage::direct("name", src("users", "name")),
        ]
    );
}

#[test]
fn qualified_star_over_unexpanded_cte_stays_a_placeholder() {
    let analysis = analyze("WITH c AS (SELECT * FROM t) SELECT c.* FROM c", None, None).unwrap();
    assert_eq!(
        analysis.lineage.columns,
        vec![ColumnLineage::new("c.*", TransformKind::Direct)]
    );
    assert!(analysis.diagnostics.iter().any(|d| {
        d.code == DiagnosticCode::LineageStarUnexpanded && d.column.as_deref() == Some("c.*")
    }));
    assert_eq!(analysis.lineage.sources, vec!["t"]);
}

#[test]
fn union_merges() {
    let result = lineage("SELECT id FROM a UNION SELECT id FROM b");
    assert_eq!(result.sources, vec!["a", "b"]);
    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.columns[0].name, "id");
    assert_eq!(result.columns[0].transform, TransformKind::Expr);
    assert_eq!(result.columns[0].sources, vec![src("a", "id"), src("b", "id")]);
}

#[test]
fn set_operation_chain() {
    let result = lineage(
        "SELECT x FROM a UNION ALL SELECT x FROM b INTERSECT SELECT x FROM c EXCEPT SELECT x FROM a",
    );
    assert_eq!(result.sources, vec!["a", "b", "c"]);
    assert_eq!(
        result.columns[0].sources,
        vec![src("a", "x"), src("b", "x"), src("c", "x")]
    );
}

#[rstest]
#[case::single_table("SELECT a FROM t", &["t"])]
#[case::join_chain(
    "SELECT o.id FROM orders o JOIN customers c ON o.cid = c.id LEFT JOIN regions r ON c.rid = r.id",
    &["customers", "orders", "regions"]
)]
#[case::nested_derived(
    "SELECT a.x FROM (SELECT x FROM (SELECT x FROM deep.t1) d1) a JOIN t2 ON a.x = t2.x",
    &["deep.t1", "t2"]
)]
#[case::cte_chain(
    "WITH c1 AS (SELECT id FROM s1), c2 AS (SELECT c1.id FROM c1 JOIN s2 USING (id)) SELECT id FROM c2",
    &["s1", "s2"]
)]
#[case::duplicate_references("SELECT a.x, b.x FROM t a JOIN t b ON a.id = b.id", &["t"])]
#[case::nested_expression_subqueries(
    "SELECT id FROM t WHERE id IN (SELECT id FROM u WHERE EXISTS (SELECT 1 FROM v))",
    &["t", "u", "v"]
)]
#[case::unused_cte("WITH unused AS (SELECT x FROM z) SELECT a FROM t", &["t", "z"])]
#[case::qualified_names("SELECT 1 FROM prod.analytics.orders", &["prod.analytics.orders"])]
#[case::case_folding("SELECT a FROM Orders JOIN ORDERS o2 ON 1 = 1", &["orders"])]
fn source_completeness(#[case] sql: &str, #[case] expected: &[&str]) {
    let result = lineage(sql);
    assert_eq!(result.sources, expected.to_vec());
}

#[test]
fn multi_level_cte_columns_flatten() {
    let result = lineage(
        r#"
        WITH
            base AS (SELECT id, amount, created_at FROM raw.payments),
            daily AS (
                SELECT CAST(created_at AS DATE) AS day, SUM(amount) AS total
                FROM base
                GROUP BY CAST(created_at AS DATE)
            ),
            ranked AS (
                SELECT day, total, RANK() OVER (ORDER BY total DESC) AS position
                FROM daily
            )
        SELECT day, total, position FROM ranked WHERE position <= 10
        "#,
    );

    assert_eq!(result.sources, vec!["raw.payments"]);

    let day = result.column("day").unwrap();
    assert_eq!(day.transform, TransformKind::Expr);
    assert_eq!(day.function, None);
    assert_eq!(day.sources, vec![src("raw.payments", "created_at")]);

    // inherited through the CTE reference
    let total = result.column("total").unwrap();
    assert_eq!(total.function.as_deref(), Some("sum"));
    assert_eq!(total.sources, vec![src("raw.payments", "amount")]);

    let position = result.column("position").unwrap();
    assert_eq!(position.function.as_deref(), Some("rank"));
    assert_eq!(position.sources, vec![src("raw.payments", "amount")]);
}

#[test]
fn cte_column_list_renames_outputs() {
    let result = lineage("WITH c(a, b) AS (SELECT x, y + 1 FROM t) SELECT a, b FROM c");
    assert_eq!(result.columns[0], ColumnLineage::direct("a", src("t", "x")));
    assert_eq!(result.columns[1].transform, TransformKind::Expr);
    assert_eq!(result.columns[1].sources, vec![src("t", "y")]);
}

#[test]
fn recursive_cte() {
    let result = lineage(
        r#"
        WITH RECURSIVE tree AS (
            SELECT id, parent_id, 0 AS depth FROM nodes WHERE parent_id IS NULL
            UNION ALL
            SELECT n.id, n.parent_id, tree.depth + 1
            FROM nodes n
            JOIN tree ON n.parent_id = tree.id
        )
        SELECT id, depth FROM tree
        "#,
    );

    assert_eq!(result.sources, vec!["nodes"]);
    assert_eq!(result.column("id").unwrap().sources, vec![src("nodes", "id")]);
    assert_eq!(result.column("id").unwrap().transform, TransformKind::Expr);
    assert!(result.column("depth").unwrap().sources.is_empty());
}

#[test]
fn lateral_subquery_sees_siblings() {
    let result = lineage(
        r#"
        SELECT o.id, l.total
        FROM orders o,
        LATERAL (SELECT SUM(i.price) AS total FROM items i WHERE i.order_id = o.id) l
        "#,
    );
    assert_eq!(result.sources, vec!["items", "orders"]);
    let total = result.column("total").unwrap();
    assert_eq!(total.function.as_deref(), Some("sum"));
    assert_eq!(total.sources, vec![src("items", "price")]);
}

#[test]
fn using_join_with_schema() {
    let context = schema(&[("a", &["id", "name"]), ("b", &["id", "score"])]);
    let result =
        extract_lineage("SELECT id, name, score FROM a JOIN b USING (id)", Some(&context), None)
            .unwrap();
    assert_eq!(result.columns[0].sources, vec![src("a", "id")]);
    assert_eq!(result.columns[1].sources, vec![src("a", "name")]);
    assert_eq!(result.columns[2].sources, vec![src("b", "score")]);
}

#[test]
fn schema_lookup_by_suffix() {
    let context = schema(&[("analytics.orders", &["id", "amount"])]);
    let result =
        extract_lineage("SELECT * FROM warehouse.analytics.orders", Some(&context), None).unwrap();
    assert_eq!(result.column_names(), vec!["id", "amount"]);
    assert_eq!(
        result.columns[1].sources,
        vec![src("warehouse.analytics.orders", "amount")]
    );
}

#[test]
fn derived_table_with_star_over_single_table() {
    let result = lineage("SELECT d.amount FROM (SELECT * FROM payments) d");
    assert_eq!(result.columns[0].sources, vec![src("payments", "amount")]);
}

#[rstest]
#[case::upper("SELECT UPPER(name) AS n FROM t", TransformKind::Direct, None)]
#[case::upper_over_cast("SELECT UPPER(CAST(name AS TEXT)) AS n FROM t", TransformKind::Direct, None)]
#[case::coalesce_literal("SELECT IFNULL(name, 'n/a') AS n FROM t", TransformKind::Direct, None)]
#[case::two_columns("SELECT CONCAT(first_name, last_name) AS n FROM t", TransformKind::Expr, None)]
#[case::nested_aggregate("SELECT ROUND(AVG(price), 2) AS n FROM t", TransformKind::Expr, Some("avg"))]
#[case::aliased_aggregate("SELECT GROUP_CONCAT(name) AS n FROM t", TransformKind::Expr, Some("string_agg"))]
#[case::arithmetic("SELECT price * quantity AS n FROM t", TransformKind::Expr, None)]
#[case::case_expr("SELECT CASE WHEN a THEN b END AS n FROM t", TransformKind::Expr, None)]
#[case::window("SELECT LAG(price) OVER (ORDER BY day) AS n FROM t", TransformKind::Expr, Some("lag"))]
fn function_classification(
    #[case] sql: &str,
    #[case] transform: TransformKind,
    #[case] function: Option<&str>,
) {
    let result = lineage(sql);
    assert_eq!(result.columns[0].transform, transform);
    assert_eq!(result.columns[0].function.as_deref(), function);
}

#[test]
fn output_names_are_inferred() {
    let result = lineage("SELECT t.Id, count(*), a + b, (c), 'x' AS Label FROM t");
    assert_eq!(result.column_names(), vec!["id", "count", "_col2", "c", "label"]);
}

#[test]
fn duckdb_syntax_lineage() {
    let analysis = analyze(
        r#"
        SELECT
            region,
            SUM(amount)::DOUBLE AS total,
            tags[1] AS first_tag,
            list_filter(tags, t -> t <> '') AS clean_tags
        FROM sales
        GROUP BY ALL
        ORDER BY ALL DESC
        "#,
        None,
        Some(&DuckDbDialect),
    )
    .unwrap();

    let result = &analysis.lineage;
    assert!(analysis.diagnostics.is_empty());
    assert_eq!(result.column("total").unwrap().function.as_deref(), Some("sum"));
    assert_eq!(result.column("first_tag").unwrap().sources, vec![src("sales", "tags")]);
    assert_eq!(result.column("clean_tags").unwrap().sources, vec![src("sales", "tags")]);
}

#[test]
fn dialect_syntax_is_rejected_by_generic_dialect() {
    assert!(parse("SELECT a::INT FROM t").is_err());
    assert!(parse("SELECT a FROM t GROUP BY ALL").is_err());
    assert!(parse_with_dialect("SELECT a::INT FROM t", &PostgresDialect).is_ok());
    assert!(parse_with_dialect("SELECT a FROM t GROUP BY ALL", &SnowflakeDialect).is_ok());
}

#[rstest]
#[case::group_by_all("SELECT region, SUM(amount) AS total FROM sales GROUP BY ALL")]
#[case::order_by_all("SELECT a, b FROM t ORDER BY ALL DESC LIMIT 5")]
#[case::ctes_and_joins(
    "WITH x AS (SELECT id, v FROM users) SELECT x.id, y.name FROM x LEFT JOIN y ON x.id = y.id WHERE x.v > 1 ORDER BY x.id DESC NULLS LAST"
)]
#[case::set_operations("SELECT a FROM t UNION ALL SELECT b FROM u EXCEPT SELECT c FROM w")]
#[case::predicates(
    "SELECT a FROM t WHERE a NOT IN (1, 2) AND b BETWEEN 1 AND 10 AND c ILIKE 'x%' AND d IS NOT NULL"
)]
#[case::windows(
    "SELECT SUM(x) OVER w AS s, ROW_NUMBER() OVER (PARTITION BY g ORDER BY x ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS rn FROM t WINDOW w AS (PARTITION BY g)"
)]
#[case::duckdb_literals("SELECT [1, 2, 3] AS l, {'k': a} AS s, a::VARCHAR AS c, l[1:2] AS sl FROM t")]
#[case::quoted_identifiers(r#"SELECT "select", "first name" FROM "order""#)]
#[case::niladic_named_columns(r#"SELECT "current_date", t."current_time" FROM t"#)]
fn printed_sql_reparses_to_same_tree(#[case] sql: &str) {
    let stmt = parse_with_dialect(sql, &DuckDbDialect).unwrap();
    let printed = stmt.to_string();
    let reparsed = parse_with_dialect(&printed, &DuckDbDialect).unwrap();
    assert_eq!(reparsed, stmt);
}

#[test]
fn group_by_all_flag_round_trips() {
    let stmt = parse_with_dialect("SELECT a, COUNT(*) FROM t GROUP BY ALL", &DuckDbDialect).unwrap();
    let reparsed = parse_with_dialect(&stmt.to_string(), &DuckDbDialect).unwrap();
    assert_eq!(reparsed.body.left.group_by, Some(GroupBy::All));
}

#[test]
fn sql_parser_wrapper() {
    let parser = SqlParser::duckdb();
    assert_eq!(parser.dialect().name(), "duckdb");

    let parsed = parser
        .parse("with a as (select 1 as x) select x from a", Some(Path::new("models/a.sql")))
        .unwrap();
    assert_eq!(parsed.cte_names(), vec!["a"]);
    assert_eq!(parsed.canonical_sql(), "WITH a AS (SELECT 1 AS x) SELECT x FROM a");
}

#[test]
fn parse_error_positions() {
    let err = parse("SELECT a,\n  FROM t").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Syntax);
    assert_eq!(err.position.line, 2);
    assert_eq!(err.position.column, 3);

    let err = parse("SELECT a FROM t WHERE").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
    assert!(err.to_string().contains("end of input"));

    let err = parse("SELECT 'unterminated FROM t").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::IllegalToken);
}

#[test]
fn lineage_errors_carry_diagnostics() {
    let err = extract_lineage("WITH a AS (SELECT 1 AS x), a AS (SELECT 2 AS x) SELECT x FROM a", None, None)
        .unwrap_err();
    assert!(matches!(err, LineageError::Resolve(_)));
    let diagnostic = err.to_diagnostic(Some(Path::new("models/dup.sql")));
    assert_eq!(diagnostic.code, DiagnosticCode::SqlResolveError);
    assert_eq!(
        diagnostic.location.and_then(|l| l.file).as_deref(),
        Some("models/dup.sql")
    );
}

#[test]
fn unterminated_block_comment_is_lenient() {
    let result = lineage("SELECT id FROM t /* trailing comment never closed");
    assert_eq!(result.sources, vec!["t"]);
}

#[test]
fn lineage_serializes_to_stable_shape() {
    let result = lineage("SELECT id, SUM(x) AS s FROM t");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "sources": ["t"],
            "columns": [
                {
                    "name": "id",
                    "transform": "",
                    "sources": [{"table": "t", "column": "id"}]
                },
                {
                    "name": "s",
                    "transform": "EXPR",
                    "function": "sum",
                    "sources": [{"table": "t", "column": "x"}]
                }
            ]
        })
    );

    let back: ModelLineage = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
}

#[test]
fn extraction_is_dialect_independent_for_plain_sql() {
    let sql = "SELECT o.id, SUM(o.amount) AS total FROM orders o GROUP BY o.id";
    let dialects: [&dyn Dialect; 3] = [&GenericDialect, &DuckDbDialect, &PostgresDialect];
    let results: Vec<ModelLineage> = dialects
        .iter()
        .map(|d| extract_lineage(sql, None, Some(*d)).unwrap())
        .collect();
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}
