//! Column-level lineage extraction
//!
//! Walks a resolved statement and produces, for every output column, the
//! physical columns it reads and whether it is a direct copy or a computed
//! expression.

use crate::ast::{Expr, FunctionCall, NamedWindow, SelectCore, SelectItem, SelectStmt, WindowSpec};
use crate::dialect::{Dialect, FunctionKind, GenericDialect};
use crate::parser::{parse_with_dialect, ParseError};
use crate::resolver::{ResolveError, Resolver};
use crate::scope::{ColumnResolution, ColumnTrace, Scope, StarColumn};
use sqlineage_core::{ColumnLineage, Diagnostic, DiagnosticCode, ModelLineage, Severity, TransformKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, trace};

/// Known table columns, used for star expansion and unqualified lookups
#[derive(Debug, Clone, Default)]
pub struct LineageContext {
    /// Lowercased table name to column names
    tables: HashMap<String, Vec<String>>,
}

impl LineageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table's columns; `name` may be qualified (`schema.table`)
    pub fn add_table(&mut self, name: impl AsRef<str>, columns: Vec<String>) {
        self.tables.insert(name.as_ref().to_lowercase(), columns);
    }

    pub fn from_schema(schema: &BTreeMap<String, Vec<String>>) -> Self {
        let mut context = Self::new();
        for (table, columns) in schema {
            context.add_table(table, columns.clone());
        }
        context
    }

    pub fn get_table_columns(&self, name: &str) -> Option<&[String]> {
        self.tables.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    /// Columns for a table given its name parts, trying the full name,
    /// then `schema.name`, then the bare name
    pub fn lookup(&self, parts: &[String]) -> Option<&[String]> {
        (0..parts.len()).find_map(|start| self.get_table_columns(&parts[start..].join(".")))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Lineage of one statement before it becomes a `ModelLineage`
#[derive(Debug, Default)]
pub(crate) struct StatementLineage {
    pub columns: Vec<ColumnLineage>,
    pub sources: BTreeSet<String>,
    /// Some `*` could not be expanded
    pub open: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl StatementLineage {
    /// Merge a set-operation branch positionally into this one
    fn merge(&mut self, branch: StatementLineage) {
        for (column, other) in self.columns.iter_mut().zip(&branch.columns) {
            column.extend_sources(other.sources.iter());
            column.transform = TransformKind::Expr;
            if column.function.is_none() {
                column.function = other.function.clone();
            }
        }
        self.sources.extend(branch.sources);
        self.open |= branch.open;
        self.diagnostics.extend(branch.diagnostics);
    }

    fn into_model(self) -> ModelLineage {
        ModelLineage {
            sources: self.sources.into_iter().collect(),
            columns: self.columns,
        }
    }
}

/// A column trace plus whether the expression reads no columns at all
#[derive(Debug, Clone)]
struct Trace {
    column: ColumnTrace,
    constant: bool,
}

impl Trace {
    fn constant() -> Self {
        Self {
            column: ColumnTrace {
                transform: TransformKind::Expr,
                function: None,
                sources: Vec::new(),
            },
            constant: true,
        }
    }

    fn computed() -> Self {
        Self {
            constant: false,
            ..Self::constant()
        }
    }

    fn resolved(column: ColumnTrace) -> Self {
        Self {
            column,
            constant: false,
        }
    }

    fn absorb(&mut self, other: &Trace) {
        for source in &other.column.sources {
            if !self.column.sources.contains(source) {
                self.column.sources.push(source.clone());
            }
        }
        if self.column.function.is_none() {
            self.column.function = other.column.function.clone();
        }
        self.constant &= other.constant;
    }
}

/// Per-select-core walk state
struct TraceState<'c> {
    windows: &'c [NamedWindow],
    lambda_params: Vec<String>,
    discovered: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
    /// Output column currently being traced
    column: String,
}

impl<'c> TraceState<'c> {
    fn new(windows: &'c [NamedWindow]) -> Self {
        Self {
            windows,
            lambda_params: Vec::new(),
            discovered: BTreeSet::new(),
            diagnostics: Vec::new(),
            column: String::new(),
        }
    }

    fn window(&self, name: &str) -> Option<&'c crate::ast::WindowDef> {
        self.windows
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(name))
            .map(|w| &w.spec)
    }
}

/// Lineage extractor over a resolved scope
#[derive(Clone, Copy)]
pub struct LineageExtractor<'a> {
    dialect: &'a dyn Dialect,
    context: &'a LineageContext,
}

impl<'a> LineageExtractor<'a> {
    pub fn new(dialect: &'a dyn Dialect, context: &'a LineageContext) -> Self {
        Self { dialect, context }
    }

    fn normalize(&self, name: &str) -> String {
        self.dialect.normalize_name(name)
    }

    /// Extract lineage for a statement resolved into `scope`
    pub fn extract(&self, stmt: &SelectStmt, scope: &Scope<'_>) -> Result<ModelLineage, ResolveError> {
        Ok(self.extract_statement(stmt, scope)?.into_model())
    }

    pub(crate) fn extract_statement(
        &self,
        stmt: &SelectStmt,
        scope: &Scope<'_>,
    ) -> Result<StatementLineage, ResolveError> {
        let mut lineage = self.extract_level(&stmt.body.left, scope);

        let resolver = Resolver::new(self.dialect, self.context);
        let mut next = stmt.body.set_op.as_ref();
        while let Some(set_op) = next {
            let core = &set_op.right.left;
            let mut branch_scope = scope.isolated_child();
            resolver.resolve_core(core, &mut branch_scope)?;
            let branch = self.extract_level(core, &branch_scope);
            trace!(op = %set_op.op, columns = branch.columns.len(), "merging set operation branch");
            lineage.merge(branch);
            next = set_op.right.set_op.as_ref();
        }
        Ok(lineage)
    }

    /// One select core plus everything its scope registered
    fn extract_level(&self, core: &SelectCore, scope: &Scope<'_>) -> StatementLineage {
        let mut lineage = StatementLineage {
            sources: scope.sources(),
            diagnostics: scope.diagnostics().to_vec(),
            ..StatementLineage::default()
        };
        let mut state = TraceState::new(&core.windows);

        for (index, item) in core.items.iter().enumerate() {
            match item {
                SelectItem::Star => self.push_star(None, scope, &mut lineage),
                SelectItem::QualifiedStar(qualifier) => {
                    let qualifier = self.normalize(qualifier);
                    self.push_star(Some(&qualifier), scope, &mut lineage);
                }
                SelectItem::Expr { expr, alias } => {
                    let name = match alias {
                        Some(alias) => self.normalize(alias),
                        None => self.infer_name(expr, index),
                    };
                    state.column = name.clone();
                    let traced = self.trace(expr, scope, &mut state);
                    trace!(
                        column = %name,
                        transform = %traced.column.transform,
                        sources = traced.column.sources.len(),
                        "traced column"
                    );
                    lineage.columns.push(traced.column.into_lineage(name));
                }
            }
        }

        lineage.sources.extend(state.discovered);
        lineage.diagnostics.extend(state.diagnostics);
        lineage
    }

    fn push_star(&self, qualifier: Option<&str>, scope: &Scope<'_>, lineage: &mut StatementLineage) {
        for column in scope.expand_star(qualifier) {
            match column {
                StarColumn::Column { name, trace } => lineage.columns.push(trace.into_lineage(name)),
                StarColumn::Unexpanded { qualifier } => {
                    let name = StarColumn::placeholder_name(qualifier.as_deref());
                    let message = match &qualifier {
                        Some(q) => format!("Cannot expand '{}': columns of '{}' are unknown", name, q),
                        None => format!("Cannot expand '{}': no schema for the tables in FROM", name),
                    };
                    debug!(star = %name, "star left unexpanded");
                    lineage.open = true;
                    lineage.diagnostics.push(
                        Diagnostic::new(DiagnosticCode::LineageStarUnexpanded, Severity::Warn, message)
                            .with_column(name.clone()),
                    );
                    lineage.columns.push(ColumnLineage::new(name, TransformKind::Direct));
                }
            }
        }
    }

    fn infer_name(&self, expr: &Expr, index: usize) -> String {
        match expr {
            Expr::Column { name, .. } => self.normalize(name),
            Expr::Function(call) => self.normalize(&call.name),
            Expr::Nested(inner) => self.infer_name(inner, index),
            _ => format!("_col{}", index),
        }
    }

    fn trace(&self, expr: &Expr, scope: &Scope<'_>, state: &mut TraceState<'_>) -> Trace {
        match expr {
            Expr::Column { table, name } => self.trace_column(table.as_deref(), name, scope, state),
            Expr::Literal(_) => Trace::constant(),
            Expr::Nested(inner) => self.trace(inner, scope, state),
            Expr::Function(call) => self.trace_function(call, scope, state),
            Expr::Cast { expr, .. } => {
                let mut traced = self.trace(expr, scope, state);
                traced.column.transform = TransformKind::Expr;
                traced
            }
            Expr::Lambda { params, body } => {
                let depth = state.lambda_params.len();
                state
                    .lambda_params
                    .extend(params.iter().map(|p| self.normalize(p)));
                let body = self.trace(body, scope, state);
                state.lambda_params.truncate(depth);

                let mut traced = Trace::computed();
                traced.absorb(&body);
                traced.constant = false;
                traced
            }
            Expr::Star | Expr::Subquery(_) | Expr::Exists(_) => Trace::computed(),
            _ => self.combine(expr.children(), scope, state),
        }
    }

    fn trace_column(
        &self,
        qualifier: Option<&str>,
        name: &str,
        scope: &Scope<'_>,
        state: &mut TraceState<'_>,
    ) -> Trace {
        let name = self.normalize(name);
        if qualifier.is_none() && state.lambda_params.contains(&name) {
            return Trace::computed();
        }
        let qualifier = qualifier.map(|q| self.normalize(q));

        match scope.resolve_column(qualifier.as_deref(), &name) {
            ColumnResolution::Resolved(column) => Trace::resolved(column),
            ColumnResolution::Discovered(source) => {
                trace!(table = %source.table, column = %source.column, "discovered source table");
                state.discovered.insert(source.table.clone());
                Trace::resolved(ColumnTrace::direct(source))
            }
            ColumnResolution::Unresolved(fallback) => {
                let reference = match &qualifier {
                    Some(q) => format!("{}.{}", q, name),
                    None => name,
                };
                debug!(column = %reference, "unresolved column reference");
                state.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::LineageUnresolvedColumn,
                        Severity::Info,
                        format!("Column '{}' could not be traced to any table", reference),
                    )
                    .with_column(state.column.clone()),
                );
                Trace::resolved(ColumnTrace::direct(fallback))
            }
        }
    }

    fn combine(&self, children: Vec<&Expr>, scope: &Scope<'_>, state: &mut TraceState<'_>) -> Trace {
        let mut out = Trace::constant();
        for child in children {
            let traced = self.trace(child, scope, state);
            out.absorb(&traced);
        }
        out
    }

    fn trace_function(&self, call: &FunctionCall, scope: &Scope<'_>, state: &mut TraceState<'_>) -> Trace {
        let mut kind = self.dialect.classify_function(&call.name);
        if kind == FunctionKind::Passthrough && call.over.is_some() {
            kind = FunctionKind::Window;
        }

        let args: Vec<Trace> = call
            .args
            .iter()
            .map(|arg| self.trace(arg, scope, state))
            .collect();

        let mut out = Trace::constant();
        for arg in &args {
            out.absorb(arg);
        }

        // FILTER, in-argument ORDER BY and the window clause
        let mut extras: Vec<&Expr> = call.order_by.iter().map(|o| &o.expr).collect();
        extras.extend(call.filter.as_deref());
        match &call.over {
            Some(WindowSpec::Inline(def)) => {
                extras.extend(def.exprs());
                if let Some(base) = def.base.as_deref().and_then(|b| state.window(b)) {
                    extras.extend(base.exprs());
                }
            }
            Some(WindowSpec::Named(name)) => {
                if let Some(def) = state.window(name) {
                    extras.extend(def.exprs());
                }
            }
            None => {}
        }
        for expr in extras {
            let traced = self.trace(expr, scope, state);
            out.absorb(&traced);
        }

        match kind {
            FunctionKind::Aggregate | FunctionKind::Window => {
                out.column.function = Some(self.dialect.canonical_function_name(&call.name));
                out.constant = false;
            }
            FunctionKind::Generator => {
                out.column.sources.clear();
                out.constant = false;
            }
            FunctionKind::Table => out.constant = false,
            FunctionKind::Passthrough => {
                // a nested aggregate or window keeps the column computed
                if out.column.sources.len() == 1 && out.column.function.is_none() {
                    out.column.transform = TransformKind::Direct;
                }
                out.constant &= !args.is_empty();
            }
        }
        out
    }

    /// Trace for the columns of a table function in FROM
    pub(crate) fn trace_table_function(&self, call: &FunctionCall, scope: &Scope<'_>) -> ColumnTrace {
        let mut state = TraceState::new(&[]);
        let mut out = Trace::computed();
        for arg in &call.args {
            let traced = self.trace(arg, scope, &mut state);
            out.absorb(&traced);
        }
        out.column.transform = TransformKind::Expr;
        out.column
    }
}

/// Lineage plus the non-fatal findings raised while computing it
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub lineage: ModelLineage,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Errors from the full parse-resolve-extract pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum LineageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl LineageError {
    pub fn to_diagnostic(&self, file_path: Option<&Path>) -> Diagnostic {
        match self {
            LineageError::Parse(err) => err.to_diagnostic(file_path),
            LineageError::Resolve(err) => {
                let diagnostic = err.to_diagnostic();
                match file_path {
                    Some(path) => diagnostic.in_file(path.display().to_string()),
                    None => diagnostic,
                }
            }
        }
    }
}

/// Parse, resolve and extract lineage, keeping diagnostics
///
/// `schema` maps table names to their columns; without it, `*` is left
/// unexpanded. `dialect` defaults to ANSI.
pub fn analyze(
    sql: &str,
    schema: Option<&LineageContext>,
    dialect: Option<&dyn Dialect>,
) -> Result<Analysis, LineageError> {
    let dialect = dialect.unwrap_or(&GenericDialect);
    let empty = LineageContext::new();
    let context = schema.unwrap_or(&empty);

    let stmt = parse_with_dialect(sql, dialect)?;
    let scope = Resolver::new(dialect, context).resolve(&stmt)?;
    let mut lineage = LineageExtractor::new(dialect, context).extract_statement(&stmt, &scope)?;

    debug!(
        dialect = dialect.name(),
        columns = lineage.columns.len(),
        sources = lineage.sources.len(),
        diagnostics = lineage.diagnostics.len(),
        "extracted lineage"
    );

    let diagnostics = std::mem::take(&mut lineage.diagnostics);
    Ok(Analysis {
        lineage: lineage.into_model(),
        diagnostics,
    })
}

/// Column lineage for one SELECT/WITH statement
pub fn extract_lineage(
    sql: &str,
    schema: Option<&LineageContext>,
    dialect: Option<&dyn Dialect>,
) -> Result<ModelLineage, LineageError> {
    analyze(sql, schema, dialect).map(|analysis| analysis.lineage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DuckDbDialect;
    use pretty_assertions::assert_eq;
    use sqlineage_core::SourceColumn;

    fn lineage(sql: &str) -> ModelLineage {
        extract_lineage(sql, None, None).unwrap()
    }

    fn src(table: &str, column: &str) -> SourceColumn {
        SourceColumn::new(table, column)
    }

    #[test]
    fn context_lookup_order() {
        let mut context = LineageContext::new();
        context.add_table("Orders", vec!["id".to_string()]);
        context.add_table("raw.customers", vec!["id".to_string(), "name".to_string()]);

        let parts = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(context.lookup(&parts(&["db", "sales", "orders"])).map(|c| c.len()), Some(1));
        assert_eq!(context.lookup(&parts(&["raw", "customers"])).map(|c| c.len()), Some(2));
        assert!(context.lookup(&parts(&["customers"])).is_none());
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn literal_is_expression_without_sources() {
        let result = lineage("SELECT 1 AS one, 'x' FROM t");
        assert_eq!(result.columns[0].transform, TransformKind::Expr);
        assert!(result.columns[0].sources.is_empty());
        assert_eq!(result.columns[1].name, "_col1");
        assert_eq!(result.sources, vec!["t"]);
    }

    #[test]
    fn passthrough_collapses_to_direct() {
        let result = lineage("SELECT UPPER(name) AS n, COALESCE(a, 0) AS c, CONCAT(a, b) AS ab FROM t");
        assert_eq!(result.columns[0].transform, TransformKind::Direct);
        assert_eq!(result.columns[0].sources, vec![src("t", "name")]);
        assert_eq!(result.columns[1].transform, TransformKind::Direct);
        assert_eq!(result.columns[2].transform, TransformKind::Expr);
        assert_eq!(result.columns[2].sources, vec![src("t", "a"), src("t", "b")]);
    }

    #[test]
    fn passthrough_over_single_source_expression_is_direct() {
        for sql in [
            "SELECT UPPER(a || 'x') AS u FROM t",
            "SELECT UPPER(CAST(a AS TEXT)) AS u FROM t",
            "SELECT LOWER(TRIM(a)) AS u FROM t",
        ] {
            let result = lineage(sql);
            assert_eq!(result.columns[0].transform, TransformKind::Direct, "{}", sql);
            assert_eq!(result.columns[0].sources, vec![src("t", "a")], "{}", sql);
        }
    }

    #[test]
    fn nested_aggregate_function_carried_up() {
        let result = lineage("SELECT ROUND(SUM(amount), 2) AS total FROM orders");
        let total = &result.columns[0];
        assert_eq!(total.transform, TransformKind::Expr);
        assert_eq!(total.function.as_deref(), Some("sum"));
        assert_eq!(total.sources, vec![src("orders", "amount")]);
    }

    #[test]
    fn count_star_has_no_sources() {
        let result = lineage("SELECT COUNT(*) AS n FROM orders");
        assert_eq!(result.columns[0].function.as_deref(), Some("count"));
        assert!(result.columns[0].sources.is_empty());
        assert_eq!(result.sources, vec!["orders"]);
    }

    #[test]
    fn window_function_scans_partition_and_order() {
        let result = lineage(
            "SELECT ROW_NUMBER() OVER (PARTITION BY customer_id ORDER BY created_at) AS rn FROM orders",
        );
        let rn = &result.columns[0];
        assert_eq!(rn.function.as_deref(), Some("row_number"));
        assert_eq!(
            rn.sources,
            vec![src("orders", "customer_id"), src("orders", "created_at")]
        );
    }

    #[test]
    fn named_window_is_scanned() {
        let result = lineage("SELECT SUM(x) OVER w AS s FROM t WINDOW w AS (PARTITION BY g)");
        assert_eq!(result.columns[0].sources, vec![src("t", "x"), src("t", "g")]);
    }

    #[test]
    fn filter_clause_is_scanned() {
        let result = lineage("SELECT COUNT(*) FILTER (WHERE status = 'ok') AS ok FROM t");
        assert_eq!(result.columns[0].sources, vec![src("t", "status")]);
    }

    #[test]
    fn case_collects_all_branches() {
        let result = lineage("SELECT CASE WHEN a > 0 THEN b ELSE c END AS v FROM t");
        assert_eq!(result.columns[0].transform, TransformKind::Expr);
        assert_eq!(result.columns[0].sources.len(), 3);
    }

    #[test]
    fn cast_forwards_sources() {
        let result = lineage("SELECT CAST(id AS VARCHAR) AS id FROM t");
        assert_eq!(result.columns[0].transform, TransformKind::Expr);
        assert_eq!(result.columns[0].sources, vec![src("t", "id")]);
    }

    #[test]
    fn join_columns_by_alias() {
        let result = lineage(
            "SELECT o.id, c.name FROM orders o LEFT JOIN customers c ON o.customer_id = c.id",
        );
        assert_eq!(result.sources, vec!["customers", "orders"]);
        assert_eq!(result.columns[0].sources, vec![src("orders", "id")]);
        assert_eq!(result.columns[1].sources, vec![src("customers", "name")]);
    }

    #[test]
    fn unresolved_column_reported() {
        let analysis = analyze("SELECT a FROM t1 JOIN t2 ON t1.id = t2.id", None, None).unwrap();
        // several entries with unknown columns: first one wins
        assert_eq!(analysis.lineage.columns[0].sources, vec![src("t1", "a")]);

        let analysis = analyze("SELECT x", None, None).unwrap();
        assert_eq!(analysis.lineage.columns[0].sources, vec![src("", "x")]);
        assert!(analysis.lineage.sources.is_empty());
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].code, DiagnosticCode::LineageUnresolvedColumn);
        assert!(!analysis.has_errors());

        let analysis = analyze("WITH a AS (SELECT id FROM u) SELECT a.foo FROM a", None, None).unwrap();
        assert_eq!(
            analysis.lineage.columns[0],
            ColumnLineage::direct("foo", src("u", "foo"))
        );
        assert_eq!(analysis.diagnostics[0].column.as_deref(), Some("foo"));
    }

    #[test]
    fn star_placeholder_diagnostic() {
        let analysis = analyze("SELECT * FROM t", None, None).unwrap();
        assert_eq!(analysis.diagnostics[0].code, DiagnosticCode::LineageStarUnexpanded);
        assert_eq!(analysis.diagnostics[0].column.as_deref(), Some("*"));
    }

    #[test]
    fn star_partially_known() {
        let mut context = LineageContext::new();
        context.add_table("a", vec!["x".to_string()]);
        let result =
            extract_lineage("SELECT * FROM a JOIN b ON a.x = b.x", Some(&context), None).unwrap();
        assert_eq!(result.column_names(), vec!["x", "b.*"]);
    }

    #[test]
    fn lambda_params_are_not_columns() {
        let analysis = analyze(
            "SELECT list_transform(xs, x -> x + 1) AS ys FROM t",
            None,
            Some(&DuckDbDialect),
        )
        .unwrap();
        assert_eq!(analysis.lineage.columns[0].sources, vec![src("t", "xs")]);
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn discovered_qualifier_is_a_source() {
        let result = lineage("SELECT t.a, other.b FROM t");
        assert_eq!(result.sources, vec!["other", "t"]);
        assert_eq!(result.columns[1].sources, vec![src("other", "b")]);
    }

    #[test]
    fn union_keeps_left_names() {
        let result = lineage("SELECT a AS x FROM t UNION ALL SELECT b AS y FROM u");
        assert_eq!(result.column_names(), vec!["x"]);
        assert_eq!(result.columns[0].sources, vec![src("t", "a"), src("u", "b")]);
    }

    #[test]
    fn parse_error_becomes_diagnostic() {
        let err = extract_lineage("SELECT FROM", None, None).unwrap_err();
        assert!(matches!(err, LineageError::Parse(_)));
        let diagnostic = err.to_diagnostic(Some(Path::new("models/a.sql")));
        assert_eq!(diagnostic.code, DiagnosticCode::SqlParseError);
    }
}
