//! Name resolution for CTEs, aliases, and table references
//!
//! Builds the scope tree for a statement. Every CTE, derived table and
//! LATERAL subquery is resolved when it is registered, and its output is
//! flattened into a `Relation` so later column lookups never walk back
//! through the query history.

use crate::ast::{Cte, Expr, JoinConstraint, SelectCore, SelectItem, SelectStmt, TableRef, WithClause};
use crate::dialect::Dialect;
use crate::lineage::{LineageContext, LineageExtractor};
use crate::scope::{Relation, Scope, ScopeEntry};
use sqlineage_core::{Diagnostic, DiagnosticCode, Severity};
use std::rc::Rc;
use tracing::{debug, trace};

/// Scope resolver for SELECT statements
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    dialect: &'a dyn Dialect,
    context: &'a LineageContext,
}

impl<'a> Resolver<'a> {
    pub fn new(dialect: &'a dyn Dialect, context: &'a LineageContext) -> Self {
        Self { dialect, context }
    }

    fn extractor(&self) -> LineageExtractor<'a> {
        LineageExtractor::new(self.dialect, self.context)
    }

    fn normalize(&self, name: &str) -> String {
        self.dialect.normalize_name(name)
    }

    /// Resolve a statement into its root scope
    pub fn resolve(&self, stmt: &SelectStmt) -> Result<Scope<'static>, ResolveError> {
        let mut scope = Scope::root();
        self.resolve_into(stmt, &mut scope)?;
        Ok(scope)
    }

    /// Register the WITH clause and the first select core of `stmt` into `scope`
    ///
    /// Set-operation branches are resolved by the extractor, each in its own
    /// child scope.
    pub fn resolve_into(&self, stmt: &SelectStmt, scope: &mut Scope<'_>) -> Result<(), ResolveError> {
        if let Some(with) = &stmt.with {
            self.register_ctes(with, scope)?;
        }
        self.resolve_core(&stmt.body.left, scope)
    }

    fn register_ctes(&self, with: &WithClause, scope: &mut Scope<'_>) -> Result<(), ResolveError> {
        for cte in &with.ctes {
            let name = self.normalize(&cte.name);
            if scope.has_own_cte(&name) {
                return Err(ResolveError::DuplicateCte(cte.name.clone()));
            }

            let (relation, diagnostics) = if with.recursive {
                // first pass sees a placeholder for itself, second pass sees the first result
                let columns: Vec<String> = cte.columns.iter().map(|c| self.normalize(c)).collect();
                let placeholder = Relation::placeholder(name.clone(), &columns);
                let (first, _) = self.cte_relation(cte, &name, scope, Some(placeholder))?;
                self.cte_relation(cte, &name, scope, Some(first))?
            } else {
                self.cte_relation(cte, &name, scope, None)?
            };

            debug!(
                cte = %name,
                columns = relation.columns.len(),
                sources = ?relation.sources,
                "registered CTE"
            );
            scope.push_diagnostics(diagnostics);
            scope.define_cte(name, relation);
        }
        Ok(())
    }

    fn cte_relation(
        &self,
        cte: &Cte,
        name: &str,
        scope: &Scope<'_>,
        self_reference: Option<Relation>,
    ) -> Result<(Relation, Vec<Diagnostic>), ResolveError> {
        let mut outer = scope.isolated_child();
        if let Some(relation) = self_reference {
            outer.define_cte(name, relation);
        }
        let (mut relation, diagnostics) = self.relation_for(&cte.query, name, &outer, false)?;
        if !cte.columns.is_empty() {
            let columns: Vec<String> = cte.columns.iter().map(|c| self.normalize(c)).collect();
            relation.rename_columns(&columns);
        }
        Ok((relation, diagnostics))
    }

    /// Resolve a nested statement and flatten its output
    ///
    /// `correlated` statements may see the FROM entries of `parent`.
    fn relation_for(
        &self,
        query: &SelectStmt,
        name: &str,
        parent: &Scope<'_>,
        correlated: bool,
    ) -> Result<(Relation, Vec<Diagnostic>), ResolveError> {
        let mut scope = if correlated {
            parent.child()
        } else {
            parent.isolated_child()
        };
        self.resolve_into(query, &mut scope)?;
        let lineage = self.extractor().extract_statement(query, &scope)?;
        let relation = Relation {
            name: name.to_string(),
            columns: lineage.columns,
            sources: lineage.sources,
            open: lineage.open,
        };
        Ok((relation, lineage.diagnostics))
    }

    /// Register FROM entries and expression subqueries of one select core
    pub(crate) fn resolve_core(&self, core: &SelectCore, scope: &mut Scope<'_>) -> Result<(), ResolveError> {
        if core.items.is_empty() {
            return Err(ResolveError::EmptyStatement);
        }

        if let Some(from) = &core.from {
            for table_ref in from.tables() {
                self.register_table_ref(table_ref, scope)?;
            }
            for join in &from.joins {
                if let Some(JoinConstraint::On(expr)) = &join.constraint {
                    self.resolve_subqueries(expr, scope)?;
                }
            }
        }

        let clauses = core
            .where_clause
            .iter()
            .chain(core.having.iter())
            .chain(core.qualify.iter());
        for expr in clauses {
            self.resolve_subqueries(expr, scope)?;
        }
        for item in &core.items {
            if let SelectItem::Expr { expr, .. } = item {
                self.resolve_subqueries(expr, scope)?;
            }
        }
        Ok(())
    }

    fn register_table_ref(&self, table_ref: &TableRef, scope: &mut Scope<'_>) -> Result<(), ResolveError> {
        match table_ref {
            TableRef::Table(table) => {
                let name = self.normalize(&table.name);
                let key = table
                    .alias
                    .as_deref()
                    .map(|a| self.normalize(a))
                    .unwrap_or_else(|| name.clone());

                if !table.is_qualified() {
                    if let Some(relation) = scope.lookup_cte(&name) {
                        trace!(cte = %name, alias = %key, "FROM references CTE");
                        scope.add_entry(key, ScopeEntry::Cte(relation));
                        return Ok(());
                    }
                }

                let parts: Vec<String> = table.parts().into_iter().map(|p| self.normalize(p)).collect();
                let columns = self
                    .context
                    .lookup(&parts)
                    .map(|cols| cols.iter().map(|c| self.normalize(c)).collect::<Vec<_>>());
                let qualified = parts.join(".");
                debug!(
                    table = %qualified,
                    alias = %key,
                    known_columns = columns.is_some(),
                    "registered table"
                );
                scope.add_entry(key, ScopeEntry::Table { name: qualified, columns });
            }
            TableRef::Derived { query, alias } => {
                let key = self.entry_key(alias.as_deref(), "_derived", scope);
                let (relation, diagnostics) = self.relation_for(query, &key, scope, false)?;
                debug!(derived = %key, sources = ?relation.sources, "registered derived table");
                scope.push_diagnostics(diagnostics);
                scope.add_entry(key, ScopeEntry::Derived(Rc::new(relation)));
            }
            TableRef::Lateral { query, alias } => {
                let key = self.entry_key(alias.as_deref(), "_lateral", scope);
                let (relation, diagnostics) = self.relation_for(query, &key, scope, true)?;
                debug!(lateral = %key, sources = ?relation.sources, "registered lateral subquery");
                scope.push_diagnostics(diagnostics);
                scope.add_entry(key, ScopeEntry::Derived(Rc::new(relation)));
            }
            TableRef::Function { call, alias } => {
                let name = self.normalize(&call.name);
                let key = alias
                    .as_deref()
                    .map(|a| self.normalize(a))
                    .unwrap_or_else(|| name.clone());
                let trace = self.extractor().trace_table_function(call, scope);
                debug!(function = %name, alias = %key, "registered table function");
                scope.add_entry(key, ScopeEntry::Function { name, trace });
            }
        }
        Ok(())
    }

    fn entry_key(&self, alias: Option<&str>, prefix: &str, scope: &Scope<'_>) -> String {
        match alias {
            Some(alias) => self.normalize(alias),
            None => format!("{}{}", prefix, scope.entries().count()),
        }
    }

    /// Resolve subqueries nested in an expression; their tables become sources of `scope`
    fn resolve_subqueries(&self, expr: &Expr, scope: &mut Scope<'_>) -> Result<(), ResolveError> {
        let mut queries = Vec::new();
        collect_subqueries(expr, &mut queries);
        for query in queries {
            let (relation, diagnostics) = self.relation_for(query, "subquery", scope, true)?;
            trace!(sources = ?relation.sources, "resolved expression subquery");
            scope.add_subquery_sources(relation.sources);
            scope.push_diagnostics(diagnostics);
        }
        Ok(())
    }
}

fn collect_subqueries<'e>(expr: &'e Expr, out: &mut Vec<&'e SelectStmt>) {
    if let Some(query) = expr.subquery() {
        out.push(query);
    }
    for child in expr.children() {
        collect_subqueries(child, out);
    }
}

/// Name resolution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Empty statement: select list has no items")]
    EmptyStatement,

    #[error("Duplicate CTE name: {0}")]
    DuplicateCte(String),
}

impl ResolveError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticCode::SqlResolveError, Severity::Error, self.to_string())
    }
}
