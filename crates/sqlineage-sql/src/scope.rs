//! Lexical scopes for name resolution
//!
//! One scope exists per query level. A child borrows its parent, so scopes
//! form a tree that lives on the resolving call stack. CTE definitions are
//! visible through the whole parent chain; FROM entries are only visible to
//! correlated children (subqueries in expressions and LATERAL).

use sqlineage_core::{ColumnLineage, Diagnostic, SourceColumn, TransformKind};
use std::collections::BTreeSet;
use std::rc::Rc;

/// Where an output column's value comes from
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnTrace {
    pub transform: TransformKind,
    pub function: Option<String>,
    pub sources: Vec<SourceColumn>,
}

impl ColumnTrace {
    pub fn direct(source: SourceColumn) -> Self {
        Self {
            transform: TransformKind::Direct,
            function: None,
            sources: vec![source],
        }
    }

    pub fn from_lineage(column: &ColumnLineage) -> Self {
        Self {
            transform: column.transform,
            function: column.function.clone(),
            sources: column.sources.clone(),
        }
    }

    pub fn into_lineage(self, name: impl Into<String>) -> ColumnLineage {
        let mut column = ColumnLineage::new(name, self.transform);
        column.function = self.function;
        column.extend_sources(self.sources.iter());
        column
    }
}

/// Output of a CTE or derived table, flattened to physical sources when registered
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relation {
    pub name: String,
    pub columns: Vec<ColumnLineage>,
    /// Physical tables reachable through this relation
    pub sources: BTreeSet<String>,
    /// A `*` in the body was not expanded, so `columns` may be incomplete
    pub open: bool,
}

impl Relation {
    /// Stand-in for a recursive CTE while its own body is resolved
    pub fn placeholder(name: impl Into<String>, columns: &[String]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|c| ColumnLineage::new(c.clone(), TransformKind::Direct))
                .collect(),
            sources: BTreeSet::new(),
            open: columns.is_empty(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnLineage> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Apply an explicit column list, `WITH a(x, y) AS (...)`
    pub fn rename_columns(&mut self, names: &[String]) {
        for (column, name) in self.columns.iter_mut().zip(names) {
            column.name = name.clone();
        }
    }

    fn has_column(&self, name: &str) -> Option<bool> {
        if self.column(name).is_some() {
            Some(true)
        } else if self.open {
            None
        } else {
            Some(false)
        }
    }

    /// Best-effort source for a column this relation does not expose
    fn fallback_source(&self, column: &str) -> SourceColumn {
        let table = match (self.sources.len(), self.sources.iter().next()) {
            (1, Some(table)) => table.clone(),
            _ => String::new(),
        };
        SourceColumn::new(table, column)
    }

    fn trace(&self, column: &str) -> Option<ColumnTrace> {
        if let Some(col) = self.column(column) {
            return Some(ColumnTrace::from_lineage(col));
        }
        // unexpanded star over a single table: assume the column passes through
        match (self.open, self.sources.iter().next()) {
            (true, Some(table)) if self.sources.len() == 1 => {
                Some(ColumnTrace::direct(SourceColumn::new(table.clone(), column)))
            }
            // nothing known yet, e.g. a recursive CTE seen from its own body
            (true, None) => Some(ColumnTrace {
                transform: TransformKind::Expr,
                function: None,
                sources: Vec::new(),
            }),
            _ => None,
        }
    }

    /// Open with nothing but unexpanded `*` placeholders as columns
    fn only_placeholders(&self) -> bool {
        self.open && self.columns.iter().all(|c| c.name == "*" || c.name.ends_with(".*"))
    }
}

/// Something a FROM clause made visible under a name
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeEntry {
    /// Physical table, with its columns when a schema knows them
    Table {
        name: String,
        columns: Option<Vec<String>>,
    },
    Cte(Rc<Relation>),
    Derived(Rc<Relation>),
    /// Table function; every column derives from its arguments
    Function { name: String, trace: ColumnTrace },
}

impl ScopeEntry {
    /// `Some(true/false)` when the column set is known, `None` otherwise
    pub fn has_column(&self, column: &str) -> Option<bool> {
        match self {
            ScopeEntry::Table { columns: Some(cols), .. } => Some(cols.iter().any(|c| c == column)),
            ScopeEntry::Table { columns: None, .. } | ScopeEntry::Function { .. } => None,
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) => rel.has_column(column),
        }
    }

    pub fn trace(&self, column: &str) -> Option<ColumnTrace> {
        match self {
            ScopeEntry::Table { name, .. } => {
                Some(ColumnTrace::direct(SourceColumn::new(name.clone(), column)))
            }
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) => rel.trace(column),
            ScopeEntry::Function { trace, .. } => Some(trace.clone()),
        }
    }

    fn fallback_source(&self, column: &str) -> SourceColumn {
        match self {
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) => rel.fallback_source(column),
            ScopeEntry::Table { name, .. } => SourceColumn::new(name.clone(), column),
            ScopeEntry::Function { .. } => SourceColumn::new("", column),
        }
    }

    /// Columns for `*`, when known
    pub fn expand(&self) -> Option<Vec<(String, ColumnTrace)>> {
        match self {
            ScopeEntry::Table {
                name,
                columns: Some(cols),
            } => Some(
                cols.iter()
                    .map(|c| (c.clone(), ColumnTrace::direct(SourceColumn::new(name.clone(), c.clone()))))
                    .collect(),
            ),
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) if rel.only_placeholders() => None,
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) => Some(
                rel.columns
                    .iter()
                    .map(|c| (c.name.clone(), ColumnTrace::from_lineage(c)))
                    .collect(),
            ),
            ScopeEntry::Table { columns: None, .. } | ScopeEntry::Function { .. } => None,
        }
    }

    fn collect_sources(&self, out: &mut BTreeSet<String>) {
        match self {
            ScopeEntry::Table { name, .. } => {
                out.insert(name.clone());
            }
            ScopeEntry::Cte(rel) | ScopeEntry::Derived(rel) => {
                out.extend(rel.sources.iter().cloned());
            }
            ScopeEntry::Function { trace, .. } => {
                out.extend(trace.sources.iter().map(|s| s.table.clone()));
            }
        }
    }
}

/// Outcome of resolving one column reference
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnResolution {
    Resolved(ColumnTrace),
    /// Qualifier not in scope, taken to be a physical table
    Discovered(SourceColumn),
    /// Not traceable; carries a best-effort source, with an empty table when none is known
    Unresolved(SourceColumn),
}

/// One output column produced by `*`
#[derive(Debug, Clone, PartialEq)]
pub enum StarColumn {
    Column { name: String, trace: ColumnTrace },
    /// Columns unknown; `qualifier` names the entry, if one
    Unexpanded { qualifier: Option<String> },
}

impl StarColumn {
    pub fn placeholder_name(qualifier: Option<&str>) -> String {
        match qualifier {
            Some(q) => format!("{}.*", q),
            None => "*".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    /// Stops FROM-entry lookups from reaching the parent
    isolated: bool,
    ctes: Vec<(String, Rc<Relation>)>,
    entries: Vec<(String, ScopeEntry)>,
    subquery_sources: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Scope<'static> {
        Scope::default()
    }

    /// Child that can see this scope's FROM entries (correlated subqueries, LATERAL)
    pub fn child(&self) -> Scope<'_> {
        Scope {
            parent: Some(self),
            ..Scope::default()
        }
    }

    /// Child that only inherits CTE definitions (derived tables, CTE bodies, set branches)
    pub fn isolated_child(&self) -> Scope<'_> {
        Scope {
            parent: Some(self),
            isolated: true,
            ..Scope::default()
        }
    }

    pub fn parent(&self) -> Option<&Scope<'p>> {
        self.parent
    }

    pub fn define_cte(&mut self, name: impl Into<String>, relation: Relation) {
        self.ctes.push((name.into(), Rc::new(relation)));
    }

    pub fn has_own_cte(&self, name: &str) -> bool {
        self.ctes.iter().any(|(n, _)| n == name)
    }

    pub fn cte_names(&self) -> Vec<&str> {
        self.ctes.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Find a CTE here or in any enclosing scope; inner definitions shadow outer ones
    pub fn lookup_cte(&self, name: &str) -> Option<Rc<Relation>> {
        std::iter::successors(Some(self), |scope| scope.parent)
            .find_map(|scope| {
                scope
                    .ctes
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, rel)| Rc::clone(rel))
            })
    }

    /// Register a FROM entry; a repeated key replaces the earlier entry
    pub fn add_entry(&mut self, key: impl Into<String>, entry: ScopeEntry) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn entry(&self, key: &str) -> Option<&ScopeEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ScopeEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn add_subquery_sources(&mut self, sources: impl IntoIterator<Item = String>) {
        self.subquery_sources.extend(sources);
    }

    pub fn push_diagnostics(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// Diagnostics raised while flattening nested relations of this scope
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Scopes whose FROM entries are visible from here, innermost first
    fn lookup_chain(&self) -> impl Iterator<Item = &Scope<'_>> + '_ {
        std::iter::successors(Some(self), |scope| {
            if scope.isolated {
                None
            } else {
                scope.parent
            }
        })
    }

    fn find_unqualified(&self, column: &str) -> Option<&ScopeEntry> {
        let entries = || self.entries.iter().map(|(_, e)| e);
        entries()
            .find(|e| e.has_column(column) == Some(true))
            .or_else(|| match self.entries.as_slice() {
                [(_, only)] => Some(only),
                _ => None,
            })
            .or_else(|| entries().find(|e| e.has_column(column).is_none()))
    }

    /// Resolve a (normalized) column reference to its physical trace
    pub fn resolve_column(&self, qualifier: Option<&str>, column: &str) -> ColumnResolution {
        let resolved = |entry: &ScopeEntry| match entry.trace(column) {
            Some(trace) => ColumnResolution::Resolved(trace),
            None => ColumnResolution::Unresolved(entry.fallback_source(column)),
        };

        match qualifier {
            Some(q) => {
                if let Some(entry) = self.lookup_chain().find_map(|s| s.entry(q)) {
                    return resolved(entry);
                }
                if let Some(rel) = self.lookup_cte(q) {
                    return match rel.trace(column) {
                        Some(trace) => ColumnResolution::Resolved(trace),
                        None => ColumnResolution::Unresolved(rel.fallback_source(column)),
                    };
                }
                ColumnResolution::Discovered(SourceColumn::new(q, column))
            }
            None => self
                .lookup_chain()
                .find_map(|s| s.find_unqualified(column))
                .map_or_else(|| ColumnResolution::Unresolved(SourceColumn::new("", column)), resolved),
        }
    }

    /// Expand `*` or `qualifier.*` against this scope's entries
    pub fn expand_star(&self, qualifier: Option<&str>) -> Vec<StarColumn> {
        let to_columns = |cols: Vec<(String, ColumnTrace)>| {
            cols.into_iter()
                .map(|(name, trace)| StarColumn::Column { name, trace })
                .collect::<Vec<_>>()
        };

        if let Some(q) = qualifier {
            return match self.lookup_chain().find_map(|s| s.entry(q)).and_then(ScopeEntry::expand) {
                Some(cols) => to_columns(cols),
                None => vec![StarColumn::Unexpanded {
                    qualifier: Some(q.to_string()),
                }],
            };
        }

        let mut out = Vec::new();
        let mut expanded_any = false;
        for (key, entry) in &self.entries {
            match entry.expand() {
                Some(cols) => {
                    expanded_any = true;
                    out.extend(to_columns(cols));
                }
                None => out.push(StarColumn::Unexpanded {
                    qualifier: Some(key.clone()),
                }),
            }
        }
        if !expanded_any {
            return vec![StarColumn::Unexpanded { qualifier: None }];
        }
        out
    }

    /// Physical tables this level reads: FROM entries, own CTE definitions, and expression subqueries
    pub fn sources(&self) -> BTreeSet<String> {
        let mut out = self.subquery_sources.clone();
        for (_, rel) in &self.ctes {
            out.extend(rel.sources.iter().cloned());
        }
        for (_, entry) in &self.entries {
            entry.collect_sources(&mut out);
        }
        out
    }
}
