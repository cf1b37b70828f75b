//! Column-level lineage types
//!
//! These types are the persisted shape consumed by catalog and documentation
//! generators. Field names and the `""` / `"EXPR"` transform encoding are
//! part of the public contract.

use serde::{Deserialize, Serialize};

/// How an output column was derived from its sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransformKind {
    /// Copied as-is from a single source column
    #[default]
    #[serde(rename = "")]
    Direct,

    /// Computed by an expression, aggregate, window or generator
    #[serde(rename = "EXPR")]
    Expr,
}

impl TransformKind {
    /// Stable string encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "",
            Self::Expr => "EXPR",
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Expr => write!(f, "expr"),
        }
    }
}

/// A physical table column an output column reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Fully-qualified physical table name
    pub table: String,

    /// Column name in that table
    pub column: String,
}

impl SourceColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for SourceColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.table.is_empty() {
            write!(f, "{}", self.column)
        } else {
            write!(f, "{}.{}", self.table, self.column)
        }
    }
}

/// Lineage of a single output column
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnLineage {
    /// Output column name
    pub name: String,

    /// Transformation applied
    pub transform: TransformKind,

    /// Canonical aggregate/window function name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Physical source columns, deduplicated in discovery order
    pub sources: Vec<SourceColumn>,
}

impl ColumnLineage {
    /// Create a column with no sources
    pub fn new(name: impl Into<String>, transform: TransformKind) -> Self {
        Self {
            name: name.into(),
            transform,
            function: None,
            sources: Vec::new(),
        }
    }

    /// Create a direct copy of one source column
    pub fn direct(name: impl Into<String>, source: SourceColumn) -> Self {
        Self {
            name: name.into(),
            transform: TransformKind::Direct,
            function: None,
            sources: vec![source],
        }
    }

    /// Set the function name
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Add a source unless an identical one is already present
    pub fn push_source(&mut self, source: SourceColumn) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// Union another column's sources into this one
    pub fn extend_sources<'a>(&mut self, sources: impl IntoIterator<Item = &'a SourceColumn>) {
        for source in sources {
            self.push_source(source.clone());
        }
    }
}

/// Lineage of a whole model (one SELECT statement)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelLineage {
    /// Physical tables read by the model, deduplicated and sorted
    pub sources: Vec<String>,

    /// Output columns in select-list order
    pub columns: Vec<ColumnLineage>,
}

impl ModelLineage {
    /// Find an output column by name
    pub fn column(&self, name: &str) -> Option<&ColumnLineage> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Output column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check whether the model reads from a table
    pub fn reads_from(&self, table: &str) -> bool {
        self.sources.iter().any(|s| s == table)
    }
}
