//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // SQL front end (1xxx)
    /// Failed to parse SQL
    SqlParseError,

    /// Scalar subquery in a SELECT list
    SqlScalarSubquery,

    /// Scope resolution failed
    SqlResolveError,

    // Lineage extraction (2xxx)
    /// SELECT * encountered but cannot expand (no schema)
    LineageStarUnexpanded,

    /// Column reference could not be traced to any table
    LineageUnresolvedColumn,

    // Project (3xxx)
    /// Model file could not be read
    ModelReadError,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlScalarSubquery => "SQL_SCALAR_SUBQUERY",
            Self::SqlResolveError => "SQL_RESOLVE_ERROR",
            Self::LineageStarUnexpanded => "LINEAGE_STAR_UNEXPANDED",
            Self::LineageUnresolvedColumn => "LINEAGE_UNRESOLVED_COLUMN",
            Self::ModelReadError => "MODEL_READ_ERROR",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - lineage is partial but usable
    Warn,

    /// Error - no lineage could be produced
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location of a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to project root
    pub file: Option<String>,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    pub column: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            line: None,
            column: None,
        }
    }

    /// Create a location pointing into SQL text with no known file
    pub fn at(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line: Some(line),
            column: Some(column),
        }
    }

    /// Attach a file path
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = self.file.as_deref().unwrap_or("<sql>");
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", file, line, column),
            (Some(line), None) => write!(f, "{}:{}", file, line),
            _ => write!(f, "{}", file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Output column the diagnostic is about, if any
    pub column: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            column: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the output column
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Attach a file path, keeping any line/column already present
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        let location = self.location.take().unwrap_or_default();
        self.location = Some(location.in_file(file));
        self
    }
}
