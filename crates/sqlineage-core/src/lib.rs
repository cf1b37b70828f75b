//! sqlineage core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes or lineage fields - they are part of the public API.

pub mod diagnostic;
pub mod lineage;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use lineage::{ColumnLineage, ModelLineage, SourceColumn, TransformKind};
pub use config::{Config, ConfigError, DialectConfig, SeverityThreshold};
