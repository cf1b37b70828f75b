//! SQL parsing and column-level lineage
//!
//! This crate handles:
//! - Tokenizing and parsing SELECT/WITH statements
//! - Dialect syntax through pluggable parser handler tables
//! - Resolving CTEs, aliases, derived tables and LATERAL references
//! - Extracting column-level lineage down to physical tables

pub mod token;
pub mod lexer;
pub mod ast;
pub mod display;
pub mod extensions;
pub mod dialect;
pub mod parser;
pub mod scope;
pub mod resolver;
pub mod lineage;

pub use ast::SelectStmt;
pub use dialect::{dialect_for, Dialect, FunctionKind, GenericDialect, DuckDbDialect, PostgresDialect, SnowflakeDialect, BigQueryDialect};
pub use parser::{parse, parse_with_dialect, SqlParser, ParsedSql, ParseError, ParseErrorKind};
pub use resolver::{Resolver, ResolveError};
pub use lineage::{analyze, extract_lineage, Analysis, LineageContext, LineageError, LineageExtractor};
