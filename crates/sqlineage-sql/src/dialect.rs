//! SQL dialects: function classification, name folding, and parser extensions

use crate::extensions::{self, ParserExtensions, Precedence};
use crate::token::TokenKind;
use sqlineage_core::DialectConfig;

/// How a function relates its result to its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Result derived row-by-row from arguments (`UPPER`, `COALESCE`)
    Passthrough,
    Aggregate,
    /// Value with no column-derived input (`NOW`, `RANDOM`)
    Generator,
    Window,
    /// Produces rows, used in FROM
    Table,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Passthrough => "passthrough",
            FunctionKind::Aggregate => "aggregate",
            FunctionKind::Generator => "generator",
            FunctionKind::Window => "window",
            FunctionKind::Table => "table",
        }
    }
}

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "any_value",
    "approx_count_distinct",
    "approx_quantile",
    "arbitrary",
    "array_agg",
    "avg",
    "bit_and",
    "bit_or",
    "bool_and",
    "bool_or",
    "corr",
    "count",
    "count_if",
    "covar_pop",
    "covar_samp",
    "every",
    "first",
    "histogram",
    "json_agg",
    "last",
    "list",
    "listagg",
    "max",
    "median",
    "min",
    "mode",
    "percentile_cont",
    "percentile_disc",
    "stddev",
    "stddev_pop",
    "string_agg",
    "sum",
    "var_pop",
    "variance",
];

const GENERATOR_FUNCTIONS: &[&str] = &[
    "current_date",
    "current_time",
    "current_timestamp",
    "gen_random_uuid",
    "localtime",
    "localtimestamp",
    "now",
    "random",
    "uuid",
];

const WINDOW_FUNCTIONS: &[&str] = &[
    "cume_dist",
    "dense_rank",
    "first_value",
    "lag",
    "last_value",
    "lead",
    "nth_value",
    "ntile",
    "percent_rank",
    "rank",
    "row_number",
];

const TABLE_FUNCTIONS: &[&str] = &[
    "generate_series",
    "range",
    "read_csv",
    "read_csv_auto",
    "read_json",
    "read_json_auto",
    "read_parquet",
    "unnest",
];

/// Alternative spellings folded into one canonical name
const FUNCTION_ALIASES: &[(&str, &str)] = &[
    ("ceiling", "ceil"),
    ("char_length", "length"),
    ("character_length", "length"),
    ("group_concat", "string_agg"),
    ("ifnull", "coalesce"),
    ("lcase", "lower"),
    ("len", "length"),
    ("nvl", "coalesce"),
    ("pow", "power"),
    ("stddev_samp", "stddev"),
    ("substr", "substring"),
    ("ucase", "upper"),
    ("var_samp", "variance"),
];

/// Classify a canonical (lowercase, unaliased) function name with the shared tables
pub fn builtin_function_kind(canonical: &str) -> FunctionKind {
    // qualified names (`pg_catalog.sum`) classify by their last part
    let name = canonical.rsplit('.').next().unwrap_or(canonical);
    if AGGREGATE_FUNCTIONS.contains(&name) {
        FunctionKind::Aggregate
    } else if WINDOW_FUNCTIONS.contains(&name) {
        FunctionKind::Window
    } else if GENERATOR_FUNCTIONS.contains(&name) {
        FunctionKind::Generator
    } else if TABLE_FUNCTIONS.contains(&name) {
        FunctionKind::Table
    } else {
        FunctionKind::Passthrough
    }
}

/// A SQL dialect as seen by the parser and the lineage extractor
///
/// Implementations are read-only after construction and may be shared
/// across threads.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify_function(&self, name: &str) -> FunctionKind {
        builtin_function_kind(&self.canonical_function_name(name))
    }

    /// Case-folding policy for identifiers
    fn normalize_name(&self, name: &str) -> String {
        name.to_lowercase()
    }

    fn canonical_function_name(&self, name: &str) -> String {
        let lower = name.to_lowercase();
        FUNCTION_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(lower)
    }

    /// Add dialect syntax to the parser's handler tables
    fn register_extensions(&self, _extensions: &mut ParserExtensions) {}

    fn extensions(&self) -> ParserExtensions {
        let mut extensions = ParserExtensions::new();
        self.register_extensions(&mut extensions);
        extensions
    }
}

/// ANSI SQL with no extensions
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn classify_function(&self, name: &str) -> FunctionKind {
        let canonical = self.canonical_function_name(name);
        match canonical.as_str() {
            "arg_max" | "arg_min" | "max_by" | "min_by" | "product" => FunctionKind::Aggregate,
            "read_ndjson" | "glob" => FunctionKind::Table,
            _ => builtin_function_kind(&canonical),
        }
    }

    fn register_extensions(&self, ext: &mut ParserExtensions) {
        ext.register_infix(TokenKind::DoubleColon, Precedence::Postfix, extensions::double_colon_cast);
        ext.register_infix(TokenKind::LBracket, Precedence::Postfix, extensions::subscript);
        ext.register_infix(TokenKind::Arrow, Precedence::Lowest, extensions::lambda);
        ext.register_prefix(TokenKind::LBracket, extensions::list_literal);
        ext.register_prefix(TokenKind::LBrace, extensions::struct_literal);
        ext.enable_group_by_all();
        ext.enable_order_by_all();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn classify_function(&self, name: &str) -> FunctionKind {
        let canonical = self.canonical_function_name(name);
        match canonical.as_str() {
            "jsonb_agg" | "jsonb_object_agg" | "json_object_agg" | "xmlagg" => FunctionKind::Aggregate,
            "clock_timestamp" | "statement_timestamp" | "transaction_timestamp" => {
                FunctionKind::Generator
            }
            "jsonb_array_elements" | "json_array_elements" | "regexp_split_to_table" => {
                FunctionKind::Table
            }
            _ => builtin_function_kind(&canonical),
        }
    }

    fn register_extensions(&self, ext: &mut ParserExtensions) {
        ext.register_infix(TokenKind::DoubleColon, Precedence::Postfix, extensions::double_colon_cast);
        ext.register_infix(TokenKind::LBracket, Precedence::Postfix, extensions::subscript);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn classify_function(&self, name: &str) -> FunctionKind {
        let canonical = self.canonical_function_name(name);
        match canonical.as_str() {
            "object_agg" | "array_unique_agg" | "hll" | "approx_top_k" => FunctionKind::Aggregate,
            "uuid_string" | "seq4" | "seq8" | "sysdate" | "current_account" => {
                FunctionKind::Generator
            }
            "flatten" | "generator" | "split_to_table" => FunctionKind::Table,
            _ => builtin_function_kind(&canonical),
        }
    }

    fn register_extensions(&self, ext: &mut ParserExtensions) {
        ext.register_infix(TokenKind::DoubleColon, Precedence::Postfix, extensions::double_colon_cast);
        ext.enable_group_by_all();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn classify_function(&self, name: &str) -> FunctionKind {
        let canonical = self.canonical_function_name(name);
        match canonical.as_str() {
            "countif" | "logical_and" | "logical_or" | "approx_top_count" => FunctionKind::Aggregate,
            "generate_uuid" | "current_datetime" | "rand" => FunctionKind::Generator,
            "generate_array" | "generate_date_array" => FunctionKind::Passthrough,
            _ => builtin_function_kind(&canonical),
        }
    }
}

/// Dialect instance for a configured dialect name
pub fn dialect_for(config: &DialectConfig) -> Box<dyn Dialect> {
    match config {
        DialectConfig::Ansi => Box::new(GenericDialect),
        DialectConfig::DuckDb => Box::new(DuckDbDialect),
        DialectConfig::Postgres => Box::new(PostgresDialect),
        DialectConfig::Snowflake => Box::new(SnowflakeDialect),
        DialectConfig::BigQuery => Box::new(BigQueryDialect),
    }
}
