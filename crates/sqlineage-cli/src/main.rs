use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use sqlineage_core::{Config, Diagnostic, DiagnosticCode, DialectConfig, ModelLineage, Severity};
use sqlineage_sql::{analyze, dialect_for, LineageContext, ParseError, SqlParser};

/// sqlineage - Column-level lineage for SQL models
#[derive(Parser)]
#[command(name = "sqlineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlineage.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract column lineage from model files
    Lineage {
        /// SQL files or directories of models
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// JSON file mapping table names to column lists
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// SQL dialect (overrides config)
        #[arg(short, long)]
        dialect: Option<DialectConfig>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a SQL file and print its canonical form
    Parse {
        /// SQL file to parse
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if Path::new("sqlineage.toml").exists() {
        Config::from_file(Path::new("sqlineage.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Lineage {
            paths,
            schema,
            dialect,
            format,
            output,
        } => lineage_command(
            config,
            &paths,
            schema.as_deref(),
            dialect,
            format,
            output.as_deref(),
            cli.verbose,
        ),
        Commands::Parse { file } => parse_command(&config, &file),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// A model file and the name its lineage is reported under
#[derive(Debug, Clone, PartialEq)]
struct ModelFile {
    name: String,
    path: PathBuf,
}

/// Lineage command - extract lineage for every model found under `paths`
fn lineage_command(
    mut config: Config,
    paths: &[PathBuf],
    schema: Option<&Path>,
    dialect: Option<DialectConfig>,
    format: OutputFormat,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    if let Some(dialect) = dialect {
        config.dialect = dialect;
    }
    if let Some(schema_path) = schema {
        config.merge_schema(load_schema_file(schema_path)?);
    }

    if verbose {
        eprintln!("{} dialect: {:?}", "Using".cyan(), config.dialect);
        eprintln!("{} {} tables", "Schema:".cyan(), config.schema.len());
    }

    let context = LineageContext::from_schema(&config.schema);
    let dialect = dialect_for(&config.dialect);
    let models = collect_models(paths, &config);

    let mut lineages: BTreeMap<String, ModelLineage> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for model in &models {
        if verbose {
            eprintln!("  {} {}...", "Analyzing".cyan(), model.path.display());
        }

        let sql = match std::fs::read_to_string(&model.path) {
            Ok(sql) => sql,
            Err(e) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::ModelReadError,
                    Severity::Error,
                    format!("Failed to read SQL file {}: {}", model.path.display(), e),
                ));
                continue;
            }
        };

        let file = model.path.display().to_string();
        match analyze(&sql, Some(&context), Some(dialect.as_ref())) {
            Ok(analysis) => {
                diagnostics.extend(analysis.diagnostics.into_iter().map(|d| d.in_file(file.clone())));
                if lineages.insert(model.name.clone(), analysis.lineage).is_some() {
                    tracing::warn!(model = %model.name, path = %file, "duplicate model name, keeping the last one");
                }
            }
            Err(err) => diagnostics.push(err.to_diagnostic(Some(&model.path))),
        }
    }

    for diagnostic in &mut diagnostics {
        diagnostic.severity = config
            .severity
            .get_severity(diagnostic.code, diagnostic.severity);
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&lineages)?,
        OutputFormat::Text => render_text(&lineages),
    };
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if verbose {
                eprintln!("{} {}", "Lineage saved to:".green(), path.display());
            }
        }
        None => println!("{}", rendered),
    }

    print_diagnostics(&diagnostics);

    if verbose {
        eprintln!();
        eprintln!("Analyzed {} models", lineages.len());
    }

    // Exit with error code if there are errors
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        std::process::exit(1);
    }

    Ok(())
}

/// Parse command - print canonical SQL or a located parse error
fn parse_command(config: &Config, file: &Path) -> Result<()> {
    let sql = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read SQL file {}", file.display()))?;

    let parser = SqlParser::from_dialect(&config.dialect);
    match parser.parse(&sql, Some(file)) {
        Ok(parsed) => {
            println!("{}", parsed.canonical_sql());
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", render_parse_error(&sql, file, &err));
            std::process::exit(1);
        }
    }
}

/// Load a `{"table": ["col", ...]}` schema file
fn load_schema_file(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid schema file {}", path.display()))
}

/// Find model files; directories are walked for `*.sql`
fn collect_models(paths: &[PathBuf], config: &Config) -> Vec<ModelFile> {
    let mut models = Vec::new();

    for root in paths {
        if root.is_file() {
            models.extend(model_file(root));
            continue;
        }

        let entries = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"));

        for entry in entries {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let relative = relative.to_string_lossy().replace('\\', "/");
            if config.is_excluded(&relative) {
                tracing::debug!(path = %relative, "excluded by config");
                continue;
            }
            models.extend(model_file(entry.path()));
        }
    }

    models
}

fn model_file(path: &Path) -> Option<ModelFile> {
    let name = path.file_stem()?.to_string_lossy().to_string();
    Some(ModelFile {
        name,
        path: path.to_path_buf(),
    })
}

fn render_text(lineages: &BTreeMap<String, ModelLineage>) -> String {
    let mut out = String::new();

    for (model, lineage) in lineages {
        out.push_str(&format!("{}\n", model.bold().bright_blue()));
        out.push_str(&format!("  {} {}\n", "sources:".bold(), lineage.sources.join(", ")));

        let width = lineage.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for column in &lineage.columns {
            let transform = match (&column.function, column.transform.is_direct()) {
                (Some(function), _) => format!("{}({})", column.transform.as_str(), function),
                (None, true) => "DIRECT".to_string(),
                (None, false) => column.transform.as_str().to_string(),
            };
            let sources: Vec<String> = column.sources.iter().map(|s| s.to_string()).collect();
            let sources = if sources.is_empty() {
                "-".dimmed().to_string()
            } else {
                sources.join(", ")
            };
            let name = format!("{:<width$}", column.name, width = width);
            let transform = format!("{:<16}", transform);
            out.push_str(&format!("  {}  {} <- {}\n", name.green(), transform.cyan(), sources));
        }
        out.push('\n');
    }

    if lineages.is_empty() {
        out.push_str(&format!("{}\n", "No models found".yellow()));
    }
    out
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };

        eprint!("[{}] {}: {}", severity_str, diag.code.as_str(), diag.message);
        if let Some(column) = &diag.column {
            eprint!(" (column {})", column);
        }
        eprintln!();

        if let Some(loc) = &diag.location {
            eprintln!("    at {}", loc);
        }
    }
}

/// Error message with the offending line and a caret under the column
fn render_parse_error(sql: &str, file: &Path, err: &ParseError) -> String {
    let line_no = err.position.line;
    let line = sql.lines().nth(line_no.saturating_sub(1)).unwrap_or("");
    let gutter = " ".repeat(line_no.to_string().len());
    let caret = format!("{}^", " ".repeat(err.position.column.saturating_sub(1)));

    format!(
        "{}: {}\n{}{} {}:{}:{}\n{} |\n{} | {}\n{} | {}",
        "error".red().bold(),
        err.message,
        gutter,
        "-->".bright_blue(),
        file.display(),
        line_no,
        err.position.column,
        gutter,
        line_no,
        line,
        gutter,
        caret.red().bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlineage_sql::parse;

    #[test]
    fn caret_points_at_error_column() {
        colored::control::set_override(false);
        let sql = "SELECT a,\n  FROM t";
        let err = parse(sql).unwrap_err();
        let rendered = render_parse_error(sql, Path::new("m.sql"), &err);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], " --> m.sql:2:3");
        assert_eq!(lines[3], "2 |   FROM t");
        assert_eq!(lines[4], "  |   ^");
    }

    #[test]
    fn model_name_is_file_stem() {
        let model = model_file(Path::new("models/marts/orders_summary.sql")).unwrap();
        assert_eq!(model.name, "orders_summary");
    }

    #[test]
    fn cli_parses_lineage_flags() {
        let cli = Cli::try_parse_from([
            "sqlineage",
            "lineage",
            "models",
            "--dialect",
            "duckdb",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Lineage {
                paths,
                dialect,
                format,
                ..
            } => {
                assert_eq!(paths, vec![PathBuf::from("models")]);
                assert_eq!(dialect, Some(DialectConfig::DuckDb));
                assert_eq!(format, OutputFormat::Json);
            }
            Commands::Parse { .. } => panic!("expected lineage command"),
        }
    }
}
