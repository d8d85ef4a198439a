//! Command-line interface
//!
//! Reads files, hands them to the compiler facade and writes the results.
//! Several programs are compiled in parallel against one shared schema;
//! outputs are written in input order and only when every program
//! succeeded.

use crate::compiler::{self, CompileError, CompileOptions};
use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand, ValueEnum};
use miette::Diagnostic;
use pipetype_core::{Config, ConfigError, Limits, OutputFormat};
use pipetype_engine::{CacheError, Resolution, SchemaCache};
use pipetype_schema::{Schema, TypeRef};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Successful execution exit code
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Schema or program error exit code
pub const EXIT_COMPILE: i32 = 3;

/// Compile typed pipeline programs to Buildkite YAML
#[derive(Parser, Debug)]
#[command(name = "pipetype")]
#[command(about = "Type-check pipeline configuration programs and compile them to YAML")]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file; `pipetype.toml` in the working directory by default
    #[arg(short = 'c', long, global = true, env = "PIPETYPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short = 'l', long, global = true, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check programs and write the compiled documents
    Compile {
        /// Program files, e.g. `pipeline.yml.ts`
        #[arg(required = true)]
        programs: Vec<PathBuf>,
        /// Schema declaration file; the bundled Buildkite schema by default
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,
        /// Output file, or directory when compiling several programs
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
        /// Output document format
        #[arg(short = 'f', long, value_enum)]
        format: Option<FormatArg>,
        /// Wrap the document in a mapping keyed by the root binding name
        #[arg(long)]
        wrap_root: bool,
    },
    /// Check programs without writing anything
    Check {
        /// Program files
        #[arg(required = true)]
        programs: Vec<PathBuf>,
        /// Schema declaration file; the bundled Buildkite schema by default
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,
        /// Print how every union-typed value was resolved
        #[arg(long)]
        explain: bool,
    },
    /// Print the declared types and the root binding of a schema
    Schema {
        /// Schema declaration file; the bundled Buildkite schema by default
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,
    },
}

/// Output format flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Canonical YAML
    Yaml,
    /// Pretty-printed JSON
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Yaml => Self::Yaml,
            FormatArg::Json => Self::Json,
        }
    }
}

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid combination of arguments
    #[error("{message}")]
    #[diagnostic(code(pipetype::cli::usage))]
    Usage {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// The configuration file could not be loaded
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// Reading or writing a file failed
    #[error("Failed to {operation} {}", path.display())]
    #[diagnostic(code(pipetype::cli::io))]
    Io {
        /// What was being done
        operation: &'static str,
        /// The file involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The schema cache could not be created
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    /// A single program or the schema failed to compile
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    /// Some of several programs failed to compile
    #[error("{} of {total} programs failed", errors.len())]
    #[diagnostic(code(pipetype::cli::failed), help("No output was written"))]
    Programs {
        /// Number of programs given
        total: usize,
        /// Errors in input order
        #[related]
        errors: Vec<CompileError>,
    },
}

impl CliError {
    fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    fn io<'a>(operation: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Map an error to the process exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Usage { .. } | CliError::Config(_) | CliError::Io { .. } | CliError::Cache(_) => {
            EXIT_CLI
        }
        CliError::Compile(_) | CliError::Programs { .. } => EXIT_COMPILE,
    }
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Output file name for a program: `pipeline.yml.ts` becomes `pipeline.yml`
#[must_use]
pub fn output_name(program: &Path, format: OutputFormat) -> PathBuf {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut stem = name.as_str();
    for suffix in [".ts", ".yml", ".yaml", ".json"] {
        stem = stem.strip_suffix(suffix).unwrap_or(stem);
    }
    PathBuf::from(format!("{stem}.{}", format.extension()))
}

/// Reject programs that would be written to the same output file
fn check_output_names(programs: &[PathBuf], format: OutputFormat) -> Result<(), CliError> {
    let mut seen: HashMap<PathBuf, &PathBuf> = HashMap::new();
    for program in programs {
        let name = output_name(program, format);
        if let Some(first) = seen.get(&name) {
            return Err(CliError::usage(
                format!(
                    "{} and {} both compile to {}",
                    first.display(),
                    program.display(),
                    name.display()
                ),
                "Rename one of the programs or compile them separately",
            ));
        }
        seen.insert(name, program);
    }
    Ok(())
}

/// Everything a command needs besides its own arguments
struct Session {
    config: Config,
    cache: SchemaCache,
}

impl Session {
    fn open(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => {
                let cwd = std::env::current_dir().map_err(CliError::io("read", Path::new(".")))?;
                Config::discover(&cwd)?.unwrap_or_default()
            }
        };
        Ok(Self {
            config,
            cache: SchemaCache::new(4)?,
        })
    }

    fn limits(&self) -> Limits {
        self.config.limits()
    }

    /// Load the schema named by the flag, the config file, or the bundled one
    fn schema(&self, flag: Option<&Path>) -> Result<Arc<Schema>, CliError> {
        let path = flag.or(self.config.schema.as_deref());
        let limits = self.limits();
        let loader = match path {
            Some(path) => {
                let text = read(path)?;
                compiler::schema_loader(Some((&path.display().to_string(), &text)), &limits)
            }
            None => compiler::schema_loader(None, &limits),
        };
        let schema = self.cache.get_or_load(&loader).map_err(CompileError::from)?;
        tracing::debug!(root = %schema.root().name, types = schema.types().count(), "Schema ready");
        Ok(schema)
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(CliError::io("read", path))
}

fn write(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(CliError::io("write", path))
}

/// Run a parsed command, writing documents and reports to `out`
///
/// # Errors
///
/// Returns a [`CliError`]; see [`exit_code_for`] for the exit code.
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let session = Session::open(cli.config.as_deref())?;
    match &cli.command {
        Commands::Compile {
            programs,
            schema,
            out: target,
            format,
            wrap_root,
        } => {
            let mut options = CompileOptions::from_config(&session.config);
            if let Some(format) = format {
                options.format = (*format).into();
            }
            options.wrap_root |= *wrap_root;
            let schema = session.schema(schema.as_deref())?;
            run_compile(&schema, programs, target.as_deref(), &options, out)
        }
        Commands::Check {
            programs,
            schema,
            explain,
        } => {
            let schema = session.schema(schema.as_deref())?;
            run_check(&schema, programs, *explain, &session.limits(), out)
        }
        Commands::Schema { schema } => {
            let schema = session.schema(schema.as_deref())?;
            write_schema_summary(&schema, out).map_err(CliError::io("write", Path::new("<stdout>")))
        }
    }
}

/// Read every program, then run `stage` on all of them in parallel
fn run_all<T: Send>(
    programs: &[PathBuf],
    stage: impl Fn(&str, &str) -> Result<T, CompileError> + Sync,
) -> Result<Vec<T>, CliError> {
    let sources = programs
        .iter()
        .map(|path| Ok((path.display().to_string(), read(path)?)))
        .collect::<Result<Vec<_>, CliError>>()?;

    let results: Vec<Result<T, CompileError>> = sources
        .par_iter()
        .map(|(name, source)| stage(name, source))
        .collect();

    let total = results.len();
    let mut successes = Vec::with_capacity(total);
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(err) => errors.push(err),
        }
    }
    match errors.len() {
        0 => Ok(successes),
        1 if total == 1 => Err(CliError::Compile(errors.remove(0))),
        _ => Err(CliError::Programs { total, errors }),
    }
}

fn run_compile(
    schema: &Schema,
    programs: &[PathBuf],
    target: Option<&Path>,
    options: &CompileOptions,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if programs.len() > 1 && target.is_none_or(Path::is_file) {
        return Err(CliError::usage(
            "Several programs need an output directory",
            "Pass --out <DIR>; each document is named after its program",
        ));
    }
    if target.is_some() {
        check_output_names(programs, options.format)?;
    }

    let documents = run_all(programs, |name, source| {
        compiler::compile(schema, name, source, options)
    })?;

    match target {
        None => {
            for document in &documents {
                out.write_all(document.as_bytes())
                    .map_err(CliError::io("write", Path::new("<stdout>")))?;
            }
        }
        Some(path) if programs.len() == 1 && !path.is_dir() => write(path, &documents[0])?,
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(CliError::io("create", dir))?;
            for (program, document) in programs.iter().zip(&documents) {
                let path = dir.join(output_name(program, options.format));
                write(&path, document)?;
                tracing::info!(output = %path.display(), "Wrote document");
            }
        }
    }
    Ok(())
}

fn run_check(
    schema: &Schema,
    programs: &[PathBuf],
    explain: bool,
    limits: &Limits,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let reports = run_all(programs, |name, source| {
        compiler::check_program(schema, name, source, limits)
    })?;

    write_check_report(programs, &reports, explain, out)
        .map_err(CliError::io("write", Path::new("<stdout>")))
}

fn write_check_report(
    programs: &[PathBuf],
    reports: &[Vec<Resolution>],
    explain: bool,
    out: &mut impl Write,
) -> std::io::Result<()> {
    for (program, resolutions) in programs.iter().zip(reports) {
        writeln!(out, "{}: ok", program.display())?;
        if explain {
            for resolution in resolutions {
                writeln!(out, "  {resolution}")?;
            }
        }
    }
    Ok(())
}

/// Print the root binding, type declarations and sentinels
fn write_schema_summary(schema: &Schema, out: &mut impl Write) -> std::io::Result<()> {
    let root = schema.root();
    writeln!(out, "declare var {}: {};", root.name, root.ty)?;
    for decl in schema.types() {
        match &decl.ty {
            TypeRef::Record(record) => {
                writeln!(out, "interface {} {{", decl.name)?;
                for field in &record.fields {
                    let optional = if field.optional { "?" } else { "" };
                    writeln!(out, "  {}{optional}: {};", field.name, field.ty)?;
                }
                writeln!(out, "}}")?;
            }
            ty => writeln!(out, "type {} = {ty};", decl.name)?,
        }
    }
    for constant in schema.constants() {
        writeln!(out, "declare const {} = {};", constant.name, constant.value)?;
    }
    Ok(())
}
