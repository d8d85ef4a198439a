//! Compiler facade
//!
//! Wires the stages together: parse the program, check it against a
//! schema, evaluate it and emit the document. Every stage's error is
//! carried unchanged inside [`CompileError`], so diagnostics keep their
//! source spans and help text.

use miette::Diagnostic;
use pipetype_buildkite::{EmitError, PipelineEmitter};
use pipetype_core::{Config, Limits, OutputFormat};
use pipetype_engine::{
    CheckErrors, EvalError, ProgramParseError, Resolution, check_with_limits, evaluate_with_limits,
    parse_program_with_limits,
};
use pipetype_schema::{Schema, SchemaLoader, SchemaParseError};
use thiserror::Error;
use tracing::instrument;

/// Errors from any compilation stage, in stage order
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    /// The schema declarations are malformed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaParseError),

    /// The program is not syntactically valid
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ProgramParseError),

    /// The program does not conform to the schema
    #[error(transparent)]
    #[diagnostic(transparent)]
    Check(#[from] CheckErrors),

    /// Evaluation failed or produced an unserializable value
    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),

    /// The document could not be written
    #[error(transparent)]
    #[diagnostic(transparent)]
    Emit(#[from] EmitError),
}

impl CompileError {
    /// Name of the stage that failed
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::Parse(_) => "parse",
            Self::Check(_) => "check",
            Self::Eval(_) => "evaluate",
            Self::Emit(_) => "emit",
        }
    }
}

/// Settings for one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Output document format
    pub format: OutputFormat,
    /// Wrap the document under the root binding name
    pub wrap_root: bool,
    /// Source, depth and output limits
    pub limits: Limits,
}

impl CompileOptions {
    /// Options taken from a configuration file
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            format: config.output_format(),
            wrap_root: config.wrap_root(),
            limits: config.limits(),
        }
    }
}

/// Compile one program against a loaded schema
///
/// # Errors
///
/// Returns the first failing stage's error. Checking reports every
/// nonconformance at once; nothing is emitted while any remain.
#[instrument(skip(schema, source, options), fields(root = %schema.root().name))]
pub fn compile(
    schema: &Schema,
    source_name: &str,
    source: &str,
    options: &CompileOptions,
) -> Result<String, CompileError> {
    let program = parse_program_with_limits(source_name, source, &options.limits)?;
    let checked = check_with_limits(schema, program, &options.limits)?;
    let value = evaluate_with_limits(&checked, &options.limits)?;

    let document = PipelineEmitter::new()
        .with_format(options.format)
        .with_wrap_root(options.wrap_root)
        .with_limits(options.limits.clone())
        .emit(&schema.root().name, &value)?;

    tracing::debug!(bytes = document.len(), "Compiled program");
    Ok(document)
}

/// Load `schema_source` and compile `program_source` against it as YAML
///
/// # Errors
///
/// Returns [`CompileError::Schema`] for malformed declarations, otherwise
/// the same errors as [`compile`].
pub fn compile_source(schema_source: &str, program_source: &str) -> Result<String, CompileError> {
    let schema = pipetype_schema::load(schema_source)?;
    compile(&schema, "program.ts", program_source, &CompileOptions::default())
}

/// Check one program and return how each variant was resolved
///
/// # Errors
///
/// Returns [`CompileError::Parse`] or [`CompileError::Check`].
#[instrument(skip(schema, source, limits))]
pub fn check_program(
    schema: &Schema,
    source_name: &str,
    source: &str,
    limits: &Limits,
) -> Result<Vec<Resolution>, CompileError> {
    let program = parse_program_with_limits(source_name, source, limits)?;
    let checked = check_with_limits(schema, program, limits)?;
    Ok(checked.resolutions().to_vec())
}

/// Loader for a `(name, text)` declaration source, or for the bundled
/// Buildkite schema when none is given
#[must_use]
pub fn schema_loader(schema: Option<(&str, &str)>, limits: &Limits) -> SchemaLoader {
    let loader = match schema {
        Some((name, text)) => SchemaLoader::new().add_source(name, text),
        None => pipetype_buildkite::schema::loader(),
    };
    loader.with_limits(limits.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetype_buildkite::load_bundled;

    const SCHEMA: &str = r#"
interface Step { command: string; label?: string }
type AnyStep = Step | "wait";
declare var steps: AnyStep[];
"#;

    #[test]
    fn test_compile_source_two_steps() {
        let yaml = compile_source(
            SCHEMA,
            r#"steps = [{command: "scripts/tests.sh", label: ":hammer: Tests"}, "wait"]"#,
        )
        .unwrap();
        assert_eq!(yaml, "- command: scripts/tests.sh\n  label: \":hammer: Tests\"\n- wait\n");
    }

    #[test]
    fn test_error_stages() {
        let err = compile_source("interface {", "steps = []").unwrap_err();
        assert_eq!(err.stage(), "schema");

        let err = compile_source(SCHEMA, "steps = [").unwrap_err();
        assert_eq!(err.stage(), "parse");

        let err = compile_source(SCHEMA, r#"steps = [{command: "x", bogus: 1}]"#).unwrap_err();
        assert_eq!(err.stage(), "check");
        let CompileError::Check(errors) = err else {
            panic!("expected check errors");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].path, "steps[0].bogus");
    }

    #[test]
    fn test_json_and_wrapped_output() {
        let schema = pipetype_schema::load(SCHEMA).unwrap();
        let options = CompileOptions {
            format: OutputFormat::Json,
            wrap_root: true,
            ..CompileOptions::default()
        };
        let json = compile(&schema, "p.ts", "steps = [\"wait\"]", &options).unwrap();
        assert_eq!(json, "{\n  \"steps\": [\n    \"wait\"\n  ]\n}\n");
    }

    #[test]
    fn test_output_limit_is_an_emit_error() {
        let schema = pipetype_schema::load(SCHEMA).unwrap();
        let options = CompileOptions {
            limits: Limits {
                max_output_bytes: 4,
                ..Limits::default()
            },
            ..CompileOptions::default()
        };
        let err = compile(&schema, "p.ts", "steps = [\"wait\", \"wait\"]", &options).unwrap_err();
        assert_eq!(err.stage(), "emit");
    }

    #[test]
    fn test_check_program_resolutions() {
        let schema = load_bundled().unwrap();
        let resolutions = check_program(
            &schema,
            "p.ts",
            r#"steps = [{ command: "make" }, wait, { block: "Go?" }]"#,
            &Limits::default(),
        )
        .unwrap();
        let rendered: Vec<String> = resolutions.iter().map(ToString::to_string).collect();
        assert!(rendered.contains(&"steps[0]: AnyStep as Step".to_string()));
        assert!(rendered.contains(&"steps[2]: AnyStep as BlockStep".to_string()));
    }

    #[test]
    fn test_options_from_config() {
        let config = Config::from_toml(
            "pipetype.toml",
            "[output]\nformat = \"json\"\nwrap_root = true\n[limits]\nmax_depth = 16\n",
        )
        .unwrap();
        let options = CompileOptions::from_config(&config);
        assert_eq!(options.format, OutputFormat::Json);
        assert!(options.wrap_root);
        assert_eq!(options.limits.max_depth, 16);
    }

    #[test]
    fn test_bundled_loader_is_default() {
        let schema = schema_loader(None, &Limits::default()).load().unwrap();
        assert_eq!(schema.root().name, "steps");
        let custom = schema_loader(Some(("custom.d.ts", "declare var jobs: string[];")), &Limits::default())
            .load()
            .unwrap();
        assert_eq!(custom.root().name, "jobs");
    }
}
