//! Error types for parsing, checking and evaluating programs
//!
//! Every error carries enough source information to be rendered by
//! `miette` against the program text.

use miette::{Diagnostic, NamedSource, SourceSpan};
use pipetype_core::{SourceLocation, Span, UnserializableValueError};
use thiserror::Error;

/// A configuration program could not be parsed
#[derive(Debug, Error, Diagnostic)]
#[error("{message} at {source_name}:{location}")]
#[diagnostic(code(pipetype::program::parse))]
pub struct ProgramParseError {
    /// What went wrong
    pub message: String,
    /// Name of the program source
    pub source_name: String,
    /// Line and column of the problem
    pub location: SourceLocation,
    /// The program source, for rendering
    #[source_code]
    pub src: NamedSource<String>,
    /// Location of the problem
    #[label("here")]
    pub span: SourceSpan,
    /// Suggested fix
    #[help]
    pub help: Option<String>,
}

impl ProgramParseError {
    /// Create an error pointing at `span` within `text`
    #[must_use]
    pub fn new(message: impl Into<String>, source_name: &str, text: &str, span: Span) -> Self {
        let start = span.start.min(text.len());
        let end = span.end.clamp(start, text.len());
        Self {
            message: message.into(),
            source_name: source_name.to_string(),
            location: SourceLocation::resolve(text, start),
            src: NamedSource::new(source_name, text.to_string()),
            span: Span::new(start, end).into(),
            help: None,
        }
    }

    /// Attach help text
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// One nonconformance between a program and the schema
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{path}: expected {expected}, found {found}")]
#[diagnostic(code(pipetype::check))]
pub struct CheckError {
    /// Value path, e.g. `steps[3].retry.automatic.limit`
    pub path: String,
    /// Expected type in declaration syntax
    pub expected: String,
    /// Description of what the program produces there
    pub found: String,
    /// Line and column of the offending expression
    pub location: SourceLocation,
    /// Offending expression
    #[label("{found}")]
    pub span: SourceSpan,
    /// Extra guidance, e.g. which alternative declares a field
    #[help]
    pub note: Option<String>,
}

impl CheckError {
    pub(crate) fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
        source: &str,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
            location: SourceLocation::resolve(source, span.start),
            span: span.into(),
            note: None,
        }
    }

    pub(crate) fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Every nonconformance found while checking one program
#[derive(Debug, Error, Diagnostic)]
#[error("{} found in {source_name}", plural(errors.len()))]
#[diagnostic(
    code(pipetype::check::failed),
    help("Fix the reported values; no output is written while errors remain")
)]
pub struct CheckErrors {
    /// Name of the program source
    pub source_name: String,
    /// The program source, for rendering
    #[source_code]
    pub src: NamedSource<String>,
    /// Errors in source order
    #[related]
    pub errors: Vec<CheckError>,
}

fn plural(count: usize) -> String {
    if count == 1 {
        "1 type error".to_string()
    } else {
        format!("{count} type errors")
    }
}

impl CheckErrors {
    /// Number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether there are no errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the errors
    pub fn iter(&self) -> std::slice::Iter<'_, CheckError> {
        self.errors.iter()
    }
}

impl<'a> IntoIterator for &'a CheckErrors {
    type Item = &'a CheckError;
    type IntoIter = std::slice::Iter<'a, CheckError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Evaluation of a checked program failed
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    /// The root value contains something that cannot be emitted
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unserializable(#[from] UnserializableValueError),

    /// An operation failed at runtime
    #[error("{message} at {source_name}:{location}")]
    #[diagnostic(code(pipetype::eval))]
    Runtime {
        /// What went wrong
        message: String,
        /// Name of the program source
        source_name: String,
        /// Line and column of the expression
        location: SourceLocation,
        /// The program source
        #[source_code]
        src: NamedSource<String>,
        /// The failing expression
        #[label("here")]
        span: SourceSpan,
    },
}

impl EvalError {
    pub(crate) fn runtime(message: impl Into<String>, source_name: &str, text: &str, span: Span) -> Self {
        let start = span.start.min(text.len());
        let end = span.end.clamp(start, text.len());
        Self::Runtime {
            message: message.into(),
            source_name: source_name.to_string(),
            location: SourceLocation::resolve(text, start),
            src: NamedSource::new(source_name, text.to_string()),
            span: Span::new(start, end).into(),
        }
    }
}

/// Schema cache errors
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CacheError {
    /// The cache was created with zero capacity
    #[error("Cache capacity must be non-zero")]
    #[diagnostic(code(pipetype::cache::capacity))]
    ZeroCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_location() {
        let text = "const a = 1;\nsteps = [;";
        let start = text.rfind(';').unwrap();
        let err = ProgramParseError::new("expected an expression", "p.ts", text, Span::point(start));
        assert_eq!(err.location, SourceLocation { line: 2, column: 10 });
        assert!(err.to_string().contains("p.ts:2:10"));
    }

    #[test]
    fn test_check_error_display() {
        let err = CheckError::new("steps[0].bogus", "Step", "undeclared field `bogus`", Span::new(2, 7), "[{ bogus: 1 }]");
        assert_eq!(
            err.to_string(),
            "steps[0].bogus: expected Step, found undeclared field `bogus`"
        );
        assert_eq!(err.location.column, 3);
    }

    #[test]
    fn test_check_errors_summary() {
        let errors = CheckErrors {
            source_name: "p.ts".into(),
            src: NamedSource::new("p.ts", String::new()),
            errors: vec![CheckError::new("steps", "AnyStep[]", "undefined", Span::point(0), "")],
        };
        assert_eq!(errors.to_string(), "1 type error found in p.ts");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_unserializable_is_transparent() {
        let err = EvalError::from(UnserializableValueError::new("steps[0].command", "function"));
        assert_eq!(
            err.to_string(),
            "value at `steps[0].command` cannot be serialized: function"
        );
    }
}
