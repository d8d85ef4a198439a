//! Error types for schema loading

use miette::{Diagnostic, NamedSource, SourceSpan};
use pipetype_core::{LimitExceeded, SourceLocation, Span};
use thiserror::Error;

/// What was wrong with a schema declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaErrorKind {
    /// Malformed declaration syntax
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Construct the declaration language does not support
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Reference to a type that is never declared
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// Type declared twice
    #[error("type `{0}` is declared more than once")]
    DuplicateType(String),

    /// Field declared twice within one record
    #[error("field `{field}` is declared more than once in `{record}`")]
    DuplicateField {
        /// Owning record
        record: String,
        /// Repeated field
        field: String,
    },

    /// Constant declared twice
    #[error("constant `{0}` is declared more than once")]
    DuplicateConstant(String),

    /// Two different root bindings in one source
    #[error("root binding `{second}` conflicts with root binding `{first}`")]
    MultipleRoots {
        /// Earlier root name
        first: String,
        /// Later root name
        second: String,
    },

    /// Root bindings declared by two different sources in one session
    #[error("root binding `{name}` is already declared by `{first_source}`")]
    ConflictingRoot {
        /// Root declared by the later source
        name: String,
        /// Source that declared the first root
        first_source: String,
    },

    /// No `declare var` root binding anywhere
    #[error("no root binding declared")]
    MissingRoot,

    /// Type aliases that only refer to each other
    #[error("type alias `{0}` refers to itself")]
    CyclicAlias(String),

    /// Type expression nested beyond the configured depth
    #[error("type nesting exceeds maximum depth of {0}")]
    TooDeep(usize),

    /// Source text over the size limit
    #[error("{0}")]
    TooLarge(LimitExceeded),
}

/// A schema declaration source could not be loaded
#[derive(Debug, Error, Diagnostic)]
#[error("{kind} at {source_name}:{location}")]
#[diagnostic(code(pipetype::schema::parse))]
pub struct SchemaParseError {
    /// What went wrong
    pub kind: SchemaErrorKind,
    /// Source text of the offending construct (truncated)
    pub construct: String,
    /// Name of the schema source
    pub source_name: String,
    /// Line and column of the construct
    pub location: SourceLocation,
    /// The schema source, for rendering
    #[source_code]
    pub src: NamedSource<String>,
    /// Location of the construct
    #[label("offending construct")]
    pub span: SourceSpan,
    /// Suggested fix
    #[help]
    pub help: Option<String>,
}

impl SchemaParseError {
    /// Create an error pointing at `span` within `text`
    #[must_use]
    pub fn new(kind: SchemaErrorKind, source_name: &str, text: &str, span: Span) -> Self {
        let start = span.start.min(text.len());
        let end = span.end.clamp(start, text.len());
        let construct: String = text.get(start..end).unwrap_or_default().chars().take(60).collect();
        Self {
            kind,
            construct,
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

/// Result type for schema loading
pub type Result<T> = std::result::Result<T, SchemaParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reports_location_and_construct() {
        let text = "type A = B;\ntype C = Missing;";
        let start = text.find("Missing").unwrap();
        let err = SchemaParseError::new(
            SchemaErrorKind::UnknownType("Missing".into()),
            "pipeline.d.ts",
            text,
            Span::new(start, start + 7),
        );
        assert_eq!(err.location, SourceLocation { line: 2, column: 10 });
        assert_eq!(err.construct, "Missing");
        let message = err.to_string();
        assert!(message.contains("unknown type `Missing`"));
        assert!(message.contains("pipeline.d.ts:2:10"));
    }

    #[test]
    fn test_span_is_clamped_to_source() {
        let err = SchemaParseError::new(SchemaErrorKind::MissingRoot, "s", "abc", Span::new(10, 20));
        assert_eq!(err.construct, "");
        assert_eq!(err.location.column, 4);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SchemaParseError>();
    }
}
