//! Buildkite Pipeline Emitter
//!
//! Renders an evaluated [`Value`] tree as canonical pipeline YAML, or as
//! JSON for Buildkite's JSON pipeline format.
//!
//! # Value to YAML Mapping
//!
//! | Value | YAML |
//! |-------|------|
//! | `Record` | block mapping, insertion order; `{}` when empty |
//! | `Sequence` | block sequence; `[]` when empty |
//! | `Scalar::String` | plain, double-quoted or literal block (`\|`, `\|-`) |
//! | `Scalar::Number` | integer or shortest round-trip float |
//! | `Sentinel` | its literal, e.g. `wait` |
//!
//! Output is a pure function of the value tree: the same tree always
//! produces the same bytes.

use indexmap::IndexMap;
use miette::Diagnostic;
use pipetype_core::limits::validate_output;
use pipetype_core::{LimitExceeded, Limits, OutputFormat, Scalar, UnserializableValueError, Value, path};
use std::fmt::Write as _;
use thiserror::Error;

/// Errors raised while emitting a document
#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    /// The value tree holds something with no textual form
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unserializable(#[from] UnserializableValueError),

    /// The document is larger than `max_output_bytes`
    #[error("Emitted document is too large: {0}")]
    #[diagnostic(
        code(pipetype::emit::too_large),
        help("Raise [limits] max_output_bytes in pipetype.toml")
    )]
    TooLarge(#[from] LimitExceeded),

    /// JSON serialization failed
    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(pipetype::emit::json))]
    Json(#[from] serde_json::Error),
}

/// Result type for emitting
pub type EmitResult<T> = std::result::Result<T, EmitError>;

/// Pipeline document emitter
///
/// ```ignore
/// let yaml = PipelineEmitter::new().with_wrap_root(true).emit("steps", &value)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PipelineEmitter {
    /// Wrap the document in a mapping keyed by the root binding name
    pub wrap_root: bool,
    /// Output format
    pub format: OutputFormat,
    /// Output size limit
    pub limits: Limits,
}

impl PipelineEmitter {
    /// Create an emitter for unwrapped YAML
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the document under the root binding name, e.g. `steps:`
    #[must_use]
    pub const fn with_wrap_root(mut self, wrap_root: bool) -> Self {
        self.wrap_root = wrap_root;
        self
    }

    /// Set the output format
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output size limit
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Render `value`, the value of the root binding `root`, as a document
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::Unserializable`] for non-finite numbers and
    /// [`EmitError::TooLarge`] when the document exceeds the output limit.
    pub fn emit(&self, root: &str, value: &Value) -> EmitResult<String> {
        let wrapped;
        let (document, root) = if self.wrap_root {
            wrapped = Value::Record(IndexMap::from([(root.to_string(), value.clone())]));
            (&wrapped, "")
        } else {
            (value, root)
        };

        let text = match self.format {
            OutputFormat::Yaml => to_yaml_at(document, root)?,
            OutputFormat::Json => {
                ensure_finite(document, root)?;
                let mut text = serde_json::to_string_pretty(document)?;
                text.push('\n');
                text
            }
        };
        validate_output(&text, &self.limits)?;

        tracing::debug!(
            format = self.format.extension(),
            bytes = text.len(),
            "Emitted pipeline document"
        );
        Ok(text)
    }
}

/// Render `value` as canonical YAML
///
/// # Errors
///
/// Returns [`UnserializableValueError`] for non-finite numbers.
pub fn to_yaml(value: &Value) -> Result<String, UnserializableValueError> {
    to_yaml_at(value, "")
}

fn to_yaml_at(value: &Value, root: &str) -> Result<String, UnserializableValueError> {
    let mut writer = YamlWriter::default();
    match value {
        Value::Record(fields) if !fields.is_empty() => writer.mapping(fields, 0, false, root)?,
        Value::Sequence(items) if !items.is_empty() => writer.sequence(items, 0, false, root)?,
        other => {
            writer.leaf(other, 0, root)?;
        }
    }
    Ok(writer.out)
}

fn ensure_finite(value: &Value, at: &str) -> Result<(), UnserializableValueError> {
    match value {
        Value::Record(fields) => fields
            .iter()
            .try_for_each(|(key, field)| ensure_finite(field, &path::field(at, key))),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| ensure_finite(item, &path::index(at, i))),
        _ => format_leaf(value, at).map(drop),
    }
}

#[derive(Default)]
struct YamlWriter {
    out: String,
}

impl YamlWriter {
    fn indent(&mut self, width: usize) {
        self.out.extend(std::iter::repeat_n(' ', width));
    }

    /// Block mapping at `indent`; `inline` means the first key continues a
    /// `- ` already written
    fn mapping(
        &mut self,
        fields: &IndexMap<String, Value>,
        indent: usize,
        inline: bool,
        at: &str,
    ) -> Result<(), UnserializableValueError> {
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 || !inline {
                self.indent(indent);
            }
            self.out.push_str(&quote_string(key));
            self.out.push(':');
            let at = path::field(at, key);
            match value {
                Value::Record(inner) if !inner.is_empty() => {
                    self.out.push('\n');
                    self.mapping(inner, indent + 2, false, &at)?;
                }
                Value::Sequence(items) if !items.is_empty() => {
                    self.out.push('\n');
                    self.sequence(items, indent + 2, false, &at)?;
                }
                leaf => {
                    self.out.push(' ');
                    self.leaf(leaf, indent, &at)?;
                }
            }
        }
        Ok(())
    }

    fn sequence(
        &mut self,
        items: &[Value],
        indent: usize,
        inline: bool,
        at: &str,
    ) -> Result<(), UnserializableValueError> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 || !inline {
                self.indent(indent);
            }
            self.out.push_str("- ");
            let at = path::index(at, i);
            match item {
                Value::Record(fields) if !fields.is_empty() => {
                    self.mapping(fields, indent + 2, true, &at)?;
                }
                Value::Sequence(inner) if !inner.is_empty() => {
                    self.sequence(inner, indent + 2, true, &at)?;
                }
                leaf => self.leaf(leaf, indent, &at)?,
            }
        }
        Ok(())
    }

    /// A scalar, sentinel or empty collection, ending the current line.
    /// Block scalar content is indented two past `indent`.
    fn leaf(&mut self, value: &Value, indent: usize, at: &str) -> Result<(), UnserializableValueError> {
        if let Some(Scalar::String(text)) = value.as_scalar() {
            if let Some((header, lines)) = block_scalar(text) {
                self.out.push_str(header);
                self.out.push('\n');
                for line in lines {
                    if !line.is_empty() {
                        self.indent(indent + 2);
                        self.out.push_str(line);
                    }
                    self.out.push('\n');
                }
                return Ok(());
            }
        }
        let text = format_leaf(value, at)?;
        self.out.push_str(&text);
        self.out.push('\n');
        Ok(())
    }
}

/// Single-line rendering of a leaf value
fn format_leaf(value: &Value, at: &str) -> Result<String, UnserializableValueError> {
    match value {
        Value::Record(_) => Ok("{}".to_string()),
        Value::Sequence(_) => Ok("[]".to_string()),
        Value::Scalar(scalar) | Value::Sentinel(pipetype_core::Sentinel { literal: scalar, .. }) => {
            match scalar {
                Scalar::String(s) => Ok(quote_string(s)),
                Scalar::Bool(b) => Ok(b.to_string()),
                Scalar::Number(n) => Scalar::format_number(*n).ok_or_else(|| {
                    UnserializableValueError::new(at, format!("non-finite number {n}"))
                }),
            }
        }
    }
}

/// Header and content lines when `text` can be written as a literal block
fn block_scalar(text: &str) -> Option<(&'static str, Vec<&str>)> {
    if !text.contains('\n') {
        return None;
    }
    let (body, header) = match text.strip_suffix('\n') {
        Some(body) => (body, "|"),
        None => (text, "|-"),
    };
    let lines: Vec<&str> = body.split('\n').collect();
    let first = lines.first()?;
    let representable = !first.is_empty()
        && !first.starts_with(' ')
        && !body.ends_with('\n')
        && lines.iter().all(|line| !line.ends_with(' '))
        && !text.chars().any(|c| c != '\n' && needs_escape(c));
    representable.then_some((header, lines))
}

/// Characters that must be escaped in any YAML scalar
fn needs_escape(c: char) -> bool {
    c.is_control() || matches!(c, '\u{2028}' | '\u{2029}' | '\u{feff}' | '\u{fffe}' | '\u{ffff}')
}

/// A string as a plain or double-quoted scalar
fn quote_string(s: &str) -> String {
    if is_plain_safe(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if needs_escape(c) => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

const INDICATORS: &[char] = &[
    '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
];

/// Whether `s` reads back as the same string when written unquoted
fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if INDICATORS.contains(&first)
        || s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
        || s.ends_with(':')
        || s.contains(": ")
        || s.contains(" #")
        || s.chars().any(|c| c == '\n' || needs_escape(c))
    {
        return false;
    }
    !resolves_to_non_string(s)
}

/// Whether a YAML 1.1 or 1.2 reader could read `s` as something other
/// than a string
fn resolves_to_non_string(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "~" | "null" | "true" | "false" | "yes" | "no" | "y" | "n" | "on" | "off" | "=" | "<<"
    ) {
        return true;
    }
    let unsigned = lower.trim_start_matches(['+', '-']);
    if matches!(unsigned, ".inf" | ".nan") || s.starts_with("...") {
        return true;
    }
    // Numbers, dates and times all start with a digit, possibly after a
    // sign or a leading dot
    let digits = unsigned.strip_prefix('.').unwrap_or(unsigned);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetype_core::Sentinel;

    fn wait() -> Value {
        Value::Sentinel(Sentinel {
            name: "wait".into(),
            literal: Scalar::from("wait"),
        })
    }

    #[test]
    fn test_two_step_pipeline() {
        let value = Value::Sequence(vec![
            Value::record([
                ("command", Value::string("scripts/tests.sh")),
                ("label", Value::string(":hammer: Tests")),
            ]),
            wait(),
        ]);
        assert_eq!(
            to_yaml(&value).unwrap(),
            "- command: scripts/tests.sh\n  label: \":hammer: Tests\"\n- wait\n"
        );
    }

    #[test]
    fn test_sentinel_matches_plain_string() {
        let sentinel = to_yaml(&Value::Sequence(vec![wait()])).unwrap();
        let plain = to_yaml(&Value::Sequence(vec![Value::string("wait")])).unwrap();
        assert_eq!(sentinel, plain);
    }

    #[test]
    fn test_nested_collections() {
        let value = Value::Sequence(vec![Value::record([
            ("command", Value::Sequence(vec![Value::string("make"), Value::string("make test")])),
            ("env", Value::record([("CI", Value::string("1"))])),
            ("agents", Value::record::<String>([])),
            ("artifact_paths", Value::Sequence(vec![])),
            ("parallelism", Value::number(4.0)),
            ("skip", Value::bool(false)),
        ])]);
        let expected = "\
- command:
    - make
    - make test
  env:
    CI: \"1\"
  agents: {}
  artifact_paths: []
  parallelism: 4
  skip: false
";
        assert_eq!(to_yaml(&value).unwrap(), expected);
    }

    #[test]
    fn test_nested_sequences_and_empty_documents() {
        let value = Value::Sequence(vec![Value::Sequence(vec![Value::number(1.0), Value::number(2.5)])]);
        assert_eq!(to_yaml(&value).unwrap(), "- - 1\n  - 2.5\n");
        assert_eq!(to_yaml(&Value::Sequence(vec![])).unwrap(), "[]\n");
        assert_eq!(to_yaml(&Value::record::<String>([])).unwrap(), "{}\n");
    }

    #[test]
    fn test_string_quoting() {
        for (input, expected) in [
            ("scripts/tests.sh", "scripts/tests.sh"),
            ("FIXTURE=swift .buildkite/build-pr.sh", "FIXTURE=swift .buildkite/build-pr.sh"),
            ("pkg/*", "pkg/*"),
            (":shipit: Release", "\":shipit: Release\""),
            ("", "\"\""),
            ("true", "\"true\""),
            ("No", "\"No\""),
            ("null", "\"null\""),
            ("10", "\"10\""),
            ("1.5e3", "\"1.5e3\""),
            ("2024-01-01", "\"2024-01-01\""),
            (".inf", "\".inf\""),
            ("key: value", "\"key: value\""),
            ("a #comment", "\"a #comment\""),
            ("trailing:", "\"trailing:\""),
            (" padded", "\" padded\""),
            ("*alias", "\"*alias\""),
            ("say \"hi\"", "say \"hi\""),
            ("tab\there", "\"tab\\there\""),
            ("bell\u{7}", "\"bell\\u0007\""),
        ] {
            assert_eq!(quote_string(input), expected, "quoting {input:?}");
        }
    }

    #[test]
    fn test_multiline_strings() {
        let value = Value::record([
            ("clip", Value::string("echo one\necho two\n")),
            ("strip", Value::string("echo one\n\n  echo two")),
            ("quoted", Value::string(" leading\nspace")),
        ]);
        let expected = "\
clip: |
  echo one
  echo two
strip: |-
  echo one

    echo two
quoted: \" leading\\nspace\"
";
        assert_eq!(to_yaml(&value).unwrap(), expected);
    }

    #[test]
    fn test_numbers() {
        let value = Value::Sequence(vec![
            Value::number(3.0),
            Value::number(-0.0),
            Value::number(0.1),
            Value::number(1e21),
        ]);
        assert_eq!(to_yaml(&value).unwrap(), "- 3\n- 0\n- 0.1\n- 1e21\n");
    }

    #[test]
    fn test_non_finite_number_is_unserializable() {
        let value = Value::Sequence(vec![Value::record([("timeout_in_minutes", Value::number(f64::INFINITY))])]);
        let err = to_yaml_at(&value, "steps").unwrap_err();
        assert_eq!(err.path, "steps[0].timeout_in_minutes");

        let err = PipelineEmitter::new()
            .with_format(OutputFormat::Json)
            .emit("steps", &value)
            .unwrap_err();
        let EmitError::Unserializable(err) = err else {
            panic!("expected an unserializable value");
        };
        assert_eq!(err.path, "steps[0].timeout_in_minutes");
    }

    #[test]
    fn test_root_key_wraps_document() {
        let value = Value::Sequence(vec![wait()]);
        let yaml = PipelineEmitter::new().with_wrap_root(true).emit("steps", &value).unwrap();
        assert_eq!(yaml, "steps:\n  - wait\n");
    }

    #[test]
    fn test_json_output_keeps_order() {
        let value = Value::Sequence(vec![Value::record([
            ("label", Value::string("b")),
            ("command", Value::string("a")),
        ])]);
        let json = PipelineEmitter::new()
            .with_format(OutputFormat::Json)
            .with_wrap_root(true)
            .emit("steps", &value)
            .unwrap();
        let label = json.find("\"label\"").unwrap();
        let command = json.find("\"command\"").unwrap();
        assert!(label < command);
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn test_output_limit() {
        let value = Value::Sequence(vec![Value::string("x".repeat(64))]);
        let limits = Limits {
            max_output_bytes: 16,
            ..Limits::default()
        };
        let err = PipelineEmitter::new().with_limits(limits).emit("steps", &value).unwrap_err();
        assert!(matches!(err, EmitError::TooLarge(_)));
    }
}
