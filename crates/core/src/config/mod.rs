//! Configuration types for pipetype
//!
//! Loaded from an optional `pipetype.toml`; command-line flags override
//! whatever the file sets.

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "pipetype.toml";

/// Main configuration structure for pipetype
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// Schema declaration file; the bundled Buildkite schema when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,

    /// Output settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Input and output size limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct OutputConfig {
    /// Document format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// Wrap the document in a mapping keyed by the root binding name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap_root: Option<bool>,
}

/// Output document format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Canonical YAML
    #[default]
    Yaml,
    /// Pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// File extension for documents in this format
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yml",
            Self::Json => "json",
        }
    }
}

/// Limit overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum size of a schema or program source, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_source_bytes: Option<usize>,

    /// Maximum nesting depth of types and expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Maximum size of an emitted document, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,
}

/// Errors raised while reading the configuration file
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read configuration file {}", path.display())]
    #[diagnostic(
        code(pipetype::config::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys
    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(pipetype::config::parse),
        help("Supported keys: schema, [output] format/wrap_root, [limits] max_source_bytes/max_depth/max_output_bytes")
    )]
    Parse {
        /// Parser message
        message: String,
        /// The configuration source
        #[source_code]
        src: NamedSource<String>,
        /// Location of the problem
        #[label("here")]
        span: Option<SourceSpan>,
    },
}

impl Config {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid TOML or
    /// contains unknown keys.
    pub fn from_toml(name: &str, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.message().to_string(),
            src: NamedSource::new(name, text.to_string()),
            span: e.span().map(SourceSpan::from),
        })
    }

    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&path.display().to_string(), &text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load `pipetype.toml` from `dir` if it exists
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Configured output format, defaulting to YAML
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        self.output
            .as_ref()
            .and_then(|o| o.format)
            .unwrap_or_default()
    }

    /// Whether the document should be wrapped under the root binding name
    #[must_use]
    pub fn wrap_root(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.wrap_root)
            .unwrap_or(false)
    }

    /// Default limits with the `[limits]` table applied
    #[must_use]
    pub fn limits(&self) -> crate::Limits {
        let limits = crate::Limits::default();
        match &self.limits {
            Some(overrides) => limits.with_overrides(overrides),
            None => limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config = Config::from_toml("pipetype.toml", "").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output_format(), OutputFormat::Yaml);
        assert!(!config.wrap_root());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
schema = "schema/buildkite.d.ts"

[output]
format = "json"
wrap_root = true

[limits]
max_depth = 32
"#;
        let config = Config::from_toml("pipetype.toml", text).unwrap();
        assert_eq!(config.schema, Some(PathBuf::from("schema/buildkite.d.ts")));
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert!(config.wrap_root());
        assert_eq!(config.limits().max_depth, 32);
        assert_eq!(config.limits().max_source_bytes, crate::Limits::default().max_source_bytes);
        assert_eq!(config.limits.unwrap().max_depth, Some(32));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml("pipetype.toml", "scheme = \"x\"").unwrap_err();
        match err {
            ConfigError::Parse { message, span, .. } => {
                assert!(message.contains("scheme"));
                assert!(span.is_some());
            }
            ConfigError::Io { .. } => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::discover(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_discover_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[output]\nwrap_root = true\n").unwrap();
        let config = Config::discover(dir.path()).unwrap().unwrap();
        assert!(config.wrap_root());
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(OutputFormat::Yaml.extension(), "yml");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }
}
