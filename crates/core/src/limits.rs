//! Input and output size limits

use thiserror::Error;

/// Bounds applied while loading, checking and emitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a schema or program source, in bytes
    pub max_source_bytes: usize,
    /// Maximum nesting depth of type and value expressions
    pub max_depth: usize,
    /// Maximum size of an emitted document, in bytes
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_source_bytes: 4 * 1024 * 1024, // 4MB
            max_depth: 128,
            max_output_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl Limits {
    /// Apply overrides from a `[limits]` configuration table
    #[must_use]
    pub fn with_overrides(mut self, overrides: &crate::config::LimitsConfig) -> Self {
        if let Some(bytes) = overrides.max_source_bytes {
            self.max_source_bytes = bytes;
        }
        if let Some(depth) = overrides.max_depth {
            self.max_depth = depth;
        }
        if let Some(bytes) = overrides.max_output_bytes {
            self.max_output_bytes = bytes;
        }
        self
    }
}

/// A limit was exceeded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{what} exceeds maximum size of {limit} bytes ({actual} bytes)")]
pub struct LimitExceeded {
    /// Which input or output was too large
    pub what: &'static str,
    /// The configured limit
    pub limit: usize,
    /// The observed size
    pub actual: usize,
}

/// Validate a source text against `max_source_bytes`
///
/// # Errors
///
/// Returns [`LimitExceeded`] if the source is too large
pub fn validate_source(source: &str, limits: &Limits) -> Result<(), LimitExceeded> {
    check_size("source", source.len(), limits.max_source_bytes)
}

/// Validate an emitted document against `max_output_bytes`
///
/// # Errors
///
/// Returns [`LimitExceeded`] if the output is too large
pub fn validate_output(output: &str, limits: &Limits) -> Result<(), LimitExceeded> {
    check_size("output", output.len(), limits.max_output_bytes)
}

const fn check_size(what: &'static str, actual: usize, limit: usize) -> Result<(), LimitExceeded> {
    if actual > limit {
        Err(LimitExceeded {
            what,
            limit,
            actual,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_source_bytes, 4 * 1024 * 1024);
        assert_eq!(limits.max_depth, 128);
    }

    #[test]
    fn test_validate_source() {
        let limits = Limits {
            max_source_bytes: 4,
            ..Limits::default()
        };
        assert!(validate_source("abcd", &limits).is_ok());
        let err = validate_source("abcde", &limits).unwrap_err();
        assert_eq!(err.actual, 5);
        assert!(err.to_string().contains("source exceeds maximum size of 4 bytes"));
    }

    #[test]
    fn test_validate_output() {
        let limits = Limits {
            max_output_bytes: 1,
            ..Limits::default()
        };
        assert!(validate_output("ab", &limits).is_err());
    }

    #[test]
    fn test_overrides() {
        let overrides = LimitsConfig {
            max_depth: Some(8),
            ..LimitsConfig::default()
        };
        let limits = Limits::default().with_overrides(&overrides);
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_source_bytes, Limits::default().max_source_bytes);
    }
}
