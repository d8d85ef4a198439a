//! Value paths such as `steps[3].retry.automatic.limit`
//!
//! Paths are plain strings built by appending segments. Keys that are not
//! identifiers are written in bracket form: `env["MY-VAR"]`.

/// Append a record key
#[must_use]
pub fn field(parent: &str, key: &str) -> String {
    if is_identifier(key) {
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{parent}.{key}")
        }
    } else {
        format!("{parent}[{key:?}]")
    }
}

/// Append a known sequence index
#[must_use]
pub fn index(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Append the wildcard index used for elements of unknown position
#[must_use]
pub fn any_index(parent: &str) -> String {
    format!("{parent}[*]")
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments() {
        let path = index("steps", 3);
        let path = field(&path, "retry");
        let path = field(&path, "limit");
        assert_eq!(path, "steps[3].retry.limit");
        assert_eq!(any_index("steps"), "steps[*]");
    }

    #[test]
    fn test_non_identifier_keys_are_bracketed() {
        assert_eq!(field("env", "MY-VAR"), "env[\"MY-VAR\"]");
        assert_eq!(field("env", ""), "env[\"\"]");
        assert_eq!(field("", "steps"), "steps");
    }
}
