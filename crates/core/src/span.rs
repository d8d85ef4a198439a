//! Byte spans and line/column resolution for source text.

use miette::SourceSpan;
use std::fmt;

/// A half-open byte range `[start, end)` into a source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl Span {
    /// Create a span covering `start..end`
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty span at a single offset
    #[must_use]
    pub const fn point(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shift both ends by `offset` bytes
    #[must_use]
    pub const fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        Self::new(span.start.into(), span.len())
    }
}

/// A 1-based line and column position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Line number, starting at 1
    pub line: usize,
    /// Column in characters, starting at 1
    pub column: usize,
}

impl SourceLocation {
    /// Resolve a byte offset into a line/column pair.
    ///
    /// Offsets past the end of `source` resolve to the position just after
    /// the last character.
    #[must_use]
    pub fn resolve(source: &str, offset: usize) -> Self {
        let mut line = 1;
        let mut column = 1;
        for (index, ch) in source.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_first_line() {
        let loc = SourceLocation::resolve("steps = []", 6);
        assert_eq!(loc, SourceLocation { line: 1, column: 7 });
    }

    #[test]
    fn test_resolve_after_newlines() {
        let src = "a\nbb\nccc";
        assert_eq!(SourceLocation::resolve(src, 2).line, 2);
        let loc = SourceLocation::resolve(src, 7);
        assert_eq!(loc, SourceLocation { line: 3, column: 3 });
    }

    #[test]
    fn test_resolve_counts_characters_not_bytes() {
        let src = "é = 1";
        let loc = SourceLocation::resolve(src, "é ".len());
        assert_eq!(loc.column, 3);
    }

    #[test]
    fn test_span_join_and_source_span() {
        let joined = Span::new(4, 6).to(Span::new(1, 3));
        assert_eq!(joined, Span::new(1, 6));
        let source_span: SourceSpan = joined.into();
        assert_eq!(source_span.offset(), 1);
        assert_eq!(source_span.len(), 5);
    }
}
