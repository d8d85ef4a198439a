//! Core types shared across the pipetype crates
//!
//! - [`span`]: byte spans and line/column resolution
//! - [`lexer`]: the tokenizer for declaration and program sources
//! - [`value`]: the evaluated value tree handed to emitters
//! - [`path`]: `steps[0].label` style value paths
//! - [`config`]: `pipetype.toml` configuration
//! - [`limits`]: size and depth bounds

pub mod config;
pub mod lexer;
pub mod limits;
pub mod path;
pub mod span;
pub mod value;

pub use config::{Config, ConfigError, OutputFormat};
pub use lexer::{Cursor, LexError, Punct, Spanned, TemplatePart, Token, tokenize, tokenize_with_depth};
pub use limits::{LimitExceeded, Limits};
pub use span::{SourceLocation, Span};
pub use value::{Scalar, Sentinel, UnserializableValueError, Value};
