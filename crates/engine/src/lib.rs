//! Configuration program engine for pipetype
//!
//! A configuration program is a small TypeScript-like script that assigns
//! the schema's root binding. This crate parses such programs, checks them
//! against a [`pipetype_schema::Schema`] and evaluates checked programs to
//! a [`pipetype_core::Value`] tree.
//!
//! Evaluation takes a [`CheckedProgram`], which only [`check`] produces:
//!
//! ```text
//! parse_program -> check -> evaluate -> emit
//! ```

pub mod ast;
pub mod cache;
pub mod checker;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod shape;

pub use cache::SchemaCache;
pub use checker::{CheckedProgram, Resolution, check, check_with_limits};
pub use error::{CacheError, CheckError, CheckErrors, EvalError, ProgramParseError};
pub use evaluator::{evaluate, evaluate_with_limits};
pub use parser::{parse_program, parse_program_with_limits};
