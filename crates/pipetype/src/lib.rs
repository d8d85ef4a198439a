//! pipetype: typed pipeline configuration compiler
//!
//! A pipeline is written as a small TypeScript-like program that assigns
//! the root binding declared by a schema (Buildkite's `steps` by default).
//! The program is checked against the schema before anything runs; only a
//! conforming program is evaluated and written out as YAML.
//!
//! ```ignore
//! let schema = pipetype_buildkite::load_bundled()?;
//! let yaml = pipetype::compile(&schema, "pipeline.yml.ts", &source, &CompileOptions::default())?;
//! ```
//!
//! The stages live in their own crates:
//! - `pipetype-schema` loads declaration sources into a [`Schema`]
//! - `pipetype-engine` parses, checks and evaluates programs
//! - `pipetype-buildkite` ships the Buildkite schema and the YAML emitter

pub mod cli;
pub mod compiler;
pub mod tracing;

pub use compiler::{CompileError, CompileOptions, check_program, compile, compile_source, schema_loader};
pub use pipetype_schema::Schema;
