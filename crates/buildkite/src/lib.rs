//! Buildkite pipeline output for pipetype
//!
//! This crate ships the Buildkite step schema and renders evaluated
//! pipelines as the YAML (or JSON) that `buildkite-agent pipeline upload`
//! accepts.
//!
//! # Example
//!
//! ```ignore
//! use pipetype_buildkite::{PipelineEmitter, schema};
//!
//! let schema = schema::load_bundled()?;
//! let program = pipetype_engine::parse_program("pipeline.yml.ts", &source)?;
//! let checked = pipetype_engine::check(&schema, program)?;
//! let value = pipetype_engine::evaluate(&checked)?;
//!
//! let yaml = PipelineEmitter::new().emit(&schema.root().name, &value)?;
//! ```

pub mod emitter;
pub mod schema;

pub use emitter::{EmitError, EmitResult, PipelineEmitter, to_yaml};
pub use schema::{BUILDKITE_SCHEMA, load_bundled};
