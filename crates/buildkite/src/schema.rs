//! Bundled Buildkite pipeline schema
//!
//! The declarations in `schema/buildkite.d.ts` describe Buildkite's step
//! format: command, wait, block and trigger steps.
//! See: <https://buildkite.com/docs/pipelines/configure/defining-steps>

use pipetype_schema::{Schema, SchemaLoader, SchemaParseError};

/// Name under which the bundled declarations are loaded
pub const BUILDKITE_SCHEMA_NAME: &str = "buildkite.d.ts";

/// Declaration source of the bundled schema
pub const BUILDKITE_SCHEMA: &str = include_str!("../schema/buildkite.d.ts");

/// A loader holding the bundled declarations
#[must_use]
pub fn loader() -> SchemaLoader {
    SchemaLoader::new().add_source(BUILDKITE_SCHEMA_NAME, BUILDKITE_SCHEMA)
}

/// Load the bundled schema
///
/// # Errors
///
/// Only fails if the bundled declarations are malformed.
pub fn load_bundled() -> Result<Schema, SchemaParseError> {
    loader().load()
}
