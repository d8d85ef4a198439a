//! Schema declarations for pipetype
//!
//! This crate loads TypeScript-style declaration files (`*.d.ts`) into an
//! immutable [`Schema`]: named record, union, list and map types, literal
//! sentinel constants and the single root binding a configuration program
//! must produce.

pub mod error;
pub mod loader;
pub mod model;

pub use error::{Result, SchemaErrorKind, SchemaParseError};
pub use loader::{SchemaLoader, load};
pub use model::{
    FieldSpec, LiteralType, MapType, RecordType, RootBinding, ScalarType, Schema, SentinelConst,
    SequenceType, TypeDecl, TypeRef, VariantType,
};
