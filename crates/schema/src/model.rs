//! Schema model: the shape of a valid configuration value.
//!
//! A [`Schema`] is built once by the loader and is immutable afterwards.
//! Type references are a closed enum ([`TypeRef`]); named references are
//! resolved through [`Schema::resolve`].

use indexmap::IndexMap;
use pipetype_core::{Scalar, Span};
use std::fmt;

/// Primitive scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// Any string
    String,
    /// Any number
    Number,
    /// `true` or `false`
    Boolean,
}

impl ScalarType {
    /// Whether `scalar` is of this type
    #[must_use]
    pub const fn admits(self, scalar: &Scalar) -> bool {
        matches!(
            (self, scalar),
            (Self::String, Scalar::String(_))
                | (Self::Number, Scalar::Number(_))
                | (Self::Boolean, Scalar::Bool(_))
        )
    }

    /// Declaration-syntax name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// A finite set of permitted scalar values
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralType {
    /// Permitted values in declaration order; never empty
    pub values: Vec<Scalar>,
}

impl LiteralType {
    /// Whether `scalar` equals one of the permitted values (type and value)
    #[must_use]
    pub fn admits(&self, scalar: &Scalar) -> bool {
        self.values.iter().any(|v| v == scalar)
    }
}

/// A field of a record type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name, unique within the record
    pub name: String,
    /// Value type
    pub ty: TypeRef,
    /// Whether the field may be absent
    pub optional: bool,
    /// Documentation text; informational only
    pub doc: Option<String>,
    /// Declaration site
    pub span: Span,
}

/// A closed record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    /// Declared name; `None` for inline object types
    pub name: Option<String>,
    /// Fields in declaration order
    pub fields: Vec<FieldSpec>,
}

impl RecordType {
    /// Look up a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that must be present
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.optional)
    }

    /// Whether a field with this name is declared
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// An ordered union of at least two alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct VariantType {
    /// Alternatives in declaration order
    pub alternatives: Vec<TypeRef>,
}

/// A list type
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceType {
    /// Element type
    pub element: TypeRef,
    /// Whether a single element may stand in for a one-element list
    pub accepts_single: bool,
}

/// A string-keyed dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct MapType {
    /// Name of the key in the index signature (informational)
    pub key_name: String,
    /// Type of every value
    pub value: TypeRef,
}

/// A reference to a type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// Primitive scalar
    Scalar(ScalarType),
    /// Literal constant set
    Literal(LiteralType),
    /// Closed record
    Record(RecordType),
    /// Ordered union
    Variant(VariantType),
    /// List
    Sequence(Box<SequenceType>),
    /// Dictionary
    Map(Box<MapType>),
    /// Reference to a declared type
    Named(String),
}

impl TypeRef {
    /// Build a union, normalizing degenerate cases.
    ///
    /// A single alternative is returned as-is and a union made only of
    /// literals collapses into one [`LiteralType`] (duplicates removed).
    #[must_use]
    pub fn union(mut alternatives: Vec<Self>) -> Self {
        if alternatives.len() == 1 {
            return alternatives.remove(0);
        }
        if !alternatives.is_empty() && alternatives.iter().all(|a| matches!(a, Self::Literal(_))) {
            let mut values: Vec<Scalar> = Vec::new();
            for alternative in alternatives {
                if let Self::Literal(lit) = alternative {
                    for value in lit.values {
                        if !values.contains(&value) {
                            values.push(value);
                        }
                    }
                }
            }
            return Self::Literal(LiteralType { values });
        }
        Self::Variant(VariantType { alternatives })
    }

    /// A single-value literal type
    #[must_use]
    pub fn literal(value: impl Into<Scalar>) -> Self {
        Self::Literal(LiteralType {
            values: vec![value.into()],
        })
    }

    /// A plain `T[]`
    #[must_use]
    pub fn sequence(element: Self) -> Self {
        Self::Sequence(Box::new(SequenceType {
            element,
            accepts_single: false,
        }))
    }

    /// Whether this type renders with `|` at the top level
    fn is_union_like(&self) -> bool {
        match self {
            Self::Variant(_) => true,
            Self::Literal(lit) => lit.values.len() > 1,
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.name()),
            Self::Literal(lit) => {
                for (i, value) in lit.values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Self::Record(record) => match &record.name {
                Some(name) => f.write_str(name),
                None => {
                    f.write_str("{ ")?;
                    for (i, field) in record.fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(&field.name)?;
                        if field.optional {
                            f.write_str("?")?;
                        }
                    }
                    f.write_str(" }")
                }
            },
            Self::Variant(variant) => {
                for (i, alternative) in variant.alternatives.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                Ok(())
            }
            Self::Sequence(seq) if seq.accepts_single => write!(f, "OneOrMany<{}>", seq.element),
            Self::Sequence(seq) if seq.element.is_union_like() => write!(f, "({})[]", seq.element),
            Self::Sequence(seq) => write!(f, "{}[]", seq.element),
            Self::Map(map) => write!(f, "{{ [{}: string]: {} }}", map.key_name, map.value),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A named type declaration (`interface` or `type`)
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    /// Declared name
    pub name: String,
    /// The declared type
    pub ty: TypeRef,
    /// Documentation text
    pub doc: Option<String>,
    /// Name of the source that declared it
    pub source: String,
    /// Declaration site
    pub span: Span,
}

/// A global constant usable as a sentinel, e.g. `declare const wait = "wait"`
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelConst {
    /// Constant name
    pub name: String,
    /// Literal value
    pub value: Scalar,
    /// Declaration site
    pub span: Span,
}

/// The designated binding a configuration program must produce
#[derive(Debug, Clone, PartialEq)]
pub struct RootBinding {
    /// Binding name, e.g. `steps`
    pub name: String,
    /// Required type
    pub ty: TypeRef,
    /// Name of the source that declared it
    pub source: String,
    /// Declaration site
    pub span: Span,
}

/// A loaded schema declaration set
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub(crate) types: IndexMap<String, TypeDecl>,
    pub(crate) constants: IndexMap<String, SentinelConst>,
    pub(crate) root: RootBinding,
}

impl Schema {
    /// The root binding
    #[must_use]
    pub const fn root(&self) -> &RootBinding {
        &self.root
    }

    /// Declared types in declaration order
    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// Look up a declared type
    #[must_use]
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    /// Declared sentinel constants
    pub fn constants(&self) -> impl Iterator<Item = &SentinelConst> {
        self.constants.values()
    }

    /// Look up a sentinel constant
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&SentinelConst> {
        self.constants.get(name)
    }

    /// Follow `Named` references until a structural type is reached.
    ///
    /// The loader rejects unknown names and alias cycles, so this always
    /// terminates on a loaded schema; an unknown name resolves to itself.
    #[must_use]
    pub fn resolve<'a>(&'a self, mut ty: &'a TypeRef) -> &'a TypeRef {
        let mut hops = 0;
        while let TypeRef::Named(name) = ty {
            match self.types.get(name) {
                Some(decl) if hops <= self.types.len() => {
                    ty = &decl.ty;
                    hops += 1;
                }
                _ => break,
            }
        }
        ty
    }

    /// Alternatives of a variant, with nested variants expanded in place.
    ///
    /// Each entry pairs the alternative's display label with the resolved
    /// type. Non-variant types yield themselves.
    #[must_use]
    pub fn flatten_alternatives<'a>(&'a self, ty: &'a TypeRef) -> Vec<(String, &'a TypeRef)> {
        let mut out = Vec::new();
        self.flatten_into(ty, &mut out, 0);
        out
    }

    fn flatten_into<'a>(&'a self, ty: &'a TypeRef, out: &mut Vec<(String, &'a TypeRef)>, depth: usize) {
        let resolved = self.resolve(ty);
        match resolved {
            TypeRef::Variant(variant) if depth <= self.types.len() => {
                for alternative in &variant.alternatives {
                    self.flatten_into(alternative, out, depth + 1);
                }
            }
            _ => out.push((ty.to_string(), resolved)),
        }
    }
}
