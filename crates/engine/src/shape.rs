//! Static shapes of program expressions
//!
//! The checker interprets a program over shapes instead of values. A shape
//! records what is known about an expression: its kind, its value when that
//! is fixed by the program text, and where it was written.

use crate::ast::{Expr, Ident};
use indexmap::IndexMap;
use pipetype_core::{Scalar, Sentinel, Span};
use pipetype_schema::ScalarType;
use std::collections::HashMap;
use std::rc::Rc;

/// Upper bound on the branches a single shape may fan out into
pub(crate) const MAX_BRANCHES: usize = 64;

/// Local variables of one arrow function call
pub(crate) type Frame = HashMap<String, Shape>;

/// What the checker knows about an expression
#[derive(Debug, Clone)]
pub struct Shape {
    /// The shape itself
    pub kind: ShapeKind,
    /// Source of the expression that produced it
    pub span: Span,
}

/// A field of a record shape
#[derive(Debug, Clone)]
pub struct FieldShape {
    /// Location of the key that last set this field
    pub key_span: Span,
    /// The field value
    pub shape: Shape,
}

/// An arrow function together with the locals it closes over
#[derive(Debug)]
pub struct FunctionShape {
    pub(crate) params: Vec<Ident>,
    pub(crate) body: Expr,
    pub(crate) captured: Vec<Frame>,
}

/// Shape kinds
#[derive(Debug, Clone)]
pub enum ShapeKind {
    /// String, with its value when statically known
    Str(Option<String>),
    /// Number, with its value when statically known
    Num(Option<f64>),
    /// Boolean, with its value when statically known
    Bool(Option<bool>),
    /// Reference to a schema constant
    Sentinel(Sentinel),
    /// Object literal, fields in first-insertion order
    Record(IndexMap<String, FieldShape>),
    /// Array of statically known length
    Tuple(Vec<Shape>),
    /// Array of unknown length
    Array(Box<Shape>),
    /// Arrow function
    Function(Rc<FunctionShape>),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Any one of several shapes, e.g. both arms of a ternary
    OneOf(Vec<Shape>),
    /// Nothing is known; an error has already been reported
    Unknown,
}

impl Shape {
    /// Create a shape
    #[must_use]
    pub const fn new(kind: ShapeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub(crate) const fn unknown(span: Span) -> Self {
        Self::new(ShapeKind::Unknown, span)
    }

    /// Combine alternatives, flattening nested `OneOf`s.
    ///
    /// A single alternative is returned unchanged. `None` when there are
    /// more than [`MAX_BRANCHES`] alternatives; the caller reports it.
    pub(crate) fn one_of(shapes: Vec<Self>, span: Span) -> Option<Self> {
        let mut flat = Vec::with_capacity(shapes.len());
        for shape in shapes {
            match shape.kind {
                ShapeKind::OneOf(inner) => flat.extend(inner),
                _ => flat.push(shape),
            }
        }
        if flat.len() == 1 {
            return Some(flat.remove(0));
        }
        if flat.len() > MAX_BRANCHES {
            return None;
        }
        Some(Self::new(ShapeKind::OneOf(flat), span))
    }

    /// The scalar value when it is statically known
    #[must_use]
    pub fn known_scalar(&self) -> Option<Scalar> {
        match &self.kind {
            ShapeKind::Str(Some(s)) => Some(Scalar::String(s.clone())),
            ShapeKind::Num(Some(n)) => Some(Scalar::Number(*n)),
            ShapeKind::Bool(Some(b)) => Some(Scalar::Bool(*b)),
            ShapeKind::Sentinel(sentinel) => Some(sentinel.literal.clone()),
            _ => None,
        }
    }

    /// Scalar type of the shape, known value or not
    #[must_use]
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            ShapeKind::Str(_) => Some(ScalarType::String),
            ShapeKind::Num(_) => Some(ScalarType::Number),
            ShapeKind::Bool(_) => Some(ScalarType::Boolean),
            ShapeKind::Sentinel(sentinel) => Some(match sentinel.literal {
                Scalar::String(_) => ScalarType::String,
                Scalar::Number(_) => ScalarType::Number,
                Scalar::Bool(_) => ScalarType::Boolean,
            }),
            _ => None,
        }
    }

    /// JavaScript truthiness, when it can be decided statically
    #[must_use]
    pub fn truthiness(&self) -> Option<bool> {
        match &self.kind {
            ShapeKind::Record(_)
            | ShapeKind::Tuple(_)
            | ShapeKind::Array(_)
            | ShapeKind::Function(_) => Some(true),
            ShapeKind::Null | ShapeKind::Undefined => Some(false),
            ShapeKind::OneOf(branches) => {
                let first = branches.first()?.truthiness()?;
                branches
                    .iter()
                    .all(|b| b.truthiness() == Some(first))
                    .then_some(first)
            }
            ShapeKind::Unknown => None,
            _ => self.known_scalar().map(|s| scalar_truthiness(&s)),
        }
    }

    /// Human-readable description used in diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.kind {
            ShapeKind::Str(Some(s)) => format!("string {s:?}"),
            ShapeKind::Str(None) => "string".to_string(),
            ShapeKind::Num(Some(n)) => format!("number {}", Scalar::Number(*n)),
            ShapeKind::Num(None) => "number".to_string(),
            ShapeKind::Bool(Some(b)) => format!("boolean {b}"),
            ShapeKind::Bool(None) => "boolean".to_string(),
            ShapeKind::Sentinel(sentinel) => {
                format!("constant `{}` ({})", sentinel.name, sentinel.literal)
            }
            ShapeKind::Record(fields) if fields.is_empty() => "object {}".to_string(),
            ShapeKind::Record(fields) => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("object {{ {} }}", keys.join(", "))
            }
            ShapeKind::Tuple(items) if items.len() == 1 => "array of 1 element".to_string(),
            ShapeKind::Tuple(items) => format!("array of {} elements", items.len()),
            ShapeKind::Array(_) => "array".to_string(),
            ShapeKind::Function(_) => "function".to_string(),
            ShapeKind::Null => "null".to_string(),
            ShapeKind::Undefined => "undefined".to_string(),
            ShapeKind::OneOf(branches) if branches.is_empty() => "nothing".to_string(),
            ShapeKind::OneOf(branches) => {
                let parts: Vec<String> = branches.iter().map(Self::describe).collect();
                format!("one of {}", parts.join(" | "))
            }
            ShapeKind::Unknown => "unknown".to_string(),
        }
    }

    /// Element shapes when this is an array, and whether the length is known
    pub(crate) fn elements(&self) -> Option<(Vec<Self>, bool)> {
        match &self.kind {
            ShapeKind::Tuple(items) => Some((items.clone(), true)),
            ShapeKind::Array(element) => Some((vec![(**element).clone()], false)),
            _ => None,
        }
    }

    /// The string value for string shapes and string constants
    pub(crate) fn as_known_str(&self) -> Option<&str> {
        match &self.kind {
            ShapeKind::Str(Some(s)) => Some(s),
            ShapeKind::Sentinel(Sentinel {
                literal: Scalar::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    /// Whether this is a string shape or a string constant
    pub(crate) fn is_stringish(&self) -> bool {
        self.scalar_type() == Some(ScalarType::String)
    }
}

/// JavaScript truthiness of a scalar
#[must_use]
pub fn scalar_truthiness(scalar: &Scalar) -> bool {
    match scalar {
        Scalar::String(s) => !s.is_empty(),
        Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
        Scalar::Bool(b) => *b,
    }
}

/// JavaScript string conversion of a scalar
#[must_use]
pub fn scalar_to_string(scalar: &Scalar) -> String {
    match scalar {
        Scalar::String(s) => s.clone(),
        Scalar::Number(n) => number_to_string(*n),
        Scalar::Bool(b) => b.to_string(),
    }
}

/// JavaScript number formatting for the common cases
#[must_use]
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        Scalar::format_number(n).unwrap_or_else(|| n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(kind: ShapeKind) -> Shape {
        Shape::new(kind, Span::default())
    }

    #[test]
    fn test_one_of_flattens_and_unwraps() {
        let inner = Shape::one_of(
            vec![shape(ShapeKind::Null), shape(ShapeKind::Bool(Some(true)))],
            Span::default(),
        )
        .unwrap();
        let outer = Shape::one_of(vec![inner, shape(ShapeKind::Undefined)], Span::default()).unwrap();
        let ShapeKind::OneOf(branches) = &outer.kind else {
            panic!("expected OneOf");
        };
        assert_eq!(branches.len(), 3);

        let single = Shape::one_of(vec![shape(ShapeKind::Null)], Span::default()).unwrap();
        assert!(matches!(single.kind, ShapeKind::Null));
    }

    #[test]
    fn test_one_of_refuses_past_branch_limit() {
        let numbers = |count: usize| {
            (0..count)
                .map(|i| shape(ShapeKind::Num(Some(f64::from(u32::try_from(i).unwrap())))))
                .collect::<Vec<_>>()
        };
        assert!(Shape::one_of(numbers(MAX_BRANCHES), Span::default()).is_some());
        assert!(Shape::one_of(numbers(MAX_BRANCHES + 1), Span::default()).is_none());
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(shape(ShapeKind::Str(Some(String::new()))).truthiness(), Some(false));
        assert_eq!(shape(ShapeKind::Num(Some(2.0))).truthiness(), Some(true));
        assert_eq!(shape(ShapeKind::Str(None)).truthiness(), None);
        assert_eq!(shape(ShapeKind::Tuple(vec![])).truthiness(), Some(true));
        let mixed = shape(ShapeKind::OneOf(vec![
            shape(ShapeKind::Null),
            shape(ShapeKind::Record(IndexMap::new())),
        ]));
        assert_eq!(mixed.truthiness(), None);
    }

    #[test]
    fn test_describe() {
        let sentinel = shape(ShapeKind::Sentinel(Sentinel {
            name: "wait".into(),
            literal: Scalar::from("wait"),
        }));
        assert_eq!(sentinel.describe(), "constant `wait` (\"wait\")");
        assert_eq!(shape(ShapeKind::Num(Some(1.0))).describe(), "number 1");
        assert_eq!(
            shape(ShapeKind::Tuple(vec![shape(ShapeKind::Null)])).describe(),
            "array of 1 element"
        );
        assert_eq!(sentinel.scalar_type(), Some(ScalarType::String));
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1e21), "1e21");
        assert_eq!(
            number_to_string(1e21),
            Scalar::format_number(1e21).unwrap_or_default()
        );
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }
}
