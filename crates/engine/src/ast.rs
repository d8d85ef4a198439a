//! Syntax tree for configuration programs.

use pipetype_core::Span;

/// A parsed configuration program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Name of the program source, used in diagnostics
    pub source_name: String,
    /// The program text
    pub source: String,
    /// `import "..."` statements, in order
    pub imports: Vec<Import>,
    /// Top-level statements, in order
    pub statements: Vec<Stmt>,
}

/// An `import "path";` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Module path as written
    pub path: String,
    /// Location of the statement
    pub span: Span,
}

/// An identifier occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    /// The name
    pub name: String,
    /// Where it appears
    pub span: Span,
}

/// Binding keyword of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `const`
    Const,
    /// `let`
    Let,
    /// `var`
    Var,
}

impl DeclKind {
    /// Whether the binding may be reassigned
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        !matches!(self, Self::Const)
    }
}

/// A top-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `const x = ...;`
    Declare {
        /// Binding keyword
        kind: DeclKind,
        /// Bound name
        name: Ident,
        /// Initializer, required for `const`
        init: Option<Expr>,
        /// Whole statement
        span: Span,
    },
    /// `x = ...;`
    Assign {
        /// Assigned name
        target: Ident,
        /// New value
        value: Expr,
        /// Whole statement
        span: Span,
    },
    /// An expression evaluated for its own sake
    Expr(Expr),
}

/// An expression with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// What kind of expression
    pub kind: ExprKind,
    /// Source range of the whole expression
    pub span: Span,
}

impl Expr {
    /// Create an expression
    #[must_use]
    pub const fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String literal
    Str(String),
    /// Number literal
    Number(f64),
    /// `true` or `false`
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Template literal
    Template(Vec<TemplateSegment>),
    /// Variable reference
    Ident(String),
    /// `[a, ...b]`
    Array(Vec<ArrayItem>),
    /// `{ a: 1, b, ...c }`
    Object(Vec<ObjectItem>),
    /// `object.property`
    Member {
        /// Receiver
        object: Box<Expr>,
        /// Property name
        property: Ident,
    },
    /// `object[index]`
    Index {
        /// Receiver
        object: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        /// Called expression
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `(a, b) => body`
    Arrow {
        /// Parameters
        params: Vec<Ident>,
        /// Body expression
        body: Box<Expr>,
    },
    /// Prefix operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Infix operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Value when truthy
        consequent: Box<Expr>,
        /// Value when falsy
        alternate: Box<Expr>,
    },
}

/// Piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    /// Literal text
    Text(String),
    /// `${expr}`
    Expr(Expr),
}

/// Element of an array literal
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    /// Plain element
    Item(Expr),
    /// `...expr`
    Spread(Expr),
}

/// Member of an object literal
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectItem {
    /// `key: value`, or shorthand `key`
    Field {
        /// Key text
        key: String,
        /// Location of the key
        key_span: Span,
        /// Field value
        value: Expr,
    },
    /// `...expr`
    Spread(Expr),
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `===`
    Eq,
    /// `!==`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Operator as written
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "===",
            Self::Ne => "!==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}
