//! Static checking of configuration programs against a schema
//!
//! Checking runs in two stages. First the program is interpreted over
//! [`Shape`]s, which reports misuse such as unknown identifiers or `.map` on
//! a non-array. Then every assignment to the schema's root binding is
//! matched structurally against the root type.
//!
//! All errors are collected; a program is only handed to the evaluator as
//! a [`CheckedProgram`] when none were found.

use crate::ast::{
    ArrayItem, BinaryOp, DeclKind, Expr, ExprKind, ObjectItem, Program, Stmt, TemplateSegment,
    UnaryOp,
};
use crate::error::{CheckError, CheckErrors};
use crate::shape::{
    FieldShape, Frame, FunctionShape, MAX_BRANCHES, Shape, ShapeKind, number_to_string,
    scalar_to_string,
};
use indexmap::IndexMap;
use miette::NamedSource;
use pipetype_core::{Limits, Sentinel, Span, path};
use pipetype_schema::{RecordType, Schema, TypeRef};
use std::fmt;
use std::rc::Rc;

/// Function calls interpreted per program before checking gives up
const MAX_CALLS: usize = 100_000;

/// A variant decision made while matching: which alternative a value at
/// `path` was checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Value path, e.g. `steps[1]`
    pub path: String,
    /// The variant type, in declaration syntax
    pub variant: String,
    /// The chosen alternative, in declaration syntax
    pub alternative: String,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} as {}", self.path, self.variant, self.alternative)
    }
}

/// A program that passed checking against a schema.
///
/// Only [`check`] creates one, so evaluation of an unchecked program cannot
/// be expressed.
#[derive(Debug)]
pub struct CheckedProgram<'s> {
    pub(crate) schema: &'s Schema,
    pub(crate) program: Program,
    resolutions: Vec<Resolution>,
}

impl<'s> CheckedProgram<'s> {
    /// The schema the program was checked against
    #[must_use]
    pub const fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// The checked program
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }

    /// Variant decisions, in matching order
    #[must_use]
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }
}

/// Check `program` against `schema` with default limits
///
/// # Errors
///
/// Returns [`CheckErrors`] holding every nonconformance found.
pub fn check(schema: &Schema, program: Program) -> Result<CheckedProgram<'_>, CheckErrors> {
    check_with_limits(schema, program, &Limits::default())
}

/// Check `program` against `schema`; `limits.max_depth` bounds the depth
/// of nested function calls
///
/// # Errors
///
/// Returns [`CheckErrors`] holding every nonconformance found.
pub fn check_with_limits<'s>(
    schema: &'s Schema,
    program: Program,
    limits: &Limits,
) -> Result<CheckedProgram<'s>, CheckErrors> {
    let mut checker = Checker::new(schema, &program, limits);
    checker.run();
    let Checker {
        mut errors,
        resolutions,
        ..
    } = checker;

    errors.sort_by_key(|e| e.span.offset());
    errors.dedup();

    tracing::debug!(
        source = %program.source_name,
        errors = errors.len(),
        resolutions = resolutions.len(),
        "Checked program"
    );

    if errors.is_empty() {
        Ok(CheckedProgram {
            schema,
            program,
            resolutions,
        })
    } else {
        Err(CheckErrors {
            source_name: program.source_name.clone(),
            src: NamedSource::new(&program.source_name, program.source.clone()),
            errors,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Declared(DeclKind),
    Root,
    Constant,
}

#[derive(Debug, Clone)]
struct Binding {
    kind: BindingKind,
    shape: Shape,
}

/// Errors and decisions produced by structural matching
#[derive(Debug, Default)]
struct Outcome {
    errors: Vec<CheckError>,
    resolutions: Vec<Resolution>,
}

struct Checker<'a> {
    schema: &'a Schema,
    source: &'a str,
    statements: &'a [Stmt],
    max_call_depth: usize,
    globals: IndexMap<String, Binding>,
    frames: Vec<Frame>,
    call_depth: usize,
    calls: usize,
    /// Path reported for expression-level errors: the binding being defined
    context: String,
    root_assigned: bool,
    errors: Vec<CheckError>,
    resolutions: Vec<Resolution>,
}

impl<'a> Checker<'a> {
    fn new(schema: &'a Schema, program: &'a Program, limits: &Limits) -> Self {
        let mut globals = IndexMap::new();
        for constant in schema.constants() {
            globals.insert(
                constant.name.clone(),
                Binding {
                    kind: BindingKind::Constant,
                    shape: Shape::new(
                        ShapeKind::Sentinel(Sentinel {
                            name: constant.name.clone(),
                            literal: constant.value.clone(),
                        }),
                        Span::default(),
                    ),
                },
            );
        }
        let root = schema.root();
        globals.insert(
            root.name.clone(),
            Binding {
                kind: BindingKind::Root,
                shape: Shape::new(ShapeKind::Undefined, Span::default()),
            },
        );

        Self {
            schema,
            source: &program.source,
            statements: &program.statements,
            max_call_depth: limits.max_depth,
            globals,
            frames: Vec::new(),
            call_depth: 0,
            calls: 0,
            context: root.name.clone(),
            root_assigned: false,
            errors: Vec::new(),
            resolutions: Vec::new(),
        }
    }

    fn error(&mut self, expected: impl Into<String>, found: impl Into<String>, span: Span) {
        let err = CheckError::new(self.context.clone(), expected, found, span, self.source);
        self.errors.push(err);
    }

    /// Combine alternatives, reporting expressions that fan out past
    /// [`MAX_BRANCHES`]
    fn one_of(&mut self, shapes: Vec<Shape>, span: Span) -> Shape {
        Shape::one_of(shapes, span).unwrap_or_else(|| {
            self.too_many_branches(span);
            Shape::unknown(span)
        })
    }

    fn too_many_branches(&mut self, span: Span) {
        let err = CheckError::new(
            self.context.clone(),
            format!("at most {MAX_BRANCHES} possible shapes"),
            "an expression with more",
            span,
            self.source,
        )
        .with_note("Split the expression so each part has fewer alternatives");
        self.errors.push(err);
    }

    fn run(&mut self) {
        let statements = self.statements;
        for statement in statements {
            self.statement(statement);
        }
        if !self.root_assigned {
            let root = self.schema.root();
            let err = CheckError::new(
                root.name.clone(),
                root.ty.to_string(),
                format!("no assignment to `{}`", root.name),
                Span::point(self.source.len()),
                self.source,
            )
            .with_note(format!("Assign the pipeline with `{} = [...]`", root.name));
            self.errors.push(err);
        }
    }

    fn statement(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Declare {
                kind, name, init, ..
            } => {
                self.context.clone_from(&name.name);
                let existing = self.globals.get(&name.name).map(|b| b.kind);
                match existing {
                    Some(BindingKind::Root) if *kind == DeclKind::Var => {
                        if let Some(init) = init {
                            self.assign_root(init);
                        }
                        return;
                    }
                    Some(BindingKind::Root) => {
                        self.error(
                            format!("an assignment `{} = ...`", name.name),
                            format!("`{}` redeclared; it is declared by the schema", name.name),
                            name.span,
                        );
                        return;
                    }
                    Some(BindingKind::Constant) => {
                        self.error(
                            "a new name",
                            format!("`{}`, which is a schema constant", name.name),
                            name.span,
                        );
                        return;
                    }
                    Some(BindingKind::Declared(previous))
                        if !(previous == DeclKind::Var && *kind == DeclKind::Var) =>
                    {
                        self.error(
                            "a new name",
                            format!("`{}`, which is already declared", name.name),
                            name.span,
                        );
                        return;
                    }
                    _ => {}
                }
                let shape = match init {
                    Some(init) => self.eval(init),
                    None => Shape::new(ShapeKind::Undefined, name.span),
                };
                self.globals.insert(
                    name.name.clone(),
                    Binding {
                        kind: BindingKind::Declared(*kind),
                        shape,
                    },
                );
            }
            Stmt::Assign { target, value, .. } => {
                self.context.clone_from(&target.name);
                match self.globals.get(&target.name).map(|b| b.kind) {
                    Some(BindingKind::Root) => self.assign_root(value),
                    Some(BindingKind::Declared(kind)) if kind.is_mutable() => {
                        let shape = self.eval(value);
                        if let Some(binding) = self.globals.get_mut(&target.name) {
                            binding.shape = shape;
                        }
                    }
                    Some(BindingKind::Declared(_) | BindingKind::Constant) => {
                        self.eval(value);
                        self.error(
                            "an assignable variable",
                            format!("constant `{}`", target.name),
                            target.span,
                        );
                    }
                    None => {
                        self.eval(value);
                        self.error(
                            "a declared variable",
                            format!("undeclared `{}`", target.name),
                            target.span,
                        );
                    }
                }
            }
            Stmt::Expr(expr) => {
                self.context = String::new();
                self.eval(expr);
            }
        }
    }

    fn assign_root(&mut self, value: &Expr) {
        let root = self.schema.root();
        self.context.clone_from(&root.name);
        let shape = self.eval(value);

        let matcher = Matcher {
            schema: self.schema,
            source: self.source,
        };
        let mut outcome = Outcome::default();
        matcher.conform(&root.ty, &shape, &root.name, &[], &mut outcome);
        self.errors.extend(outcome.errors);
        self.resolutions.extend(outcome.resolutions);

        self.root_assigned = true;
        if let Some(binding) = self.globals.get_mut(&root.name) {
            binding.shape = shape;
        }
    }

    fn lookup(&self, name: &str) -> Option<Shape> {
        for frame in self.frames.iter().rev() {
            if let Some(shape) = frame.get(name) {
                return Some(shape.clone());
            }
        }
        self.globals.get(name).map(|b| b.shape.clone())
    }

    // ------------------------------------------------------------------
    // Shape inference
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Shape {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Str(s) => Shape::new(ShapeKind::Str(Some(s.clone())), span),
            ExprKind::Number(n) => Shape::new(ShapeKind::Num(Some(*n)), span),
            ExprKind::Bool(b) => Shape::new(ShapeKind::Bool(Some(*b)), span),
            ExprKind::Null => Shape::new(ShapeKind::Null, span),
            ExprKind::Undefined => Shape::new(ShapeKind::Undefined, span),
            ExprKind::Template(segments) => self.template(segments, span),
            ExprKind::Ident(name) => match self.lookup(name) {
                Some(shape) if shape.scalar_type().is_some() || is_leaf(&shape) => {
                    Shape::new(shape.kind, span)
                }
                Some(shape) => shape,
                None => {
                    self.error("a declared identifier", format!("unknown identifier `{name}`"), span);
                    Shape::unknown(span)
                }
            },
            ExprKind::Array(items) => self.array(items, span),
            ExprKind::Object(items) => self.object(items, span),
            ExprKind::Member { object, property } => {
                let receiver = self.eval(object);
                self.member(&receiver, &property.name, span)
            }
            ExprKind::Index { object, index } => {
                let receiver = self.eval(object);
                let index = self.eval(index);
                self.index(&receiver, &index, span)
            }
            ExprKind::Call { callee, args } => self.call_expr(callee, args, span),
            ExprKind::Arrow { params, body } => Shape::new(
                ShapeKind::Function(Rc::new(FunctionShape {
                    params: params.clone(),
                    body: (**body).clone(),
                    captured: self.frames.clone(),
                })),
                span,
            ),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand);
                self.unary(*op, &operand, span)
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, span),
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.eval(test);
                match test.truthiness() {
                    Some(true) => self.eval(consequent),
                    Some(false) => self.eval(alternate),
                    None => {
                        let a = self.eval(consequent);
                        let b = self.eval(alternate);
                        self.one_of(vec![a, b], span)
                    }
                }
            }
        }
    }

    fn template(&mut self, segments: &[TemplateSegment], span: Span) -> Shape {
        let mut text = Some(String::new());
        for segment in segments {
            match segment {
                TemplateSegment::Text(part) => {
                    if let Some(text) = &mut text {
                        text.push_str(part);
                    }
                }
                TemplateSegment::Expr(expr) => {
                    let shape = self.eval(expr);
                    match self.stringify(&shape) {
                        Some(Some(part)) => {
                            if let Some(text) = &mut text {
                                text.push_str(&part);
                            }
                        }
                        Some(None) => text = None,
                        None => {
                            self.error(
                                "a string, number or boolean",
                                format!("{} in template literal", shape.describe()),
                                shape.span,
                            );
                            text = None;
                        }
                    }
                }
            }
        }
        Shape::new(ShapeKind::Str(text), span)
    }

    /// String conversion for interpolation and `+`: `None` when the shape
    /// cannot be converted, `Some(None)` when the result is not known
    fn stringify(&self, shape: &Shape) -> Option<Option<String>> {
        match &shape.kind {
            ShapeKind::Str(s) => Some(s.clone()),
            ShapeKind::Num(n) => Some(n.map(number_to_string)),
            ShapeKind::Bool(b) => Some(b.map(|b| b.to_string())),
            ShapeKind::Sentinel(sentinel) => Some(Some(scalar_to_string(&sentinel.literal))),
            ShapeKind::Unknown => Some(None),
            ShapeKind::OneOf(branches) => {
                for branch in branches {
                    self.stringify(branch)?;
                }
                Some(None)
            }
            _ => None,
        }
    }

    fn array(&mut self, items: &[ArrayItem], span: Span) -> Shape {
        let mut elements = Vec::new();
        let mut known_length = true;
        for item in items {
            match item {
                ArrayItem::Item(expr) => elements.push(self.eval(expr)),
                ArrayItem::Spread(expr) => {
                    let spread = self.eval(expr);
                    match self.spread_elements(&spread) {
                        Some((items, known)) => {
                            elements.extend(items);
                            known_length &= known;
                        }
                        None => {
                            self.error("an array to spread", spread.describe(), spread.span);
                            known_length = false;
                        }
                    }
                }
            }
        }
        if known_length {
            Shape::new(ShapeKind::Tuple(elements), span)
        } else {
            Shape::new(ShapeKind::Array(Box::new(self.one_of(elements, span))), span)
        }
    }

    fn spread_elements(&self, shape: &Shape) -> Option<(Vec<Shape>, bool)> {
        match &shape.kind {
            ShapeKind::Unknown => Some((Vec::new(), false)),
            ShapeKind::OneOf(branches) => {
                let mut all = Vec::new();
                for branch in branches {
                    all.extend(self.spread_elements(branch)?.0);
                }
                Some((all, false))
            }
            _ => shape.elements(),
        }
    }

    fn object(&mut self, items: &[ObjectItem], span: Span) -> Shape {
        // One partial object per combination of spread alternatives
        let mut partials: Vec<IndexMap<String, FieldShape>> = vec![IndexMap::new()];
        let mut unknown = false;
        for item in items {
            match item {
                ObjectItem::Field {
                    key,
                    key_span,
                    value,
                } => {
                    let shape = self.eval(value);
                    for partial in &mut partials {
                        partial.insert(
                            key.clone(),
                            FieldShape {
                                key_span: *key_span,
                                shape: shape.clone(),
                            },
                        );
                    }
                }
                ObjectItem::Spread(expr) => {
                    let spread = self.eval(expr);
                    let spread_span = spread.span;
                    let branches = match spread.kind {
                        ShapeKind::OneOf(branches) => branches,
                        _ => vec![spread],
                    };
                    let mut next = Vec::new();
                    for branch in &branches {
                        match &branch.kind {
                            ShapeKind::Record(fields) => {
                                for partial in &partials {
                                    let mut merged = partial.clone();
                                    for (key, field) in fields {
                                        merged.insert(key.clone(), field.clone());
                                    }
                                    next.push(merged);
                                }
                            }
                            ShapeKind::Null | ShapeKind::Undefined => next.extend(partials.iter().cloned()),
                            ShapeKind::Unknown => unknown = true,
                            _ => {
                                self.error("an object to spread", branch.describe(), branch.span);
                                unknown = true;
                            }
                        }
                    }
                    if next.len() > MAX_BRANCHES {
                        self.too_many_branches(spread_span);
                        unknown = true;
                    }
                    if !next.is_empty() {
                        partials = next;
                    }
                }
            }
        }
        if unknown {
            return Shape::unknown(span);
        }
        let shapes = partials
            .into_iter()
            .map(|fields| Shape::new(ShapeKind::Record(fields), span))
            .collect();
        self.one_of(shapes, span)
    }

    fn member(&mut self, receiver: &Shape, property: &str, span: Span) -> Shape {
        match &receiver.kind {
            ShapeKind::Unknown => Shape::unknown(span),
            ShapeKind::OneOf(branches) => {
                let results = branches.iter().map(|b| self.member(b, property, span)).collect();
                self.one_of(results, span)
            }
            ShapeKind::Record(fields) => {
                if let Some(field) = fields.get(property) {
                    field.shape.clone()
                } else {
                    self.error(
                        format!("an object with property `{property}`"),
                        receiver.describe(),
                        span,
                    );
                    Shape::unknown(span)
                }
            }
            ShapeKind::Tuple(items) if property == "length" => {
                Shape::new(ShapeKind::Num(Some(len_as_f64(items.len()))), span)
            }
            ShapeKind::Array(_) if property == "length" => Shape::new(ShapeKind::Num(None), span),
            _ if property == "length" && receiver.is_stringish() => {
                let length = receiver
                    .as_known_str()
                    .map(|s| len_as_f64(s.encode_utf16().count()));
                Shape::new(ShapeKind::Num(length), span)
            }
            ShapeKind::Null | ShapeKind::Undefined => {
                self.error(
                    "an object",
                    format!("{} when reading `{property}`", receiver.describe()),
                    span,
                );
                Shape::unknown(span)
            }
            _ if is_method(property) => {
                self.error(
                    format!("a call to `.{property}(...)`"),
                    format!("method `{property}` used as a value"),
                    span,
                );
                Shape::unknown(span)
            }
            _ => {
                self.error(
                    format!("a value with property `{property}`"),
                    receiver.describe(),
                    span,
                );
                Shape::unknown(span)
            }
        }
    }

    fn index(&mut self, receiver: &Shape, index: &Shape, span: Span) -> Shape {
        match (&receiver.kind, &index.kind) {
            (ShapeKind::Unknown, _) | (_, ShapeKind::Unknown) => Shape::unknown(span),
            (ShapeKind::Tuple(items), ShapeKind::Num(Some(n))) => match as_index(*n) {
                Some(i) if i < items.len() => items[i].clone(),
                _ => {
                    self.error(
                        format!("an index below {}", items.len()),
                        format!("index {}", number_to_string(*n)),
                        index.span,
                    );
                    Shape::unknown(span)
                }
            },
            (ShapeKind::Tuple(items), ShapeKind::Num(None)) => self.one_of(items.clone(), span),
            (ShapeKind::Array(element), ShapeKind::Num(_)) => (**element).clone(),
            (ShapeKind::Record(_), _) if index.as_known_str().is_some() => {
                let key = index.as_known_str().unwrap_or_default().to_string();
                self.member(receiver, &key, span)
            }
            (ShapeKind::Record(_), ShapeKind::Str(None)) => Shape::unknown(span),
            (_, ShapeKind::Num(n)) if receiver.is_stringish() => {
                let ch = receiver.as_known_str().zip(n.and_then(as_index)).and_then(|(s, i)| {
                    s.chars().nth(i).map(String::from)
                });
                Shape::new(ShapeKind::Str(ch), span)
            }
            _ => {
                self.error(
                    "an array indexed by a number or an object indexed by a string",
                    format!("{} indexed by {}", receiver.describe(), index.describe()),
                    span,
                );
                Shape::unknown(span)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Shape, span: Span) -> Shape {
        match op {
            UnaryOp::Not => Shape::new(ShapeKind::Bool(operand.truthiness().map(|t| !t)), span),
            UnaryOp::Neg => match &operand.kind {
                ShapeKind::Num(n) => Shape::new(ShapeKind::Num(n.map(|n| -n)), span),
                ShapeKind::Unknown => Shape::unknown(span),
                _ => {
                    self.error("a number", format!("{} after `-`", operand.describe()), operand.span);
                    Shape::unknown(span)
                }
            },
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> Shape {
        let lhs = self.eval(left);
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let short_circuit = if op == BinaryOp::And {
                    lhs.truthiness().map(|t| !t)
                } else {
                    lhs.truthiness()
                };
                match short_circuit {
                    Some(true) => lhs,
                    Some(false) => self.eval(right),
                    None => {
                        let rhs = self.eval(right);
                        self.one_of(vec![lhs, rhs], span)
                    }
                }
            }
            _ => {
                let rhs = self.eval(right);
                self.arithmetic(op, &lhs, &rhs, span)
            }
        }
    }

    fn arithmetic(&mut self, op: BinaryOp, lhs: &Shape, rhs: &Shape, span: Span) -> Shape {
        if matches!(lhs.kind, ShapeKind::Unknown) || matches!(rhs.kind, ShapeKind::Unknown) {
            return Shape::unknown(span);
        }
        if let ShapeKind::OneOf(branches) = &lhs.kind {
            let results = branches.iter().map(|b| self.arithmetic(op, b, rhs, span)).collect();
            return self.one_of(results, span);
        }
        if let ShapeKind::OneOf(branches) = &rhs.kind {
            let results = branches.iter().map(|b| self.arithmetic(op, lhs, b, span)).collect();
            return self.one_of(results, span);
        }

        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = static_equal(lhs, rhs);
                let value = if op == BinaryOp::Eq { equal } else { equal.map(|e| !e) };
                Shape::new(ShapeKind::Bool(value), span)
            }
            BinaryOp::Add if lhs.is_stringish() || rhs.is_stringish() => {
                match (self.stringify(lhs), self.stringify(rhs)) {
                    (Some(a), Some(b)) if lhs.scalar_type().is_some() && rhs.scalar_type().is_some() => {
                        let text = a.zip(b).map(|(a, b)| a + &b);
                        Shape::new(ShapeKind::Str(text), span)
                    }
                    _ => self.operator_error(op, lhs, rhs, span),
                }
            }
            BinaryOp::Lt | BinaryOp::Gt if lhs.is_stringish() && rhs.is_stringish() => {
                let value = lhs.as_known_str().zip(rhs.as_known_str()).map(|(a, b)| {
                    if op == BinaryOp::Lt { a < b } else { a > b }
                });
                Shape::new(ShapeKind::Bool(value), span)
            }
            _ => match (&lhs.kind, &rhs.kind) {
                (ShapeKind::Num(a), ShapeKind::Num(b)) => {
                    let pair = a.zip(*b);
                    match op {
                        BinaryOp::Lt => Shape::new(ShapeKind::Bool(pair.map(|(a, b)| a < b)), span),
                        BinaryOp::Gt => Shape::new(ShapeKind::Bool(pair.map(|(a, b)| a > b)), span),
                        _ => Shape::new(ShapeKind::Num(pair.map(|(a, b)| apply_numeric(op, a, b))), span),
                    }
                }
                _ => self.operator_error(op, lhs, rhs, span),
            },
        }
    }

    fn operator_error(&mut self, op: BinaryOp, lhs: &Shape, rhs: &Shape, span: Span) -> Shape {
        let expected = match op {
            BinaryOp::Add => "numbers or strings",
            BinaryOp::Lt | BinaryOp::Gt => "two numbers or two strings",
            _ => "numbers",
        };
        self.error(
            format!("{expected} around `{}`", op.as_str()),
            format!("{} and {}", lhs.describe(), rhs.describe()),
            span,
        );
        Shape::unknown(span)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call_expr(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Shape {
        if let ExprKind::Member { object, property } = &callee.kind {
            let receiver = self.eval(object);
            let args: Vec<Shape> = args.iter().map(|a| self.eval(a)).collect();
            return self.method(&receiver, &property.name, &args, span);
        }
        let function = self.eval(callee);
        let args: Vec<Shape> = args.iter().map(|a| self.eval(a)).collect();
        match &function.kind {
            ShapeKind::Function(f) => self.call(f, args, span),
            ShapeKind::Unknown => Shape::unknown(span),
            _ => {
                self.error("a function", format!("{} called as a function", function.describe()), callee.span);
                Shape::unknown(span)
            }
        }
    }

    fn call(&mut self, function: &Rc<FunctionShape>, args: Vec<Shape>, span: Span) -> Shape {
        self.calls += 1;
        if self.calls > MAX_CALLS {
            if self.calls == MAX_CALLS + 1 {
                self.error(
                    format!("at most {MAX_CALLS} function calls"),
                    "a program that calls more",
                    span,
                );
            }
            return Shape::unknown(span);
        }
        if self.call_depth >= self.max_call_depth {
            self.error(
                format!("calls nested at most {} deep", self.max_call_depth),
                "deeper recursion",
                span,
            );
            return Shape::unknown(span);
        }
        let mut frame = Frame::new();
        let mut args = args.into_iter();
        for param in &function.params {
            let arg = args.next().unwrap_or_else(|| Shape::new(ShapeKind::Undefined, span));
            frame.insert(param.name.clone(), arg);
        }

        let mut frames = function.captured.clone();
        frames.push(frame);
        let saved = std::mem::replace(&mut self.frames, frames);
        self.call_depth += 1;
        let result = self.eval(&function.body);
        self.call_depth -= 1;
        self.frames = saved;
        result
    }

    fn callback(&mut self, method: &str, args: &[Shape], span: Span) -> Option<Rc<FunctionShape>> {
        match args.first().map(|a| &a.kind) {
            Some(ShapeKind::Function(f)) => Some(Rc::clone(f)),
            Some(ShapeKind::Unknown) => None,
            other => {
                let found = match other {
                    Some(_) => args[0].describe(),
                    None => "no argument".to_string(),
                };
                self.error(format!("a function argument to `.{method}`"), found, span);
                None
            }
        }
    }

    fn method(&mut self, receiver: &Shape, name: &str, args: &[Shape], span: Span) -> Shape {
        match &receiver.kind {
            ShapeKind::Unknown => return Shape::unknown(span),
            ShapeKind::OneOf(branches) => {
                let results = branches.iter().map(|b| self.method(b, name, args, span)).collect();
                return self.one_of(results, span);
            }
            ShapeKind::Record(_) => {
                let property = self.member(receiver, name, span);
                return match &property.kind {
                    ShapeKind::Function(f) => self.call(f, args.to_vec(), span),
                    ShapeKind::Unknown => property,
                    _ => {
                        self.error(
                            "a function",
                            format!("{} called as a function", property.describe()),
                            span,
                        );
                        Shape::unknown(span)
                    }
                };
            }
            _ => {}
        }

        if let Some((elements, known)) = receiver.elements() {
            return match name {
                "map" | "filter" | "flatMap" => {
                    let Some(f) = self.callback(name, args, span) else {
                        return Shape::unknown(span);
                    };
                    self.iterate(name, &f, elements, known, span)
                }
                "concat" => {
                    let mut all = elements;
                    let mut known_length = known;
                    for arg in args {
                        match self.spread_elements(arg) {
                            Some((items, k)) => {
                                all.extend(items);
                                known_length &= k;
                            }
                            None => all.push(arg.clone()),
                        }
                    }
                    if known_length {
                        Shape::new(ShapeKind::Tuple(all), span)
                    } else {
                        Shape::new(ShapeKind::Array(Box::new(self.one_of(all, span))), span)
                    }
                }
                "join" => {
                    let separator = match args.first() {
                        None => Some(Some(",".to_string())),
                        Some(sep) if sep.is_stringish() => Some(sep.as_known_str().map(String::from)),
                        Some(sep) if matches!(sep.kind, ShapeKind::Unknown) => Some(None),
                        Some(other) => {
                            self.error("a string separator", other.describe(), other.span);
                            None
                        }
                    };
                    let mut parts = Some(Vec::new());
                    for element in &elements {
                        match self.stringify(element) {
                            Some(Some(part)) => {
                                if let Some(parts) = &mut parts {
                                    parts.push(part);
                                }
                            }
                            Some(None) => parts = None,
                            None => {
                                self.error(
                                    "array elements that are strings, numbers or booleans",
                                    format!("{} in `.join`", element.describe()),
                                    element.span,
                                );
                                parts = None;
                            }
                        }
                    }
                    let text = match (known, parts, separator) {
                        (true, Some(parts), Some(Some(sep))) => Some(parts.join(&sep)),
                        _ => None,
                    };
                    Shape::new(ShapeKind::Str(text), span)
                }
                _ => self.unknown_method(receiver, name, span),
            };
        }

        if receiver.is_stringish() {
            let text = receiver.as_known_str().map(String::from);
            return match name {
                "toUpperCase" => Shape::new(ShapeKind::Str(text.map(|s| s.to_uppercase())), span),
                "toLowerCase" => Shape::new(ShapeKind::Str(text.map(|s| s.to_lowercase())), span),
                "trim" => Shape::new(ShapeKind::Str(text.map(|s| s.trim().to_string())), span),
                "split" => match args.first() {
                    Some(sep) if sep.is_stringish() => match (text, sep.as_known_str()) {
                        (Some(text), Some(sep)) => {
                            let parts = split_string(&text, sep)
                                .into_iter()
                                .map(|p| Shape::new(ShapeKind::Str(Some(p)), span))
                                .collect();
                            Shape::new(ShapeKind::Tuple(parts), span)
                        }
                        _ => Shape::new(
                            ShapeKind::Array(Box::new(Shape::new(ShapeKind::Str(None), span))),
                            span,
                        ),
                    },
                    Some(other) => {
                        self.error("a string separator", other.describe(), other.span);
                        Shape::unknown(span)
                    }
                    None => Shape::new(
                        ShapeKind::Tuple(vec![Shape::new(ShapeKind::Str(text), span)]),
                        span,
                    ),
                },
                _ => self.unknown_method(receiver, name, span),
            };
        }

        self.unknown_method(receiver, name, span)
    }

    fn unknown_method(&mut self, receiver: &Shape, name: &str, span: Span) -> Shape {
        let expected = match name {
            "map" | "filter" | "flatMap" | "concat" | "join" => "an array",
            "split" | "toUpperCase" | "toLowerCase" | "trim" => "a string",
            _ => "a supported method (map, filter, flatMap, concat, join, split, toUpperCase, toLowerCase, trim)",
        };
        self.error(
            format!("{expected} for `.{name}`"),
            receiver.describe(),
            receiver.span,
        );
        Shape::unknown(span)
    }

    fn iterate(&mut self, name: &str, f: &Rc<FunctionShape>, elements: Vec<Shape>, known: bool, span: Span) -> Shape {
        let mut out = Vec::new();
        let mut known_length = known;
        for (i, element) in elements.into_iter().enumerate() {
            let index = if known {
                Shape::new(ShapeKind::Num(Some(len_as_f64(i))), span)
            } else {
                Shape::new(ShapeKind::Num(None), span)
            };
            let result = self.call(f, vec![element.clone(), index], span);
            match name {
                "map" => out.push(result),
                "filter" => match result.truthiness() {
                    Some(true) => out.push(element),
                    Some(false) => {}
                    None => {
                        out.push(element);
                        known_length = false;
                    }
                },
                _ => {
                    if matches!(result.kind, ShapeKind::Unknown) {
                        known_length = false;
                        continue;
                    }
                    match result.elements() {
                        Some((items, k)) => {
                            out.extend(items);
                            known_length &= k;
                        }
                        None => out.push(result),
                    }
                }
            }
        }
        if known_length {
            Shape::new(ShapeKind::Tuple(out), span)
        } else {
            Shape::new(ShapeKind::Array(Box::new(self.one_of(out, span))), span)
        }
    }
}

/// Leaves take the location of the identifier that names them
const fn is_leaf(shape: &Shape) -> bool {
    matches!(
        shape.kind,
        ShapeKind::Null | ShapeKind::Undefined | ShapeKind::Function(_)
    )
}

fn is_method(name: &str) -> bool {
    matches!(
        name,
        "map" | "filter" | "flatMap" | "concat" | "join" | "split" | "toUpperCase" | "toLowerCase" | "trim"
    )
}

#[allow(clippy::cast_precision_loss)]
const fn len_as_f64(len: usize) -> f64 {
    len as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_index(n: f64) -> Option<usize> {
    (n.fract() == 0.0 && n >= 0.0 && n < 4_294_967_295.0).then(|| n as usize)
}

/// `String.prototype.split` for a string separator
pub(crate) fn split_string(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator).map(String::from).collect()
    }
}

pub(crate) fn apply_numeric(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a + b,
    }
}

fn static_equal(lhs: &Shape, rhs: &Shape) -> Option<bool> {
    match (&lhs.kind, &rhs.kind) {
        (ShapeKind::Null, ShapeKind::Null) | (ShapeKind::Undefined, ShapeKind::Undefined) => Some(true),
        (ShapeKind::Null | ShapeKind::Undefined, _) | (_, ShapeKind::Null | ShapeKind::Undefined) => {
            Some(false)
        }
        _ => match (lhs.known_scalar(), rhs.known_scalar()) {
            (Some(a), Some(b)) => Some(a == b),
            _ => match (lhs.scalar_type(), rhs.scalar_type()) {
                (Some(a), Some(b)) if a != b => Some(false),
                _ => None,
            },
        },
    }
}

// ----------------------------------------------------------------------
// Structural matching
// ----------------------------------------------------------------------

struct Matcher<'a> {
    schema: &'a Schema,
    source: &'a str,
}

impl Matcher<'_> {
    fn mismatch(&self, expected: &str, shape: &Shape, path: &str, out: &mut Outcome) {
        out.errors.push(CheckError::new(path, expected, shape.describe(), shape.span, self.source));
    }

    /// Match `shape` against `ty`, collecting errors and variant decisions
    fn conform(&self, ty: &TypeRef, shape: &Shape, path: &str, siblings: &[(String, &RecordType)], out: &mut Outcome) {
        let label = ty.to_string();
        let resolved = self.schema.resolve(ty);
        self.conform_as(&label, resolved, shape, path, siblings, out);
    }

    fn conform_as(
        &self,
        label: &str,
        ty: &TypeRef,
        shape: &Shape,
        path: &str,
        siblings: &[(String, &RecordType)],
        out: &mut Outcome,
    ) {
        match &shape.kind {
            ShapeKind::Unknown => return,
            ShapeKind::OneOf(branches) => {
                for branch in branches {
                    self.conform_as(label, ty, branch, path, siblings, out);
                }
                return;
            }
            _ => {}
        }

        match ty {
            TypeRef::Named(_) => self.conform(ty, shape, path, siblings, out),
            TypeRef::Scalar(scalar) => {
                if shape.scalar_type() != Some(*scalar) {
                    self.mismatch(label, shape, path, out);
                }
            }
            TypeRef::Literal(literal) => match shape.known_scalar() {
                Some(value) if literal.admits(&value) => {}
                None if shape.scalar_type().is_some() => {
                    let found = format!("{} (value not known statically)", shape.describe());
                    out.errors.push(CheckError::new(path, label, found, shape.span, self.source));
                }
                _ => self.mismatch(label, shape, path, out),
            },
            TypeRef::Record(record) => self.conform_record(label, record, shape, path, siblings, out),
            TypeRef::Map(map) => {
                if let ShapeKind::Record(fields) = &shape.kind {
                    for (key, field) in fields {
                        self.conform(&map.value, &field.shape, &path::field(path, key), &[], out);
                    }
                } else {
                    self.mismatch(label, shape, path, out);
                }
            }
            TypeRef::Sequence(sequence) => match &shape.kind {
                ShapeKind::Tuple(items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.conform(&sequence.element, item, &path::index(path, i), &[], out);
                    }
                }
                ShapeKind::Array(element) => {
                    self.conform(&sequence.element, element, &path::any_index(path), &[], out);
                }
                _ if sequence.accepts_single => {
                    self.conform(&sequence.element, shape, path, &[], out);
                }
                _ => self.mismatch(label, shape, path, out),
            },
            TypeRef::Variant(_) => self.conform_variant(label, ty, shape, path, out),
        }
    }

    fn conform_record(
        &self,
        label: &str,
        record: &RecordType,
        shape: &Shape,
        path: &str,
        siblings: &[(String, &RecordType)],
        out: &mut Outcome,
    ) {
        let ShapeKind::Record(fields) = &shape.kind else {
            self.mismatch(label, shape, path, out);
            return;
        };

        for spec in record.required_fields() {
            if !fields.contains_key(&spec.name) {
                out.errors.push(CheckError::new(
                    path::field(path, &spec.name),
                    spec.ty.to_string(),
                    format!("nothing; required field `{}` is missing", spec.name),
                    shape.span,
                    self.source,
                ));
            }
        }

        for (key, field) in fields {
            let field_path = path::field(path, key);
            if let Some(spec) = record.field(key) {
                self.conform(&spec.ty, &field.shape, &field_path, &[], out);
                continue;
            }
            let err = CheckError::new(
                field_path,
                label,
                format!("undeclared field `{key}`"),
                field.key_span,
                self.source,
            );
            let note = match siblings.iter().find(|(_, sibling)| sibling.declares(key)) {
                Some((sibling, _)) => format!(
                    "`{key}` is declared by `{sibling}`, another alternative; this object was matched against `{label}`"
                ),
                None => {
                    let declared: Vec<&str> = record.fields.iter().map(|f| f.name.as_str()).collect();
                    format!("`{label}` declares: {}", declared.join(", "))
                }
            };
            out.errors.push(err.with_note(note));
        }
    }

    fn conform_variant(&self, label: &str, ty: &TypeRef, shape: &Shape, path: &str, out: &mut Outcome) {
        let alternatives = self.schema.flatten_alternatives(ty);
        let resolve = |alternative: &str, out: &mut Outcome| {
            out.resolutions.push(Resolution {
                path: path.to_string(),
                variant: label.to_string(),
                alternative: alternative.to_string(),
            });
        };

        match &shape.kind {
            ShapeKind::Record(fields) => {
                let records: Vec<(String, &RecordType)> = alternatives
                    .iter()
                    .filter_map(|(name, alt)| match alt {
                        TypeRef::Record(record) => Some((name.clone(), record)),
                        _ => None,
                    })
                    .collect();

                let chosen = alternatives.iter().find(|(_, alt)| match alt {
                    TypeRef::Map(_) => true,
                    TypeRef::Record(record) => {
                        record.required_fields().all(|f| fields.contains_key(&f.name))
                            && fields.keys().all(|k| record.declares(k))
                    }
                    _ => false,
                });

                if let Some((name, alt)) = chosen {
                    resolve(name, out);
                    let siblings: Vec<_> = records.iter().filter(|(n, _)| n != name).cloned().collect();
                    self.conform_as(name, alt, shape, path, &siblings, out);
                    return;
                }

                let mut best: Option<&(String, &RecordType)> = None;
                let mut best_score = 0;
                for candidate in &records {
                    let score = fields.keys().filter(|k| candidate.1.declares(k)).count();
                    if best.is_none() || score > best_score {
                        best = Some(candidate);
                        best_score = score;
                    }
                }
                match best {
                    Some((name, record)) => {
                        let siblings: Vec<_> = records.iter().filter(|(n, _)| n != name).cloned().collect();
                        self.conform_record(name, record, shape, path, &siblings, out);
                    }
                    None => self.mismatch(label, shape, path, out),
                }
            }
            ShapeKind::Tuple(_) | ShapeKind::Array(_) => {
                match alternatives.iter().find(|(_, alt)| matches!(alt, TypeRef::Sequence(_))) {
                    Some((name, alt)) => {
                        resolve(name, out);
                        self.conform_as(name, alt, shape, path, &[], out);
                    }
                    None => self.mismatch(label, shape, path, out),
                }
            }
            ShapeKind::Null | ShapeKind::Undefined | ShapeKind::Function(_) => {
                self.mismatch(label, shape, path, out);
            }
            _ => {
                for (name, alt) in &alternatives {
                    let mut trial = Outcome::default();
                    self.conform_as(name, alt, shape, path, &[], &mut trial);
                    if trial.errors.is_empty() {
                        resolve(name, out);
                        out.resolutions.extend(trial.resolutions);
                        return;
                    }
                }
                self.mismatch(label, shape, path, out);
            }
        }
    }
}
