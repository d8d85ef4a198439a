//! Evaluation of checked programs
//!
//! The evaluator runs a [`CheckedProgram`] to completion and converts the
//! final value of the root binding into a [`Value`] tree. Constants from the
//! schema evaluate to [`Sentinel`]s so emitters can tell them apart from
//! plain literals.

use crate::ast::{
    ArrayItem, BinaryOp, DeclKind, Expr, ExprKind, Ident, ObjectItem, Stmt, TemplateSegment,
    UnaryOp,
};
use crate::checker::{CheckedProgram, apply_numeric, split_string};
use crate::error::EvalError;
use crate::shape::{number_to_string, scalar_to_string, scalar_truthiness};
use indexmap::IndexMap;
use pipetype_core::{Limits, Scalar, Sentinel, Span, UnserializableValueError, Value, path};
use std::collections::HashMap;
use std::rc::Rc;

type Result<T> = std::result::Result<T, EvalError>;

type Env = HashMap<String, Rt>;

/// A runtime value
#[derive(Debug, Clone)]
enum Rt {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Undefined,
    Sentinel(Sentinel),
    Array(Vec<Rt>),
    Object(IndexMap<String, Rt>),
    Function(Rc<Closure>),
}

#[derive(Debug)]
struct Closure {
    params: Vec<Ident>,
    body: Expr,
    captured: Vec<Env>,
}

impl Rt {
    fn scalar(&self) -> Option<Scalar> {
        match self {
            Self::Str(s) => Some(Scalar::String(s.clone())),
            Self::Num(n) => Some(Scalar::Number(*n)),
            Self::Bool(b) => Some(Scalar::Bool(*b)),
            Self::Sentinel(sentinel) => Some(sentinel.literal.clone()),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s)
            | Self::Sentinel(Sentinel {
                literal: Scalar::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n)
            | Self::Sentinel(Sentinel {
                literal: Scalar::Number(n),
                ..
            }) => Some(*n),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Null | Self::Undefined => false,
            Self::Array(_) | Self::Object(_) | Self::Function(_) => true,
            _ => self.scalar().is_some_and(|s| scalar_truthiness(&s)),
        }
    }

    const fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Num(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Sentinel(_) => "constant",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }
}

/// Evaluate a checked program with default limits, returning the value of
/// the root binding
///
/// # Errors
///
/// Returns [`EvalError::Unserializable`] if the root value holds something
/// that has no YAML form, and [`EvalError::Runtime`] if an operation fails.
pub fn evaluate(checked: &CheckedProgram<'_>) -> Result<Value> {
    evaluate_with_limits(checked, &Limits::default())
}

/// Evaluate a checked program; `limits.max_depth` bounds nested calls
///
/// # Errors
///
/// See [`evaluate`].
pub fn evaluate_with_limits(checked: &CheckedProgram<'_>, limits: &Limits) -> Result<Value> {
    let program = checked.program();
    let schema = checked.schema();
    let root = schema.root();

    let mut interpreter = Interpreter {
        source_name: &program.source_name,
        source: &program.source,
        root: &root.name,
        globals: IndexMap::new(),
        frames: Vec::new(),
        depth: 0,
        max_depth: limits.max_depth,
    };
    for constant in schema.constants() {
        interpreter.globals.insert(
            constant.name.clone(),
            Rt::Sentinel(Sentinel {
                name: constant.name.clone(),
                literal: constant.value.clone(),
            }),
        );
    }
    interpreter.globals.insert(root.name.clone(), Rt::Undefined);

    for statement in &program.statements {
        interpreter.statement(statement)?;
    }

    let result = interpreter.globals.swap_remove(&root.name).unwrap_or(Rt::Undefined);
    let value = to_value(result, &root.name)?;
    tracing::debug!(source = %program.source_name, root = %root.name, "Evaluated program");
    Ok(value)
}

fn to_value(rt: Rt, at: &str) -> std::result::Result<Value, UnserializableValueError> {
    match rt {
        Rt::Str(s) => Ok(Value::Scalar(Scalar::String(s))),
        Rt::Num(n) => Ok(Value::Scalar(Scalar::Number(n))),
        Rt::Bool(b) => Ok(Value::Scalar(Scalar::Bool(b))),
        Rt::Sentinel(sentinel) => Ok(Value::Sentinel(sentinel)),
        Rt::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| to_value(item, &path::index(at, i)))
            .collect::<std::result::Result<_, _>>()
            .map(Value::Sequence),
        Rt::Object(fields) => fields
            .into_iter()
            .map(|(key, field)| {
                let value = to_value(field, &path::field(at, &key))?;
                Ok((key, value))
            })
            .collect::<std::result::Result<_, _>>()
            .map(Value::Record),
        other @ (Rt::Null | Rt::Undefined | Rt::Function(_)) => {
            Err(UnserializableValueError::new(at, other.type_name()))
        }
    }
}

struct Interpreter<'a> {
    source_name: &'a str,
    source: &'a str,
    root: &'a str,
    globals: IndexMap<String, Rt>,
    frames: Vec<Env>,
    depth: usize,
    max_depth: usize,
}

impl Interpreter<'_> {
    fn fail(&self, message: impl Into<String>, span: Span) -> EvalError {
        EvalError::runtime(message, self.source_name, self.source, span)
    }

    fn statement(&mut self, statement: &Stmt) -> Result<()> {
        match statement {
            Stmt::Declare {
                kind, name, init, ..
            } => {
                let value = match init {
                    Some(init) => self.eval(init)?,
                    None if name.name == self.root => return Ok(()),
                    None => Rt::Undefined,
                };
                if name.name == self.root && *kind != DeclKind::Var {
                    return Err(self.fail(format!("`{}` cannot be redeclared", name.name), name.span));
                }
                self.globals.insert(name.name.clone(), value);
            }
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value)?;
                match self.globals.get_mut(&target.name) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(self.fail(format!("`{}` is not declared", target.name), target.span));
                    }
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&Rt> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.globals.get(name))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Rt> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Str(s) => Rt::Str(s.clone()),
            ExprKind::Number(n) => Rt::Num(*n),
            ExprKind::Bool(b) => Rt::Bool(*b),
            ExprKind::Null => Rt::Null,
            ExprKind::Undefined => Rt::Undefined,
            ExprKind::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Text(part) => text.push_str(part),
                        TemplateSegment::Expr(expr) => {
                            let value = self.eval(expr)?;
                            text.push_str(&self.stringify(&value, expr.span)?);
                        }
                    }
                }
                Rt::Str(text)
            }
            ExprKind::Ident(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| self.fail(format!("`{name}` is not defined"), span))?,
            ExprKind::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(expr) => out.push(self.eval(expr)?),
                        ArrayItem::Spread(expr) => match self.eval(expr)? {
                            Rt::Array(items) => out.extend(items),
                            other => {
                                return Err(self.fail(format!("cannot spread {} into an array", other.type_name()), expr.span));
                            }
                        },
                    }
                }
                Rt::Array(out)
            }
            ExprKind::Object(items) => {
                let mut out = IndexMap::new();
                for item in items {
                    match item {
                        ObjectItem::Field { key, value, .. } => {
                            let value = self.eval(value)?;
                            out.insert(key.clone(), value);
                        }
                        ObjectItem::Spread(expr) => match self.eval(expr)? {
                            Rt::Object(fields) => out.extend(fields),
                            Rt::Null | Rt::Undefined => {}
                            other => {
                                return Err(self.fail(format!("cannot spread {} into an object", other.type_name()), expr.span));
                            }
                        },
                    }
                }
                Rt::Object(out)
            }
            ExprKind::Member { object, property } => {
                let receiver = self.eval(object)?;
                self.member(receiver, &property.name, span)?
            }
            ExprKind::Index { object, index } => {
                let receiver = self.eval(object)?;
                let index = self.eval(index)?;
                self.index(receiver, &index, span)?
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Member { object, property } = &callee.kind {
                    let receiver = self.eval(object)?;
                    let args = self.eval_all(args)?;
                    self.method(receiver, &property.name, args, span)?
                } else {
                    let function = self.eval(callee)?;
                    let args = self.eval_all(args)?;
                    match function {
                        Rt::Function(f) => self.call(&f, args, span)?,
                        other => return Err(self.fail(format!("{} is not a function", other.type_name()), callee.span)),
                    }
                }
            }
            ExprKind::Arrow { params, body } => Rt::Function(Rc::new(Closure {
                params: params.clone(),
                body: (**body).clone(),
                captured: self.frames.clone(),
            })),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Rt::Bool(!value.truthy()),
                    UnaryOp::Neg => match value.as_num() {
                        Some(n) => Rt::Num(-n),
                        None => return Err(self.fail(format!("cannot negate {}", value.type_name()), span)),
                    },
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lhs = self.eval(left)?;
                match op {
                    BinaryOp::And if !lhs.truthy() => lhs,
                    BinaryOp::Or if lhs.truthy() => lhs,
                    BinaryOp::And | BinaryOp::Or => self.eval(right)?,
                    _ => {
                        let rhs = self.eval(right)?;
                        self.binary(*op, &lhs, &rhs, span)?
                    }
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)?
                } else {
                    self.eval(alternate)?
                }
            }
        })
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Rt>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn stringify(&self, value: &Rt, span: Span) -> Result<String> {
        value
            .scalar()
            .map(|s| scalar_to_string(&s))
            .ok_or_else(|| self.fail(format!("cannot convert {} to a string", value.type_name()), span))
    }

    fn member(&self, receiver: Rt, property: &str, span: Span) -> Result<Rt> {
        match receiver {
            Rt::Object(mut fields) => fields
                .swap_remove(property)
                .ok_or_else(|| self.fail(format!("object has no property `{property}`"), span)),
            Rt::Array(items) if property == "length" => Ok(Rt::Num(len_as_f64(items.len()))),
            ref other if property == "length" && other.as_str().is_some() => {
                let length = other.as_str().map_or(0, |s| s.encode_utf16().count());
                Ok(Rt::Num(len_as_f64(length)))
            }
            other => Err(self.fail(
                format!("cannot read `{property}` of {}", other.type_name()),
                span,
            )),
        }
    }

    fn index(&self, receiver: Rt, index: &Rt, span: Span) -> Result<Rt> {
        match (receiver, index) {
            (Rt::Array(mut items), index) => {
                let i = index.as_num().and_then(as_index).filter(|i| *i < items.len());
                match i {
                    Some(i) => Ok(items.swap_remove(i)),
                    None => Err(self.fail("array index out of bounds", span)),
                }
            }
            (receiver @ Rt::Object(_), key) if key.as_str().is_some() => {
                let key = key.as_str().unwrap_or_default().to_string();
                self.member(receiver, &key, span)
            }
            (receiver, index) if receiver.as_str().is_some() => {
                let ch = receiver
                    .as_str()
                    .zip(index.as_num().and_then(as_index))
                    .and_then(|(s, i)| s.chars().nth(i));
                ch.map(|c| Rt::Str(c.to_string()))
                    .ok_or_else(|| self.fail("string index out of bounds", span))
            }
            (receiver, index) => Err(self.fail(
                format!("cannot index {} with {}", receiver.type_name(), index.type_name()),
                span,
            )),
        }
    }

    fn call(&mut self, function: &Closure, args: Vec<Rt>, span: Span) -> Result<Rt> {
        if self.depth >= self.max_depth {
            return Err(self.fail(format!("calls nested more than {} deep", self.max_depth), span));
        }
        let mut frame = Env::new();
        let mut args = args.into_iter();
        for param in &function.params {
            frame.insert(param.name.clone(), args.next().unwrap_or(Rt::Undefined));
        }
        let mut frames = function.captured.clone();
        frames.push(frame);
        let saved = std::mem::replace(&mut self.frames, frames);
        self.depth += 1;
        let result = self.eval(&function.body);
        self.depth -= 1;
        self.frames = saved;
        result
    }

    fn callback(&self, method: &str, args: &[Rt], span: Span) -> Result<Rc<Closure>> {
        match args.first() {
            Some(Rt::Function(f)) => Ok(Rc::clone(f)),
            _ => Err(self.fail(format!("`.{method}` expects a function"), span)),
        }
    }

    fn method(&mut self, receiver: Rt, name: &str, args: Vec<Rt>, span: Span) -> Result<Rt> {
        match receiver {
            Rt::Array(items) => match name {
                "map" | "filter" | "flatMap" => {
                    let f = self.callback(name, &args, span)?;
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        let result = self.call(&f, vec![item.clone(), Rt::Num(len_as_f64(i))], span)?;
                        match name {
                            "map" => out.push(result),
                            "filter" => {
                                if result.truthy() {
                                    out.push(item);
                                }
                            }
                            _ => match result {
                                Rt::Array(inner) => out.extend(inner),
                                other => out.push(other),
                            },
                        }
                    }
                    Ok(Rt::Array(out))
                }
                "concat" => {
                    let mut out = items;
                    for arg in args {
                        match arg {
                            Rt::Array(more) => out.extend(more),
                            other => out.push(other),
                        }
                    }
                    Ok(Rt::Array(out))
                }
                "join" => {
                    let separator = match args.first() {
                        None => ",".to_string(),
                        Some(sep) => sep
                            .as_str()
                            .map(String::from)
                            .ok_or_else(|| self.fail("`.join` expects a string separator", span))?,
                    };
                    let parts = items
                        .iter()
                        .map(|item| self.stringify(item, span))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Rt::Str(parts.join(&separator)))
                }
                _ => Err(self.fail(format!("`.{name}` is not available on array"), span)),
            },
            Rt::Object(fields) => match fields.get(name) {
                Some(Rt::Function(f)) => {
                    let f = Rc::clone(f);
                    self.call(&f, args, span)
                }
                Some(other) => Err(self.fail(format!("`{name}` is a {}, not a function", other.type_name()), span)),
                None => Err(self.fail(format!("object has no method `{name}`"), span)),
            },
            ref text if text.as_str().is_some() => {
                let text = text.as_str().unwrap_or_default();
                match name {
                    "toUpperCase" => Ok(Rt::Str(text.to_uppercase())),
                    "toLowerCase" => Ok(Rt::Str(text.to_lowercase())),
                    "trim" => Ok(Rt::Str(text.trim().to_string())),
                    "split" => match args.first() {
                        None => Ok(Rt::Array(vec![Rt::Str(text.to_string())])),
                        Some(sep) => {
                            let sep = sep
                                .as_str()
                                .ok_or_else(|| self.fail("`.split` expects a string separator", span))?;
                            Ok(Rt::Array(split_string(text, sep).into_iter().map(Rt::Str).collect()))
                        }
                    },
                    _ => Err(self.fail(format!("`.{name}` is not available on string"), span)),
                }
            }
            other => Err(self.fail(
                format!("`.{name}` is not available on {}", other.type_name()),
                span,
            )),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Rt, rhs: &Rt, span: Span) -> Result<Rt> {
        match op {
            BinaryOp::Eq => Ok(Rt::Bool(strict_equal(lhs, rhs))),
            BinaryOp::Ne => Ok(Rt::Bool(!strict_equal(lhs, rhs))),
            BinaryOp::Add if lhs.as_str().is_some() || rhs.as_str().is_some() => {
                let a = self.stringify(lhs, span)?;
                let b = self.stringify(rhs, span)?;
                Ok(Rt::Str(a + &b))
            }
            BinaryOp::Lt | BinaryOp::Gt if lhs.as_str().is_some() && rhs.as_str().is_some() => {
                let (a, b) = (lhs.as_str().unwrap_or_default(), rhs.as_str().unwrap_or_default());
                Ok(Rt::Bool(if op == BinaryOp::Lt { a < b } else { a > b }))
            }
            _ => match (lhs.as_num(), rhs.as_num()) {
                (Some(a), Some(b)) => Ok(match op {
                    BinaryOp::Lt => Rt::Bool(a < b),
                    BinaryOp::Gt => Rt::Bool(a > b),
                    _ => Rt::Num(apply_numeric(op, a, b)),
                }),
                _ => Err(self.fail(
                    format!(
                        "cannot apply `{}` to {} and {}",
                        op.as_str(),
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                    span,
                )),
            },
        }
    }
}

fn strict_equal(lhs: &Rt, rhs: &Rt) -> bool {
    match (lhs, rhs) {
        (Rt::Null, Rt::Null) | (Rt::Undefined, Rt::Undefined) => true,
        _ => match (lhs.scalar(), rhs.scalar()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

#[allow(clippy::cast_precision_loss)]
const fn len_as_f64(len: usize) -> f64 {
    len as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_index(n: f64) -> Option<usize> {
    (n.fract() == 0.0 && n >= 0.0 && n < 4_294_967_295.0).then(|| n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::check;
    use crate::parser::parse_program;
    use pipetype_schema::load;

    const SCHEMA: &str = r#"
interface Step {
  command: string | string[];
  label?: string;
  parallelism?: number;
  env?: { [name: string]: string };
}
declare const wait = "wait";
type AnyStep = Step | "wait";
declare var steps: AnyStep[];
"#;

    fn eval(source: &str) -> Result<Value> {
        let schema = load(SCHEMA).unwrap();
        let program = parse_program("pipeline.ts", source).unwrap();
        let checked = check(&schema, program).unwrap();
        evaluate(&checked)
    }

    fn labels(value: &Value) -> Vec<String> {
        let Value::Sequence(steps) = value else {
            panic!("expected a sequence");
        };
        steps
            .iter()
            .filter_map(|s| match s.get("label")?.as_scalar()? {
                Scalar::String(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sentinel_survives_evaluation() {
        let value = eval(r#"steps = [{ command: "a" }, wait, "wait"]"#).unwrap();
        let Value::Sequence(steps) = value else {
            panic!("expected a sequence");
        };
        assert!(steps[1].is_sentinel());
        assert!(!steps[2].is_sentinel());
    }

    #[test]
    fn test_map_with_template() {
        let value = eval(
            r#"
const fixtures = ["java", "swift"];
steps = fixtures.map(fixture => ({
  command: `FIXTURE=${fixture} .buildkite/build-pr.sh`,
  label: fixture
}));
"#,
        )
        .unwrap();
        assert_eq!(labels(&value), vec!["java", "swift"]);
        let command = value_at(&value, 0, "command");
        assert_eq!(command, "FIXTURE=java .buildkite/build-pr.sh");
    }

    fn value_at(value: &Value, i: usize, key: &str) -> String {
        let Value::Sequence(steps) = value else {
            panic!("expected a sequence");
        };
        match steps[i].get(key).and_then(Value::as_scalar) {
            Some(Scalar::String(s)) => s.clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_spread_override_keeps_key_position() {
        let value = eval(
            r#"
const base = { command: "a", label: "base" };
steps = [{ ...base, command: "b" }];
"#,
        )
        .unwrap();
        let Value::Sequence(steps) = &value else {
            panic!("expected a sequence");
        };
        let Value::Record(fields) = &steps[0] else {
            panic!("expected a record");
        };
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["command", "label"]);
        assert_eq!(value_at(&value, 0, "command"), "b");
    }

    #[test]
    fn test_operators_and_methods() {
        let value = eval(
            r#"
const names = ["Lint", "skip", "Test"];
const n = 2 * 3 - 1;
steps = names
  .filter((name, i) => name !== "skip" && i < 3)
  .map(name => ({ command: ["make", name.toLowerCase()].join(" "), label: name + " x" + n }));
"#,
        )
        .unwrap();
        assert_eq!(labels(&value), vec!["Lint x5", "Test x5"]);
        assert_eq!(value_at(&value, 1, "command"), "make test");
    }

    #[test]
    fn test_last_assignment_wins() {
        let value = eval("steps = [wait]\nsteps = [{ command: \"x\", label: \"second\" }]").unwrap();
        assert_eq!(labels(&value), vec!["second"]);
    }

    #[test]
    fn test_number_results_keep_their_value() {
        let value = eval("steps = [{ command: \"x\", parallelism: 10 / 4 }]").unwrap();
        let Value::Sequence(steps) = value else {
            panic!("expected a sequence");
        };
        assert_eq!(
            steps[0].get("parallelism").and_then(Value::as_scalar),
            Some(&Scalar::Number(2.5))
        );
    }

    #[test]
    fn test_number_to_string_in_templates() {
        let value = eval("steps = [{ command: `run ${1 / 2} ${3}` }]").unwrap();
        assert_eq!(value_at(&value, 0, "command"), "run 0.5 3");
        assert_eq!(number_to_string(-0.0), "0");

        let value = eval("steps = [{ command: `sleep ${1e21}` }]").unwrap();
        assert_eq!(value_at(&value, 0, "command"), "sleep 1e21");
    }

    #[test]
    fn test_unserializable_values_are_reported_with_path() {
        let err = to_value(
            Rt::Array(vec![Rt::Object(IndexMap::from([(
                "command".to_string(),
                Rt::Null,
            )]))]),
            "steps",
        )
        .unwrap_err();
        assert_eq!(err.path, "steps[0].command");
        assert_eq!(err.reason, "null");
    }
}
