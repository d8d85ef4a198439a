//! Parser for configuration programs
//!
//! Programs are straight-line TypeScript-style scripts:
//!
//! ```text
//! import "./yaml/buildkite";
//!
//! const fixtures = ["java", "swift"];
//! steps = fixtures.map(fixture => ({
//!   command: `FIXTURE=${fixture} ./build.sh`,
//!   label: fixture,
//! }));
//! ```
//!
//! Statements end with `;` or a line break.

use crate::ast::{
    ArrayItem, BinaryOp, DeclKind, Expr, ExprKind, Ident, Import, ObjectItem, Program, Stmt,
    TemplateSegment, UnaryOp,
};
use crate::error::ProgramParseError;
use crate::shape::number_to_string;
use pipetype_core::limits::validate_source;
use pipetype_core::{Cursor, Limits, Punct, Span, Spanned, TemplatePart, Token, tokenize_with_depth};

/// Result type for program parsing
pub type Result<T> = std::result::Result<T, ProgramParseError>;

/// Parse a program with default limits
///
/// # Errors
///
/// Returns [`ProgramParseError`] for malformed programs.
pub fn parse_program(source_name: &str, source: &str) -> Result<Program> {
    parse_program_with_limits(source_name, source, &Limits::default())
}

/// Parse a program, enforcing `limits`
///
/// # Errors
///
/// Returns [`ProgramParseError`] for malformed programs, oversized sources
/// and expressions nested deeper than `limits.max_depth`.
pub fn parse_program_with_limits(source_name: &str, source: &str, limits: &Limits) -> Result<Program> {
    validate_source(source, limits).map_err(|e| {
        ProgramParseError::new(e.to_string(), source_name, source, Span::point(0))
    })?;
    let tokens = tokenize_with_depth(source, limits.max_depth)
        .map_err(|e| ProgramParseError::new(e.message, source_name, source, e.span))?;

    let mut parser = Parser {
        cursor: Cursor::new(tokens),
        source_name,
        source,
        max_depth: limits.max_depth,
        depth: 0,
    };

    let mut imports = Vec::new();
    let mut statements = Vec::new();
    loop {
        while parser.cursor.eat_punct(Punct::Semi) {}
        if parser.cursor.at_eof() {
            break;
        }
        if parser.cursor.at_ident("import") {
            let import = parser.parse_import()?;
            tracing::debug!(path = %import.path, "Recorded program import");
            imports.push(import);
        } else {
            statements.push(parser.parse_statement()?);
        }
    }

    tracing::debug!(
        source = source_name,
        statements = statements.len(),
        imports = imports.len(),
        "Parsed program"
    );
    Ok(Program {
        source_name: source_name.to_string(),
        source: source.to_string(),
        imports,
        statements,
    })
}

const RESERVED: &[&str] = &[
    "const", "let", "var", "import", "export", "return", "function", "if", "else", "for",
    "while", "new", "this", "class", "true", "false", "null", "undefined",
];

struct Parser<'s> {
    cursor: Cursor,
    source_name: &'s str,
    source: &'s str,
    max_depth: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>, span: Span) -> ProgramParseError {
        ProgramParseError::new(message, self.source_name, self.source, span)
    }

    fn unexpected(&self, expected: &str) -> ProgramParseError {
        let next = self.cursor.peek();
        self.error(format!("expected {expected}, found {}", next.token), next.span)
    }

    fn expect(&mut self, punct: Punct) -> Result<Span> {
        if self.cursor.eat_punct(punct) {
            Ok(self.cursor.prev_span())
        } else {
            Err(self.unexpected(&format!("`{}`", punct.as_str())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Ident> {
        let next = self.cursor.peek().clone();
        match next.token {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.cursor.bump();
                Ok(Ident {
                    name,
                    span: next.span,
                })
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// A statement ends at `;`, a line break, `}` or the end of input
    fn end_statement(&mut self) -> Result<()> {
        if self.cursor.eat_punct(Punct::Semi)
            || self.cursor.at_eof()
            || self.cursor.peek().newline_before
        {
            Ok(())
        } else {
            Err(self
                .unexpected("`;` or a line break")
                .with_help("Put each statement on its own line or end it with `;`"))
        }
    }

    fn parse_import(&mut self) -> Result<Import> {
        let start = self.cursor.bump().span;
        let next = self.cursor.bump();
        let Token::Str(path) = next.token else {
            return Err(self
                .error(format!("expected module path, found {}", next.token), next.span)
                .with_help("Only side-effect imports such as `import \"./yaml/buildkite\";` are supported"));
        };
        let span = start.to(next.span);
        self.end_statement()?;
        Ok(Import { path, span })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let start = self.cursor.peek().span;
        let kind = if self.cursor.eat_ident("const") {
            Some(DeclKind::Const)
        } else if self.cursor.eat_ident("let") {
            Some(DeclKind::Let)
        } else if self.cursor.eat_ident("var") {
            Some(DeclKind::Var)
        } else {
            None
        };

        if let Some(kind) = kind {
            let name = self.expect_ident("a binding name")?;
            let init = if self.cursor.eat_punct(Punct::Assign) {
                Some(self.parse_expression()?)
            } else if kind == DeclKind::Const {
                return Err(self
                    .unexpected("`=`")
                    .with_help("`const` declarations must be initialized"));
            } else {
                None
            };
            let span = start.to(self.cursor.prev_span());
            self.end_statement()?;
            return Ok(Stmt::Declare {
                kind,
                name,
                init,
                span,
            });
        }

        let expr = self.parse_expression()?;
        if self.cursor.at_punct(Punct::Assign) {
            let ExprKind::Ident(name) = &expr.kind else {
                return Err(self
                    .error("invalid assignment target", expr.span)
                    .with_help("Only plain variables can be assigned; build a new object instead"));
            };
            let target = Ident {
                name: name.clone(),
                span: expr.span,
            };
            self.cursor.bump();
            let value = self.parse_expression()?;
            let span = start.to(self.cursor.prev_span());
            self.end_statement()?;
            return Ok(Stmt::Assign {
                target,
                value,
                span,
            });
        }
        self.end_statement()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > self.max_depth {
            let span = self.cursor.peek().span;
            return Err(self.error(
                format!("expression nesting exceeds maximum depth of {}", self.max_depth),
                span,
            ));
        }
        let result = if self.at_arrow() {
            self.parse_arrow()
        } else {
            self.parse_conditional()
        };
        self.depth -= 1;
        result
    }

    /// Whether the upcoming tokens start an arrow function
    fn at_arrow(&self) -> bool {
        if matches!(self.cursor.peek().token, Token::Ident(_)) {
            return self.cursor.nth_is_punct(1, Punct::Arrow);
        }
        if !self.cursor.at_punct(Punct::LParen) {
            return false;
        }
        let mut n = 1;
        if self.cursor.nth_is_punct(n, Punct::RParen) {
            return self.cursor.nth_is_punct(n + 1, Punct::Arrow);
        }
        loop {
            if !matches!(self.cursor.peek_nth(n).token, Token::Ident(_)) {
                return false;
            }
            n += 1;
            if self.cursor.nth_is_punct(n, Punct::Comma) {
                n += 1;
            } else if self.cursor.nth_is_punct(n, Punct::RParen) {
                return self.cursor.nth_is_punct(n + 1, Punct::Arrow);
            } else {
                return false;
            }
        }
    }

    fn parse_arrow(&mut self) -> Result<Expr> {
        let start = self.cursor.peek().span;
        let mut params = Vec::new();
        if self.cursor.eat_punct(Punct::LParen) {
            while !self.cursor.eat_punct(Punct::RParen) {
                params.push(self.expect_ident("a parameter name")?);
                self.cursor.eat_punct(Punct::Comma);
            }
        } else {
            params.push(self.expect_ident("a parameter name")?);
        }
        for (i, param) in params.iter().enumerate() {
            if params[..i].iter().any(|p| p.name == param.name) {
                return Err(self.error(format!("duplicate parameter `{}`", param.name), param.span));
            }
        }
        self.expect(Punct::Arrow)?;

        let body = if self.cursor.at_punct(Punct::LBrace) {
            let open = self.cursor.bump().span;
            if !self.cursor.eat_ident("return") {
                return Err(self
                    .unexpected("`return`")
                    .with_help("Block bodies may only contain `return <expression>`; wrap object results in parentheses: `x => ({ ... })`"));
            }
            let value = self.parse_expression()?;
            self.cursor.eat_punct(Punct::Semi);
            if !self.cursor.eat_punct(Punct::RBrace) {
                return Err(self.error("unclosed arrow function body", open));
            }
            value
        } else {
            self.parse_expression()?
        };

        let span = start.to(self.cursor.prev_span());
        Ok(Expr::new(
            ExprKind::Arrow {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(0)?;
        if !self.cursor.eat_punct(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.parse_expression()?;
        self.expect(Punct::Colon)?;
        let alternate = self.parse_expression()?;
        let span = test.span.to(alternate.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// Precedence climbing over the binary operators
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.peek_binary_op() {
            if precedence < min_precedence {
                break;
            }
            self.cursor.bump();
            let right = self.parse_binary_operand(precedence + 1)?;
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_binary_operand(&mut self, min_precedence: u8) -> Result<Expr> {
        self.depth += 1;
        if self.depth > self.max_depth {
            let span = self.cursor.peek().span;
            return Err(self.error(
                format!("expression nesting exceeds maximum depth of {}", self.max_depth),
                span,
            ));
        }
        let result = self.parse_binary(min_precedence);
        self.depth -= 1;
        result
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8)> {
        let Token::Punct(punct) = self.cursor.peek().token else {
            return None;
        };
        let op = match punct {
            Punct::OrOr => (BinaryOp::Or, 1),
            Punct::AndAnd => (BinaryOp::And, 2),
            Punct::StrictEq => (BinaryOp::Eq, 3),
            Punct::StrictNe => (BinaryOp::Ne, 3),
            Punct::Lt => (BinaryOp::Lt, 4),
            Punct::Gt => (BinaryOp::Gt, 4),
            Punct::Plus => (BinaryOp::Add, 5),
            Punct::Minus => (BinaryOp::Sub, 5),
            Punct::Star => (BinaryOp::Mul, 6),
            Punct::Slash => (BinaryOp::Div, 6),
            _ => return None,
        };
        Some(op)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.cursor.peek().span;
        let op = if self.cursor.eat_punct(Punct::Bang) {
            UnaryOp::Not
        } else if self.cursor.eat_punct(Punct::Minus) {
            UnaryOp::Neg
        } else {
            return self.parse_postfix();
        };

        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(
                format!("expression nesting exceeds maximum depth of {}", self.max_depth),
                start,
            ));
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        let operand = operand?;

        let span = start.to(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.cursor.eat_punct(Punct::Dot) {
                let property = self.expect_property_name()?;
                let span = expr.span.to(property.span);
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    },
                    span,
                );
            } else if self.cursor.at_punct(Punct::LBracket) && !self.cursor.peek().newline_before {
                self.cursor.bump();
                let index = self.parse_expression()?;
                let close = self.expect(Punct::RBracket)?;
                let span = expr.span.to(close);
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.cursor.at_punct(Punct::LParen) && !self.cursor.peek().newline_before {
                self.cursor.bump();
                let mut args = Vec::new();
                while !self.cursor.eat_punct(Punct::RParen) {
                    if self.cursor.at_eof() {
                        return Err(self.unexpected("`)`"));
                    }
                    args.push(self.parse_expression()?);
                    if !self.cursor.eat_punct(Punct::Comma) && !self.cursor.at_punct(Punct::RParen) {
                        return Err(self.unexpected("`,` or `)`"));
                    }
                }
                let span = expr.span.to(self.cursor.prev_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Property names after `.` may be reserved words (`x.length`, `o.default`)
    fn expect_property_name(&mut self) -> Result<Ident> {
        let next = self.cursor.peek().clone();
        match next.token {
            Token::Ident(name) => {
                self.cursor.bump();
                Ok(Ident {
                    name,
                    span: next.span,
                })
            }
            _ => Err(self.unexpected("a property name")),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let next = self.cursor.bump();
        let span = next.span;
        let kind = match next.token {
            Token::Str(value) => ExprKind::Str(value),
            Token::Number(value) => ExprKind::Number(value),
            Token::Template(parts) => ExprKind::Template(self.parse_template(parts)?),
            Token::Ident(word) => match word.as_str() {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                "undefined" => ExprKind::Undefined,
                "function" | "new" | "this" | "class" | "if" | "for" | "while" | "return" => {
                    return Err(self.error(format!("`{word}` is not supported in configuration programs"), span));
                }
                _ => ExprKind::Ident(word),
            },
            Token::Punct(Punct::LParen) => {
                let inner = self.parse_expression()?;
                let close = self.expect(Punct::RParen)?;
                return Ok(Expr::new(inner.kind, span.to(close)));
            }
            Token::Punct(Punct::LBracket) => return self.parse_array(span),
            Token::Punct(Punct::LBrace) => return self.parse_object(span),
            other => {
                return Err(self.error(format!("expected an expression, found {other}"), span));
            }
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_template(&self, parts: Vec<TemplatePart>) -> Result<Vec<TemplateSegment>> {
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => segments.push(TemplateSegment::Text(text)),
                TemplatePart::Hole(tokens) => segments.push(TemplateSegment::Expr(self.parse_hole(tokens)?)),
            }
        }
        Ok(segments)
    }

    fn parse_hole(&self, tokens: Vec<Spanned>) -> Result<Expr> {
        let mut hole = Parser {
            cursor: Cursor::new(tokens),
            source_name: self.source_name,
            source: self.source,
            max_depth: self.max_depth,
            depth: self.depth,
        };
        let expr = hole.parse_expression()?;
        if !hole.cursor.at_eof() {
            return Err(hole.unexpected("`}` closing the template hole"));
        }
        Ok(expr)
    }

    fn parse_array(&mut self, open: Span) -> Result<Expr> {
        let mut items = Vec::new();
        loop {
            if self.cursor.eat_punct(Punct::RBracket) {
                break;
            }
            if self.cursor.at_eof() {
                return Err(self.error("unclosed `[`", open));
            }
            if self.cursor.eat_punct(Punct::Ellipsis) {
                items.push(ArrayItem::Spread(self.parse_expression()?));
            } else {
                items.push(ArrayItem::Item(self.parse_expression()?));
            }
            if !self.cursor.eat_punct(Punct::Comma) && !self.cursor.at_punct(Punct::RBracket) {
                return Err(self.unexpected("`,` or `]`"));
            }
        }
        Ok(Expr::new(ExprKind::Array(items), open.to(self.cursor.prev_span())))
    }

    fn parse_object(&mut self, open: Span) -> Result<Expr> {
        let mut items = Vec::new();
        loop {
            if self.cursor.eat_punct(Punct::RBrace) {
                break;
            }
            if self.cursor.at_eof() {
                return Err(self.error("unclosed `{`", open));
            }
            if self.cursor.eat_punct(Punct::Ellipsis) {
                items.push(ObjectItem::Spread(self.parse_expression()?));
            } else {
                let key_token = self.cursor.bump();
                let key_span = key_token.span;
                let (key, shorthand_ok) = match key_token.token {
                    Token::Ident(name) => (name, true),
                    Token::Str(text) => (text, false),
                    Token::Number(n) => (number_to_string(n), false),
                    other => {
                        return Err(self.error(format!("expected a property name, found {other}"), key_span));
                    }
                };
                let value = if self.cursor.eat_punct(Punct::Colon) {
                    self.parse_expression()?
                } else if shorthand_ok && !RESERVED.contains(&key.as_str()) {
                    Expr::new(ExprKind::Ident(key.clone()), key_span)
                } else {
                    return Err(self.unexpected("`:`"));
                };
                items.push(ObjectItem::Field {
                    key,
                    key_span,
                    value,
                });
            }
            if !self.cursor.eat_punct(Punct::Comma) && !self.cursor.at_punct(Punct::RBrace) {
                return Err(self.unexpected("`,` or `}`"));
            }
        }
        Ok(Expr::new(ExprKind::Object(items), open.to(self.cursor.prev_span())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program("test.ts", source).unwrap()
    }

    fn single_expr(source: &str) -> Expr {
        match parse(source).statements.remove(0) {
            Stmt::Expr(expr) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_imports_are_recorded() {
        let program = parse("import \"./yaml/buildkite\";\nsteps = [];");
        assert_eq!(program.imports.len(), 1);
        assert_eq!(program.imports[0].path, "./yaml/buildkite");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_declarations_and_assignment() {
        let program = parse("const a = 1\nlet b\nvar c = \"x\";\nb = a");
        assert!(matches!(
            &program.statements[0],
            Stmt::Declare { kind: DeclKind::Const, init: Some(_), .. }
        ));
        assert!(matches!(
            &program.statements[1],
            Stmt::Declare { kind: DeclKind::Let, init: None, .. }
        ));
        assert!(matches!(&program.statements[3], Stmt::Assign { target, .. } if target.name == "b"));
    }

    #[test]
    fn test_const_requires_initializer() {
        let err = parse_program("t.ts", "const a;").unwrap_err();
        assert!(err.message.contains("expected `=`"));
        assert!(err.help.is_some());
    }

    #[test]
    fn test_statements_need_separator() {
        let err = parse_program("t.ts", "a = 1 b = 2").unwrap_err();
        assert!(err.message.contains("`;` or a line break"));
        assert_eq!(err.location.column, 7);
    }

    #[test]
    fn test_precedence() {
        let expr = single_expr("1 + 2 * 3 === 7 && !x");
        let ExprKind::Binary { op: BinaryOp::And, left, right } = expr.kind else {
            panic!("expected &&");
        };
        assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
        assert!(matches!(right.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_arrow_functions() {
        let expr = single_expr("xs.map(x => ({ label: x }))");
        let ExprKind::Call { callee, args } = expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Member { ref property, .. } if property.name == "map"));
        let ExprKind::Arrow { params, body } = &args[0].kind else {
            panic!("expected arrow");
        };
        assert_eq!(params[0].name, "x");
        assert!(matches!(body.kind, ExprKind::Object(_)));

        let expr = single_expr("((a, i) => { return a + i; })");
        assert!(matches!(expr.kind, ExprKind::Arrow { ref params, .. } if params.len() == 2));
    }

    #[test]
    fn test_object_literal_forms() {
        let expr = single_expr("({ label, \"artifact_paths\": \"pkg/*\", 10: true, ...base, })");
        let ExprKind::Object(items) = expr.kind else {
            panic!("expected object");
        };
        let keys: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                ObjectItem::Field { key, .. } => Some(key.as_str()),
                ObjectItem::Spread(_) => None,
            })
            .collect();
        assert_eq!(keys, vec!["label", "artifact_paths", "10"]);
        assert!(matches!(items[3], ObjectItem::Spread(_)));
    }

    #[test]
    fn test_template_holes() {
        let expr = single_expr("`FIXTURE=${fixture} ./build.sh`");
        let ExprKind::Template(segments) = expr.kind else {
            panic!("expected template");
        };
        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[1], TemplateSegment::Expr(e) if e.kind == ExprKind::Ident("fixture".into())));
    }

    #[test]
    fn test_conditional() {
        let expr = single_expr("deploy ? \"main\" : \"none\"");
        assert!(matches!(expr.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_program("t.ts", "a.b = 1").unwrap_err();
        assert_eq!(err.message, "invalid assignment target");
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits {
            max_depth: 16,
            ..Limits::default()
        };
        let source = format!("x = {}1{}", "[".repeat(40), "]".repeat(40));
        let err = parse_program_with_limits("t.ts", &source, &limits).unwrap_err();
        assert!(err.message.contains("maximum depth of 16"));
    }

    #[test]
    fn test_unsupported_keyword() {
        let err = parse_program("t.ts", "steps = new Array()").unwrap_err();
        assert!(err.message.contains("`new` is not supported"));
    }

    #[test]
    fn test_lex_errors_become_parse_errors() {
        let err = parse_program("t.ts", "steps = \"open").unwrap_err();
        assert_eq!(err.source_name, "t.ts");
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn test_deeply_nested_templates_are_rejected() {
        let depth = 100_000;
        let source = format!("steps = {}1{}", "`${".repeat(depth), "}`".repeat(depth));
        let err = parse_program("t.ts", &source).unwrap_err();
        assert!(err.message.contains("template literals nested deeper than 128"));
        assert_eq!(err.location.line, 1);
    }
}
