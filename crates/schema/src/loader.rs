//! Schema declaration loader
//!
//! Parses TypeScript-style declaration sources into a [`Schema`]:
//!
//! ```text
//! interface Step { command: string | string[]; label?: string; }
//! type WaitStep = "wait" | { wait: string; continue_on_failure: boolean };
//! declare const wait = "wait";
//! declare var steps: (Step | WaitStep)[];
//! ```
//!
//! A session may combine several sources. Only one of them may declare the
//! root binding; within a single source a re-declared root binding of the
//! same name replaces the earlier one.

use crate::error::{Result, SchemaErrorKind, SchemaParseError};
use crate::model::{
    FieldSpec, MapType, RecordType, RootBinding, ScalarType, Schema, SentinelConst, SequenceType,
    TypeDecl, TypeRef,
};
use indexmap::IndexMap;
use pipetype_core::limits::validate_source;
use pipetype_core::{Cursor, Limits, Punct, Scalar, Span, Token, tokenize_with_depth};
use std::collections::HashSet;

/// Name used for sources loaded through [`load`]
pub const DEFAULT_SOURCE_NAME: &str = "schema.d.ts";

/// Load a schema from a single declaration source
///
/// # Errors
///
/// Returns [`SchemaParseError`] for malformed declarations, unknown type
/// references, a missing root binding or exceeded limits.
pub fn load(source: &str) -> Result<Schema> {
    SchemaLoader::new().add_source(DEFAULT_SOURCE_NAME, source).load()
}

/// Builder that loads one schema from one or more declaration sources
#[derive(Debug, Clone, Default)]
pub struct SchemaLoader {
    limits: Limits,
    sources: Vec<(String, String)>,
}

impl SchemaLoader {
    /// Create a loader with default limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom limits
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a named declaration source
    #[must_use]
    pub fn add_source(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.push((name.into(), text.into()));
        self
    }

    /// Named source texts, in the order they were added.
    ///
    /// Used as a cache key by callers that reuse loaded schemas.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// Limits applied while loading
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Parse every source and assemble the schema
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaParseError`] encountered.
    pub fn load(&self) -> Result<Schema> {
        let mut types: IndexMap<String, TypeDecl> = IndexMap::new();
        let mut constants: IndexMap<String, SentinelConst> = IndexMap::new();
        let mut root: Option<RootBinding> = None;
        let mut references: Vec<(String, Span, usize)> = Vec::new();

        for (index, (name, text)) in self.sources.iter().enumerate() {
            validate_source(text, &self.limits).map_err(|e| {
                SchemaParseError::new(SchemaErrorKind::TooLarge(e), name, text, Span::point(0))
            })?;

            let decls = DeclParser::new(name, text, &self.limits)?.parse()?;

            for decl in decls.types {
                if types.contains_key(&decl.name) {
                    return Err(self.error_at(
                        index,
                        SchemaErrorKind::DuplicateType(decl.name.clone()),
                        decl.span,
                    ));
                }
                types.insert(decl.name.clone(), decl);
            }
            for constant in decls.constants {
                if constants.contains_key(&constant.name) {
                    return Err(self.error_at(
                        index,
                        SchemaErrorKind::DuplicateConstant(constant.name.clone()),
                        constant.span,
                    ));
                }
                constants.insert(constant.name.clone(), constant);
            }
            if let Some(source_root) = decls.root {
                if let Some(existing) = &root {
                    return Err(self
                        .error_at(
                            index,
                            SchemaErrorKind::ConflictingRoot {
                                name: source_root.name.clone(),
                                first_source: existing.source.clone(),
                            },
                            source_root.span,
                        )
                        .with_help("Select one schema per invocation instead of loading both"));
                }
                root = Some(source_root);
            }
            references.extend(decls.references.into_iter().map(|(n, s)| (n, s, index)));
        }

        for (name, span, index) in references {
            if !types.contains_key(&name) {
                return Err(self.error_at(index, SchemaErrorKind::UnknownType(name), span));
            }
        }

        let Some(root) = root else {
            let (index, end) = self
                .sources
                .iter()
                .enumerate()
                .last()
                .map_or((0, 0), |(i, (_, text))| (i, text.len()));
            return Err(self
                .error_at(index, SchemaErrorKind::MissingRoot, Span::point(end))
                .with_help("Declare the root binding, e.g. `declare var steps: Step[];`"));
        };

        self.reject_alias_cycles(&types)?;

        let schema = Schema {
            types,
            constants,
            root,
        };
        tracing::debug!(
            types = schema.types.len(),
            constants = schema.constants.len(),
            root = %schema.root.name,
            "Loaded schema"
        );
        Ok(schema)
    }

    fn reject_alias_cycles(&self, types: &IndexMap<String, TypeDecl>) -> Result<()> {
        for decl in types.values() {
            let mut seen = HashSet::new();
            let mut current = &decl.ty;
            while let TypeRef::Named(next) = current {
                if !seen.insert(next.as_str()) || next == &decl.name {
                    let index = self
                        .sources
                        .iter()
                        .position(|(name, _)| *name == decl.source)
                        .unwrap_or(0);
                    return Err(self.error_at(
                        index,
                        SchemaErrorKind::CyclicAlias(decl.name.clone()),
                        decl.span,
                    ));
                }
                match types.get(next) {
                    Some(target) => current = &target.ty,
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn error_at(&self, index: usize, kind: SchemaErrorKind, span: Span) -> SchemaParseError {
        let (name, text) = self
            .sources
            .get(index)
            .map_or(("", ""), |(n, t)| (n.as_str(), t.as_str()));
        SchemaParseError::new(kind, name, text, span)
    }
}

/// Declarations found in one source
#[derive(Debug, Default)]
struct SourceDecls {
    types: Vec<TypeDecl>,
    constants: Vec<SentinelConst>,
    root: Option<RootBinding>,
    references: Vec<(String, Span)>,
}

/// Object members: either fields or an index signature
enum Members {
    Fields(Vec<FieldSpec>),
    Index(MapType),
}

struct DeclParser<'s> {
    cursor: Cursor,
    name: &'s str,
    text: &'s str,
    max_depth: usize,
    depth: usize,
    decls: SourceDecls,
}

impl<'s> DeclParser<'s> {
    fn new(name: &'s str, text: &'s str, limits: &Limits) -> Result<Self> {
        let tokens = tokenize_with_depth(text, limits.max_depth).map_err(|e| {
            SchemaParseError::new(SchemaErrorKind::Syntax(e.message), name, text, e.span)
        })?;
        Ok(Self {
            cursor: Cursor::new(tokens),
            name,
            text,
            max_depth: limits.max_depth,
            depth: 0,
            decls: SourceDecls::default(),
        })
    }

    fn error(&self, kind: SchemaErrorKind, span: Span) -> SchemaParseError {
        SchemaParseError::new(kind, self.name, self.text, span)
    }

    fn syntax(&self, message: impl Into<String>) -> SchemaParseError {
        self.error(SchemaErrorKind::Syntax(message.into()), self.cursor.peek().span)
    }

    fn expect(&mut self, punct: Punct) -> Result<Span> {
        if self.cursor.eat_punct(punct) {
            Ok(self.cursor.prev_span())
        } else {
            Err(self.syntax(format!(
                "expected `{}`, found {}",
                punct.as_str(),
                self.cursor.peek().token
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span)> {
        let spanned = self.cursor.peek().clone();
        match spanned.token {
            Token::Ident(name) => {
                self.cursor.bump();
                Ok((name, spanned.span))
            }
            other => Err(self.syntax(format!("expected {what}, found {other}"))),
        }
    }

    fn end_statement(&mut self) {
        self.cursor.eat_punct(Punct::Semi);
    }

    fn parse(mut self) -> Result<SourceDecls> {
        loop {
            while self.cursor.eat_punct(Punct::Semi) {}
            if self.cursor.at_eof() {
                return Ok(self.decls);
            }
            let doc = self.cursor.peek().doc.clone();
            self.cursor.eat_ident("export");

            if self.cursor.eat_ident("interface") {
                self.parse_interface(doc)?;
            } else if self.cursor.eat_ident("type") {
                self.parse_alias(doc)?;
            } else if self.cursor.eat_ident("declare") {
                if self.cursor.eat_ident("const") {
                    self.parse_constant()?;
                } else if self.cursor.eat_ident("var") || self.cursor.eat_ident("let") {
                    self.parse_root()?;
                } else {
                    return Err(self.syntax("expected `const`, `var` or `let` after `declare`"));
                }
            } else if self.cursor.eat_ident("import") {
                // Imports between declaration files are resolved by the caller.
                match self.cursor.bump().token {
                    Token::Str(_) => self.end_statement(),
                    other => return Err(self.syntax(format!("expected module path, found {other}"))),
                }
            } else {
                return Err(self.syntax(format!(
                    "expected a declaration, found {}",
                    self.cursor.peek().token
                )));
            }
        }
    }

    fn parse_interface(&mut self, doc: Option<String>) -> Result<()> {
        let (name, name_span) = self.expect_ident("interface name")?;
        if self.cursor.at_ident("extends") || self.cursor.at_punct(Punct::Lt) {
            return Err(self.error(
                SchemaErrorKind::Unsupported("interface inheritance and generics".into()),
                self.cursor.peek().span,
            ));
        }
        let open = self.expect(Punct::LBrace)?;
        let ty = match self.parse_members(Some(&name), open)? {
            Members::Fields(fields) => TypeRef::Record(RecordType {
                name: Some(name.clone()),
                fields,
            }),
            Members::Index(map) => TypeRef::Map(Box::new(map)),
        };
        self.decls.types.push(TypeDecl {
            name,
            ty,
            doc,
            source: self.name.to_string(),
            span: name_span,
        });
        Ok(())
    }

    fn parse_alias(&mut self, doc: Option<String>) -> Result<()> {
        let (name, name_span) = self.expect_ident("type name")?;
        self.expect(Punct::Assign)?;
        let ty = self.parse_type()?;
        self.end_statement();
        self.decls.types.push(TypeDecl {
            name,
            ty,
            doc,
            source: self.name.to_string(),
            span: name_span,
        });
        Ok(())
    }

    fn parse_constant(&mut self) -> Result<()> {
        let (name, name_span) = self.expect_ident("constant name")?;
        let value = if self.cursor.eat_punct(Punct::Assign) {
            self.parse_literal_value()?
        } else if self.cursor.eat_punct(Punct::Colon) {
            let start = self.cursor.peek().span;
            match self.parse_type()? {
                TypeRef::Literal(mut lit) if lit.values.len() == 1 => lit.values.remove(0),
                _ => {
                    return Err(self.error(
                        SchemaErrorKind::Unsupported("constants must have a single literal type".into()),
                        start.to(self.cursor.prev_span()),
                    ));
                }
            }
        } else {
            return Err(self.syntax("expected `=` or `:` after constant name"));
        };
        self.end_statement();
        self.decls.constants.push(SentinelConst {
            name,
            value,
            span: name_span,
        });
        Ok(())
    }

    fn parse_root(&mut self) -> Result<()> {
        let (name, name_span) = self.expect_ident("binding name")?;
        self.expect(Punct::Colon)?;
        let ty = self.parse_type()?;
        self.end_statement();

        if let Some(previous) = &self.decls.root {
            if previous.name != name {
                return Err(self.error(
                    SchemaErrorKind::MultipleRoots {
                        first: previous.name.clone(),
                        second: name,
                    },
                    name_span,
                ));
            }
            tracing::warn!(
                root = %name,
                source = %self.name,
                "Root binding declared more than once; the later declaration wins"
            );
        }
        self.decls.root = Some(RootBinding {
            name,
            ty,
            source: self.name.to_string(),
            span: name_span,
        });
        Ok(())
    }

    fn parse_literal_value(&mut self) -> Result<Scalar> {
        let negative = self.cursor.eat_punct(Punct::Minus);
        let spanned = self.cursor.bump();
        match spanned.token {
            Token::Number(n) => Ok(Scalar::Number(if negative { -n } else { n })),
            Token::Str(s) if !negative => Ok(Scalar::String(s)),
            Token::Ident(word) if !negative && word == "true" => Ok(Scalar::Bool(true)),
            Token::Ident(word) if !negative && word == "false" => Ok(Scalar::Bool(false)),
            other => Err(self.error(
                SchemaErrorKind::Syntax(format!("expected a literal value, found {other}")),
                spanned.span,
            )),
        }
    }

    /// Parse `name?: Type` members up to the closing `}`
    fn parse_members(&mut self, owner: Option<&str>, open: Span) -> Result<Members> {
        let mut fields: Vec<FieldSpec> = Vec::new();
        let mut index: Option<MapType> = None;
        let owner_label = owner.unwrap_or("object type");

        loop {
            while self.cursor.eat_punct(Punct::Semi) || self.cursor.eat_punct(Punct::Comma) {}
            if self.cursor.eat_punct(Punct::RBrace) {
                break;
            }
            if self.cursor.at_eof() {
                return Err(self.error(
                    SchemaErrorKind::Syntax(format!("unclosed `{{` in {owner_label}")),
                    open,
                ));
            }

            let doc = self.cursor.peek().doc.clone();
            if self.cursor.at_punct(Punct::LBracket) {
                let start = self.cursor.bump().span;
                let (key_name, _) = self.expect_ident("index key name")?;
                self.expect(Punct::Colon)?;
                if !self.cursor.eat_ident("string") {
                    return Err(self.error(
                        SchemaErrorKind::Unsupported("index signatures must use string keys".into()),
                        self.cursor.peek().span,
                    ));
                }
                self.expect(Punct::RBracket)?;
                self.expect(Punct::Colon)?;
                let value = self.parse_type()?;
                if index.is_some() {
                    return Err(self.error(
                        SchemaErrorKind::Unsupported("more than one index signature".into()),
                        start,
                    ));
                }
                index = Some(MapType { key_name, value });
                continue;
            }

            let spanned = self.cursor.bump();
            let field_name = match spanned.token {
                Token::Ident(name) | Token::Str(name) => name,
                other => {
                    return Err(self.error(
                        SchemaErrorKind::Syntax(format!("expected field name, found {other}")),
                        spanned.span,
                    ));
                }
            };
            let optional = self.cursor.eat_punct(Punct::Question);
            self.expect(Punct::Colon)?;
            let ty = self.parse_type()?;

            if fields.iter().any(|f| f.name == field_name) {
                return Err(self.error(
                    SchemaErrorKind::DuplicateField {
                        record: owner_label.to_string(),
                        field: field_name,
                    },
                    spanned.span,
                ));
            }
            fields.push(FieldSpec {
                name: field_name,
                ty,
                optional,
                doc,
                span: spanned.span,
            });
        }

        match index {
            Some(map) if fields.is_empty() => Ok(Members::Index(map)),
            Some(_) => Err(self.error(
                SchemaErrorKind::Unsupported(format!(
                    "{owner_label} mixes named fields with an index signature"
                )),
                open,
            )),
            None => Ok(Members::Fields(fields)),
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(
                SchemaErrorKind::TooDeep(self.max_depth),
                self.cursor.peek().span,
            ));
        }
        let result = self.parse_union();
        self.depth -= 1;
        result
    }

    fn parse_union(&mut self) -> Result<TypeRef> {
        self.cursor.eat_punct(Punct::Pipe);
        let mut alternatives = vec![self.parse_postfix()?];
        while self.cursor.eat_punct(Punct::Pipe) {
            alternatives.push(self.parse_postfix()?);
        }
        Ok(TypeRef::union(alternatives))
    }

    fn parse_postfix(&mut self) -> Result<TypeRef> {
        let mut ty = self.parse_primary()?;
        while self.cursor.at_punct(Punct::LBracket) && self.cursor.nth_is_punct(1, Punct::RBracket) {
            self.cursor.bump();
            self.cursor.bump();
            ty = TypeRef::sequence(ty);
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<TypeRef> {
        let spanned = self.cursor.peek().clone();
        match spanned.token {
            Token::Punct(Punct::LParen) => {
                self.cursor.bump();
                let ty = self.parse_type()?;
                self.expect(Punct::RParen)?;
                Ok(ty)
            }
            Token::Punct(Punct::LBrace) => {
                self.cursor.bump();
                match self.parse_members(None, spanned.span)? {
                    Members::Fields(fields) => Ok(TypeRef::Record(RecordType { name: None, fields })),
                    Members::Index(map) => Ok(TypeRef::Map(Box::new(map))),
                }
            }
            Token::Str(_) | Token::Number(_) | Token::Punct(Punct::Minus) => {
                Ok(TypeRef::literal(self.parse_literal_value()?))
            }
            Token::Ident(word) => {
                self.cursor.bump();
                match word.as_str() {
                    "string" => Ok(TypeRef::Scalar(ScalarType::String)),
                    "number" => Ok(TypeRef::Scalar(ScalarType::Number)),
                    "boolean" => Ok(TypeRef::Scalar(ScalarType::Boolean)),
                    "true" => Ok(TypeRef::literal(true)),
                    "false" => Ok(TypeRef::literal(false)),
                    "Array" | "OneOrMany" => {
                        self.expect(Punct::Lt)?;
                        let element = self.parse_type()?;
                        self.expect(Punct::Gt)?;
                        Ok(TypeRef::Sequence(Box::new(SequenceType {
                            element,
                            accepts_single: word == "OneOrMany",
                        })))
                    }
                    "any" | "unknown" | "null" | "undefined" | "object" | "never" | "void" => {
                        Err(self.error(
                            SchemaErrorKind::Unsupported(format!("type `{word}`")),
                            spanned.span,
                        ))
                    }
                    _ => {
                        if self.cursor.at_punct(Punct::Lt) {
                            return Err(self.error(
                                SchemaErrorKind::Unsupported(format!("generic type `{word}<...>`")),
                                spanned.span,
                            ));
                        }
                        self.decls.references.push((word.clone(), spanned.span));
                        Ok(TypeRef::Named(word))
                    }
                }
            }
            other => Err(self.syntax(format!("expected a type, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LiteralType;

    const STEPS: &str = r#"
interface Step {
  /** The command to run */
  command: string | string[];
  label?: string;
}
type WaitStep = "wait" | { wait: string; continue_on_failure: boolean };
declare const wait = "wait";
/** List of steps */
declare var steps: (Step | WaitStep)[];
"#;

    #[test]
    fn test_load_basic_schema() {
        let schema = load(STEPS).unwrap();
        assert_eq!(schema.root().name, "steps");
        assert_eq!(schema.root().ty.to_string(), "(Step | WaitStep)[]");

        let step = schema.type_decl("Step").unwrap();
        let TypeRef::Record(record) = &step.ty else {
            panic!("Step should be a record");
        };
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields[0].doc.as_deref(), Some("The command to run"));
        assert!(!record.fields[0].optional);
        assert!(record.fields[1].optional);

        let constant = schema.constant("wait").unwrap();
        assert_eq!(constant.value, Scalar::from("wait"));
    }

    #[test]
    fn test_literal_unions_collapse() {
        let schema = load(
            "interface R { limit?: 1 | 2 | 3; exit_status?: \"*\" | number; }\ndeclare var r: R;",
        )
        .unwrap();
        let TypeRef::Record(record) = &schema.type_decl("R").unwrap().ty else {
            panic!("expected record");
        };
        assert_eq!(
            record.field("limit").unwrap().ty,
            TypeRef::Literal(LiteralType {
                values: vec![Scalar::Number(1.0), Scalar::Number(2.0), Scalar::Number(3.0)],
            })
        );
        assert!(matches!(record.field("exit_status").unwrap().ty, TypeRef::Variant(_)));
    }

    #[test]
    fn test_index_signature_becomes_map() {
        let schema = load("interface Env { [name: string]: string }\ndeclare var env: Env;").unwrap();
        assert!(matches!(schema.type_decl("Env").unwrap().ty, TypeRef::Map(_)));

        let schema = load("declare var agents: { [key: string]: string };").unwrap();
        assert!(matches!(schema.root().ty, TypeRef::Map(_)));
    }

    #[test]
    fn test_array_and_one_or_many() {
        let schema = load("declare var x: { a: Array<\"text\" | \"select\">; b: OneOrMany<string> };").unwrap();
        let TypeRef::Record(record) = &schema.root().ty else {
            panic!("expected record");
        };
        let TypeRef::Sequence(a) = &record.field("a").unwrap().ty else {
            panic!("expected sequence");
        };
        assert!(!a.accepts_single);
        let TypeRef::Sequence(b) = &record.field("b").unwrap().ty else {
            panic!("expected sequence");
        };
        assert!(b.accepts_single);
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = load("declare var steps: Stpe[];").unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnknownType("Stpe".into()));
        assert_eq!(err.location.line, 1);
        assert_eq!(err.location.column, 20);
    }

    #[test]
    fn test_missing_root_is_error() {
        let err = load("interface Step { command: string }").unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::MissingRoot);
        assert!(err.help.is_some());
    }

    #[test]
    fn test_duplicate_field_is_error() {
        let err = load("interface S { a: string; a: number }\ndeclare var s: S;").unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::DuplicateField { .. }));
    }

    #[test]
    fn test_same_root_redeclared_last_wins() {
        let schema = load("declare var steps: string[];\ndeclare var steps: number[];").unwrap();
        assert_eq!(schema.root().ty.to_string(), "number[]");
    }

    #[test]
    fn test_different_roots_in_one_source_is_error() {
        let err = load("declare var steps: string[];\ndeclare var jobs: string[];").unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::MultipleRoots { .. }));
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_roots_in_two_sources_conflict() {
        let err = SchemaLoader::new()
            .add_source("a.d.ts", "declare var steps: string[];")
            .add_source("b.d.ts", "declare var steps: number[];")
            .load()
            .unwrap_err();
        assert_eq!(
            err.kind,
            SchemaErrorKind::ConflictingRoot {
                name: "steps".into(),
                first_source: "a.d.ts".into(),
            }
        );
        assert_eq!(err.source_name, "b.d.ts");
    }

    #[test]
    fn test_types_shared_across_sources() {
        let schema = SchemaLoader::new()
            .add_source("types.d.ts", "interface Step { command: string }")
            .add_source("root.d.ts", "declare var steps: Step[];")
            .load()
            .unwrap();
        assert_eq!(schema.type_decl("Step").unwrap().source, "types.d.ts");
        assert_eq!(schema.root().source, "root.d.ts");
    }

    #[test]
    fn test_alias_cycle_is_error() {
        let err = load("type A = B;\ntype B = A;\ndeclare var a: A;").unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::CyclicAlias(_)));
    }

    #[test]
    fn test_recursive_record_is_allowed() {
        let schema = load("interface Group { group: string; steps?: Group[] }\ndeclare var g: Group;");
        assert!(schema.is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits {
            max_depth: 3,
            ..Limits::default()
        };
        let err = SchemaLoader::new()
            .with_limits(limits)
            .add_source("deep.d.ts", "declare var x: ((((string))));")
            .load()
            .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::TooDeep(3));
    }

    #[test]
    fn test_syntax_error_location() {
        let err = load("interface Step {\n  command string;\n}").unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::Syntax(_)));
        assert_eq!(err.location.line, 2);
        assert_eq!(err.construct, "string");
    }

    #[test]
    fn test_unsupported_any() {
        let err = load("declare var x: any;").unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::Unsupported("type `any`".into()));
    }

    #[test]
    fn test_constant_with_literal_type_annotation() {
        let schema = load("declare const wait: \"wait\";\ndeclare var s: string;").unwrap();
        assert_eq!(schema.constant("wait").unwrap().value, Scalar::from("wait"));
    }
}
