//! Tokenizer shared by the declaration and program languages.
//!
//! Both languages use the same TypeScript-flavoured surface syntax, so a
//! single token stream serves the schema loader and the program parser.
//! Template literals are lexed eagerly: every `${...}` hole is turned into
//! its own token list, terminated by [`Token::Eof`].

use crate::limits::Limits;
use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// Punctuation and operator tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `|`
    Pipe,
    /// `=`
    Assign,
    /// `.`
    Dot,
    /// `...`
    Ellipsis,
    /// `=>`
    Arrow,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `!`
    Bang,
    /// `===` (also accepts `==`)
    StrictEq,
    /// `!==` (also accepts `!=`)
    StrictNe,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
}

impl Punct {
    /// Source text of the punctuation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Colon => ":",
            Self::Question => "?",
            Self::Pipe => "|",
            Self::Assign => "=",
            Self::Dot => ".",
            Self::Ellipsis => "...",
            Self::Arrow => "=>",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Bang => "!",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
        }
    }
}

/// One piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text with escapes already processed
    Text(String),
    /// Tokens of a `${...}` hole, ending with [`Token::Eof`]
    Hole(Vec<Spanned>),
}

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// Quoted string literal
    Str(String),
    /// Numeric literal
    Number(f64),
    /// Backtick template literal
    Template(Vec<TemplatePart>),
    /// Punctuation
    Punct(Punct),
    /// End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "`{name}`"),
            Self::Str(value) => write!(f, "string {value:?}"),
            Self::Number(value) => write!(f, "number {value}"),
            Self::Template(_) => f.write_str("template literal"),
            Self::Punct(p) => write!(f, "`{}`", p.as_str()),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its location and any attached doc comment
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token
    pub token: Token,
    /// Where it appears in the source
    pub span: Span,
    /// Text of a `/** ... */` comment directly preceding the token
    pub doc: Option<String>,
    /// Whether a line break separates this token from the previous one
    pub newline_before: bool,
}

/// Error produced while tokenizing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LexError {
    /// What went wrong
    pub message: String,
    /// Where it went wrong
    pub span: Span,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Tokenize `source` into a token list ending with [`Token::Eof`].
///
/// # Errors
///
/// Returns a [`LexError`] for unterminated strings, comments or template
/// holes, malformed escapes and unexpected characters.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LexError> {
    tokenize_with_depth(source, Limits::default().max_depth)
}

/// Tokenize `source`, rejecting template literals nested more than
/// `max_depth` deep inside each other's `${...}` holes.
///
/// # Errors
///
/// Returns the same errors as [`tokenize`], plus a [`LexError`] at the
/// template that crosses the nesting limit.
pub fn tokenize_with_depth(source: &str, max_depth: usize) -> Result<Vec<Spanned>, LexError> {
    let mut lexer = Lexer::new(source, max_depth);
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    max_depth: usize,
    template_depth: usize,
}

impl<'a> Lexer<'a> {
    const fn new(src: &'a str, max_depth: usize) -> Self {
        Self {
            src,
            pos: 0,
            max_depth,
            template_depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments, returning the last doc comment seen and
    /// whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<(Option<String>, bool), LexError> {
        let mut doc = None;
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_nth(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_nth(1) == Some('*') => {
                    let start = self.pos;
                    self.pos += 2;
                    let is_doc = self.peek() == Some('*') && self.peek_nth(1) != Some('/');
                    let body_start = self.pos;
                    let Some(close) = self.src[self.pos..].find("*/") else {
                        return Err(LexError::new(
                            "unterminated block comment",
                            Span::new(start, self.src.len()),
                        ));
                    };
                    let body = &self.src[body_start..self.pos + close];
                    if body.contains('\n') {
                        newline = true;
                    }
                    self.pos += close + 2;
                    doc = if is_doc { Some(clean_doc(body)) } else { doc };
                }
                _ => return Ok((doc, newline)),
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        let (doc, newline_before) = self.skip_trivia()?;
        let start = self.pos;
        let Some(ch) = self.bump() else {
            return Ok(Spanned {
                token: Token::Eof,
                span: Span::point(start),
                doc,
                newline_before,
            });
        };

        let token = match ch {
            '"' | '\'' => Token::Str(self.string(ch, start)?),
            '`' => Token::Template(self.template(start)?),
            c if c.is_ascii_digit() => Token::Number(self.number(start)?),
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_continue) {
                    self.bump();
                }
                Token::Ident(self.src[start..self.pos].to_string())
            }
            _ => Token::Punct(self.punct(ch, start)?),
        };

        Ok(Spanned {
            token,
            span: Span::new(start, self.pos),
            doc,
            newline_before,
        })
    }

    fn punct(&mut self, ch: char, start: usize) -> Result<Punct, LexError> {
        let punct = match ch {
            '{' => Punct::LBrace,
            '}' => Punct::RBrace,
            '[' => Punct::LBracket,
            ']' => Punct::RBracket,
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '<' => Punct::Lt,
            '>' => Punct::Gt,
            ',' => Punct::Comma,
            ';' => Punct::Semi,
            ':' => Punct::Colon,
            '?' => Punct::Question,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '.' => {
                if self.peek() == Some('.') && self.peek_nth(1) == Some('.') {
                    self.pos += 2;
                    Punct::Ellipsis
                } else {
                    Punct::Dot
                }
            }
            '=' => {
                if self.eat('>') {
                    Punct::Arrow
                } else if self.eat('=') {
                    self.eat('=');
                    Punct::StrictEq
                } else {
                    Punct::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Punct::StrictNe
                } else {
                    Punct::Bang
                }
            }
            '|' => {
                if self.eat('|') {
                    Punct::OrOr
                } else {
                    Punct::Pipe
                }
            }
            '&' if self.eat('&') => Punct::AndAnd,
            other => {
                return Err(LexError::new(
                    format!("unexpected character `{other}`"),
                    Span::new(start, self.pos),
                ));
            }
        };
        Ok(punct)
    }

    fn number(&mut self, start: usize) -> Result<f64, LexError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_nth(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += digit_at;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>().map_err(|e| {
            LexError::new(
                format!("invalid number `{text}`: {e}"),
                Span::new(start, self.pos),
            )
        })
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(LexError::new(
                        "unterminated string literal",
                        Span::new(start, self.pos),
                    ));
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self, start: usize) -> Result<Vec<TemplatePart>, LexError> {
        if self.template_depth >= self.max_depth {
            return Err(LexError::new(
                format!("template literals nested deeper than {}", self.max_depth),
                Span::new(start, self.pos),
            ));
        }
        self.template_depth += 1;
        let parts = self.template_parts(start);
        self.template_depth -= 1;
        parts
    }

    fn template_parts(&mut self, start: usize) -> Result<Vec<TemplatePart>, LexError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError::new(
                        "unterminated template literal",
                        Span::new(start, self.pos),
                    ));
                }
                Some('`') => break,
                Some('\\') => text.push(self.escape()?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(TemplatePart::Hole(self.template_hole(start)?));
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(parts)
    }

    fn template_hole(&mut self, template_start: usize) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let spanned = self.next_token()?;
            match spanned.token {
                Token::Eof => {
                    return Err(LexError::new(
                        "unterminated `${` in template literal",
                        Span::new(template_start, self.pos),
                    ));
                }
                Token::Punct(Punct::LBrace) => depth += 1,
                Token::Punct(Punct::RBrace) if depth == 0 => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span: spanned.span,
                        doc: None,
                        newline_before: false,
                    });
                    return Ok(tokens);
                }
                Token::Punct(Punct::RBrace) => depth -= 1,
                _ => {}
            }
            tokens.push(spanned);
        }
    }

    fn escape(&mut self) -> Result<char, LexError> {
        let start = self.pos - 1;
        let Some(c) = self.bump() else {
            return Err(LexError::new("unterminated escape", Span::point(start)));
        };
        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'u' => {
                let digits: String = if self.eat('{') {
                    let mut digits = String::new();
                    while let Some(d) = self.bump() {
                        if d == '}' {
                            break;
                        }
                        digits.push(d);
                    }
                    digits
                } else {
                    (0..4).filter_map(|_| self.bump()).collect()
                };
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        LexError::new(
                            format!("invalid unicode escape `\\u{digits}`"),
                            Span::new(start, self.pos),
                        )
                    })?
            }
            other => other,
        };
        Ok(escaped)
    }
}

/// Read position over a token list ending with [`Token::Eof`]
#[derive(Debug, Clone)]
pub struct Cursor {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Cursor {
    /// Wrap a token list. A trailing [`Token::Eof`] is added if missing.
    #[must_use]
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if tokens.last().is_none_or(|t| t.token != Token::Eof) {
            let end = tokens.last().map_or(0, |t| t.span.end);
            tokens.push(Spanned {
                token: Token::Eof,
                span: Span::point(end),
                doc: None,
                newline_before: false,
            });
        }
        Self { tokens, pos: 0 }
    }

    /// The current token
    #[must_use]
    pub fn peek(&self) -> &Spanned {
        self.peek_nth(0)
    }

    /// The token `n` positions ahead, or the final `Eof`
    #[must_use]
    pub fn peek_nth(&self, n: usize) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    /// Consume and return the current token; `Eof` is never consumed
    pub fn bump(&mut self) -> Spanned {
        let token = self.peek().clone();
        if token.token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    /// Span of the most recently consumed token
    #[must_use]
    pub fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    /// Whether the current token is the given punctuation
    #[must_use]
    pub fn at_punct(&self, punct: Punct) -> bool {
        self.peek().token == Token::Punct(punct)
    }

    /// Whether the token `n` ahead is the given punctuation
    #[must_use]
    pub fn nth_is_punct(&self, n: usize, punct: Punct) -> bool {
        self.peek_nth(n).token == Token::Punct(punct)
    }

    /// Consume the given punctuation if present
    pub fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Whether the current token is the identifier `word`
    #[must_use]
    pub fn at_ident(&self, word: &str) -> bool {
        matches!(&self.peek().token, Token::Ident(name) if name == word)
    }

    /// Consume the identifier `word` if present
    pub fn eat_ident(&mut self, word: &str) -> bool {
        if self.at_ident(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Whether all tokens have been consumed
    #[must_use]
    pub fn at_eof(&self) -> bool {
        self.peek().token == Token::Eof
    }
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn clean_doc(body: &str) -> String {
    let body = body.strip_prefix('*').unwrap_or(body);
    body.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map_or(line, str::trim)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_punctuation_and_idents() {
        let tokens = kinds("steps = [wait, ...rest];");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("steps".into()),
                Token::Punct(Punct::Assign),
                Token::Punct(Punct::LBracket),
                Token::Ident("wait".into()),
                Token::Punct(Punct::Comma),
                Token::Punct(Punct::Ellipsis),
                Token::Ident("rest".into()),
                Token::Punct(Punct::RBracket),
                Token::Punct(Punct::Semi),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_multi_char_operators() {
        let tokens = kinds("a => b === c !== d && e || !f");
        assert!(tokens.contains(&Token::Punct(Punct::Arrow)));
        assert!(tokens.contains(&Token::Punct(Punct::StrictEq)));
        assert!(tokens.contains(&Token::Punct(Punct::StrictNe)));
        assert!(tokens.contains(&Token::Punct(Punct::AndAnd)));
        assert!(tokens.contains(&Token::Punct(Punct::OrOr)));
        assert!(tokens.contains(&Token::Punct(Punct::Bang)));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = kinds(r#"'it\'s' "a\tbA\u{1F600}""#);
        assert_eq!(tokens[0], Token::Str("it's".into()));
        assert_eq!(tokens[1], Token::Str("a\tbA\u{1F600}".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("10")[0], Token::Number(10.0));
        assert_eq!(kinds("2.5")[0], Token::Number(2.5));
        assert_eq!(kinds("1e3")[0], Token::Number(1000.0));
    }

    #[test]
    fn test_template_holes_are_lexed() {
        let tokens = kinds("`FIXTURE=${fixture} .buildkite/build-pr.sh`");
        let Token::Template(parts) = &tokens[0] else {
            panic!("expected template, got {:?}", tokens[0]);
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Text("FIXTURE=".into()));
        let TemplatePart::Hole(hole) = &parts[1] else {
            panic!("expected hole");
        };
        assert_eq!(hole[0].token, Token::Ident("fixture".into()));
        assert_eq!(hole[1].token, Token::Eof);
        assert_eq!(parts[2], TemplatePart::Text(" .buildkite/build-pr.sh".into()));
    }

    #[test]
    fn test_nested_braces_in_template_hole() {
        let tokens = kinds("`${ {a: 1}.a }`");
        let Token::Template(parts) = &tokens[0] else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_doc_comment_attaches_to_next_token() {
        let tokens = tokenize("/**\n * The label.\n * Supports emoji.\n */\nlabel?: string;").unwrap();
        assert_eq!(tokens[0].doc.as_deref(), Some("The label.\nSupports emoji."));
        assert!(tokens[0].newline_before);
        assert_eq!(tokens[1].doc, None);
    }

    #[test]
    fn test_line_comments_are_skipped() {
        let tokens = kinds("// header\nsteps // trailing\n");
        assert_eq!(tokens, vec![Token::Ident("steps".into()), Token::Eof]);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("\"open").unwrap_err();
        assert!(err.message.contains("unterminated string"));
        assert_eq!(err.span.start, 0);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert!(err.message.contains('#'));
        assert_eq!(err.span, Span::new(2, 3));
    }

    fn nested_templates(depth: usize) -> String {
        format!("{}1{}", "`${".repeat(depth), "}`".repeat(depth))
    }

    #[test]
    fn test_nested_templates_within_depth() {
        let tokens = tokenize_with_depth(&nested_templates(8), 8).unwrap();
        assert!(matches!(tokens[0].token, Token::Template(_)));
        assert_eq!(tokens[1].token, Token::Eof);
    }

    #[test]
    fn test_nested_templates_past_depth_is_error() {
        let err = tokenize_with_depth(&nested_templates(9), 8).unwrap_err();
        assert!(err.message.contains("nested deeper than 8"));
        assert_eq!(err.span.start, 24);
    }

    #[test]
    fn test_deeply_nested_templates_do_not_overflow() {
        let source = format!("steps = {}", nested_templates(100_000));
        let err = tokenize(&source).unwrap_err();
        assert!(err.message.contains("nested deeper than 128"));
    }

    #[test]
    fn test_cursor_never_passes_eof() {
        let mut cursor = Cursor::new(tokenize("a;").unwrap());
        assert!(cursor.eat_ident("a"));
        assert!(cursor.eat_punct(Punct::Semi));
        assert!(cursor.at_eof());
        assert_eq!(cursor.bump().token, Token::Eof);
        assert!(cursor.at_eof());
        assert_eq!(cursor.prev_span(), Span::new(1, 2));
    }

    #[test]
    fn test_cursor_adds_missing_eof() {
        let cursor = Cursor::new(Vec::new());
        assert!(cursor.at_eof());
    }
}
