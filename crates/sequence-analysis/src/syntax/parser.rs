//! Tolerant recursive-descent parser for scene-module source.
//!
//! Script code is scanned loosely: only brackets, literals, elements and the
//! position of the cursor relative to an operand are tracked, which is enough
//! to tell an element `<Tag` from a comparison `a < b`. Inside element
//! attribute containers and call arguments the parser switches to a
//! structured expression grammar (literals, identifiers, member access, calls,
//! object/array literals) and falls back to opaque nodes for anything else.
//!
//! Recoverable problems become [`Diagnostic`]s; the parse continues on the
//! recovered tree. Only input that leaves no sensible tree (an unterminated
//! block comment or template literal, runaway nesting, or an excessive number
//! of errors) produces a [`FatalSyntaxError`].

use std::fmt;

use super::ast::{AttrValue, Attribute, Element, ElementName, Expr, ImportBinding, Module, Property};
use super::scanner::{is_ident_continue, is_ident_start, Scanner};

const MAX_DIAGNOSTICS: usize = 64;
const MAX_DEPTH: usize = 256;

/// A recoverable syntax problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// The source could not be turned into a tree at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalSyntaxError {
    #[error("Line {line}: unterminated block comment")]
    UnterminatedComment { line: u32 },

    #[error("Line {line}: unterminated template literal")]
    UnterminatedTemplate { line: u32 },

    #[error("Line {line}: nesting too deep")]
    NestingTooDeep { line: u32 },

    #[error("Too many syntax errors ({count}); giving up")]
    TooManyErrors { count: usize },
}

/// A parsed module plus the recoverable problems met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse module source text.
pub fn parse_module(src: &str) -> Result<ParseOutput, FatalSyntaxError> {
    let mut parser = Parser {
        s: Scanner::new(src),
        diagnostics: vec![],
        imports: vec![],
        open_tags: vec![],
        depth: 0,
    };
    let body = parser.parse_loose(b"", Slot::Statement)?;
    Ok(ParseOutput {
        module: Module {
            imports: parser.imports,
            body,
        },
        diagnostics: parser.diagnostics,
    })
}

type PResult<T> = Result<T, FatalSyntaxError>;

/// Where the cursor sits relative to the surrounding code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// A statement may begin; `{` opens a block.
    Statement,
    /// An operand is expected; `{` opens an object literal, `<` an element.
    Expression,
    /// Just after `=>`; `{` opens a function body, `<` an element.
    Arrow,
    /// Just after an operand; `<` and `/` are operators.
    AfterOperand,
}

struct Parser<'a> {
    s: Scanner<'a>,
    diagnostics: Vec<Diagnostic>,
    imports: Vec<ImportBinding>,
    /// Display names of the elements currently open, innermost last.
    open_tags: Vec<String>,
    depth: usize,
}

impl Parser<'_> {
    fn diag(&mut self, line: u32, message: impl Into<String>) -> PResult<()> {
        self.diagnostics.push(Diagnostic {
            line,
            message: message.into(),
        });
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            return Err(FatalSyntaxError::TooManyErrors {
                count: self.diagnostics.len(),
            });
        }
        Ok(())
    }

    fn trivia(&mut self) -> PResult<()> {
        self.s
            .skip_trivia()
            .map_err(|e| FatalSyntaxError::UnterminatedComment { line: e.line })
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FatalSyntaxError::NestingTooDeep {
                line: self.s.line(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expect_close(&mut self, close: u8) -> PResult<()> {
        self.trivia()?;
        if !self.s.eat(close) {
            let line = self.s.line();
            self.diag(line, format!("expected '{}'", close as char))?;
        }
        Ok(())
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.s.starts_with(word) {
            let next = self.s.peek_at(word.len());
            if next.map_or(true, |b| !is_ident_continue(b)) {
                return self.s.eat_str(word);
            }
        }
        false
    }

    fn element_ahead(&self) -> bool {
        self.s.peek() == Some(b'<')
            && self
                .s
                .peek_at(1)
                .is_some_and(|b| is_ident_start(b) || b == b'>')
    }

    // ------------------------------------------------------------------
    // Loose scanning
    // ------------------------------------------------------------------

    /// Scan code until a byte in `stop` (not consumed) or end of input,
    /// collecting the expressions worth keeping.
    fn parse_loose(&mut self, stop: &[u8], mut slot: Slot) -> PResult<Vec<Expr>> {
        self.enter()?;
        let mut out = vec![];

        loop {
            self.trivia()?;
            let Some(b) = self.s.peek() else { break };
            if stop.contains(&b) {
                break;
            }

            match b {
                b'(' => {
                    self.s.bump();
                    let inner = self.parse_loose(b")", Slot::Expression)?;
                    self.expect_close(b')')?;
                    out.push(Expr::Opaque(inner));
                    slot = Slot::AfterOperand;
                }
                b'[' => {
                    self.s.bump();
                    let inner = self.parse_loose(b"]", Slot::Expression)?;
                    self.expect_close(b']')?;
                    out.push(Expr::Opaque(inner));
                    slot = Slot::AfterOperand;
                }
                b'{' if slot == Slot::Expression => {
                    out.push(self.parse_object()?);
                    slot = Slot::AfterOperand;
                }
                b'{' => {
                    self.s.bump();
                    let inner = self.parse_loose(b"}", Slot::Statement)?;
                    self.expect_close(b'}')?;
                    out.push(Expr::Opaque(inner));
                    slot = Slot::Statement;
                }
                b')' | b']' | b'}' => {
                    let line = self.s.line();
                    self.s.bump();
                    self.diag(line, format!("unexpected '{}'", b as char))?;
                }
                b'\'' | b'"' => {
                    out.push(Expr::Str(self.parse_string(b)?));
                    slot = Slot::AfterOperand;
                }
                b'`' => {
                    out.push(self.parse_template()?);
                    slot = Slot::AfterOperand;
                }
                b'<' if slot != Slot::AfterOperand && self.element_ahead() => {
                    match self.parse_element()? {
                        Some(element) => {
                            out.push(Expr::Element(element));
                            slot = Slot::AfterOperand;
                        }
                        None => {
                            self.s.bump();
                            slot = Slot::Expression;
                        }
                    }
                }
                b'/' if slot != Slot::AfterOperand => {
                    self.skip_regex();
                    slot = Slot::AfterOperand;
                }
                b'0'..=b'9' => {
                    self.parse_number();
                    slot = Slot::AfterOperand;
                }
                b'.' if self.s.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.parse_number();
                    slot = Slot::AfterOperand;
                }
                b';' => {
                    self.s.bump();
                    slot = Slot::Statement;
                }
                b'=' if self.s.peek_at(1) == Some(b'>') => {
                    self.s.eat_str("=>");
                    slot = Slot::Arrow;
                }
                b'+' | b'-' if self.s.peek_at(1) == Some(b) => {
                    // `++`/`--` do not change whether an operand precedes.
                    self.s.bump();
                    self.s.bump();
                }
                b'.' => {
                    self.s.bump();
                }
                b if is_ident_start(b) => {
                    let word = self.s.ident(false).unwrap_or_default();
                    if word == "import" && slot == Slot::Statement && self.import_ahead() {
                        self.parse_import()?;
                        slot = Slot::Statement;
                    } else {
                        slot = keyword_slot(word);
                    }
                }
                _ => {
                    self.s.bump();
                    slot = Slot::Expression;
                }
            }
        }

        self.leave();
        Ok(out)
    }

    fn import_ahead(&self) -> bool {
        !matches!(self.s.peek(), Some(b'(') | Some(b'.'))
    }

    // ------------------------------------------------------------------
    // Structured expressions
    // ------------------------------------------------------------------

    /// Parse one expression ending before a byte in `stop`. Shapes outside the
    /// modelled subset come back as [`Expr::Opaque`].
    fn parse_expression(&mut self, stop: &[u8]) -> PResult<Expr> {
        self.enter()?;
        let first = self.parse_primary()?;
        self.trivia()?;

        let at_stop = self.s.peek().map_or(true, |b| stop.contains(&b));
        let expr = match first {
            Some(expr) if at_stop => expr,
            first => {
                let slot = if first.is_some() {
                    Slot::AfterOperand
                } else {
                    Slot::Expression
                };
                let mut items: Vec<Expr> = first.into_iter().collect();
                items.extend(self.parse_loose(stop, slot)?);
                Expr::Opaque(items)
            }
        };

        self.leave();
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Option<Expr>> {
        self.trivia()?;
        let Some(b) = self.s.peek() else {
            return Ok(None);
        };

        let mut expr = match b {
            b'0'..=b'9' => self.parse_number(),
            b'.' if self.s.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.parse_number(),
            b'-' if self
                .s
                .peek_at(1)
                .is_some_and(|c| c.is_ascii_digit() || c == b'.') =>
            {
                self.s.bump();
                match self.parse_number() {
                    Expr::Number(n) => Expr::Number(-n),
                    other => other,
                }
            }
            b'\'' | b'"' => Expr::Str(self.parse_string(b)?),
            b'`' => self.parse_template()?,
            b'{' => self.parse_object()?,
            b'[' => {
                self.s.bump();
                Expr::Array(self.parse_list(b']')?)
            }
            b'(' => {
                self.s.bump();
                let inner = self.parse_expression(b")")?;
                self.expect_close(b')')?;
                inner
            }
            b'<' if self.element_ahead() => match self.parse_element()? {
                Some(element) => Expr::Element(element),
                None => return Ok(None),
            },
            b if is_ident_start(b) => {
                let mark = self.s.mark();
                let word = self.s.ident(false).unwrap_or_default();
                match word {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    w if is_keyword(w) => {
                        self.s.reset(mark);
                        return Ok(None);
                    }
                    w => Expr::Ident(w.to_string()),
                }
            }
            _ => return Ok(None),
        };

        loop {
            self.trivia()?;
            match self.s.peek() {
                Some(b'.') if self.s.peek_at(1).is_some_and(is_ident_start) => {
                    self.s.bump();
                    let property = self.s.ident(false).unwrap_or_default().to_string();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(b'?') if self.s.peek_at(1) == Some(b'.') => {
                    self.s.eat_str("?.");
                    if self.s.peek() == Some(b'(') {
                        continue;
                    }
                    match self.s.ident(false) {
                        Some(property) => {
                            expr = Expr::Member {
                                object: Box::new(expr),
                                property: property.to_string(),
                            };
                        }
                        None => break,
                    }
                }
                Some(b'(') => {
                    self.s.bump();
                    let args = self.parse_list(b')')?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(b'!') if self.s.peek_at(1) != Some(b'=') => {
                    // Non-null assertion.
                    self.s.bump();
                }
                _ => break,
            }
        }

        Ok(Some(expr))
    }

    /// Comma-separated expressions up to `close` (consumed).
    fn parse_list(&mut self, close: u8) -> PResult<Vec<Expr>> {
        let stop = [b',', close];
        let mut items = vec![];
        loop {
            self.trivia()?;
            if self.s.eat(close) {
                break;
            }
            if self.s.is_eof() {
                let line = self.s.line();
                self.diag(line, format!("expected '{}'", close as char))?;
                break;
            }
            if self.s.eat(b',') {
                // Elision (`[a, , b]`) or trailing comma.
                continue;
            }
            items.push(self.parse_expression(&stop)?);
            self.trivia()?;
            self.s.eat(b',');
        }
        Ok(items)
    }

    fn parse_object(&mut self) -> PResult<Expr> {
        self.s.bump();
        let mut props = vec![];

        loop {
            self.trivia()?;
            if self.s.eat(b'}') {
                return Ok(Expr::Object(props));
            }
            if self.s.is_eof() {
                let line = self.s.line();
                self.diag(line, "expected '}'")?;
                return Ok(Expr::Object(props));
            }

            if self.s.eat_str("...") {
                let value = self.parse_expression(b",}")?;
                props.push(Property { key: None, value });
            } else {
                let key = match self.s.peek() {
                    Some(b) if is_ident_start(b) => self.s.ident(false).map(str::to_string),
                    Some(q @ (b'\'' | b'"')) => Some(self.parse_string(q)?),
                    Some(b'0'..=b'9') => {
                        let mark = self.s.mark();
                        self.parse_number();
                        Some(self.s.slice(mark).to_string())
                    }
                    Some(b'[') => {
                        self.s.bump();
                        let computed = self.parse_loose(b"]", Slot::Expression)?;
                        self.expect_close(b']')?;
                        props.push(Property {
                            key: None,
                            value: Expr::Opaque(computed),
                        });
                        None
                    }
                    _ => return self.bail_object(props),
                };

                self.trivia()?;
                match (key, self.s.peek()) {
                    (Some(key), Some(b':')) => {
                        self.s.bump();
                        let value = self.parse_expression(b",}")?;
                        props.push(Property {
                            key: Some(key),
                            value,
                        });
                    }
                    (Some(key), Some(b',') | Some(b'}')) => {
                        props.push(Property {
                            value: Expr::Ident(key.clone()),
                            key: Some(key),
                        });
                    }
                    (key, Some(b'(')) => {
                        // Method shorthand.
                        self.s.bump();
                        let mut body = self.parse_loose(b")", Slot::Expression)?;
                        self.expect_close(b')')?;
                        self.trivia()?;
                        if self.s.eat(b'{') {
                            body.extend(self.parse_loose(b"}", Slot::Statement)?);
                            self.expect_close(b'}')?;
                        }
                        props.push(Property {
                            key,
                            value: Expr::Opaque(body),
                        });
                    }
                    (None, Some(b':')) => {
                        self.s.bump();
                        let value = self.parse_expression(b",}")?;
                        if let Some(last) = props.last_mut() {
                            last.value = Expr::Opaque(vec![last.value.clone(), value]);
                        }
                    }
                    _ => return self.bail_object(props),
                }
            }

            self.trivia()?;
            if !self.s.eat(b',') && self.s.peek() != Some(b'}') && !self.s.is_eof() {
                return self.bail_object(props);
            }
        }
    }

    /// The braces turned out not to hold an object literal we understand;
    /// scan the rest loosely and keep whatever was collected.
    fn bail_object(&mut self, props: Vec<Property>) -> PResult<Expr> {
        let mut items: Vec<Expr> = props.into_iter().map(|p| p.value).collect();
        items.extend(self.parse_loose(b"}", Slot::Statement)?);
        self.expect_close(b'}')?;
        Ok(Expr::Opaque(items))
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    /// Parse an element at `<`. Returns `None` (with the cursor restored) when
    /// the `<` turns out to open a generic parameter list.
    fn parse_element(&mut self) -> PResult<Option<Element>> {
        let start = self.s.mark();
        let line = self.s.line();
        self.s.bump();
        self.trivia()?;

        let name = if self.s.peek() == Some(b'>') {
            ElementName::Fragment
        } else {
            let name = self.parse_element_name();
            self.trivia()?;
            if self.s.peek() == Some(b',') || self.eat_word("extends") {
                self.s.reset(start);
                return Ok(None);
            }
            name
        };

        self.enter()?;
        let display = name.display();
        let mut element = Element {
            name,
            attributes: vec![],
            children: vec![],
            line,
        };

        if !self.parse_attributes(&mut element, &display)? {
            self.leave();
            return Ok(Some(element));
        }

        self.open_tags.push(display.clone());
        let result = self.parse_children(&mut element, &display);
        self.open_tags.pop();
        result?;

        self.leave();
        Ok(Some(element))
    }

    fn parse_element_name(&mut self) -> ElementName {
        let first = self.s.ident(true).unwrap_or_default().to_string();
        if self.s.peek() == Some(b':') && self.s.peek_at(1).is_some_and(is_ident_start) {
            self.s.bump();
            let name = self.s.ident(true).unwrap_or_default().to_string();
            return ElementName::Namespaced {
                namespace: first,
                name,
            };
        }

        let mut parts = vec![first];
        while self.s.peek() == Some(b'.') && self.s.peek_at(1).is_some_and(is_ident_start) {
            self.s.bump();
            parts.push(self.s.ident(true).unwrap_or_default().to_string());
        }
        if parts.len() == 1 {
            ElementName::Ident(parts.remove(0))
        } else {
            ElementName::Member(parts)
        }
    }

    /// Parse attributes up to `>` or `/>`. Returns whether children follow.
    fn parse_attributes(&mut self, element: &mut Element, display: &str) -> PResult<bool> {
        loop {
            self.trivia()?;
            let line = self.s.line();
            match self.s.peek() {
                None => {
                    self.diag(element.line, format!("unclosed element <{display}>"))?;
                    return Ok(false);
                }
                Some(b'/') => {
                    self.s.bump();
                    self.trivia()?;
                    if !self.s.eat(b'>') {
                        self.diag(line, format!("expected '>' after '/' in <{display}>"))?;
                    }
                    return Ok(false);
                }
                Some(b'>') => {
                    self.s.bump();
                    return Ok(true);
                }
                Some(b'{') => {
                    self.s.bump();
                    self.trivia()?;
                    if self.s.eat_str("...") {
                        let expr = self.parse_expression(b"}")?;
                        element.attributes.push(Attribute::Spread(expr));
                    } else {
                        self.diag(line, format!("unexpected expression in attributes of <{display}>"))?;
                        self.parse_loose(b"}", Slot::Expression)?;
                    }
                    self.expect_close(b'}')?;
                }
                Some(b) if is_ident_start(b) => {
                    let mut name = self.s.ident(true).unwrap_or_default().to_string();
                    if self.s.peek() == Some(b':') && self.s.peek_at(1).is_some_and(is_ident_start) {
                        self.s.bump();
                        name.push(':');
                        name.push_str(self.s.ident(true).unwrap_or_default());
                    }
                    self.trivia()?;
                    let value = if self.s.eat(b'=') {
                        self.trivia()?;
                        self.parse_attribute_value(&name, display)?
                    } else {
                        None
                    };
                    element.attributes.push(Attribute::Named { name, value, line });
                }
                Some(b) => {
                    self.s.bump();
                    self.diag(
                        line,
                        format!("unexpected character '{}' in <{display}>", b as char),
                    )?;
                }
            }
        }
    }

    fn parse_attribute_value(&mut self, name: &str, display: &str) -> PResult<Option<AttrValue>> {
        let line = self.s.line();
        match self.s.peek() {
            Some(q @ (b'"' | b'\'')) => Ok(Some(AttrValue::Str(self.parse_attribute_string(q)?))),
            Some(b'{') => {
                self.s.bump();
                let expr = self.parse_expression(b"}")?;
                self.expect_close(b'}')?;
                Ok(Some(AttrValue::Expr(expr)))
            }
            Some(b'<') if self.element_ahead() => Ok(self
                .parse_element()?
                .map(|el| AttrValue::Expr(Expr::Element(el)))),
            _ => {
                self.diag(line, format!("missing value for attribute '{name}' in <{display}>"))?;
                Ok(None)
            }
        }
    }

    fn parse_children(&mut self, element: &mut Element, display: &str) -> PResult<()> {
        loop {
            match self.s.peek() {
                None => {
                    self.diag(element.line, format!("unclosed element <{display}>"))?;
                    return Ok(());
                }
                Some(b'<') if self.s.peek_at(1) == Some(b'/') => {
                    let close_start = self.s.mark();
                    let line = self.s.line();
                    self.s.eat_str("</");
                    self.trivia()?;
                    let closing = if self.s.peek() == Some(b'>') {
                        String::new()
                    } else {
                        self.parse_element_name().display()
                    };
                    self.trivia()?;

                    if closing == display {
                        if !self.s.eat(b'>') {
                            self.diag(line, format!("expected '>' to close </{display}>"))?;
                        }
                        return Ok(());
                    }

                    let ancestors = &self.open_tags[..self.open_tags.len().saturating_sub(1)];
                    if ancestors.iter().any(|tag| *tag == closing) {
                        // Leave the closer for the ancestor it belongs to.
                        self.s.reset(close_start);
                        self.diag(
                            element.line,
                            format!("element <{display}> is not closed before </{closing}>"),
                        )?;
                        return Ok(());
                    }

                    self.diag(
                        line,
                        format!("unexpected closing tag </{closing}> inside <{display}>"),
                    )?;
                    while let Some(b) = self.s.bump() {
                        if b == b'>' {
                            break;
                        }
                    }
                }
                Some(b'<') if self.element_ahead() => match self.parse_element()? {
                    Some(child) => element.children.push(Expr::Element(child)),
                    None => {
                        self.s.bump();
                    }
                },
                Some(b'{') => {
                    self.s.bump();
                    self.trivia()?;
                    if self.s.eat(b'}') {
                        continue;
                    }
                    let expr = self.parse_expression(b"}")?;
                    self.expect_close(b'}')?;
                    element.children.push(expr);
                }
                Some(_) => {
                    self.s.bump();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn parse_import(&mut self) -> PResult<()> {
        let mut locals: Vec<(String, String)> = vec![];
        self.trivia()?;

        if let Some(q @ (b'\'' | b'"')) = self.s.peek() {
            self.parse_string(q)?;
            return Ok(());
        }

        loop {
            self.trivia()?;
            match self.s.peek() {
                Some(b'*') => {
                    self.s.bump();
                    self.trivia()?;
                    self.eat_word("as");
                    self.trivia()?;
                    if let Some(local) = self.s.ident(false) {
                        locals.push(("*".to_string(), local.to_string()));
                    }
                }
                Some(b'{') => {
                    self.s.bump();
                    self.parse_import_specifiers(&mut locals)?;
                }
                Some(b',') => {
                    self.s.bump();
                }
                Some(b) if is_ident_start(b) => {
                    if self.eat_word("from") {
                        break;
                    }
                    let word = self.s.ident(false).unwrap_or_default().to_string();
                    self.trivia()?;
                    let type_only = word == "type"
                        && self
                            .s
                            .peek()
                            .is_some_and(|b| b == b'{' || (is_ident_start(b) && !self.s.starts_with("from")));
                    if !type_only {
                        locals.push(("default".to_string(), word));
                    }
                }
                _ => break,
            }
        }

        self.trivia()?;
        let source = match self.s.peek() {
            Some(q @ (b'\'' | b'"')) => self.parse_string(q)?,
            _ => {
                let line = self.s.line();
                self.diag(line, "expected module specifier in import")?;
                String::new()
            }
        };

        self.imports
            .extend(locals.into_iter().map(|(imported, local)| ImportBinding {
                imported,
                local,
                source: source.clone(),
            }));
        Ok(())
    }

    fn parse_import_specifiers(&mut self, locals: &mut Vec<(String, String)>) -> PResult<()> {
        loop {
            self.trivia()?;
            if self.s.eat(b'}') {
                return Ok(());
            }
            let imported = match self.s.peek() {
                Some(q @ (b'\'' | b'"')) => self.parse_string(q)?,
                Some(b) if is_ident_start(b) => {
                    let mut word = self.s.ident(false).unwrap_or_default().to_string();
                    self.trivia()?;
                    // `type Foo` inside braces.
                    if word == "type" && self.s.peek().is_some_and(is_ident_start) && !self.s.starts_with("as") {
                        word = self.s.ident(false).unwrap_or_default().to_string();
                    }
                    word
                }
                None => {
                    let line = self.s.line();
                    self.diag(line, "expected '}' in import")?;
                    return Ok(());
                }
                Some(_) => {
                    self.s.bump();
                    continue;
                }
            };
            self.trivia()?;
            let local = if self.eat_word("as") {
                self.trivia()?;
                self.s.ident(false).unwrap_or_default().to_string()
            } else {
                imported.clone()
            };
            locals.push((imported, local));
            self.trivia()?;
            self.s.eat(b',');
        }
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    fn parse_number(&mut self) -> Expr {
        let start = self.s.mark();
        let mut prev = 0u8;
        while let Some(b) = self.s.peek() {
            let exponent_sign = (b == b'+' || b == b'-') && matches!(prev, b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                prev = b;
                self.s.bump();
            } else {
                break;
            }
        }
        let text = self.s.slice(start).replace('_', "");
        let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok().map(|v| v as f64)
        } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2).ok().map(|v| v as f64)
        } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
            i64::from_str_radix(oct, 8).ok().map(|v| v as f64)
        } else {
            text.trim_end_matches('n').parse::<f64>().ok()
        };
        match value {
            Some(v) => Expr::Number(v),
            None => Expr::Opaque(vec![]),
        }
    }

    fn parse_string(&mut self, quote: u8) -> PResult<String> {
        let line = self.s.line();
        self.s.bump();
        let mut out = String::new();
        let mut chunk = self.s.mark();
        loop {
            match self.s.peek() {
                None | Some(b'\n') => {
                    out.push_str(self.s.slice(chunk));
                    self.diag(line, "unterminated string literal")?;
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(self.s.slice(chunk));
                    self.s.bump();
                    let escaped = self.s.mark();
                    match self.s.bump() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'\n') | None => {}
                        Some(_) => out.push_str(self.s.slice(escaped)),
                    }
                    chunk = self.s.mark();
                }
                Some(b) if b == quote => {
                    out.push_str(self.s.slice(chunk));
                    self.s.bump();
                    return Ok(out);
                }
                Some(_) => {
                    self.s.bump();
                }
            }
        }
    }

    /// Element attribute strings have no escapes and may span lines.
    fn parse_attribute_string(&mut self, quote: u8) -> PResult<String> {
        let line = self.s.line();
        self.s.bump();
        let start = self.s.mark();
        loop {
            match self.s.peek() {
                None => {
                    let text = self.s.slice(start).to_string();
                    self.diag(line, "unterminated attribute string")?;
                    return Ok(text);
                }
                Some(b) if b == quote => {
                    let text = self.s.slice(start).to_string();
                    self.s.bump();
                    return Ok(text);
                }
                Some(_) => {
                    self.s.bump();
                }
            }
        }
    }

    fn parse_template(&mut self) -> PResult<Expr> {
        let line = self.s.line();
        self.s.bump();
        let mut text = String::new();
        let mut substitutions = vec![];
        let mut has_substitution = false;
        let mut chunk = self.s.mark();

        loop {
            match self.s.peek() {
                None => return Err(FatalSyntaxError::UnterminatedTemplate { line }),
                Some(b'\\') => {
                    self.s.bump();
                    self.s.bump();
                }
                Some(b'`') => {
                    text.push_str(self.s.slice(chunk));
                    self.s.bump();
                    break;
                }
                Some(b'$') if self.s.peek_at(1) == Some(b'{') => {
                    text.push_str(self.s.slice(chunk));
                    self.s.eat_str("${");
                    has_substitution = true;
                    substitutions.extend(self.parse_loose(b"}", Slot::Expression)?);
                    if !self.s.eat(b'}') {
                        return Err(FatalSyntaxError::UnterminatedTemplate { line });
                    }
                    chunk = self.s.mark();
                }
                Some(_) => {
                    self.s.bump();
                }
            }
        }

        if has_substitution {
            Ok(Expr::Opaque(substitutions))
        } else {
            Ok(Expr::Str(text))
        }
    }

    fn skip_regex(&mut self) {
        self.s.bump();
        let mut in_class = false;
        while let Some(b) = self.s.peek() {
            match b {
                b'\n' => return,
                b'\\' => {
                    self.s.bump();
                }
                b'[' => in_class = true,
                b']' => in_class = false,
                b'/' if !in_class => {
                    self.s.bump();
                    self.s.ident(false);
                    return;
                }
                _ => {}
            }
            self.s.bump();
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "function"
            | "new"
            | "typeof"
            | "void"
            | "delete"
            | "await"
            | "yield"
            | "async"
            | "class"
            | "return"
            | "in"
            | "instanceof"
            | "of"
    )
}

fn keyword_slot(word: &str) -> Slot {
    match word {
        "return" | "typeof" | "instanceof" | "in" | "of" | "new" | "delete" | "void" | "throw"
        | "case" | "yield" | "await" | "default" | "extends" => Slot::Expression,
        "else" | "do" | "try" | "finally" | "const" | "let" | "var" | "export" => Slot::Statement,
        _ => Slot::AfterOperand,
    }
}
