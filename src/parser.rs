use std::sync::Arc;

use crate::{
    diagnostics::{Location, ParserErrorList},
    lexer::{Lexer, Token, TokenKind},
    value::{CallNode, Literal, LiteralNode, Node, SymbolNode},
};

/// Parses `source` into its top-level forms.
///
/// Parsing never aborts: every form that could be built is returned, even
/// when the error list is non-empty.
pub fn parse(source: &str, label: &str) -> (Vec<Node>, ParserErrorList) {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens, label);
    let nodes = parser.parse_program();
    (nodes, parser.errors)
}

/// Deepest nesting of lists and quotes accepted before parsing gives up on a form.
pub const MAX_NESTING: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
    file: Arc<str>,
    errors: ParserErrorList,
}

impl Parser {
    fn new(tokens: Vec<Token>, label: &str) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
            file: Arc::from(label),
            errors: ParserErrorList::new(),
        }
    }

    fn parse_program(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        while !self.check(TokenKind::Eof) {
            let opener = self.peek().kind.clone();
            match self.parse_form() {
                Some(node) => nodes.push(node),
                // A failed list already consumed through its closing paren.
                None if !matches!(opener, TokenKind::LParen | TokenKind::Quote) => {
                    self.synchronize()
                }
                None => {}
            }
        }
        nodes
    }

    /// Consumes at least one token unless positioned at end of input.
    fn parse_form(&mut self) -> Option<Node> {
        let token = self.advance();
        let location = self.location(token.line);
        if matches!(token.kind, TokenKind::LParen | TokenKind::Quote) && self.depth >= MAX_NESTING {
            self.errors.add(
                Some(location),
                format!("nesting exceeds {MAX_NESTING} levels"),
            );
            if token.kind == TokenKind::LParen {
                self.skip_list();
            } else {
                self.skip_form();
            }
            return None;
        }
        match token.kind {
            TokenKind::LParen => {
                self.depth += 1;
                let list = self.parse_list(location);
                self.depth -= 1;
                list
            }
            TokenKind::RParen => {
                self.errors.add(Some(location), "unexpected `)`");
                None
            }
            TokenKind::Quote => {
                if self.check(TokenKind::Eof) || self.check(TokenKind::RParen) {
                    self.errors.add(Some(location), "quote is missing its form");
                    // At top level a following `)` belongs to the same fragment.
                    if self.depth == 0 && self.check(TokenKind::RParen) && !self.peek().spaced {
                        self.advance();
                    }
                    return None;
                }
                self.depth += 1;
                let quoted = self.parse_form();
                self.depth -= 1;
                let quoted = quoted?;
                let head = Node::Symbol(SymbolNode {
                    name: "quote".to_string(),
                    location: Some(location.clone()),
                });
                Some(Node::Call(CallNode {
                    items: vec![head, quoted].into(),
                    location: Some(location),
                }))
            }
            TokenKind::String => Some(Node::Literal(LiteralNode {
                value: Literal::Str(token.lexeme),
                location: Some(location),
            })),
            TokenKind::Atom => self.parse_atom(&token.lexeme, location),
            TokenKind::Error => {
                self.errors.add(Some(location), token.lexeme);
                None
            }
            TokenKind::Eof => {
                self.errors.add(Some(location), "unexpected end of input");
                None
            }
        }
    }

    fn parse_list(&mut self, location: Location) -> Option<Node> {
        let mut items = Vec::new();
        let mut failed = false;
        loop {
            if self.check(TokenKind::Eof) {
                self.errors.add(Some(location), "unterminated list");
                return None;
            }
            if self.check(TokenKind::RParen) {
                self.advance();
                break;
            }
            match self.parse_form() {
                Some(item) => items.push(item),
                None => failed = true,
            }
        }
        if failed {
            return None;
        }
        Some(Node::Call(CallNode {
            items: items.into(),
            location: Some(location),
        }))
    }

    fn parse_atom(&mut self, text: &str, location: Location) -> Option<Node> {
        let value = match text {
            "nil" => Literal::Nil,
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ if looks_numeric(text) => {
                if let Ok(n) = text.parse::<i64>() {
                    Literal::Int(n)
                } else if let Ok(n) = text.parse::<f64>() {
                    Literal::Float(n)
                } else {
                    self.errors
                        .add(Some(location), format!("invalid number literal `{text}`"));
                    return None;
                }
            }
            _ => {
                return Some(Node::Symbol(SymbolNode {
                    name: text.to_string(),
                    location: Some(location),
                }));
            }
        };
        Some(Node::Literal(LiteralNode {
            value,
            location: Some(location),
        }))
    }

    /// Skips the rest of a malformed fragment: every token glued to it
    /// without intervening whitespace. A glued `(` whose contents are glued
    /// to it too is skipped through its matching `)`, so the pieces of a
    /// list never surface as top-level forms.
    fn synchronize(&mut self) {
        while !self.check(TokenKind::Eof) && !self.peek().spaced {
            let token = self.advance();
            if token.kind == TokenKind::LParen && !self.peek().spaced {
                self.skip_list();
            }
        }
    }

    /// Consumes tokens through the `)` closing a list whose `(` was just
    /// consumed. Iterative, so arbitrarily deep input cannot exhaust the stack.
    fn skip_list(&mut self) {
        let mut depth = 1;
        while depth > 0 && !self.check(TokenKind::Eof) {
            match self.advance().kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
        }
    }

    /// Consumes one form, along with any quotes in front of it, without
    /// building it. Stops short of a `)` or end of input.
    fn skip_form(&mut self) {
        while self.check(TokenKind::Quote) {
            self.advance();
        }
        if self.check(TokenKind::Eof) || self.check(TokenKind::RParen) {
            return;
        }
        if self.advance().kind == TokenKind::LParen {
            self.skip_list();
        }
    }

    fn location(&self, line: usize) -> Location {
        Location::new(Arc::clone(&self.file), line)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }
}

fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_digit() => true,
        Some('+' | '-' | '.') => chars.next().is_some_and(|ch| ch.is_ascii_digit()),
        _ => false,
    }
}
