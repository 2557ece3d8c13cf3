#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Quote,
    Atom,
    String,
    /// A malformed fragment; the lexeme holds the message.
    Error,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    /// Whether whitespace or a comment separates this token from the previous one.
    pub spaced: bool,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, '\n')) = next {
            self.line += 1;
        }
        next
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut skipped = false;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == ';' {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
            skipped = true;
        }
        skipped
    }

    fn atom(&mut self, start: usize, first: char) -> String {
        let mut end = start + first.len_utf8();
        while let Some(&(idx, ch)) = self.chars.peek() {
            if is_delimiter(ch) {
                break;
            }
            self.bump();
            end = idx + ch.len_utf8();
        }
        self.source[start..end].to_string()
    }

    fn string_literal(&mut self) -> (TokenKind, String) {
        let mut value = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                '"' => return (TokenKind::String, value),
                '\\' => match self.bump() {
                    Some((_, esc)) => match esc {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        other => value.push(other),
                    },
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        (TokenKind::Error, "unterminated string literal".to_string())
    }

    /// Never fails: malformed fragments become `Error` tokens so the parser
    /// can record them and keep going.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut spaced = true;
        loop {
            spaced |= self.skip_whitespace_and_comments();
            let line = self.line;
            let Some((start, ch)) = self.bump() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line,
                    spaced: true,
                });
                break;
            };

            let (kind, lexeme) = match ch {
                '(' => (TokenKind::LParen, "(".to_string()),
                ')' => (TokenKind::RParen, ")".to_string()),
                '\'' => (TokenKind::Quote, "'".to_string()),
                '"' => self.string_literal(),
                _ => (TokenKind::Atom, self.atom(start, ch)),
            };
            tokens.push(Token {
                kind,
                lexeme,
                line,
                spaced,
            });
            spaced = false;
        }
        tokens
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '\'' | '"' | ';')
}
