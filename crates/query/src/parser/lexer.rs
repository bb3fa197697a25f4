//! SQL tokenizer.
//!
//! Input is restricted to ASCII. Identifiers are either bare
//! (`[A-Za-z_][A-Za-z0-9_]*`, case preserved) or double-quoted (`"Order"`, with
//! `""` as an escaped quote); only bare identifiers can be keywords. String
//! literals use single quotes with `''` as an escaped quote.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use kvorm_core::{Error, Result};

/// SQL keywords recognised by the compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    As,
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    Like,
    Between,
    True,
    False,
    Join,
    Inner,
    Left,
    Outer,
    On,
}

impl Keyword {
    /// Looks up a bare word, case-insensitively.
    pub fn lookup(word: &str) -> Option<Keyword> {
        let kw = match word.to_ascii_uppercase().as_str() {
            "SELECT" => Keyword::Select,
            "FROM" => Keyword::From,
            "WHERE" => Keyword::Where,
            "AS" => Keyword::As,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "NOT" => Keyword::Not,
            "IS" => Keyword::Is,
            "NULL" => Keyword::Null,
            "IN" => Keyword::In,
            "LIKE" => Keyword::Like,
            "BETWEEN" => Keyword::Between,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            "JOIN" => Keyword::Join,
            "INNER" => Keyword::Inner,
            "LEFT" => Keyword::Left,
            "OUTER" => Keyword::Outer,
            "ON" => Keyword::On,
            _ => return None,
        };
        Some(kw)
    }
}

/// Token kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Bare or quoted identifier, unquoted.
    Ident(String),
    Keyword(Keyword),
    Integer(i64),
    Float(f64),
    Str(String),
    Star,
    Comma,
    Dot,
    LParen,
    RParen,
    Semicolon,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl TokenKind {
    #[inline]
    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self, TokenKind::Keyword(k) if *k == kw)
    }
}

/// A token and the byte offset it starts at.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Splits `input` into tokens. The last token is always `Eof`.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            let start = self.pos;
            let Some(b) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: start,
                });
                return Ok(tokens);
            };
            if !b.is_ascii() {
                return Err(Error::parse("non-ASCII character in query", start));
            }

            let kind = match b {
                b'*' => self.single(TokenKind::Star),
                b',' => self.single(TokenKind::Comma),
                b'.' if !matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) => {
                    self.single(TokenKind::Dot)
                }
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b';' => self.single(TokenKind::Semicolon),
                b'-' => self.single(TokenKind::Minus),
                b'=' => {
                    // Accept both `=` and `==`.
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                    }
                    TokenKind::Eq
                }
                b'!' if self.peek_at(1) == Some(b'=') => {
                    self.pos += 2;
                    TokenKind::Ne
                }
                b'<' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'=') => {
                            self.pos += 1;
                            TokenKind::Le
                        }
                        Some(b'>') => {
                            self.pos += 1;
                            TokenKind::Ne
                        }
                        _ => TokenKind::Lt,
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'\'' => TokenKind::Str(self.quoted(b'\'')?),
                b'"' => {
                    let name = self.quoted(b'"')?;
                    if name.is_empty() {
                        return Err(Error::parse("empty quoted identifier", start));
                    }
                    TokenKind::Ident(name)
                }
                b'0'..=b'9' | b'.' => self.number()?,
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let word = self.word();
                    match Keyword::lookup(&word) {
                        Some(kw) => TokenKind::Keyword(kw),
                        None => TokenKind::Ident(word),
                    }
                }
                other => {
                    return Err(Error::parse(
                        format!("unexpected character '{}'", other as char),
                        start,
                    ))
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        // Slice boundaries are ASCII, so this is valid UTF-8.
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    /// Reads a quoted run; a doubled quote character stands for itself.
    fn quoted(&mut self, quote: u8) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(Error::parse("unterminated quoted text", start)),
                Some(b) if b == quote => {
                    if self.peek_at(1) == Some(quote) {
                        out.push(quote);
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b) if !b.is_ascii() => {
                    return Err(Error::parse("non-ASCII character in query", self.pos))
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| Error::parse(format!("invalid number '{}'", text), start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| Error::parse(format!("invalid integer '{}'", text), start))
        }
    }
}
