// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::str::Chars;

use crate::ast::Span;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    StringLiteral(String),
    NumberLiteral(String),
    Dot,
    Pipe,
    Colon,
    Assign,
    Declare,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Operator(Operator),
    Keyword(Keyword),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Nil,
    True,
    False,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::Range => "range",
            Keyword::With => "with",
            Keyword::Nil => "nil",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        let keyword = match ident {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "range" => Keyword::Range,
            "with" => Keyword::With,
            "nil" => Keyword::Nil,
            "true" => Keyword::True,
            "false" => Keyword::False,
            _ => return None,
        };
        Some(keyword)
    }
}

/// Splits the body of a single action (the text between `{{` and `}}`) into
/// tokens. `offset` is the byte position of the body inside the template so
/// spans point into the original source.
pub fn lex_action(input: &str, offset: usize) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(input, offset);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    chars: Chars<'a>,
    pos: usize,
    offset: usize,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, offset: usize) -> Self {
        Self {
            chars: input.chars(),
            pos: 0,
            offset,
            peeked: None,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(chr) = self.bump_char() else {
            return Ok(None);
        };

        let kind = match chr {
            '.' => TokenKind::Dot,
            '|' => TokenKind::Pipe,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ':' => self.with_equals(TokenKind::Declare, TokenKind::Colon),
            '=' => self.with_equals(TokenKind::Operator(Operator::Equal), TokenKind::Assign),
            '<' => self.with_equals(
                TokenKind::Operator(Operator::LessOrEqual),
                TokenKind::Operator(Operator::Less),
            ),
            '>' => self.with_equals(
                TokenKind::Operator(Operator::GreaterOrEqual),
                TokenKind::Operator(Operator::Greater),
            ),
            '!' => {
                if self.peek_char() != Some('=') {
                    return Err(Error::parse_with_span(
                        "unexpected '!' without '='",
                        self.span_from(start),
                    ));
                }
                self.bump_char();
                TokenKind::Operator(Operator::NotEqual)
            }
            '"' => TokenKind::StringLiteral(self.read_string(start)?),
            '`' => TokenKind::StringLiteral(self.read_raw_string(start)?),
            c if is_identifier_start(c) => {
                let ident = self.read_identifier(c);
                match Keyword::from_ident(&ident) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Identifier(ident),
                }
            }
            c if c.is_ascii_digit() => TokenKind::NumberLiteral(self.read_number(c)),
            _ => {
                return Err(Error::parse(
                    format!("unexpected character '{}'", chr),
                    Some(self.span_from(start)),
                ));
            }
        };

        Ok(Some(Token {
            kind,
            span: self.span_from(start),
        }))
    }

    /// Consumes a trailing `=` and returns `paired`, or returns `single`.
    fn with_equals(&mut self, paired: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek_char() == Some('=') {
            self.bump_char();
            paired
        } else {
            single
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump_char();
        }
    }

    fn take_while(&mut self, into: &mut String, accept: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek_char() {
            if !accept(ch) {
                break;
            }
            into.push(ch);
            self.bump_char();
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::from(first);
        self.take_while(&mut ident, is_identifier_part);
        ident
    }

    fn read_number(&mut self, first: char) -> String {
        let mut literal = String::from(first);
        self.take_while(&mut literal, |ch| ch.is_ascii_digit() || ch == '.');
        literal
    }

    fn read_string(&mut self, start: usize) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            match ch {
                '"' => return Ok(literal),
                '\\' => {
                    let Some(next) = self.bump_char() else {
                        return Err(Error::parse_with_span(
                            "unterminated escape sequence",
                            self.span_from(start),
                        ));
                    };
                    literal.push(match next {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                other => literal.push(other),
            }
        }
        Err(Error::parse_with_span(
            "unterminated string literal",
            self.span_from(start),
        ))
    }

    fn read_raw_string(&mut self, start: usize) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            if ch == '`' {
                return Ok(literal);
            }
            literal.push(ch);
        }
        Err(Error::parse_with_span(
            "unterminated raw string literal",
            self.span_from(start),
        ))
    }

    fn bump_char(&mut self) -> Option<char> {
        let ch = match self.peeked.take() {
            Some(peek) => peek,
            None => self.chars.next()?,
        };
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn peek_char(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.offset + start, self.offset + self.pos)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}
