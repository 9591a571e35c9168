//! Tokenizer for statement text.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tarn_core::{Error, Result};

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare word: keyword or identifier, original case preserved.
    Word(String),
    /// `@name`, stored without the prefix.
    Param(String),
    /// `'text'`, with `''` unescaped to `'`.
    Str(String),
    Int(i64),
    Float(f64),
    Star,
    Comma,
    LParen,
    RParen,
    Eq,
    Semicolon,
    End,
}

impl Token {
    /// Returns true if this is the given keyword (case-insensitive).
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("'{}'", w),
            Token::Param(p) => format!("parameter @{}", p),
            Token::Str(_) => "string literal".into(),
            Token::Int(_) | Token::Float(_) => "number".into(),
            Token::Star => "'*'".into(),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Eq => "'='".into(),
            Token::Semicolon => "';'".into(),
            Token::End => "end of input".into(),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace();
        let position = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Spanned {
                    token: Token::End,
                    position,
                })
            }
        };

        let token = match c {
            '*' => self.single(Token::Star),
            ',' => self.single(Token::Comma),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '=' => self.single(Token::Eq),
            ';' => self.single(Token::Semicolon),
            '\'' => self.string(position)?,
            '@' => {
                self.advance();
                let name = self.take_while(is_ident_char);
                if name.is_empty() {
                    return Err(Error::parse("Expected parameter name after '@'", position));
                }
                Token::Param(name.into())
            }
            '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.advance();
                self.number(position, true)?
            }
            c if c.is_ascii_digit() => self.number(position, false)?,
            c if c.is_alphabetic() || c == '_' => Token::Word(self.take_while(is_ident_char).into()),
            other => {
                return Err(Error::parse(
                    format!("Unexpected character '{}'", other),
                    position,
                ))
            }
        };
        Ok(Spanned { token, position })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn string(&mut self, start: usize) -> Result<Token> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(Error::parse("Unterminated string literal", start)),
                Some('\'') => {
                    self.advance();
                    if self.peek() == Some('\'') {
                        out.push('\'');
                        self.advance();
                    } else {
                        return Ok(Token::Str(out));
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    fn number(&mut self, start: usize, negative: bool) -> Result<Token> {
        let digits_start = self.pos;
        self.take_while(|c| c.is_ascii_digit());
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[digits_start..self.pos];
        let sign = if negative { -1 } else { 1 };
        if is_float {
            text.parse::<f64>()
                .map(|f| Token::Float(f * sign as f64))
                .map_err(|_| Error::parse("Invalid number", start))
        } else {
            text.parse::<i64>()
                .map(|i| Token::Int(i * sign))
                .map_err(|_| Error::parse("Integer literal out of range", start))
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits statement text into tokens, ending with `Token::End`.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::End;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}
