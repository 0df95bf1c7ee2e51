//! The AILANG lexer.
//!
//! Converts source text into a token stream. Errors are collected rather
//! than aborting immediately, so a single pass can report every bad escape
//! and unterminated string in a file.

use ailang_common::{Code, Diagnostic, Span};

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};

/// The result of lexing: every token (terminated by `Eof`) plus any
/// diagnostics produced along the way.
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub errors: Vec<Diagnostic>,
}

/// Lex a whole source file.
pub fn lex(source: &str) -> LexOutput {
    let mut lexer = Lexer {
        cursor: Cursor::new(source),
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    LexOutput {
        tokens: lexer.tokens,
        errors: lexer.errors,
    }
}

struct Lexer<'src> {
    cursor: Cursor<'src>,
    tokens: Vec<Token>,
    errors: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) {
        loop {
            self.skip_trivia();
            let start = self.cursor.pos();
            let Some(c) = self.cursor.bump() else {
                self.push(TokenKind::Eof, start);
                break;
            };
            match c {
                '(' => self.push(TokenKind::LParen, start),
                ')' => self.push(TokenKind::RParen, start),
                '[' => self.push(TokenKind::LBracket, start),
                ']' => self.push(TokenKind::RBracket, start),
                '{' => self.push(TokenKind::LBrace, start),
                '}' => self.push(TokenKind::RBrace, start),
                ',' => self.push(TokenKind::Comma, start),
                ';' => self.push(TokenKind::Semi, start),
                ':' => self.push(TokenKind::Colon, start),
                '\\' => self.push(TokenKind::Backslash, start),
                '.' => {
                    if self.cursor.peek() == Some('.') && self.cursor.peek2() == Some('.') {
                        self.cursor.bump();
                        self.cursor.bump();
                        self.push(TokenKind::Ellipsis, start);
                    } else {
                        self.push(TokenKind::Dot, start);
                    }
                }
                '|' => {
                    if self.eat('|') {
                        self.push(TokenKind::PipePipe, start);
                    } else {
                        self.push(TokenKind::Pipe, start);
                    }
                }
                '&' => {
                    if self.eat('&') {
                        self.push(TokenKind::AmpAmp, start);
                    } else {
                        self.error_token(start, "unexpected character `&`");
                    }
                }
                '-' => {
                    if self.eat('>') {
                        self.push(TokenKind::Arrow, start);
                    } else {
                        self.push(TokenKind::Minus, start);
                    }
                }
                '=' => {
                    if self.eat('=') {
                        self.push(TokenKind::EqEq, start);
                    } else if self.eat('>') {
                        self.push(TokenKind::FatArrow, start);
                    } else {
                        self.push(TokenKind::Assign, start);
                    }
                }
                '!' => {
                    if self.eat('=') {
                        self.push(TokenKind::NotEq, start);
                    } else {
                        self.push(TokenKind::Bang, start);
                    }
                }
                '<' => {
                    if self.eat('=') {
                        self.push(TokenKind::LtEq, start);
                    } else {
                        self.push(TokenKind::Lt, start);
                    }
                }
                '>' => {
                    if self.eat('=') {
                        self.push(TokenKind::GtEq, start);
                    } else {
                        self.push(TokenKind::Gt, start);
                    }
                }
                '+' => {
                    if self.eat('+') {
                        self.push(TokenKind::PlusPlus, start);
                    } else {
                        self.push(TokenKind::Plus, start);
                    }
                }
                '*' => self.push(TokenKind::Star, start),
                '/' => self.push(TokenKind::Slash, start),
                '%' => self.push(TokenKind::Percent, start),
                '"' => self.lex_string(start),
                '_' => {
                    // `_` alone is the wildcard; `_foo` is an identifier
                    // (the convention for builtin names).
                    if self.cursor.peek().is_some_and(is_ident_continue) {
                        self.cursor.eat_while(is_ident_continue);
                        self.push(TokenKind::Ident, start);
                    } else {
                        self.push(TokenKind::Underscore, start);
                    }
                }
                c if c.is_ascii_digit() => self.lex_number(start),
                c if is_ident_start(c) => {
                    self.cursor.eat_while(is_ident_continue);
                    let text = self.cursor.slice(start, self.cursor.pos());
                    let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Ident);
                    self.push(kind, start);
                }
                c => self.error_token(start, &format!("unexpected character {:?}", c)),
            }
        }
    }

    /// Skip whitespace and `--` line comments.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor.eat_while(|c| c.is_whitespace());
            if self.cursor.peek() == Some('-') && self.cursor.peek2() == Some('-') {
                self.cursor.eat_while(|c| c != '\n');
            } else {
                return;
            }
        }
    }

    fn lex_number(&mut self, start: u32) {
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let mut is_float = false;
        // A fraction needs a digit after the dot, otherwise `1.x` is a
        // record access on an integer (rejected later by the type checker,
        // but it must lex as Int Dot Ident).
        if self.cursor.peek() == Some('.') && self.cursor.peek2().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.cursor.bump();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.cursor.peek(), Some('e' | 'E')) {
            let after_e = self.cursor.peek2();
            let exp_ok = match after_e {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => true,
                _ => false,
            };
            if exp_ok {
                is_float = true;
                self.cursor.bump();
                if matches!(self.cursor.peek(), Some('+' | '-')) {
                    self.cursor.bump();
                }
                if !self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.errors.push(
                        Diagnostic::new(Code::ParUnexpected, "exponent requires digits")
                            .with_span(Span::new(start, self.cursor.pos())),
                    );
                }
                self.cursor.eat_while(|c| c.is_ascii_digit());
            }
        }
        let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        self.push(kind, start);
    }

    fn lex_string(&mut self, start: u32) {
        loop {
            match self.cursor.bump() {
                None => {
                    self.errors.push(
                        Diagnostic::new(Code::ParUnterminated, "unterminated string literal")
                            .with_span(Span::new(start, self.cursor.pos())),
                    );
                    self.push(TokenKind::Error, start);
                    return;
                }
                Some('"') => {
                    self.push(TokenKind::Str, start);
                    return;
                }
                Some('\\') => match self.cursor.bump() {
                    Some('n' | 't' | 'r' | '\\' | '"' | '0') => {}
                    Some(c) => {
                        self.errors.push(
                            Diagnostic::new(
                                Code::ParUnexpected,
                                format!("invalid escape sequence `\\{}`", c),
                            )
                            .with_span(Span::new(start, self.cursor.pos())),
                        );
                    }
                    None => {}
                },
                Some('\n') => {
                    self.errors.push(
                        Diagnostic::new(Code::ParUnterminated, "unterminated string literal")
                            .with_span(Span::new(start, self.cursor.pos())),
                    );
                    self.push(TokenKind::Error, start);
                    return;
                }
                Some(_) => {}
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.cursor.peek() == Some(expected) {
            self.cursor.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, start: u32) {
        self.tokens
            .push(Token::new(kind, Span::new(start, self.cursor.pos())));
    }

    fn error_token(&mut self, start: u32, message: &str) {
        self.errors.push(
            Diagnostic::new(Code::ParUnexpected, message)
                .with_span(Span::new(start, self.cursor.pos())),
        );
        self.push(TokenKind::Error, start);
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
