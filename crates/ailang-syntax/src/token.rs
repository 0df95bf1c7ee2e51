//! Token kinds produced by the AILANG lexer.

use ailang_common::Span;

/// A single lexed token. The token text is not stored; consumers slice the
/// original source with the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals and names.
    Ident,
    Int,
    Float,
    Str,

    // Keywords.
    KwModule,
    KwImport,
    KwType,
    KwExport,
    KwFunc,
    KwLet,
    KwLetRec,
    KwIn,
    KwIf,
    KwThen,
    KwElse,
    KwMatch,
    KwTrue,
    KwFalse,

    // Delimiters.
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Pipe,
    Backslash,
    Underscore,

    // Operators.
    Arrow,    // ->
    FatArrow, // =>
    Bang,     // !
    Assign,   // =
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    PlusPlus,
    Minus,
    Star,
    Slash,
    Percent,
    AmpAmp,
    PipePipe,

    // Terminators.
    Eof,
    Error,
}

impl TokenKind {
    /// Keyword lookup for identifier-shaped lexemes.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        Some(match text {
            "module" => TokenKind::KwModule,
            "import" => TokenKind::KwImport,
            "type" => TokenKind::KwType,
            "export" => TokenKind::KwExport,
            "func" => TokenKind::KwFunc,
            "let" => TokenKind::KwLet,
            "letrec" => TokenKind::KwLetRec,
            "in" => TokenKind::KwIn,
            "if" => TokenKind::KwIf,
            "then" => TokenKind::KwThen,
            "else" => TokenKind::KwElse,
            "match" => TokenKind::KwMatch,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            _ => return None,
        })
    }

    /// Human-readable name for parse error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Str => "string literal",
            TokenKind::KwModule => "`module`",
            TokenKind::KwImport => "`import`",
            TokenKind::KwType => "`type`",
            TokenKind::KwExport => "`export`",
            TokenKind::KwFunc => "`func`",
            TokenKind::KwLet => "`let`",
            TokenKind::KwLetRec => "`letrec`",
            TokenKind::KwIn => "`in`",
            TokenKind::KwIf => "`if`",
            TokenKind::KwThen => "`then`",
            TokenKind::KwElse => "`else`",
            TokenKind::KwMatch => "`match`",
            TokenKind::KwTrue => "`true`",
            TokenKind::KwFalse => "`false`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::Pipe => "`|`",
            TokenKind::Backslash => "`\\`",
            TokenKind::Underscore => "`_`",
            TokenKind::Arrow => "`->`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::Bang => "`!`",
            TokenKind::Assign => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::AmpAmp => "`&&`",
            TokenKind::PipePipe => "`||`",
            TokenKind::Eof => "end of input",
            TokenKind::Error => "invalid token",
        }
    }
}
