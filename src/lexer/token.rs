//! Token kinds and source spans (spec.md §3 "Token", §4.2).

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords (spec.md §4.2's closed set, plus func/type/enum — SPEC_FULL.md §4.2)
    Import,
    Assert,
    Throw,
    Ret,
    Break,
    Cont,
    If,
    Elif,
    Else,
    While,
    For,
    Try,
    Catch,
    Finally,
    In,
    As,
    Func,
    Type,
    Enum,

    Ident(Rc<str>),
    Int { text: Rc<str>, radix: u32 },
    Float { text: Rc<str>, imaginary: bool },
    Str(Rc<str>),
    Regex(Rc<str>),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    At,

    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    Bang,
    PlusPlus,
    MinusMinus,
    Question,

    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    EqEqEq,

    AndAnd,
    OrOr,
    QuesQues,

    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    SlashSlashEq,
    PercentEq,
    AtEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    QuesQuesEq,
    AndAndEq,
    OrOrEq,

    Newline,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier `{}`", s),
            TokenKind::Int { text, .. } => write!(f, "integer `{}`", text),
            TokenKind::Float { text, .. } => write!(f, "float `{}`", text),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Regex(s) => write!(f, "regex `{}`", s),
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Newline => write!(f, "newline"),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
