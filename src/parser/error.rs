//! Syntax errors: the first unexpected token, the expected alternatives, and
//! a formatted source excerpt with a caret (spec.md §4.3), in the style of
//! the teacher's own pretty-error formatter (`cli/commands/parse.rs`).

use thiserror::Error;

use crate::lexer::token::{Span, TokenKind};

#[derive(Debug, Error, Clone)]
pub enum ParseError {
    #[error("unexpected {found}, expected {expected}")]
    Unexpected {
        found: String,
        expected: String,
        span: Span,
    },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget { span: Span },
    #[error("{0}")]
    Lex(#[from] crate::lexer::LexError),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Unexpected { span, .. } => *span,
            ParseError::InvalidAssignmentTarget { span } => *span,
            ParseError::Lex(e) => e.span(),
        }
    }

    pub fn unexpected(found: &TokenKind, expected: impl Into<String>, span: Span) -> Self {
        ParseError::Unexpected {
            found: found.to_string(),
            expected: expected.into(),
            span,
        }
    }

    /// A source excerpt with a caret under the offending column, matching
    /// the teacher's pretty-print style in `cli/commands/parse.rs`.
    pub fn render(&self, filename: &str, source: &str) -> String {
        let span = self.span();
        let line_text = source.lines().nth(span.start.line.saturating_sub(1) as usize).unwrap_or("");
        let caret = " ".repeat(span.start.column.saturating_sub(1) as usize) + "^";
        format!(
            "error: {}\n  --> {}:{}:{}\n{}\n{}",
            self, filename, span.start.line, span.start.column, line_text, caret
        )
    }
}
