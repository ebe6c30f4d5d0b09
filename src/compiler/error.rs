//! Compile-time errors (spec.md §4.4): currently just the one closed case
//! spec.md names explicitly — an unsupported assignment target. Everything
//! else the compiler needs to reject (unknown escape, bad literal) is caught
//! earlier, by the lexer or parser.

use thiserror::Error;

use crate::lexer::token::Span;

#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error("cannot assign to this expression")]
    InvalidAssignmentTarget { span: Span },
    #[error("'break' outside a loop")]
    BreakOutsideLoop { span: Span },
    #[error("'cont' outside a loop")]
    ContOutsideLoop { span: Span },
    #[error("a catch clause's exception type must be a bare name")]
    InvalidCatchType { span: Span },
    #[error("invalid regex literal: {message}")]
    InvalidRegex { span: Span, message: String },
    #[error("invalid literal: {message}")]
    InvalidLiteral { span: Span, message: String },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::InvalidAssignmentTarget { span } => *span,
            CompileError::BreakOutsideLoop { span } => *span,
            CompileError::ContOutsideLoop { span } => *span,
            CompileError::InvalidCatchType { span } => *span,
            CompileError::InvalidRegex { span, .. } => *span,
            CompileError::InvalidLiteral { span, .. } => *span,
        }
    }
}
