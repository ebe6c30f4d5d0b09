//! Lexer (spec.md §4.2): bytes in, tokens out.

pub mod error;
pub mod scanner;
pub mod token;

pub use error::LexError;
pub use scanner::Scanner;
pub use token::{Position, Span, Token, TokenKind};

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Scanner::new(source).tokenize()
}
