//! Errors a whole run can fail with, spanning every pipeline stage (spec.md
//! §4.4/§4.5): a source file can fail to parse, fail to compile, or run to
//! completion with an uncaught exception. Distinct from `object::Exception`,
//! which is the in-language channel a running program itself observes.

use thiserror::Error;

use crate::compiler::error::CompileError;
use crate::object::exception::Exception;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("uncaught {0}")]
    Uncaught(Exception),
}
