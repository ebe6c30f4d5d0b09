//! vesper: a dynamically typed scripting language — lexer, parser, bytecode
//! compiler, object/type system, and a stack-based virtual machine.

pub mod ast;
pub mod cli;
pub mod compiler;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod runtime;
pub mod vm;
