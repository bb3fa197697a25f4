//! Query compiler: tokenizer and recursive-descent SELECT parser.

mod compiler;
pub mod lexer;

pub use compiler::{compile, Compiler, CompilerOptions};
pub(crate) use compiler::parse_predicate;
