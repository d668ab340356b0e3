use thiserror::Error;

pub mod ast;
mod parser;
mod token;

pub use parser::parse;
pub use token::{tokenize, Symbol, Token, TokenKind};

/// Parse failure with the offending input, the byte offset the parser
/// stopped at, and a description of what it expected there.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("syntax error at byte {offset}: expected {expected}")]
pub struct SyntaxError {
    pub input: String,
    pub offset: usize,
    pub expected: String,
}
