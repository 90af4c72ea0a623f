//! Front end for the snippet language
//!
//! Snippets are written in a small Python-flavoured language: indentation
//! blocks, functions, comprehensions, f-strings and `import` statements.
//! This module turns source text into a [`Program`] that the validator
//! inspects and the runtime executes. Parsing never runs any code.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::Program;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Pos, Token, TokenKind};

use thiserror::Error;

/// Source that could not be tokenized or parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("syntax error at {pos}: {message}")]
pub struct SyntaxError {
    pub pos: Pos,
    pub message: String,
}

impl SyntaxError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// Tokenize and parse a whole snippet
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_includes_position() {
        let err = SyntaxError::new(Pos::new(2, 5), "expected ':'");
        assert_eq!(err.to_string(), "syntax error at line 2, column 5: expected ':'");
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        assert!(parse("").unwrap().body.is_empty());
        assert!(parse("\n\n# only a comment\n").unwrap().body.is_empty());
    }

    proptest! {
        #[test]
        fn parse_never_panics(source in "\\PC{0,200}") {
            let _ = parse(&source);
        }

        #[test]
        fn parse_never_panics_on_code_like_input(
            source in "[a-z0-9_ ()\\[\\]{}:,.=+*/%<>!'\"\\n\\t#-]{0,200}"
        ) {
            let _ = parse(&source);
        }
    }
}
