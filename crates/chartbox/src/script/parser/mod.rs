//! Parsing (tokens to AST)
//!
//! Recursive descent for statements and precedence climbing for
//! expressions. Nesting depth is bounded so that hostile input cannot
//! exhaust the stack of whichever thread does the parsing.

mod expr;
mod stmt;

use crate::script::SyntaxError;
use crate::script::ast::Program;
use crate::script::lexer::Lexer;
use crate::script::token::{Pos, Token, TokenKind};

/// Deepest allowed nesting of blocks and sub-expressions
pub const MAX_NESTING: usize = 64;

/// Parser state for building an AST from tokens
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Parse a whole program
    pub fn parse_program(mut self) -> Result<Program, SyntaxError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Eof) {
            body.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(Program { body })
    }

    /// Parse the expression inside an f-string replacement field
    fn parse_fragment(
        &mut self,
        source: &str,
        origin: Pos,
    ) -> Result<crate::script::ast::Expr, SyntaxError> {
        let tokens = Lexer::with_origin(source, origin).tokenize()?;
        let mut fragment = Parser {
            tokens,
            current: 0,
            depth: self.depth,
        };
        let expr = fragment.parse_expression_list()?;
        fragment.skip_newlines();
        if !fragment.check(TokenKind::Eof) {
            return Err(SyntaxError::new(
                origin,
                "f-string: expecting '}'",
            ));
        }
        Ok(expr)
    }

    // === Nesting guard ===

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::new(
                self.peek().pos,
                "too many nested blocks or parentheses",
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // === Token helpers ===

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn consume_name(&mut self, what: &str) -> Result<String, SyntaxError> {
        Ok(self.consume(TokenKind::Name, what)?.lexeme)
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Name | TokenKind::Int | TokenKind::Float => format!("'{}'", token.lexeme),
            kind if !token.lexeme.is_empty() && kind != TokenKind::Str && kind != TokenKind::FStr => {
                format!("'{}'", token.lexeme)
            }
            kind => kind.describe().to_string(),
        };
        SyntaxError::new(token.pos, format!("expected {expected}, found {found}"))
    }

    fn skip_newlines(&mut self) {
        while self.match_kind(TokenKind::Newline) {}
    }

    /// Whether the current token can begin an expression
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Str
                | TokenKind::FStr
                | TokenKind::Name
                | TokenKind::True
                | TokenKind::False
                | TokenKind::None
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::LeftBrace
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Not
                | TokenKind::Lambda
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::script::ast::*;
    use crate::script::parse;

    fn body(source: &str) -> Vec<Stmt> {
        parse(source).unwrap().body
    }

    #[test]
    fn semicolon_separated_statements() {
        let stmts = body("label='x'; value=5; write_chart(label, value)");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(stmts[2].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("x = {}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nested"));
    }

    #[test]
    fn moderate_nesting_is_fine() {
        let source = format!("x = {}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn error_reports_position() {
        let err = parse("x = 1\ny = (2 +\n").unwrap_err();
        assert_eq!(err.pos.line, 3);
    }

    #[test]
    fn unexpected_token_message() {
        let err = parse("x = = 2").unwrap_err();
        assert_eq!(err.message, "expected expression, found '='");
    }
}
