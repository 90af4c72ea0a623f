//! Statement parsing

use std::sync::Arc;

use crate::script::SyntaxError;
use crate::script::ast::*;
use crate::script::parser::Parser;
use crate::script::token::TokenKind;

/// Python keywords the snippet language does not implement; they lex as
/// names, so they are caught here to give a useful message
const UNSUPPORTED: &[&str] = &[
    "class", "with", "yield", "global", "nonlocal", "del", "assert", "async", "await", "finally",
];

impl Parser {
    /// Parse one logical line or compound statement
    ///
    /// Simple statements separated by `;` come back as several statements.
    pub(super) fn parse_statement(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        match self.peek().kind {
            TokenKind::If => Ok(vec![self.parse_if()?]),
            TokenKind::While => Ok(vec![self.parse_while()?]),
            TokenKind::For => Ok(vec![self.parse_for()?]),
            TokenKind::Def => Ok(vec![self.parse_def()?]),
            TokenKind::Try => Ok(vec![self.parse_try()?]),
            TokenKind::Indent => Err(SyntaxError::new(
                self.peek().pos,
                "unexpected indent",
            )),
            _ => self.parse_simple_line(),
        }
    }

    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = vec![self.parse_simple()?];
        while self.match_kind(TokenKind::Semicolon) {
            if self.check(TokenKind::Newline) || self.check(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_simple()?);
        }

        if !self.match_kind(TokenKind::Newline) && !self.check(TokenKind::Eof) {
            return Err(self.unexpected("end of line"));
        }
        Ok(stmts)
    }

    fn parse_simple(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.peek().pos;

        let kind = match self.peek().kind {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.starts_expression() {
                    StmtKind::Return(Some(self.parse_expression_list()?))
                } else {
                    StmtKind::Return(None)
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.starts_expression() {
                    StmtKind::Raise(Some(self.parse_expression()?))
                } else {
                    StmtKind::Raise(None)
                }
            }
            TokenKind::Import => self.parse_import()?,
            TokenKind::From => self.parse_from_import()?,
            TokenKind::Name
                if UNSUPPORTED.contains(&self.peek().lexeme.as_str())
                    && matches!(
                        self.peek_kind_at(1),
                        TokenKind::Name | TokenKind::Colon | TokenKind::Newline
                    ) =>
            {
                return Err(SyntaxError::new(
                    pos,
                    format!("'{}' statements are not supported", self.peek().lexeme),
                ));
            }
            _ => self.parse_expression_statement()?,
        };

        Ok(Stmt { kind, pos })
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        let first = self.parse_expression_list()?;

        let aug = match self.peek().kind {
            TokenKind::PlusEqual => Some(BinOp::Add),
            TokenKind::MinusEqual => Some(BinOp::Sub),
            TokenKind::StarEqual => Some(BinOp::Mul),
            TokenKind::SlashEqual => Some(BinOp::Div),
            TokenKind::DoubleSlashEqual => Some(BinOp::FloorDiv),
            TokenKind::PercentEqual => Some(BinOp::Mod),
            _ => None,
        };

        if let Some(op) = aug {
            self.advance();
            if !matches!(
                first.kind,
                ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. }
            ) {
                return Err(SyntaxError::new(
                    first.pos,
                    "illegal expression for augmented assignment",
                ));
            }
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.check(TokenKind::Equal) {
            return Ok(StmtKind::Expr(first));
        }

        let mut targets = vec![first];
        let mut value = None;
        while self.match_kind(TokenKind::Equal) {
            let next = self.parse_expression_list()?;
            if let Some(previous) = value.replace(next) {
                targets.push(previous);
            }
        }

        for target in &targets {
            check_target(target)?;
        }

        // The loop ran at least once because of the check above
        let value = value.ok_or_else(|| self.unexpected("expression"))?;
        Ok(StmtKind::Assign { targets, value })
    }

    /// Parse `: NEWLINE INDENT stmts DEDENT` or `: simple_stmt`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.consume(TokenKind::Colon, "':'")?;

        if !self.match_kind(TokenKind::Newline) {
            return self.parse_simple_line();
        }

        if !self.check(TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        self.advance();
        self.enter()?;

        let mut body = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            body.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        self.match_kind(TokenKind::Dedent);
        self.leave();
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.advance().pos;
        let mut branches = Vec::new();

        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        branches.push((test, body));

        let mut orelse = Vec::new();
        loop {
            if self.match_kind(TokenKind::Elif) {
                let test = self.parse_expression()?;
                let body = self.parse_block()?;
                branches.push((test, body));
            } else if self.match_kind(TokenKind::Else) {
                orelse = self.parse_block()?;
                break;
            } else {
                break;
            }
        }

        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            pos,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.advance().pos;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        self.reject_loop_else()?;
        Ok(Stmt {
            kind: StmtKind::While { test, body },
            pos,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.advance().pos;
        let target = self.parse_target_list()?;
        check_target(&target)?;
        self.consume(TokenKind::In, "'in'")?;
        let iter = self.parse_expression_list()?;
        let body = self.parse_block()?;
        self.reject_loop_else()?;
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body },
            pos,
        })
    }

    fn reject_loop_else(&self) -> Result<(), SyntaxError> {
        if self.check(TokenKind::Else) {
            return Err(SyntaxError::new(
                self.peek().pos,
                "'else' on loops is not supported",
            ));
        }
        Ok(())
    }

    fn parse_def(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.advance().pos;
        let name = self.consume_name("a function name")?;
        self.consume(TokenKind::LeftParen, "'(' after function name")?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::Star) || self.check(TokenKind::DoubleStar) {
                return Err(SyntaxError::new(
                    self.peek().pos,
                    "variadic parameters are not supported",
                ));
            }

            let param_pos = self.peek().pos;
            let param = self.consume_name("a parameter name")?;
            if params.iter().any(|p| p.name == param) {
                return Err(SyntaxError::new(
                    param_pos,
                    format!("duplicate argument '{param}' in function definition"),
                ));
            }

            // Annotations are accepted and ignored
            if self.match_kind(TokenKind::Colon) {
                self.parse_expression()?;
            }

            let default = if self.match_kind(TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(SyntaxError::new(
                        param_pos,
                        "non-default argument follows default argument",
                    ));
                }
                None
            };
            params.push(Param {
                name: param,
                default,
            });

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters")?;

        if self.match_kind(TokenKind::Arrow) {
            self.parse_expression()?;
        }

        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Arc::new(FunctionDef { name, params, body })),
            pos,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.advance().pos;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.check(TokenKind::Except) {
            let handler_pos = self.advance().pos;
            let kind = if self.check(TokenKind::Name) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            let binding = if kind.is_some() && self.match_kind(TokenKind::As) {
                Some(self.consume_name("a name after 'as'")?)
            } else {
                None
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kind,
                binding,
                body,
                pos: handler_pos,
            });
        }

        if handlers.is_empty() {
            return Err(self.unexpected("'except'"));
        }

        let orelse = if self.match_kind(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
            },
            pos,
        })
    }

    fn parse_import(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let alias = if self.match_kind(TokenKind::As) {
                Some(self.consume_name("a name after 'as'")?)
            } else {
                None
            };
            names.push(ImportAlias { name, alias });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        if self.check(TokenKind::Dot) {
            return Err(SyntaxError::new(
                self.peek().pos,
                "relative imports are not supported",
            ));
        }
        let module = self.parse_dotted_name()?;
        self.consume(TokenKind::Import, "'import'")?;

        if self.check(TokenKind::Star) {
            return Err(SyntaxError::new(
                self.peek().pos,
                "wildcard imports are not supported",
            ));
        }

        let parenthesized = self.match_kind(TokenKind::LeftParen);
        let mut names = Vec::new();
        loop {
            if parenthesized && self.check(TokenKind::RightParen) {
                break;
            }
            let name = self.consume_name("a name to import")?;
            let alias = if self.match_kind(TokenKind::As) {
                Some(self.consume_name("a name after 'as'")?)
            } else {
                None
            };
            names.push(ImportAlias { name, alias });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        if parenthesized {
            self.consume(TokenKind::RightParen, "')'")?;
        }
        if names.is_empty() {
            return Err(self.unexpected("a name to import"));
        }

        Ok(StmtKind::ImportFrom { module, names })
    }

    fn parse_dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut name = self.consume_name("a module name")?;
        while self.match_kind(TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.consume_name("a module name")?);
        }
        Ok(name)
    }
}

fn check_target(target: &Expr) -> Result<(), SyntaxError> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) if !items.is_empty() => {
            items.iter().try_for_each(check_target)
        }
        _ => Err(SyntaxError::new(target.pos, "cannot assign to expression")),
    }
}
