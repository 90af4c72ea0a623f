//! Expression parsing

use std::sync::Arc;

use crate::script::SyntaxError;
use crate::script::ast::*;
use crate::script::parser::Parser;
use crate::script::token::{Pos, TokenKind};

impl Parser {
    /// Parse a single expression (no bare tuples)
    pub(super) fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = if self.check(TokenKind::Lambda) {
            self.parse_lambda()
        } else {
            self.parse_ternary()
        };
        self.leave();
        result
    }

    /// Parse `a, b, c` as a tuple, or a single expression without a comma
    pub(super) fn parse_expression_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_expression()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }

        let pos = first.pos;
        let mut items = vec![first];
        while self.match_kind(TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), pos))
    }

    /// Parse an assignment target list (`i`, `i, v`, `(a, b)`)
    pub(super) fn parse_target_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_target_atom()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }

        let pos = first.pos;
        let mut items = vec![first];
        while self.match_kind(TokenKind::Comma) {
            if self.check(TokenKind::In) || self.check(TokenKind::Equal) {
                break;
            }
            items.push(self.parse_target_atom()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), pos))
    }

    fn parse_target_atom(&mut self) -> Result<Expr, SyntaxError> {
        if self.match_kind(TokenKind::LeftParen) {
            self.enter()?;
            let inner = self.parse_target_list()?;
            self.leave();
            self.consume(TokenKind::RightParen, "')'")?;
            return Ok(inner);
        }
        self.parse_postfix()
    }

    fn parse_lambda(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.advance().pos;
        let mut params = Vec::new();
        while !self.check(TokenKind::Colon) {
            let name = self.consume_name("a parameter name")?;
            let default = if self.match_kind(TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Colon, "':' after lambda parameters")?;

        let body = self.parse_expression()?;
        let body_pos = body.pos;
        let def = FunctionDef {
            name: "<lambda>".to_string(),
            params,
            body: vec![Stmt {
                kind: StmtKind::Return(Some(body)),
                pos: body_pos,
            }],
        };
        Ok(Expr::new(ExprKind::Lambda(Arc::new(def)), pos))
    }

    fn parse_ternary(&mut self) -> Result<Expr, SyntaxError> {
        let body = self.parse_or()?;
        if !self.check(TokenKind::If) {
            return Ok(body);
        }

        // `x if cond else y`; inside a comprehension the `if` belongs to the
        // comprehension, which is only reached via parse_or.
        self.advance();
        let test = self.parse_or()?;
        self.consume(TokenKind::Else, "'else' in conditional expression")?;
        let orelse = self.parse_expression()?;
        let pos = body.pos;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            pos,
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.match_kind(TokenKind::Or) {
            let right = self.parse_and()?;
            left = bool_op(BoolOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.match_kind(TokenKind::And) {
            let right = self.parse_not()?;
            left = bool_op(BoolOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::Not) {
            let pos = self.advance().pos;
            self.enter()?;
            let operand = self.parse_not();
            self.leave();
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand?),
                },
                pos,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();

        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => CmpOp::Eq,
                TokenKind::BangEqual => CmpOp::NotEq,
                TokenKind::Less => CmpOp::Lt,
                TokenKind::LessEqual => CmpOp::LtE,
                TokenKind::Greater => CmpOp::Gt,
                TokenKind::GreaterEqual => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if self.peek_kind_at(1) == TokenKind::In => {
                    self.advance();
                    CmpOp::NotIn
                }
                TokenKind::Is if self.peek_kind_at(1) == TokenKind::Not => {
                    self.advance();
                    CmpOp::IsNot
                }
                TokenKind::Is => CmpOp::Is,
                _ => break,
            };
            self.advance();
            ops.push((op, self.parse_arith()?));
        }

        if ops.is_empty() {
            return Ok(left);
        }
        let pos = left.pos;
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            pos,
        ))
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let pos = self.advance().pos;
        self.enter()?;
        let operand = self.parse_factor();
        self.leave();
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            pos,
        ))
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_postfix()?;
        if !self.match_kind(TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.parse_factor();
        self.leave();
        Ok(binary(BinOp::Pow, base, exponent?))
    }

    pub(super) fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek().kind {
                TokenKind::LeftParen => expr = self.parse_call(expr)?,
                TokenKind::LeftBracket => expr = self.parse_subscript(expr)?,
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.consume_name("an attribute name")?;
                    let pos = expr.pos;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call(&mut self, func: Expr) -> Result<Expr, SyntaxError> {
        self.advance();
        self.enter()?;
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::Star) || self.check(TokenKind::DoubleStar) {
                return Err(self.unexpected("an argument (argument unpacking is not supported)"));
            }

            if self.check(TokenKind::Name) && self.peek_kind_at(1) == TokenKind::Equal {
                let name = self.advance().lexeme;
                self.advance();
                if keywords.iter().any(|k| k.name == name) {
                    return Err(SyntaxError::new(
                        self.peek().pos,
                        format!("keyword argument repeated: {name}"),
                    ));
                }
                let value = self.parse_expression()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(SyntaxError::new(
                        self.peek().pos,
                        "positional argument follows keyword argument",
                    ));
                }
                let arg = self.parse_expression()?;
                if self.check(TokenKind::For) {
                    // Generator argument: `sum(x * 2 for x in xs)`
                    let pos = arg.pos;
                    args.push(self.parse_comprehension(arg, pos)?);
                } else {
                    args.push(arg);
                }
            }

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "')' after arguments")?;
        self.leave();

        let pos = func.pos;
        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                keywords,
            },
            pos,
        ))
    }

    fn parse_subscript(&mut self, value: Expr) -> Result<Expr, SyntaxError> {
        self.advance();
        self.enter()?;
        let first = self.parse_slice_item()?;
        let index = if self.check(TokenKind::Comma) {
            let pos = first.pos;
            let mut items = vec![first];
            while self.match_kind(TokenKind::Comma) {
                if self.check(TokenKind::RightBracket) {
                    break;
                }
                items.push(self.parse_slice_item()?);
            }
            Expr::new(ExprKind::Tuple(items), pos)
        } else {
            first
        };
        self.consume(TokenKind::RightBracket, "']'")?;
        self.leave();

        let pos = value.pos;
        Ok(Expr::new(
            ExprKind::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            },
            pos,
        ))
    }

    fn parse_slice_item(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.peek().pos;
        let lower = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if !self.match_kind(TokenKind::Colon) {
            return lower.ok_or_else(|| self.unexpected("an index"));
        }

        let ends_item =
            |p: &Parser| matches!(p.peek().kind, TokenKind::RightBracket | TokenKind::Comma);

        let upper = if self.check(TokenKind::Colon) || ends_item(self) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        let step = if self.match_kind(TokenKind::Colon) && !ends_item(self) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::Slice {
                lower: lower.map(Box::new),
                upper,
                step,
            },
            pos,
        ))
    }

    /// Parse `for target in iter [if cond]...` after a comprehension element
    fn parse_comprehension(&mut self, element: Expr, pos: Pos) -> Result<Expr, SyntaxError> {
        self.consume(TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        self.consume(TokenKind::In, "'in' in comprehension")?;
        let iter = self.parse_or()?;

        let mut conditions = Vec::new();
        while self.match_kind(TokenKind::If) {
            conditions.push(self.parse_or()?);
        }

        if self.check(TokenKind::For) {
            return Err(SyntaxError::new(
                self.peek().pos,
                "nested comprehensions are not supported",
            ));
        }

        Ok(Expr::new(
            ExprKind::ListComp {
                element: Box::new(element),
                target: Box::new(target),
                iter: Box::new(iter),
                conditions,
            },
            pos,
        ))
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let pos = token.pos;

        let kind = match token.kind {
            TokenKind::Int => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| SyntaxError::new(pos, "invalid integer literal"))?;
                ExprKind::Int(value)
            }
            TokenKind::Float => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| SyntaxError::new(pos, "invalid float literal"))?;
                ExprKind::Float(value)
            }
            TokenKind::Str | TokenKind::FStr => return self.parse_strings(),
            TokenKind::Name => {
                self.advance();
                ExprKind::Name(token.lexeme)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::None => {
                self.advance();
                ExprKind::None
            }
            TokenKind::LeftParen => return self.parse_parenthesized(),
            TokenKind::LeftBracket => return self.parse_list(),
            TokenKind::LeftBrace => return self.parse_dict(),
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expr::new(kind, pos))
    }

    fn parse_parenthesized(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.advance().pos;
        self.enter()?;

        if self.match_kind(TokenKind::RightParen) {
            self.leave();
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
        }

        let first = self.parse_expression()?;
        let expr = if self.check(TokenKind::For) {
            self.parse_comprehension(first, pos)?
        } else if self.check(TokenKind::Comma) {
            let mut items = vec![first];
            while self.match_kind(TokenKind::Comma) {
                if self.check(TokenKind::RightParen) {
                    break;
                }
                items.push(self.parse_expression()?);
            }
            Expr::new(ExprKind::Tuple(items), pos)
        } else {
            first
        };

        self.consume(TokenKind::RightParen, "')'")?;
        self.leave();
        Ok(expr)
    }

    fn parse_list(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.advance().pos;
        self.enter()?;

        let mut items = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            let first = self.parse_expression()?;
            if self.check(TokenKind::For) {
                let comp = self.parse_comprehension(first, pos)?;
                self.consume(TokenKind::RightBracket, "']' after comprehension")?;
                self.leave();
                return Ok(comp);
            }
            items.push(first);
            while self.match_kind(TokenKind::Comma) {
                if self.check(TokenKind::RightBracket) {
                    break;
                }
                items.push(self.parse_expression()?);
            }
        }

        self.consume(TokenKind::RightBracket, "']'")?;
        self.leave();
        Ok(Expr::new(ExprKind::List(items), pos))
    }

    fn parse_dict(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.advance().pos;
        self.enter()?;

        let mut entries = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let key = self.parse_expression()?;
            if !self.check(TokenKind::Colon) {
                return Err(SyntaxError::new(
                    key.pos,
                    "set literals are not supported",
                ));
            }
            self.advance();
            let value = self.parse_expression()?;
            if self.check(TokenKind::For) {
                return Err(SyntaxError::new(
                    self.peek().pos,
                    "dict comprehensions are not supported",
                ));
            }
            entries.push((key, value));
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightBrace, "'}'")?;
        self.leave();
        Ok(Expr::new(ExprKind::Dict(entries), pos))
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run an f-string
    fn parse_strings(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.peek().pos;
        let mut parts = Vec::new();
        let mut formatted = false;

        while matches!(self.peek().kind, TokenKind::Str | TokenKind::FStr) {
            let token = self.advance();
            if token.kind == TokenKind::FStr {
                formatted = true;
                parts.extend(self.fstring_parts(&token.lexeme, token.pos)?);
            } else {
                parts.push(FStringPart::Literal(token.lexeme));
            }
        }

        if !formatted {
            let text = parts
                .into_iter()
                .map(|part| match part {
                    FStringPart::Literal(s) => s,
                    FStringPart::Field { .. } => String::new(),
                })
                .collect();
            return Ok(Expr::new(ExprKind::Str(text), pos));
        }

        Ok(Expr::new(ExprKind::FString(parts), pos))
    }

    fn fstring_parts(&mut self, body: &str, pos: Pos) -> Result<Vec<FStringPart>, SyntaxError> {
        let chars: Vec<char> = body.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '{' => {
                    let end = field_end(&chars, i + 1).ok_or_else(|| {
                        SyntaxError::new(pos, "f-string: expecting '}'")
                    })?;
                    let field: String = chars[i + 1..end].iter().collect();
                    let (source, spec) = split_field(&field);
                    let source = source.trim();
                    if source.is_empty() {
                        return Err(SyntaxError::new(
                            pos,
                            "f-string: empty expression not allowed",
                        ));
                    }

                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    let expr = self.parse_fragment(source, pos)?;
                    parts.push(FStringPart::Field { expr, spec });
                    i = end + 1;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(SyntaxError::new(
                        pos,
                        "f-string: single '}' is not allowed",
                    ));
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }

        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(parts)
    }
}

/// Index of the `}` closing a replacement field that starts at `start`
fn field_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, &c) in chars[start..].iter().enumerate() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth == 0 => return Some(start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split `expr!r:spec` into the expression source and the format spec
fn split_field(field: &str) -> (&str, Option<String>) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let chars: Vec<(usize, char)> = field.char_indices().collect();

    for (n, &(idx, c)) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '!' if depth == 0 => {
                let conversion = chars.get(n + 1).map(|(_, c)| *c);
                let after = chars.get(n + 2).map(|(_, c)| *c);
                if matches!(conversion, Some('r' | 's' | 'a')) && matches!(after, None | Some(':')) {
                    let spec = after.map(|_| field[chars[n + 2].0 + 1..].to_string());
                    return (&field[..idx], spec);
                }
            }
            ':' if depth == 0 => return (&field[..idx], Some(field[idx + 1..].to_string())),
            _ => {}
        }
    }
    (field, None)
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    Expr::new(
        ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}

#[cfg(test)]
mod tests {
    use crate::script::ast::*;
    use crate::script::parse;

    fn expr(source: &str) -> Expr {
        let program = parse(source).unwrap();
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_of_arithmetic() {
        let e = expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary {
                op: BinOp::Add,
                right,
                ..
            } => assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative_and_binds_unary() {
        let e = expr("-2 ** 2");
        assert!(matches!(
            e.kind,
            ExprKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn chained_comparison() {
        let e = expr("0 <= x < 10");
        match e.kind {
            ExprKind::Compare { ops, .. } => {
                assert_eq!(ops.len(), 2);
                assert_eq!(ops[0].0, CmpOp::LtE);
                assert_eq!(ops[1].0, CmpOp::Lt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn not_in_and_is_not() {
        match expr("a not in b").kind {
            ExprKind::Compare { ops, .. } => assert_eq!(ops[0].0, CmpOp::NotIn),
            other => panic!("unexpected {other:?}"),
        }
        match expr("a is not None").kind {
            ExprKind::Compare { ops, .. } => assert_eq!(ops[0].0, CmpOp::IsNot),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn call_with_keywords() {
        match expr("plt.plot(xs, ys, label='a', color=\"red\")").kind {
            ExprKind::Call { func, args, keywords } => {
                assert_eq!(func.dotted_path().as_deref(), Some("plt.plot"));
                assert_eq!(args.len(), 2);
                assert_eq!(keywords.len(), 2);
                assert_eq!(keywords[0].name, "label");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn positional_after_keyword_is_an_error() {
        assert!(parse("f(a=1, 2)").is_err());
    }

    #[test]
    fn list_comprehension_with_condition() {
        match expr("[x * 2 for x in xs if x > 1]").kind {
            ExprKind::ListComp { conditions, .. } => assert_eq!(conditions.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn generator_argument_becomes_comprehension() {
        match expr("sum(x for x in xs)").kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(args[0].kind, ExprKind::ListComp { .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slices() {
        match expr("xs[1:-1]").kind {
            ExprKind::Subscript { index, .. } => match index.kind {
                ExprKind::Slice { lower, upper, step } => {
                    assert!(lower.is_some());
                    assert!(upper.is_some());
                    assert!(step.is_none());
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            expr("xs[::2]").kind,
            ExprKind::Subscript { .. }
        ));
    }

    #[test]
    fn tuples_and_dicts() {
        assert!(matches!(expr("(1, 2)").kind, ExprKind::Tuple(ref t) if t.len() == 2));
        assert!(matches!(expr("()").kind, ExprKind::Tuple(ref t) if t.is_empty()));
        assert!(matches!(expr("(1,)").kind, ExprKind::Tuple(ref t) if t.len() == 1));
        assert!(matches!(expr("{'a': 1, 'b': 2}").kind, ExprKind::Dict(ref d) if d.len() == 2));
    }

    #[test]
    fn set_literal_is_rejected() {
        let err = parse("{1, 2}").unwrap_err();
        assert!(err.message.contains("set literals"));
    }

    #[test]
    fn conditional_expression() {
        assert!(matches!(expr("a if b else c").kind, ExprKind::IfExp { .. }));
    }

    #[test]
    fn lambda_expression() {
        match expr("lambda x, y=2: x + y").kind {
            ExprKind::Lambda(def) => {
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].default.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(expr("'ab' \"cd\"").kind, ExprKind::Str("abcd".to_string()));
    }

    #[test]
    fn fstring_fields_and_specs() {
        match expr("f'total: {a + b:.2f} {{x}} {name!r}'").kind {
            ExprKind::FString(parts) => {
                assert_eq!(parts.len(), 4);
                assert_eq!(parts[0], FStringPart::Literal("total: ".to_string()));
                match &parts[1] {
                    FStringPart::Field { expr, spec } => {
                        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
                        assert_eq!(spec.as_deref(), Some(".2f"));
                    }
                    other => panic!("unexpected {other:?}"),
                }
                assert_eq!(parts[2], FStringPart::Literal(" {x} ".to_string()));
                match &parts[3] {
                    FStringPart::Field { spec, .. } => assert_eq!(*spec, None),
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fstring_errors() {
        assert!(parse("f'{}'").is_err());
        assert!(parse("f'{x'").is_err());
        assert!(parse("f'x}'").is_err());
    }

    #[test]
    fn fstring_with_dict_index_and_not_equal() {
        match expr("f\"{d['k']} {a != b}\"").kind {
            ExprKind::FString(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
