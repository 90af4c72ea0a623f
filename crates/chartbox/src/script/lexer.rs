//! Lexical analysis (tokenization)
//!
//! Converts snippet source into tokens, synthesizing `Newline`, `Indent` and
//! `Dedent` tokens from line structure the way the parser expects them.
//! Newlines inside brackets are insignificant, as is a backslash directly
//! before a line break.

use crate::script::SyntaxError;
use crate::script::token::{Pos, Token, TokenKind};

/// Width a tab advances to
const TAB_WIDTH: usize = 8;

/// Lexer state for tokenizing source code
pub struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: u32,
    column: u32,
    /// Number of currently open brackets
    depth: usize,
    /// Indentation widths of the enclosing blocks
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Lexer whose positions start at `origin` (used for f-string fields)
    pub fn with_origin(source: &str, origin: Pos) -> Self {
        let mut lexer = Self::new(source);
        lexer.line = origin.line;
        lexer.column = origin.column;
        lexer
    }

    /// Tokenize the whole source
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                self.indentation()?;
            }

            self.skip_inline_whitespace()?;
            if self.is_at_end() {
                break;
            }

            if self.peek() == '\n' {
                self.advance();
                if self.depth == 0 {
                    self.push_newline();
                    self.at_line_start = true;
                }
                continue;
            }

            self.scan_token()?;
        }

        self.push_newline();
        let pos = self.pos();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", pos));
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", pos));
        Ok(self.tokens)
    }

    /// Measure the indentation of the next non-blank line and emit layout tokens
    fn indentation(&mut self) -> Result<(), SyntaxError> {
        let width = loop {
            let mut width = 0;
            while !self.is_at_end() {
                match self.peek() {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\r' | '\x0c' => {}
                    _ => break,
                }
                self.advance();
            }

            if self.is_at_end() {
                return Ok(());
            }

            match self.peek() {
                '\n' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                _ => break width,
            }
        };

        self.at_line_start = false;
        let pos = self.pos();
        let top = self.indents.last().copied().unwrap_or(0);

        if width > top {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, "", pos));
        } else if width < top {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, "", pos));
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(SyntaxError::new(
                    pos,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        Ok(())
    }

    fn skip_inline_whitespace(&mut self) -> Result<(), SyntaxError> {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    let pos = self.pos();
                    self.advance();
                    if self.peek() == '\r' {
                        self.advance();
                    }
                    if self.is_at_end() || self.peek() != '\n' {
                        return Err(SyntaxError::new(
                            pos,
                            "unexpected character after line continuation",
                        ));
                    }
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_token(&mut self) -> Result<(), SyntaxError> {
        let pos = self.pos();
        let c = self.peek();

        if c.is_alphabetic() || c == '_' {
            return self.identifier(pos);
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit()))
        {
            return self.number(pos);
        }
        if c == '"' || c == '\'' {
            return self.string(pos, false, false);
        }

        self.advance();
        let kind = match c {
            '(' => self.open(TokenKind::LeftParen),
            ')' => self.close(TokenKind::RightParen),
            '[' => self.open(TokenKind::LeftBracket),
            ']' => self.close(TokenKind::RightBracket),
            '{' => self.open(TokenKind::LeftBrace),
            '}' => self.close(TokenKind::RightBrace),
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '+' => self.either('=', TokenKind::PlusEqual, TokenKind::Plus),
            '%' => self.either('=', TokenKind::PercentEqual, TokenKind::Percent),
            '-' => {
                if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    self.either('=', TokenKind::MinusEqual, TokenKind::Minus)
                }
            }
            '*' => {
                if self.match_char('*') {
                    TokenKind::DoubleStar
                } else {
                    self.either('=', TokenKind::StarEqual, TokenKind::Star)
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.either('=', TokenKind::DoubleSlashEqual, TokenKind::DoubleSlash)
                } else {
                    self.either('=', TokenKind::SlashEqual, TokenKind::Slash)
                }
            }
            '=' => self.either('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.either('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.either('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '!' => {
                if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    return Err(SyntaxError::new(pos, "unexpected character '!'"));
                }
            }
            other => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        let lexeme: String = self.chars[self.offset_of(pos)..self.current].iter().collect();
        self.tokens.push(Token::new(kind, lexeme, pos));
        Ok(())
    }

    fn identifier(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        let start = self.current;
        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.current].iter().collect();

        // String prefixes: r"..", f"..", rb"..", fr".." and friends
        if !self.is_at_end() && (self.peek() == '"' || self.peek() == '\'') {
            let lower = text.to_ascii_lowercase();
            if matches!(lower.as_str(), "r" | "f" | "b" | "rf" | "fr" | "br" | "rb") {
                let raw = lower.contains('r');
                let fstr = lower.contains('f');
                return self.string(pos, raw, fstr);
            }
        }

        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Name);
        self.tokens.push(Token::new(kind, text, pos));
        Ok(())
    }

    fn number(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        let start = self.current;

        if self.peek() == '0' && matches!(self.peek_next(), Some('x' | 'X')) {
            self.advance();
            self.advance();
            while !self.is_at_end() && (self.peek().is_ascii_hexdigit() || self.peek() == '_') {
                self.advance();
            }
            let digits: String = self.chars[start + 2..self.current]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| SyntaxError::new(pos, "invalid hexadecimal literal"))?;
            self.tokens
                .push(Token::new(TokenKind::Int, value.to_string(), pos));
            return Ok(());
        }

        let mut is_float = false;
        self.digits();

        if !self.is_at_end()
            && self.peek() == '.'
            && !self
                .peek_next()
                .is_some_and(|n| n.is_alphabetic() || n == '_')
        {
            is_float = true;
            self.advance();
            self.digits();
        }

        if !self.is_at_end() && matches!(self.peek(), 'e' | 'E') {
            let next = self.peek_next();
            let signed = matches!(next, Some('+' | '-'))
                && self
                    .chars
                    .get(self.current + 2)
                    .is_some_and(|c| c.is_ascii_digit());
            if next.is_some_and(|c| c.is_ascii_digit()) || signed {
                is_float = true;
                self.advance();
                if signed {
                    self.advance();
                }
                self.digits();
            }
        }

        let text: String = self.chars[start..self.current]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if is_float {
            self.tokens.push(Token::new(TokenKind::Float, text, pos));
        } else {
            if text.parse::<i64>().is_err() {
                return Err(SyntaxError::new(pos, "integer literal is too large"));
            }
            self.tokens.push(Token::new(TokenKind::Int, text, pos));
        }
        Ok(())
    }

    fn digits(&mut self) {
        while !self.is_at_end() && (self.peek().is_ascii_digit() || self.peek() == '_') {
            self.advance();
        }
    }

    fn string(&mut self, pos: Pos, raw: bool, fstr: bool) -> Result<(), SyntaxError> {
        let quote = self.advance();
        let triple = self.peek_is(quote) && self.peek_next() == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(SyntaxError::new(pos, "unterminated string literal"));
            }

            let c = self.advance();
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek_is(quote) && self.peek_next() == Some(quote) {
                    self.advance();
                    self.advance();
                    break;
                }
                value.push(c);
                continue;
            }

            if c == '\n' && !triple {
                return Err(SyntaxError::new(pos, "unterminated string literal"));
            }

            if c != '\\' {
                value.push(c);
                continue;
            }

            if self.is_at_end() {
                return Err(SyntaxError::new(pos, "unterminated string literal"));
            }
            let escaped = self.advance();
            if raw {
                value.push('\\');
                value.push(escaped);
                continue;
            }
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' => value.push('\\'),
                '\'' => value.push('\''),
                '"' => value.push('"'),
                '\n' => {}
                'x' => value.push(self.hex_escape(pos, 2)?),
                'u' => value.push(self.hex_escape(pos, 4)?),
                other => {
                    value.push('\\');
                    value.push(other);
                }
            }
        }

        let kind = if fstr { TokenKind::FStr } else { TokenKind::Str };
        self.tokens.push(Token::new(kind, value, pos));
        Ok(())
    }

    fn hex_escape(&mut self, pos: Pos, len: usize) -> Result<char, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = if self.is_at_end() {
                None
            } else {
                self.advance().to_digit(16)
            };
            let digit = digit.ok_or_else(|| SyntaxError::new(pos, "truncated escape sequence"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| SyntaxError::new(pos, "invalid escape sequence"))
    }

    fn open(&mut self, kind: TokenKind) -> TokenKind {
        self.depth += 1;
        kind
    }

    fn close(&mut self, kind: TokenKind) -> TokenKind {
        self.depth = self.depth.saturating_sub(1);
        kind
    }

    fn either(&mut self, next: char, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.match_char(next) {
            matched
        } else {
            otherwise
        }
    }

    fn push_newline(&mut self) {
        match self.tokens.last() {
            None => {}
            Some(token) if matches!(token.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent) => {}
            Some(_) => {
                let pos = self.pos();
                self.tokens.push(Token::new(TokenKind::Newline, "", pos));
            }
        }
    }

    /// Index into `chars` of a token starting at `pos` on the current line
    fn offset_of(&self, pos: Pos) -> usize {
        self.current - (self.column - pos.column) as usize
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_is(&self, c: char) -> bool {
        !self.is_at_end() && self.peek() == c
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek_is(expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1"),
            vec![
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn indentation_produces_indent_and_dedent() {
        let source = "if x:\n    y = 1\nz = 2\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::If,
                TokenKind::Name,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn blank_lines_and_comments_do_not_affect_layout() {
        let source = "if x:\n\n    # comment\n    y = 1\n\n";
        let kinds = kinds(source);
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Indent).count(),
            1
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Dedent).count(),
            1
        );
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let source = "xs = [\n  1,\n  2,\n]\n";
        let kinds = kinds(source);
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
        assert!(!kinds.contains(&TokenKind::Indent));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = Lexer::new(r#"s = "a\tb\n\x41""#).tokenize().unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].lexeme, "a\tb\nA");
    }

    #[test]
    fn raw_and_triple_quoted_strings() {
        let tokens = Lexer::new("a = r'\\d+'\nb = '''x\ny'''").tokenize().unwrap();
        assert_eq!(tokens[2].lexeme, "\\d+");
        let triple = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Str)
            .nth(1)
            .unwrap();
        assert_eq!(triple.lexeme, "x\ny");
    }

    #[test]
    fn fstring_prefix() {
        let tokens = Lexer::new("f'{x:.2f}'").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FStr);
        assert_eq!(tokens[0].lexeme, "{x:.2f}");
    }

    #[test]
    fn numbers() {
        let tokens = Lexer::new("1_000 2.5 .5 1e3 0x1f 3.").tokenize().unwrap();
        let lexemes: Vec<_> = tokens.iter().take(6).map(|t| (t.kind, t.lexeme.as_str())).collect();
        assert_eq!(
            lexemes,
            vec![
                (TokenKind::Int, "1000"),
                (TokenKind::Float, "2.5"),
                (TokenKind::Float, ".5"),
                (TokenKind::Float, "1e3"),
                (TokenKind::Int, "31"),
                (TokenKind::Float, "3."),
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a //= b ** c != d")[..6],
            [
                TokenKind::Name,
                TokenKind::DoubleSlashEqual,
                TokenKind::Name,
                TokenKind::DoubleStar,
                TokenKind::Name,
                TokenKind::BangEqual,
            ]
        );
    }

    #[test]
    fn line_continuation() {
        let kinds = kinds("x = 1 + \\\n    2\n");
        assert!(!kinds.contains(&TokenKind::Indent));
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("s = 'abc").tokenize().unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 5));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = Lexer::new("if x:\n    y = 1\n  z = 2\n").tokenize().unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn unexpected_character() {
        let err = Lexer::new("x = 1 & 2").tokenize().unwrap_err();
        assert_eq!(err.message, "unexpected character '&'");
    }

    #[test]
    fn huge_integer_literal_is_rejected() {
        assert!(Lexer::new("99999999999999999999999").tokenize().is_err());
    }
}
