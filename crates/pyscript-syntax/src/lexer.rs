//! Lexer for script source
//!
//! Produces a flat token stream in which indentation has already been turned into
//! `Indent`/`Dedent` tokens and logical line ends into `Newline`, so the parser never
//! has to look at whitespace. Newlines inside brackets are ignored (implicit line
//! joining) and a trailing backslash joins physical lines explicitly.

use crate::error::{SyntaxError, SyntaxResult};
use crate::span::Location;
use crate::token::{Token, TokenKind};

const TAB_SIZE: u32 = 8;

/// Lexer for tokenizing script source
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    indents: Vec<u32>,
    bracket_depth: u32,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Create a new lexer over the given source
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 0,
            indents: vec![0],
            bracket_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> SyntaxResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.bracket_depth == 0 && self.handle_indentation()? {
                continue;
            }

            let Some(ch) = self.current() else {
                break;
            };

            match ch {
                ' ' | '\t' | '\x0c' | '\r' => self.advance(),
                '\\' if self.is_line_continuation() => {
                    self.advance();
                    self.skip_line_end();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    let location = self.location();
                    self.advance();
                    if self.bracket_depth == 0 {
                        self.push_newline(location);
                        self.at_line_start = true;
                    }
                }
                _ => {
                    let token = self.next_token()?;
                    self.tokens.push(token);
                }
            }
        }

        self.finish()
    }

    fn finish(mut self) -> SyntaxResult<Vec<Token>> {
        let location = self.location();
        if self.bracket_depth > 0 {
            return Err(SyntaxError::new(
                "unexpected end of input: unclosed bracket",
                location,
            ));
        }
        self.push_newline(location);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, location));
        }
        self.tokens.push(Token::new(TokenKind::Eof, location));
        Ok(self.tokens)
    }

    /// Measure the indentation of a new line and emit layout tokens.
    ///
    /// Returns `true` when the line was blank or a comment and has been consumed.
    fn handle_indentation(&mut self) -> SyntaxResult<bool> {
        let mut width = 0u32;
        while let Some(ch) = self.current() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.current() {
            None => {
                self.at_line_start = false;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                self.skip_line_end();
                return Ok(true);
            }
            Some('\n') | Some('\r') => {
                self.skip_line_end();
                return Ok(true);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let location = self.location();
        let current = self.indents.last().copied().unwrap_or(0);

        if width > current {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, location));
        } else if width < current {
            while self.indents.last().is_some_and(|top| width < *top) {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, location));
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(SyntaxError::new(
                    "unindent does not match any outer indentation level",
                    location,
                ));
            }
        }

        Ok(false)
    }

    fn push_newline(&mut self, location: Location) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent));
        if needs_newline {
            self.tokens.push(Token::new(TokenKind::Newline, location));
        }
    }

    /// Read the next non-layout token
    fn next_token(&mut self) -> SyntaxResult<Token> {
        let location = self.location();
        let Some(ch) = self.current() else {
            return Ok(Token::new(TokenKind::Eof, location));
        };

        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit())) {
            return self.read_number(location);
        }

        if ch == '"' || ch == '\'' {
            let value = self.read_string(ch, false)?;
            return Ok(Token::new(TokenKind::Str(value), location));
        }

        if ch.is_alphabetic() || ch == '_' {
            return self.read_word(location);
        }

        self.advance();
        let kind = match ch {
            '(' | '[' | '{' => {
                self.bracket_depth += 1;
                match ch {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                }
            }
            ')' | ']' | '}' => {
                if self.bracket_depth == 0 {
                    return Err(SyntaxError::new(format!("unmatched '{ch}'"), location));
                }
                self.bracket_depth -= 1;
                match ch {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                }
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '+' => self.with_assign(TokenKind::Plus, TokenKind::PlusAssign),
            '-' => self.with_assign(TokenKind::Minus, TokenKind::MinusAssign),
            '%' => self.with_assign(TokenKind::Percent, TokenKind::PercentAssign),
            '*' if self.current() == Some('*') => {
                self.advance();
                TokenKind::DoubleStar
            }
            '*' => self.with_assign(TokenKind::Star, TokenKind::StarAssign),
            '/' if self.current() == Some('/') => {
                self.advance();
                self.with_assign(TokenKind::DoubleSlash, TokenKind::DoubleSlashAssign)
            }
            '/' => self.with_assign(TokenKind::Slash, TokenKind::SlashAssign),
            '=' => self.with_assign(TokenKind::Assign, TokenKind::Equal),
            '<' => self.with_assign(TokenKind::Less, TokenKind::LessEqual),
            '>' => self.with_assign(TokenKind::Greater, TokenKind::GreaterEqual),
            '!' if self.current() == Some('=') => {
                self.advance();
                TokenKind::NotEqual
            }
            other => {
                return Err(SyntaxError::new(
                    format!("invalid character '{other}'"),
                    location,
                ));
            }
        };

        Ok(Token::new(kind, location))
    }

    /// Return `with_eq` and consume a following `=`, else return `plain`
    fn with_assign(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.current() == Some('=') {
            self.advance();
            with_eq
        } else {
            plain
        }
    }

    fn read_word(&mut self, location: Location) -> SyntaxResult<Token> {
        let start = self.position;
        while self
            .current()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let word: String = self.chars[start..self.position].iter().collect();

        // String prefixes
        if let Some(quote @ ('"' | '\'')) = self.current() {
            match word.as_str() {
                "r" | "R" => {
                    let value = self.read_string(quote, true)?;
                    return Ok(Token::new(TokenKind::Str(value), location));
                }
                "u" | "U" => {
                    let value = self.read_string(quote, false)?;
                    return Ok(Token::new(TokenKind::Str(value), location));
                }
                "f" | "F" | "b" | "B" | "rb" | "br" | "fr" | "rf" => {
                    return Err(SyntaxError::new(
                        format!("string prefix '{word}' is not supported"),
                        location,
                    ));
                }
                _ => {}
            }
        }

        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Name(word));
        Ok(Token::new(kind, location))
    }

    fn read_number(&mut self, location: Location) -> SyntaxResult<Token> {
        let start = self.position;

        if self.current() == Some('0') {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let digits_start = self.position;
                while self
                    .current()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    self.advance();
                }
                let digits: String = self.chars[digits_start..self.position]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                let value = i64::from_str_radix(&digits, radix).map_err(|_| {
                    SyntaxError::new(format!("invalid base-{radix} literal"), location)
                })?;
                return Ok(Token::new(TokenKind::Int(value), location));
            }
        }

        let mut is_float = false;
        self.consume_digits();

        if self.current() == Some('.')
            && !self.peek().is_some_and(|c| c.is_alphabetic() || c == '_')
        {
            is_float = true;
            self.advance();
            self.consume_digits();
        }

        if matches!(self.current(), Some('e' | 'E')) {
            let exponent_follows = match self.peek() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                is_float = true;
                self.advance();
                if matches!(self.current(), Some('+' | '-')) {
                    self.advance();
                }
                self.consume_digits();
            }
        }

        let text: String = self.chars[start..self.position]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| SyntaxError::new("invalid float literal", location))?;
            Ok(Token::new(TokenKind::Float(value), location))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| SyntaxError::new("integer literal too large", location))?;
            Ok(Token::new(TokenKind::Int(value), location))
        }
    }

    fn consume_digits(&mut self) {
        while self
            .current()
            .is_some_and(|c| c.is_ascii_digit() || c == '_')
        {
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char, raw: bool) -> SyntaxResult<String> {
        let location = self.location();
        let triple = self.peek() == Some(quote) && self.peek_at(2) == Some(quote);
        let opening = if triple { 3 } else { 1 };
        for _ in 0..opening {
            self.advance();
        }

        let mut value = String::new();
        loop {
            let Some(ch) = self.current() else {
                return Err(SyntaxError::new("unterminated string literal", location));
            };

            if ch == quote {
                if !triple {
                    self.advance();
                    return Ok(value);
                }
                if self.peek() == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(value);
                }
            }

            if ch == '\n' && !triple {
                return Err(SyntaxError::new("unterminated string literal", location));
            }

            if ch == '\\' {
                self.advance();
                let Some(escaped) = self.current() else {
                    return Err(SyntaxError::new("unterminated string literal", location));
                };
                self.advance();
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
                    'x' => value.push(self.read_hex_escape(2, location)?),
                    'u' => value.push(self.read_hex_escape(4, location)?),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }

            value.push(ch);
            self.advance();
        }
    }

    fn read_hex_escape(&mut self, digits: usize, location: Location) -> SyntaxResult<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .current()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| SyntaxError::new("truncated \\x or \\u escape", location))?;
            code = code * 16 + digit;
            self.advance();
        }
        char::from_u32(code).ok_or_else(|| SyntaxError::new("invalid unicode escape", location))
    }

    fn skip_comment(&mut self) {
        while self.current().is_some_and(|c| c != '\n') {
            self.advance();
        }
    }

    fn skip_line_end(&mut self) {
        if self.current() == Some('\r') {
            self.advance();
        }
        if self.current() == Some('\n') {
            self.advance();
        }
    }

    fn is_line_continuation(&self) -> bool {
        match self.peek() {
            Some('\n') => true,
            Some('\r') => self.peek_at(2) == Some('\n'),
            _ => false,
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
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
    fn test_simple_expression() {
        assert_eq!(
            kinds("_score * 2"),
            vec![
                TokenKind::Name("_score".into()),
                TokenKind::Star,
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation() {
        let tokens = kinds("while True:\n    x = 1\n    break\ny = 2\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::While,
                TokenKind::True,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Break,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("y".into()),
                TokenKind::Assign,
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_blank_lines_and_comments_are_ignored() {
        let tokens = kinds("x = 1\n\n   # comment\n\ny = 2");
        assert_eq!(
            tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
            2
        );
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_dedent_at_eof() {
        let tokens = kinds("if x:\n    if y:\n        z");
        let dedents = tokens.iter().filter(|t| **t == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_input_ending_at_line_start() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(
            kinds("1\n"),
            vec![TokenKind::Int(1), TokenKind::Newline, TokenKind::Eof]
        );
        assert_eq!(kinds("x = 1\n\n").last(), Some(&TokenKind::Eof));
        let tokens = kinds("if x:\n    y\n");
        assert_eq!(
            &tokens[tokens.len() - 2..],
            &[TokenKind::Dedent, TokenKind::Eof]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("x = [1,\n     2]\n");
        assert_eq!(
            tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#"'hello ' "a\tb" r'\n'"#)[..3],
            [
                TokenKind::Str("hello ".into()),
                TokenKind::Str("a\tb".into()),
                TokenKind::Str("\\n".into()),
            ]
        );
        assert_eq!(
            kinds("'''multi\nline'''")[0],
            TokenKind::Str("multi\nline".into())
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1_000 0x1f 2.5 .5 1e3 3.")[..6],
            [
                TokenKind::Int(1000),
                TokenKind::Int(31),
                TokenKind::Float(2.5),
                TokenKind::Float(0.5),
                TokenKind::Float(1000.0),
                TokenKind::Float(3.0),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a //= b ** c != d")[..6],
            [
                TokenKind::Name("a".into()),
                TokenKind::DoubleSlashAssign,
                TokenKind::Name("b".into()),
                TokenKind::DoubleStar,
                TokenKind::Name("c".into()),
                TokenKind::NotEqual,
            ]
        );
    }

    #[test]
    fn test_reserved_keywords() {
        assert_eq!(kinds("class")[0], TokenKind::Reserved("class"));
    }

    #[test]
    fn test_errors_carry_location() {
        let err = Lexer::new("x = 1\ny = 'open").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.location, Location::new(2, 4));

        let err = Lexer::new("if x:\n        a\n    b\n").tokenize().unwrap_err();
        assert!(err.message.contains("unindent"));

        let err = Lexer::new("x = 99999999999999999999").tokenize().unwrap_err();
        assert_eq!(err.message, "integer literal too large");
    }
}
