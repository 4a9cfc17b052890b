//! Parser for converting tokens into a syntax tree
//!
//! Recursive descent over the token stream produced by [`Lexer`], with one method per
//! grammar level for expressions. Context rules that Python reports at compile time
//! (`break` outside a loop, `return` outside a function) are enforced here so that a
//! tree which parses is also one the runtime can execute.

use crate::ast::{
    BinOp, BoolOp, CmpOp, Constant, Expr, ExprKind, FunctionDef, Param, Program, Stmt, StmtKind,
    UnaryOp,
};
use crate::error::{SyntaxError, SyntaxResult};
use crate::lexer::Lexer;
use crate::span::Location;
use crate::token::{Token, TokenKind};
use std::sync::Arc;

/// Maximum nesting of blocks and sub-expressions
const MAX_NESTING: usize = 100;

/// Parse script source into a [`Program`]
pub fn parse(source: &str) -> SyntaxResult<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

/// Parser for converting tokens into a syntax tree
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    loop_depth: usize,
    function_depth: usize,
    nesting: usize,
}

impl Parser {
    /// Create a new parser from a list of tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            loop_depth: 0,
            function_depth: 0,
            nesting: 0,
        }
    }

    /// Parse the tokens into a program
    pub fn parse_program(mut self) -> SyntaxResult<Program> {
        let mut body = Vec::new();
        loop {
            while self.check(&TokenKind::Newline) {
                self.advance();
            }
            if self.check(&TokenKind::Eof) {
                break;
            }
            self.parse_statement(&mut body)?;
        }
        Ok(Program { body })
    }

    // ---- statements -------------------------------------------------------

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> SyntaxResult<()> {
        match self.current().kind {
            TokenKind::If => out.push(self.parse_if()?),
            TokenKind::While => out.push(self.parse_while()?),
            TokenKind::For => out.push(self.parse_for()?),
            TokenKind::Def => out.push(self.parse_def()?),
            TokenKind::Indent => return Err(self.error_here("unexpected indent")),
            _ => self.parse_simple_line(out)?,
        }
        Ok(())
    }

    /// One or more `;`-separated small statements followed by a newline
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> SyntaxResult<()> {
        loop {
            out.push(self.parse_small_statement()?);
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
            if self.at_line_end() {
                break;
            }
        }
        if self.check(&TokenKind::Eof) {
            return Ok(());
        }
        self.expect(&TokenKind::Newline)?;
        Ok(())
    }

    fn parse_small_statement(&mut self) -> SyntaxResult<Stmt> {
        let location = self.current().location;
        let kind = match self.current().kind.clone() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'break' outside loop"));
                }
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'continue' not properly in loop"));
                }
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                if self.function_depth == 0 {
                    return Err(self.error_here("'return' outside function"));
                }
                self.advance();
                if self.at_line_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression_list()?))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_line_end() {
                    StmtKind::Raise(None)
                } else {
                    StmtKind::Raise(Some(self.parse_expression()?))
                }
            }
            TokenKind::Import => {
                self.advance();
                let mut module = self.expect_name()?;
                while self.eat(&TokenKind::Dot) {
                    module.push('.');
                    module.push_str(&self.expect_name()?);
                }
                let alias = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                StmtKind::Import { module, alias }
            }
            TokenKind::Del => {
                self.advance();
                let target = self.parse_expression()?;
                Self::check_target(&target, "delete")?;
                StmtKind::Delete(target)
            }
            TokenKind::Reserved(keyword) => {
                return Err(self.error_here(format!("'{keyword}' is not supported")));
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt::new(kind, location))
    }

    fn parse_expression_statement(&mut self) -> SyntaxResult<StmtKind> {
        let first = self.parse_expression_list()?;

        let aug_op = match self.current().kind {
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::DoubleSlashAssign => Some(BinOp::FloorDiv),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            _ => None,
        };
        if let Some(op) = aug_op {
            self.advance();
            if !matches!(
                first.kind,
                ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. }
            ) {
                return Err(SyntaxError::new(
                    "illegal expression for augmented assignment",
                    first.location,
                ));
            }
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.check(&TokenKind::Assign) {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat(&TokenKind::Assign) {
            exprs.push(self.parse_expression_list()?);
        }
        let value = exprs.pop().ok_or_else(|| self.error_here("invalid syntax"))?;
        for target in &exprs {
            Self::check_target(target, "assign to")?;
        }
        Ok(StmtKind::Assign {
            targets: exprs,
            value,
        })
    }

    fn check_target(target: &Expr, action: &str) -> SyntaxResult<()> {
        match &target.kind {
            ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. } => Ok(()),
            ExprKind::List(items) => items
                .iter()
                .try_for_each(|item| Self::check_target(item, action)),
            ExprKind::Constant(_) => Err(SyntaxError::new(
                format!("cannot {action} literal"),
                target.location,
            )),
            ExprKind::Call { .. } => Err(SyntaxError::new(
                format!("cannot {action} function call"),
                target.location,
            )),
            _ => Err(SyntaxError::new(
                format!("cannot {action} expression"),
                target.location,
            )),
        }
    }

    fn parse_if(&mut self) -> SyntaxResult<Stmt> {
        let location = self.advance().location;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;

        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_if()?]
        } else if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt::new(StmtKind::If { test, body, orelse }, location))
    }

    fn parse_while(&mut self) -> SyntaxResult<Stmt> {
        let location = self.advance().location;
        let test = self.parse_expression()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        if self.check(&TokenKind::Else) {
            return Err(self.error_here("'while ... else' is not supported"));
        }
        Ok(Stmt::new(StmtKind::While { test, body: body? }, location))
    }

    fn parse_for(&mut self) -> SyntaxResult<Stmt> {
        let location = self.advance().location;
        let mut targets = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            targets.push(self.expect_name()?);
        }
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expression()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        if self.check(&TokenKind::Else) {
            return Err(self.error_here("'for ... else' is not supported"));
        }
        Ok(Stmt::new(
            StmtKind::For {
                targets,
                iter,
                body: body?,
            },
            location,
        ))
    }

    fn parse_def(&mut self) -> SyntaxResult<Stmt> {
        let location = self.advance().location;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LeftParen)?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let param_location = self.current().location;
            let param_name = self.expect_name()?;
            if params.iter().any(|p| p.name == param_name) {
                return Err(SyntaxError::new(
                    format!("duplicate argument '{param_name}' in function definition"),
                    param_location,
                ));
            }
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(SyntaxError::new(
                        "non-default argument follows default argument",
                        param_location,
                    ));
                }
                None
            };
            params.push(Param {
                name: param_name,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;

        // Loops do not extend into a nested function body
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        let def = FunctionDef {
            name,
            params,
            body: body?,
            location,
        };
        Ok(Stmt::new(StmtKind::FunctionDef(Arc::new(def)), location))
    }

    /// `:` followed by an indented suite or by simple statements on the same line
    fn parse_block(&mut self) -> SyntaxResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        self.enter()?;

        let mut body = Vec::new();
        if !self.eat(&TokenKind::Newline) {
            self.parse_simple_line(&mut body)?;
            self.leave();
            return Ok(body);
        }

        if !self.eat(&TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        while !self.eat(&TokenKind::Dedent) {
            if self.check(&TokenKind::Eof) {
                break;
            }
            self.parse_statement(&mut body)?;
        }
        self.leave();
        Ok(body)
    }

    // ---- expressions ------------------------------------------------------

    /// Expression list; a bare comma-separated list evaluates to a list
    fn parse_expression_list(&mut self) -> SyntaxResult<Expr> {
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let location = first.location;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::List(items), location))
    }

    /// Parse a full expression, including the conditional form
    pub fn parse_expression(&mut self) -> SyntaxResult<Expr> {
        self.enter()?;
        let body = self.parse_or()?;
        let result = if self.eat(&TokenKind::If) {
            let test = self.parse_or()?;
            self.expect(&TokenKind::Else)?;
            let orelse = self.parse_expression()?;
            let location = body.location;
            Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                location,
            )
        } else {
            body
        };
        self.leave();
        Ok(result)
    }

    fn parse_or(&mut self) -> SyntaxResult<Expr> {
        self.parse_bool_chain(BoolOp::Or, &TokenKind::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> SyntaxResult<Expr> {
        self.parse_bool_chain(BoolOp::And, &TokenKind::And, Self::parse_not)
    }

    fn parse_bool_chain(
        &mut self,
        op: BoolOp,
        token: &TokenKind,
        operand: fn(&mut Self) -> SyntaxResult<Expr>,
    ) -> SyntaxResult<Expr> {
        let first = operand(self)?;
        if !self.check(token) {
            return Ok(first);
        }
        let location = first.location;
        let mut values = vec![first];
        while self.eat(token) {
            values.push(operand(self)?);
        }
        Ok(Expr::new(ExprKind::BoolOp { op, values }, location))
    }

    fn parse_not(&mut self) -> SyntaxResult<Expr> {
        if self.check(&TokenKind::Not) {
            let location = self.advance().location;
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                location,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> SyntaxResult<Expr> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.current().kind {
                TokenKind::Equal => CmpOp::Eq,
                TokenKind::NotEqual => CmpOp::NotEq,
                TokenKind::Less => CmpOp::Lt,
                TokenKind::LessEqual => CmpOp::LtE,
                TokenKind::Greater => CmpOp::Gt,
                TokenKind::GreaterEqual => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Is => {
                    if self.peek_kind() == Some(&TokenKind::Not) {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                TokenKind::Not if self.peek_kind() == Some(&TokenKind::In) => {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            ops.push((op, self.parse_arith()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let location = left.location;
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            location,
        ))
    }

    fn parse_arith(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> SyntaxResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> SyntaxResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_power();
        };
        let location = self.advance().location;
        self.enter()?;
        let operand = self.parse_factor()?;
        self.leave();

        // Fold negative literals so `-9223372036854775808`-style constants stay constants
        if op == UnaryOp::Neg {
            match operand.kind {
                ExprKind::Constant(Constant::Int(v)) => {
                    return Ok(Expr::new(ExprKind::Constant(Constant::Int(-v)), location));
                }
                ExprKind::Constant(Constant::Float(v)) => {
                    return Ok(Expr::new(ExprKind::Constant(Constant::Float(-v)), location));
                }
                _ => {}
            }
        }

        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            location,
        ))
    }

    fn parse_power(&mut self) -> SyntaxResult<Expr> {
        let base = self.parse_primary()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        // Right associative, binds tighter than unary minus on its left only
        self.enter()?;
        let exponent = self.parse_factor()?;
        self.leave();
        Ok(Self::binary(BinOp::Pow, base, exponent))
    }

    fn parse_primary(&mut self) -> SyntaxResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        location,
                    );
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression_list()?;
                    self.expect(&TokenKind::RightBracket)?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        location,
                    );
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        location,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> SyntaxResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<(String, Expr)> = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            let is_keyword = matches!(self.current().kind, TokenKind::Name(_))
                && self.peek_kind() == Some(&TokenKind::Assign);
            if is_keyword {
                let location = self.current().location;
                let name = self.expect_name()?;
                self.advance();
                if keywords.iter().any(|(k, _)| *k == name) {
                    return Err(SyntaxError::new(
                        format!("keyword argument repeated: {name}"),
                        location,
                    ));
                }
                keywords.push((name, self.parse_expression()?));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                args.push(self.parse_expression()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok((args, keywords))
    }

    fn parse_atom(&mut self) -> SyntaxResult<Expr> {
        let token = self.current().clone();
        let location = token.location;
        let kind = match token.kind {
            TokenKind::None => ExprKind::Constant(Constant::None),
            TokenKind::True => ExprKind::Constant(Constant::Bool(true)),
            TokenKind::False => ExprKind::Constant(Constant::Bool(false)),
            TokenKind::Int(v) => ExprKind::Constant(Constant::Int(v)),
            TokenKind::Float(v) => ExprKind::Constant(Constant::Float(v)),
            TokenKind::Str(mut value) => {
                self.advance();
                // Adjacent literals concatenate
                while let TokenKind::Str(next) = &self.current().kind {
                    value.push_str(next);
                    self.advance();
                }
                return Ok(Expr::new(ExprKind::Constant(Constant::Str(value)), location));
            }
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::LeftParen => {
                self.advance();
                self.enter()?;
                let expr = if self.check(&TokenKind::RightParen) {
                    Expr::new(ExprKind::List(Vec::new()), location)
                } else {
                    self.parse_expression_list()?
                };
                self.leave();
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => {
                self.advance();
                self.enter()?;
                let items = self.parse_sequence(&TokenKind::RightBracket)?;
                self.leave();
                return Ok(Expr::new(ExprKind::List(items), location));
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.enter()?;
                let entries = self.parse_dict_entries()?;
                self.leave();
                return Ok(Expr::new(ExprKind::Dict(entries), location));
            }
            TokenKind::Reserved(keyword) => {
                return Err(self.error_here(format!("'{keyword}' is not supported")));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(Expr::new(kind, location))
    }

    fn parse_sequence(&mut self, close: &TokenKind) -> SyntaxResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_dict_entries(&mut self) -> SyntaxResult<Vec<(Expr, Expr)>> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Err(SyntaxError::new(
                    "set literals are not supported",
                    key.location,
                ));
            }
            self.advance();
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(entries)
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        let location = left.location;
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            location,
        )
    }

    // ---- token helpers ----------------------------------------------------

    fn enter(&mut self) -> SyntaxResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error_here("too many nested blocks or expressions"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.position + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> SyntaxResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {kind}, found {}",
                self.current().kind
            )))
        }
    }

    fn expect_name(&mut self) -> SyntaxResult<String> {
        match &self.current().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected a name, found {other}"))),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Assign
                | TokenKind::RightParen
                | TokenKind::RightBracket
        )
    }

    fn unexpected(&self) -> SyntaxError {
        self.error_here(format!("invalid syntax: unexpected {}", self.current().kind))
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.location())
    }

    fn location(&self) -> Location {
        self.current().location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(source: &str) -> StmtKind {
        let program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "expected one statement in {source:?}");
        program.body.into_iter().next().unwrap().kind
    }

    fn expr(source: &str) -> ExprKind {
        match stmt(source) {
            StmtKind::Expr(e) => e.kind,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_program() {
        assert!(parse("").unwrap().body.is_empty());
        assert!(parse("\n\n# nothing\n").unwrap().body.is_empty());
    }

    #[test]
    fn test_trailing_newlines() {
        assert_eq!(parse("1\n").unwrap().body.len(), 1);
        assert_eq!(parse("x = 1\n\n").unwrap().body.len(), 1);
        assert_eq!(parse("while x:\n    break\n\n").unwrap().body.len(), 1);
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, right, .. } = expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));

        // -2 ** 2 is -(2 ** 2)
        let ExprKind::Unary { op, operand } = expr("-2 ** 2") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Neg);
        assert!(matches!(operand.kind, ExprKind::Binary { op: BinOp::Pow, .. }));
    }

    #[test]
    fn test_negative_literal_folds() {
        assert_eq!(expr("-5"), ExprKind::Constant(Constant::Int(-5)));
    }

    #[test]
    fn test_chained_comparison() {
        let ExprKind::Compare { ops, .. } = expr("a < b <= c") else {
            panic!("expected compare");
        };
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].0, CmpOp::LtE);

        let ExprKind::Compare { ops, .. } = expr("x not in y") else {
            panic!("expected compare");
        };
        assert_eq!(ops[0].0, CmpOp::NotIn);

        let ExprKind::Compare { ops, .. } = expr("x is not None") else {
            panic!("expected compare");
        };
        assert_eq!(ops[0].0, CmpOp::IsNot);
    }

    #[test]
    fn test_conditional_expression() {
        assert!(matches!(expr("a if b else c"), ExprKind::IfExp { .. }));
    }

    #[test]
    fn test_call_with_keywords() {
        let ExprKind::Call { args, keywords, .. } = expr("round(x, ndigits=2)") else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(keywords[0].0, "ndigits");

        let err = parse("f(a=1, 2)").unwrap_err();
        assert!(err.message.contains("positional argument follows"));
    }

    #[test]
    fn test_subscript_and_attribute_chain() {
        let ExprKind::Attribute { value, attr } = expr("doc['price'].value") else {
            panic!("expected attribute");
        };
        assert_eq!(attr, "value");
        assert!(matches!(value.kind, ExprKind::Subscript { .. }));
    }

    #[test]
    fn test_dict_and_list_literals() {
        let ExprKind::Dict(entries) = expr("{'a': 1, 'b': [1, 2,]}") else {
            panic!("expected dict");
        };
        assert_eq!(entries.len(), 2);
        assert!(parse("{1, 2}").is_err());
    }

    #[test]
    fn test_chained_assignment() {
        let StmtKind::Assign { targets, .. } = stmt("a = b = 1") else {
            panic!("expected assign");
        };
        assert_eq!(targets.len(), 2);
        assert!(parse("1 = x").is_err());
        assert!(parse("f() = x").is_err());
    }

    #[test]
    fn test_augmented_assignment() {
        let StmtKind::AugAssign { op, .. } = stmt("ctx['n'] += 1") else {
            panic!("expected aug assign");
        };
        assert_eq!(op, BinOp::Add);
    }

    #[test]
    fn test_if_elif_else() {
        let StmtKind::If { orelse, .. } = stmt("if a:\n    x\nelif b:\n    y\nelse:\n    z\n")
        else {
            panic!("expected if");
        };
        let StmtKind::If { orelse, .. } = &orelse[0].kind else {
            panic!("elif should nest an if");
        };
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn test_inline_block() {
        let StmtKind::While { body, .. } = stmt("while x: x -= 1; pass") else {
            panic!("expected while");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_for_with_unpacking() {
        let StmtKind::For { targets, .. } = stmt("for k, v in d.items():\n    pass\n") else {
            panic!("expected for");
        };
        assert_eq!(targets, vec!["k".to_string(), "v".to_string()]);
    }

    #[test]
    fn test_function_definition() {
        let StmtKind::FunctionDef(def) = stmt("def f(a, b=2):\n    return a + b\n") else {
            panic!("expected def");
        };
        assert_eq!(def.name, "f");
        assert!(def.params[1].default.is_some());

        assert!(parse("def f(a=1, b):\n    pass\n").is_err());
        assert!(parse("def f(a, a):\n    pass\n").is_err());
    }

    #[test]
    fn test_context_errors() {
        let err = parse("break").unwrap_err();
        assert_eq!(err.message, "'break' outside loop");

        let err = parse("return 1").unwrap_err();
        assert_eq!(err.message, "'return' outside function");

        // A loop around a def does not make break legal inside it
        let err = parse("while x:\n    def f():\n        break\n").unwrap_err();
        assert_eq!(err.message, "'break' outside loop");
    }

    #[test]
    fn test_block_errors() {
        let err = parse("if x:\nprint(1)\n").unwrap_err();
        assert_eq!(err.message, "expected an indented block");
        assert_eq!(err.location.line, 2);

        let err = parse("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn test_unsupported_keyword() {
        let err = parse("class A:\n    pass\n").unwrap_err();
        assert_eq!(err.message, "'class' is not supported");
    }

    #[test]
    fn test_error_location() {
        let err = parse("x = 1\ny = (2 +").unwrap_err();
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_import() {
        assert_eq!(
            stmt("import math as m"),
            StmtKind::Import {
                module: "math".into(),
                alias: Some("m".into())
            }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("too many nested"));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            expr("'a' 'b'"),
            ExprKind::Constant(Constant::Str("ab".into()))
        );
    }
}
