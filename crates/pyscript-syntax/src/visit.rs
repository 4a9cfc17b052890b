//! Read-only traversal of the syntax tree
//!
//! Implementors override `visit_stmt` / `visit_expr` and call the matching `walk_*`
//! function to keep descending. Returning [`ControlFlow::Break`] stops the traversal.

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use std::ops::ControlFlow;

pub trait Visitor {
    type Break;

    fn visit_stmt(&mut self, stmt: &Stmt) -> ControlFlow<Self::Break> {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        walk_expr(self, expr)
    }
}

pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, program: &Program) -> ControlFlow<V::Break> {
    walk_body(visitor, &program.body)
}

pub fn walk_body<V: Visitor + ?Sized>(visitor: &mut V, body: &[Stmt]) -> ControlFlow<V::Break> {
    for stmt in body {
        visitor.visit_stmt(stmt)?;
    }
    ControlFlow::Continue(())
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) -> ControlFlow<V::Break> {
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Delete(expr) => visitor.visit_expr(expr),
        StmtKind::Assign { targets, value } => {
            for target in targets {
                visitor.visit_expr(target)?;
            }
            visitor.visit_expr(value)
        }
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr(target)?;
            visitor.visit_expr(value)
        }
        StmtKind::If { test, body, orelse } => {
            visitor.visit_expr(test)?;
            walk_body(visitor, body)?;
            walk_body(visitor, orelse)
        }
        StmtKind::While { test, body } => {
            visitor.visit_expr(test)?;
            walk_body(visitor, body)
        }
        StmtKind::For { iter, body, .. } => {
            visitor.visit_expr(iter)?;
            walk_body(visitor, body)
        }
        StmtKind::Return(value) | StmtKind::Raise(value) => match value {
            Some(expr) => visitor.visit_expr(expr),
            None => ControlFlow::Continue(()),
        },
        StmtKind::FunctionDef(def) => {
            for param in &def.params {
                if let Some(default) = &param.default {
                    visitor.visit_expr(default)?;
                }
            }
            walk_body(visitor, &def.body)
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Pass | StmtKind::Import { .. } => {
            ControlFlow::Continue(())
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) -> ControlFlow<V::Break> {
    match &expr.kind {
        ExprKind::Constant(_) | ExprKind::Name(_) => ControlFlow::Continue(()),
        ExprKind::List(items) => {
            for item in items {
                visitor.visit_expr(item)?;
            }
            ControlFlow::Continue(())
        }
        ExprKind::Dict(entries) => {
            for (key, value) in entries {
                visitor.visit_expr(key)?;
                visitor.visit_expr(value)?;
            }
            ControlFlow::Continue(())
        }
        ExprKind::Subscript { value, index } => {
            visitor.visit_expr(value)?;
            visitor.visit_expr(index)
        }
        ExprKind::Attribute { value, .. } => visitor.visit_expr(value),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_expr(func)?;
            for arg in args {
                visitor.visit_expr(arg)?;
            }
            for (_, value) in keywords {
                visitor.visit_expr(value)?;
            }
            ControlFlow::Continue(())
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr(left)?;
            visitor.visit_expr(right)
        }
        ExprKind::Compare { left, ops } => {
            visitor.visit_expr(left)?;
            for (_, right) in ops {
                visitor.visit_expr(right)?;
            }
            ControlFlow::Continue(())
        }
        ExprKind::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr(value)?;
            }
            ControlFlow::Continue(())
        }
        ExprKind::IfExp { test, body, orelse } => {
            visitor.visit_expr(test)?;
            visitor.visit_expr(body)?;
            visitor.visit_expr(orelse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    struct NameCounter(usize);

    impl Visitor for NameCounter {
        type Break = ();

        fn visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
            if matches!(expr.kind, ExprKind::Name(_)) {
                self.0 += 1;
            }
            walk_expr(self, expr)
        }
    }

    struct FirstCall;

    impl Visitor for FirstCall {
        type Break = String;

        fn visit_expr(&mut self, expr: &Expr) -> ControlFlow<String> {
            if let ExprKind::Call { func, .. } = &expr.kind
                && let ExprKind::Name(name) = &func.kind
            {
                return ControlFlow::Break(name.clone());
            }
            walk_expr(self, expr)
        }
    }

    #[test]
    fn test_walk_reaches_nested_expressions() {
        let program = parse("def f(a=b):\n    return a + c\nwhile x:\n    y = [z]\n").unwrap();
        let mut counter = NameCounter(0);
        let _ = walk_program(&mut counter, &program);
        // b, a, c, x, y, z
        assert_eq!(counter.0, 6);
    }

    #[test]
    fn test_break_stops_traversal() {
        let program = parse("x = 1\ny = first(2)\nz = second(3)\n").unwrap();
        let result = walk_program(&mut FirstCall, &program);
        assert_eq!(result, ControlFlow::Break("first".to_string()));
    }
}
