//! Semantic analyzer
//!
//! Purely static checks applied to a script before it may execute. The analyzer
//! parses the source, then walks the tree once and accumulates [`Diagnostic`]s for
//! loops that can never terminate (`while True` without an escape) or never run
//! (`while False`). A non-empty result means the script must not be executed.

use pyscript_syntax::visit::{walk_expr, walk_program, walk_stmt};
use pyscript_syntax::{Constant, Expr, ExprKind, Program, Stmt, StmtKind, SyntaxError, Visitor};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;

/// Default cap on the number of diagnostics collected for one script
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    Syntax,
    InfiniteLoop,
    UnreachableLoop,
}

/// Why a script failed semantic validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    fn syntax(err: &SyntaxError) -> Self {
        let column = err.column() + 1;
        Self {
            code: DiagnosticCode::Syntax,
            message: format!(
                "Syntax error at line {}:{} - {}",
                err.line(),
                column,
                err.message
            ),
            line: err.line(),
            column,
        }
    }

    // Parser locations count columns from 0, diagnostics from 1.
    fn at(code: DiagnosticCode, message: &str, stmt: &Stmt) -> Self {
        Self {
            code,
            message: message.to_string(),
            line: stmt.location.line,
            column: stmt.location.column + 1,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validate source text. An empty list means the script may run.
pub fn validate(source: &str) -> Vec<Diagnostic> {
    validate_with_limit(source, DEFAULT_MAX_DIAGNOSTICS)
}

/// Validate, stopping once `max_diagnostics` problems have been found
pub fn validate_with_limit(source: &str, max_diagnostics: usize) -> Vec<Diagnostic> {
    analyze(source, max_diagnostics).diagnostics
}

/// Outcome of [`analyze`]
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The syntax tree, absent when parsing failed
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse and check in one go, keeping the tree for later execution
pub fn analyze(source: &str, max_diagnostics: usize) -> Analysis {
    match pyscript_syntax::parse(source) {
        Ok(program) => Analysis {
            diagnostics: check_program(&program, max_diagnostics),
            program: Some(program),
        },
        Err(err) => Analysis {
            program: None,
            diagnostics: vec![Diagnostic::syntax(&err)],
        },
    }
}

/// Run the structural loop checks over an already parsed program
pub fn check_program(program: &Program, max_diagnostics: usize) -> Vec<Diagnostic> {
    let mut checker = LoopChecker {
        diagnostics: Vec::new(),
        limit: max_diagnostics.max(1),
    };
    let _ = walk_program(&mut checker, program);
    checker.diagnostics
}

struct LoopChecker {
    diagnostics: Vec<Diagnostic>,
    limit: usize,
}

impl LoopChecker {
    fn report(&mut self, diagnostic: Diagnostic) -> ControlFlow<()> {
        self.diagnostics.push(diagnostic);
        if self.diagnostics.len() >= self.limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

impl Visitor for LoopChecker {
    type Break = ();

    fn visit_stmt(&mut self, stmt: &Stmt) -> ControlFlow<()> {
        if let StmtKind::While { test, body } = &stmt.kind {
            match literal_bool(test) {
                Some(true) if !body.iter().any(|s| escapes(s, 0)) => {
                    self.report(Diagnostic::at(
                        DiagnosticCode::InfiniteLoop,
                        "Infinite loop detected: while True loop has no exit condition",
                        stmt,
                    ))?;
                }
                Some(false) => {
                    self.report(Diagnostic::at(
                        DiagnosticCode::UnreachableLoop,
                        "Unreachable code: while False loop will never execute",
                        stmt,
                    ))?;
                }
                _ => {}
            }
        }
        walk_stmt(self, stmt)
    }

    // Loops never occur inside expressions
    fn visit_expr(&mut self, _expr: &Expr) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

fn literal_bool(expr: &Expr) -> Option<bool> {
    match expr.as_constant() {
        Some(Constant::Bool(value)) => Some(*value),
        _ => None,
    }
}

/// Whether `stmt` contains a transfer of control out of the loop under test.
///
/// `return` and `raise` leave every loop. A `break` only leaves the loop under test
/// when no other loop lies between them.
fn escapes(stmt: &Stmt, loop_depth: usize) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Raise(_) => true,
        StmtKind::Break => loop_depth == 0,
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
            body.iter().any(|s| escapes(s, loop_depth + 1))
        }
        StmtKind::If { body, orelse, .. } => {
            body.iter().chain(orelse).any(|s| escapes(s, loop_depth))
        }
        StmtKind::FunctionDef(def) => def.body.iter().any(|s| escapes(s, loop_depth)),
        _ => false,
    }
}

/// Which `doc` fields a script reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocFieldAccess {
    /// Only these fields, each named by a string literal
    Fields(BTreeSet<String>),
    /// `doc` is used in a way that cannot be resolved statically
    Dynamic,
}

impl DocFieldAccess {
    pub fn includes(&self, field: &str) -> bool {
        match self {
            DocFieldAccess::Fields(fields) => fields.contains(field),
            DocFieldAccess::Dynamic => true,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, DocFieldAccess::Dynamic)
    }
}

/// Statically collect the `doc['name']` and `doc.get('name')` fields a script reads
pub fn accessed_doc_fields(program: &Program) -> DocFieldAccess {
    let mut collector = DocFieldCollector::default();
    match walk_program(&mut collector, program) {
        ControlFlow::Break(()) => DocFieldAccess::Dynamic,
        ControlFlow::Continue(()) => DocFieldAccess::Fields(collector.fields),
    }
}

#[derive(Default)]
struct DocFieldCollector {
    fields: BTreeSet<String>,
}

fn is_doc(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Name(name) if name == "doc")
}

fn string_literal(expr: &Expr) -> Option<&str> {
    match expr.as_constant() {
        Some(Constant::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

impl Visitor for DocFieldCollector {
    type Break = ();

    fn visit_stmt(&mut self, stmt: &Stmt) -> ControlFlow<()> {
        match &stmt.kind {
            StmtKind::For { targets, .. } if targets.iter().any(|t| t == "doc") => {
                ControlFlow::Break(())
            }
            StmtKind::FunctionDef(def) if def.params.iter().any(|p| p.name == "doc") => {
                ControlFlow::Break(())
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        match &expr.kind {
            ExprKind::Name(name) if name == "doc" => ControlFlow::Break(()),
            ExprKind::Subscript { value, index } if is_doc(value) => match string_literal(index) {
                Some(field) => {
                    self.fields.insert(field.to_string());
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                if let ExprKind::Attribute { value, attr } = &func.kind
                    && is_doc(value)
                {
                    let field = args.first().and_then(string_literal);
                    match (attr.as_str(), field) {
                        ("get", Some(field)) => {
                            self.fields.insert(field.to_string());
                        }
                        _ => return ControlFlow::Break(()),
                    }
                    for arg in args.iter().skip(1) {
                        self.visit_expr(arg)?;
                    }
                    for (_, value) in keywords {
                        self.visit_expr(value)?;
                    }
                    return ControlFlow::Continue(());
                }
                walk_expr(self, expr)
            }
            _ => walk_expr(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(source: &str) -> Vec<DiagnosticCode> {
        validate(source).into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_valid_scripts_pass() {
        assert!(validate("x = 1\nx + 1\n").is_empty());
        assert!(validate("while x < 10:\n    x += 1\n").is_empty());
        assert!(validate("").is_empty());
    }

    #[test]
    fn test_while_true_without_escape() {
        let diagnostics = validate("x = 0\nwhile True:\n    x += 1\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::InfiniteLoop);
        assert_eq!(
            diagnostics[0].message,
            "Infinite loop detected: while True loop has no exit condition"
        );
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].column, 1);
    }

    #[test]
    fn test_while_true_with_escapes() {
        assert!(validate("while True:\n    break\n").is_empty());
        assert!(validate("while True:\n    if x:\n        break\n").is_empty());
        assert!(validate("while True:\n    raise ValueError('x')\n").is_empty());
        assert!(
            validate("def f():\n    while True:\n        if g():\n            return 1\n").is_empty()
        );
        assert_eq!(validate("while True:\n    x = 1\ny = 2\n").len(), 1);
    }

    #[test]
    fn test_break_in_inner_loop_does_not_escape_outer() {
        let src = "while True:\n    for i in range(3):\n        break\n";
        assert_eq!(codes(src), vec![DiagnosticCode::InfiniteLoop]);

        let src = "while True:\n    while x:\n        break\n";
        assert_eq!(codes(src), vec![DiagnosticCode::InfiniteLoop]);
    }

    #[test]
    fn test_raise_in_inner_loop_escapes_outer() {
        let src = "while True:\n    for i in range(3):\n        raise ValueError('stop')\n";
        assert!(validate(src).is_empty());
    }

    #[test]
    fn test_nested_infinite_loop_is_reported() {
        let src = "while True:\n    while True:\n        pass\n    break\n";
        let diagnostics = validate(src);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].column, 5);
    }

    #[test]
    fn test_while_false() {
        let diagnostics = validate("while False:\n    x = 1\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnreachableLoop);
        assert_eq!(
            diagnostics[0].message,
            "Unreachable code: while False loop will never execute"
        );

        assert_eq!(
            codes("while False:\n    break\n"),
            vec![DiagnosticCode::UnreachableLoop]
        );
    }

    #[test]
    fn test_syntax_error_is_single_diagnostic() {
        let diagnostics = validate("x = (1 +\nwhile True:\n    pass\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::Syntax);
        assert!(diagnostics[0].message.starts_with("Syntax error at line "));
    }

    #[test]
    fn test_columns_are_one_based() {
        let diagnostics = validate("x = )\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 5));
        assert_eq!(
            diagnostics[0].message,
            "Syntax error at line 1:5 - unmatched ')'"
        );
    }

    #[test]
    fn test_accumulates_and_caps_diagnostics() {
        let src = "while False:\n    pass\nwhile False:\n    pass\nwhile False:\n    pass\n";
        assert_eq!(validate(src).len(), 3);
        assert_eq!(validate_with_limit(src, 2).len(), 2);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let src = "while True:\n    pass\nwhile False:\n    pass\n";
        assert_eq!(validate(src), validate(src));
    }

    fn doc_fields(source: &str) -> DocFieldAccess {
        accessed_doc_fields(&pyscript_syntax::parse(source).unwrap())
    }

    #[test]
    fn test_accessed_doc_fields() {
        let access = doc_fields("doc['price'] * doc.get('qty', 1) + params['x']");
        let expected: BTreeSet<String> = ["price", "qty"].into_iter().map(String::from).collect();
        assert_eq!(access, DocFieldAccess::Fields(expected));
        assert!(access.includes("price"));
        assert!(!access.includes("name"));
    }

    #[test]
    fn test_dynamic_doc_access() {
        assert!(doc_fields("k = 'a'\ndoc[k]").is_dynamic());
        assert!(doc_fields("len(doc)").is_dynamic());
        assert!(doc_fields("doc.keys()").is_dynamic());
        assert!(doc_fields("for doc in items:\n    pass").is_dynamic());
        assert!(!doc_fields("1 + 1").includes("anything"));
    }
}
