//! pyscript-syntax - grammar for the PyScript Python subset
//!
//! Turns script source text into a syntax tree, or a [`SyntaxError`] carrying the
//! offending line and column. The tree is consumed by the semantic analyzer (static
//! checks) and by the runtime (evaluation); neither of them ever sees raw text.
//!
//! # Example
//!
//! ```
//! use pyscript_syntax::{parse, StmtKind};
//!
//! let program = parse("x = 1\nwhile True:\n    break\n").unwrap();
//! assert_eq!(program.body.len(), 2);
//! assert!(matches!(program.body[1].kind, StmtKind::While { .. }));
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod visit;

pub use ast::{
    BinOp, BoolOp, CmpOp, Constant, Expr, ExprKind, FunctionDef, Param, Program, Stmt, StmtKind,
    UnaryOp,
};
pub use error::{SyntaxError, SyntaxResult};
pub use lexer::Lexer;
pub use parser::{Parser, parse};
pub use span::Location;
pub use token::{Token, TokenKind};
pub use visit::Visitor;
