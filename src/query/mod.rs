//! Query text front end: parse tree and nom grammar.

pub mod ast;
pub mod parser;

pub use ast::{AssignOp, ExprKind, Expression, ParseTree, Statement, Variable};
pub use parser::parse;
