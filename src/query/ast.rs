//! Parse tree produced by [`crate::query::parse`].

use std::fmt;

use crate::error::Position;
use crate::types::{TypedValue, ValueKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseTree {
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Assignment {
        position: Position,
        target: Variable,
        operator: AssignOp,
        value: Expression,
    },
    Command {
        position: Position,
        name: String,
        arguments: Vec<Expression>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Union,
    Subtract,
    Intersect,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Union => "+=",
            AssignOp::Subtract => "-=",
            AssignOp::Intersect => "&=",
        }
    }

    /// Infix operator a compound assignment desugars to.
    pub fn binary_operator(self) -> Option<&'static str> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Union => Some("+"),
            AssignOp::Subtract => Some("-"),
            AssignOp::Intersect => Some("&"),
        }
    }
}

/// `$name` or `@name`; `name` keeps its sigil.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub kind: ValueKind,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    pub position: Position,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Literal(TypedValue),
    Name(String),
    Variable(Variable),
    /// Infix set operator (`subject` is the left operand) or a method or
    /// function call (`subject` is `None` for free functions).
    Operation {
        subject: Option<Box<Expression>>,
        operator: String,
        operands: Vec<Expression>,
    },
}

impl Expression {
    pub fn new(position: Position, kind: ExprKind) -> Self {
        Self { position, kind }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}
