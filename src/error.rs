//! Error taxonomy for parsing, resolution, and backend execution.

use std::fmt;

use thiserror::Error;

use crate::types::ValueKind;

/// Line/column location inside query text, both 1-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Malformed query text. The first syntax error aborts the whole query.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("parse error at {position}: {message}")]
pub struct ParseError {
    pub position: Position,
    pub message: String,
}

impl ParseError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Raised while turning a parse tree into a program; nothing has executed yet.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown variable `{name}` at {position}")]
    UnknownVariable { name: String, position: Position },
    #[error("unknown command `{name}` at {position}")]
    UnknownCommand { name: String, position: Position },
    #[error("unknown operation `{name}` on {subject} at {position}")]
    UnknownOperation {
        name: String,
        subject: String,
        position: Position,
    },
    #[error("type mismatch at {position}: {context} expects {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: ValueKind,
        position: Position,
    },
    #[error("`{name}` at {position} expects {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
        position: Position,
    },
    #[error("no form of `{name}` accepts ({found}) at {position}")]
    Signature {
        name: String,
        found: String,
        position: Position,
    },
    #[error("cannot reassign reserved variable `{name}`")]
    ReservedVariable { name: String },
    #[error("invalid argument at {position}: {message}")]
    InvalidArgument { message: String, position: Position },
}

/// A backend statement failed or produced output the engine cannot interpret.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend statement failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unexpected result \"{0}\" from backend: expecting an integer")]
    UnexpectedOutput(String),
    #[error("backend failure: {0}")]
    Other(String),
}

/// Anything that can stop a query before it produces a response.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl QueryError {
    /// Stable tag naming the error family, used when folding errors into responses.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Parse(_) => "ParseError",
            QueryError::Resolution(_) => "ResolutionError",
            QueryError::Backend(_) => "BackendError",
        }
    }
}
