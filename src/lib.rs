//! Graph-algebra query engine over a relational provenance store.

pub mod backend;
pub mod document;
pub mod engine;
pub mod entities;
pub mod environment;
pub mod error;
pub mod instruction;
pub mod logging;
pub mod program;
pub mod query;
pub mod resolver;
pub mod response;
pub mod sql;
pub mod store;
pub mod types;

pub use backend::{Backend, TransactionGuard, TransactionLock};
pub use document::{GraphDocument, LoadSummary, load_document};
pub use engine::QueryEngine;
pub use entities::{Graph, GraphMetadata};
pub use environment::Environment;
pub use error::{BackendError, ParseError, Position, QueryError, ResolutionError};
pub use instruction::{EXPORT_VERTEX_LIMIT, Instruction};
pub use program::{ExecutionContext, Program};
pub use response::{ExportFormat, ExportedGraph, Response};
pub use store::{SqliteBackend, create_store, derive_db_path, ensure_parent_dirs, open_store};
pub use types::{TypedValue, ValueKind};
