use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, DatabaseName, OpenFlags, params};
use tracing::debug;

use crate::backend::{Backend, TransactionLock};
use crate::entities::{
    BASE_GRAPH_NAME, EDGE_ANNO_TABLE, EDGE_TABLE, Graph, VERTEX_ANNO_TABLE, VERTEX_TABLE,
};
use crate::error::BackendError;

pub fn derive_db_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(name);
    if path.extension().is_none() {
        path.set_extension("provql.db");
    }
    path
}

pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// SQLite-backed relational store implementing the engine's [`Backend`] contract.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    txn: TransactionLock,
}

impl SqliteBackend {
    /// Wrap an already-configured connection, installing the base schema.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        install_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            txn: TransactionLock::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn create(path: &Path) -> Result<Self> {
        Self::from_connection(create_store(path)?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(open_store(path)?)
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a vertex in the raw relations and the base graph.
    pub fn put_vertex(&self, id: i64, md5: Option<&str>, annotations: &[(&str, &str)]) -> Result<()> {
        let conn = self.connection();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO vertex (id, md5) VALUES (?1, ?2)",
            params![id, md5],
        )?;
        for (field, value) in annotations {
            tx.execute(
                "INSERT INTO vertex_anno (id, field, value) VALUES (?1, ?2, ?3)",
                params![id, field, value],
            )?;
        }
        tx.execute(
            "INSERT INTO trace_base_vertex (id) VALUES (?1)",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record an edge in the raw relations and the base graph.
    pub fn put_edge(&self, id: i64, src: i64, dst: i64, annotations: &[(&str, &str)]) -> Result<()> {
        let conn = self.connection();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO edge (id, src, dst) VALUES (?1, ?2, ?3)",
            params![id, src, dst],
        )?;
        for (field, value) in annotations {
            tx.execute(
                "INSERT INTO edge_anno (id, field, value) VALUES (?1, ?2, ?3)",
                params![id, field, value],
            )?;
        }
        tx.execute("INSERT INTO trace_base_edge (id) VALUES (?1)", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every relation, then reinstall the empty base schema.
    pub fn reset_storage(&self) -> Result<()> {
        let names = self.relation_names()?;
        let conn = self.connection();
        let mut drops = String::new();
        for name in names {
            drops.push_str(&format!("DROP TABLE IF EXISTS {name};\n"));
        }
        conn.execute_batch(&drops)?;
        install_schema(&conn)?;
        Ok(())
    }

    fn run_statements(&self, statements: &str) -> Result<Option<Vec<Vec<String>>>, BackendError> {
        let conn = self.connection();
        let mut batch = Batch::new(&conn, statements);
        let mut last = None;
        while let Some(mut stmt) = batch.next()? {
            let columns = stmt.column_count();
            if columns == 0 {
                stmt.execute([])?;
                continue;
            }
            let mut rows = stmt.query([])?;
            let mut collected = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns);
                for idx in 0..columns {
                    values.push(render_value(row.get_ref(idx)?));
                }
                collected.push(values);
            }
            last = Some(collected);
        }
        Ok(last)
    }
}

impl Backend for SqliteBackend {
    fn execute(&self, statements: &str) -> Result<String, BackendError> {
        debug!(target: "provql::sql", "{statements}");
        let rows = self.run_statements(statements)?.unwrap_or_default();
        let lines: Vec<String> = rows.into_iter().map(|row| row.join("|")).collect();
        Ok(lines.join("\n"))
    }

    fn query_rows(&self, statements: &str) -> Result<Vec<Vec<String>>, BackendError> {
        debug!(target: "provql::sql", "{statements}");
        Ok(self.run_statements(statements)?.unwrap_or_default())
    }

    fn relation_names(&self) -> Result<Vec<String>, BackendError> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn begin_transaction(&self) {
        self.txn.acquire();
    }

    fn finalize_transaction(&self) {
        self.txn.release();
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(x) => x.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

pub fn create_store(path: &Path) -> Result<Connection> {
    ensure_parent_dirs(path)?;
    if path.exists() {
        bail!("database already exists at {}", path.display());
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_READ_WRITE,
    )
    .with_context(|| format!("failed to create {}", path.display()))?;

    configure_pragmas(&conn)?;
    install_schema(&conn)?;
    Ok(conn)
}

pub fn open_store(path: &Path) -> Result<Connection> {
    if !path.exists() {
        bail!("database not found at {}", path.display());
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .with_context(|| format!("failed to open {}", path.display()))?;
    configure_pragmas(&conn)?;
    install_schema(&conn)?;
    Ok(conn)
}

pub fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(Some(DatabaseName::Main), "journal_mode", &"WAL")?;
    conn.pragma_update(Some(DatabaseName::Main), "synchronous", &"NORMAL")?;
    conn.pragma_update(Some(DatabaseName::Main), "temp_store", &"MEMORY")?;
    conn.pragma_update(Some(DatabaseName::Main), "mmap_size", &268_435_456i64)?;
    conn.pragma_update(Some(DatabaseName::Main), "cache_size", &-262_144i64)?;
    Ok(())
}

pub fn install_schema(conn: &Connection) -> Result<()> {
    let base = Graph::new(BASE_GRAPH_NAME);
    let schema = format!(
        r#"
CREATE TABLE IF NOT EXISTS {VERTEX_TABLE} (
  id   INTEGER NOT NULL,
  md5  TEXT
);

CREATE TABLE IF NOT EXISTS {EDGE_TABLE} (
  id   INTEGER NOT NULL,
  src  INTEGER NOT NULL,
  dst  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS {VERTEX_ANNO_TABLE} (
  id     INTEGER NOT NULL,
  field  TEXT NOT NULL,
  value  TEXT
);

CREATE TABLE IF NOT EXISTS {EDGE_ANNO_TABLE} (
  id     INTEGER NOT NULL,
  field  TEXT NOT NULL,
  value  TEXT
);

CREATE TABLE IF NOT EXISTS {base_vertex} (id INTEGER);
CREATE TABLE IF NOT EXISTS {base_edge} (id INTEGER);

CREATE INDEX IF NOT EXISTS vertex_id_idx ON {VERTEX_TABLE}(id);
CREATE INDEX IF NOT EXISTS edge_id_idx ON {EDGE_TABLE}(id);
CREATE INDEX IF NOT EXISTS edge_src_idx ON {EDGE_TABLE}(src);
CREATE INDEX IF NOT EXISTS edge_dst_idx ON {EDGE_TABLE}(dst);
CREATE INDEX IF NOT EXISTS vertex_anno_id_idx ON {VERTEX_ANNO_TABLE}(id);
CREATE INDEX IF NOT EXISTS edge_anno_id_idx ON {EDGE_ANNO_TABLE}(id);
"#,
        base_vertex = base.vertex_table(),
        base_edge = base.edge_table(),
    );

    conn.execute_batch(&schema)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_returns_rows_of_last_producing_statement() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let output = backend.execute(
            "CREATE TABLE t (a INTEGER, b TEXT);\n\
             INSERT INTO t VALUES (1, 'x'), (2, 'y');\n\
             SELECT a, b FROM t ORDER BY a;\n\
             INSERT INTO t VALUES (3, 'z');",
        )?;
        assert_eq!(output, "1|x\n2|y");
        assert_eq!(backend.execute_for_long_result("SELECT COUNT(*) FROM t;")?, 3);
        Ok(())
    }

    #[test]
    fn long_result_rejects_non_integer_output() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let err = backend
            .execute_for_long_result("SELECT 'many';")
            .unwrap_err();
        assert!(matches!(err, BackendError::UnexpectedOutput(ref s) if s == "many"));
        Ok(())
    }

    #[test]
    fn failing_statement_surfaces_backend_error() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let err = backend.execute("SELECT id FROM missing_table;").unwrap_err();
        assert!(matches!(err, BackendError::Sqlite(_)));
        Ok(())
    }

    #[test]
    fn base_schema_and_put_helpers() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        backend.put_vertex(1, Some("abc"), &[("type", "Process")])?;
        backend.put_vertex(2, None, &[])?;
        backend.put_edge(10, 1, 2, &[("operation", "fork")])?;

        let names = backend.relation_names()?;
        for expected in [
            "edge",
            "edge_anno",
            "trace_base_edge",
            "trace_base_vertex",
            "vertex",
            "vertex_anno",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(
            backend.execute_for_long_result("SELECT COUNT(*) FROM trace_base_vertex;")?,
            2
        );
        assert_eq!(backend.execute("SELECT src, dst FROM edge;")?, "1|2");
        Ok(())
    }

    #[test]
    fn reset_storage_drops_derived_relations() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        backend.put_vertex(1, None, &[])?;
        backend.execute("CREATE TABLE trace_9_vertex (id INTEGER);")?;
        backend.reset_storage()?;
        let names = backend.relation_names()?;
        assert!(!names.iter().any(|n| n == "trace_9_vertex"));
        assert_eq!(
            backend.execute_for_long_result("SELECT COUNT(*) FROM vertex;")?,
            0
        );
        Ok(())
    }

    #[test]
    fn file_store_create_then_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("graph.provql.db");
        {
            let backend = SqliteBackend::create(&path)?;
            backend.put_vertex(5, None, &[])?;
        }
        assert!(SqliteBackend::create(&path).is_err());
        let reopened = SqliteBackend::open(&path)?;
        assert_eq!(
            reopened.execute_for_long_result("SELECT COUNT(*) FROM vertex;")?,
            1
        );
        Ok(())
    }

    #[test]
    fn derive_db_path_appends_extension() {
        assert_eq!(derive_db_path("audit"), PathBuf::from("audit.provql.db"));
        assert_eq!(derive_db_path("audit.db"), PathBuf::from("audit.db"));
    }
}
