//! Statement-text helpers shared by the instruction set.

use tracing::warn;

use crate::backend::Backend;
use crate::entities::SCRATCH_PREFIX;
use crate::error::BackendError;

/// Render `value` as a SQL string literal.
///
/// Quotes are doubled and every control character is spliced in with
/// `char(n)`, so the resulting statement text never contains a raw control
/// byte.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            c if c.is_control() => {
                out.push_str("' || char(");
                out.push_str(&(c as u32).to_string());
                out.push_str(") || '");
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Comma-separated `(id)` row tuples for a literal insert.
pub fn id_rows(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| format!("({id})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scratch relations owned by a single instruction.
///
/// Every name handed out carries the scratch prefix. [`ScratchSpace::finish`]
/// drops them; if the instruction bails out early, the drop happens on
/// `Drop` and failures there are only logged, since the next gc sweeps any
/// leftovers anyway.
pub struct ScratchSpace<'a> {
    backend: &'a dyn Backend,
    tables: Vec<String>,
}

impl<'a> ScratchSpace<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            tables: Vec::new(),
        }
    }

    /// Create (or replace) a scratch relation with the given column list.
    pub fn create(&mut self, name: &str, columns: &str) -> Result<String, BackendError> {
        let table = format!("{SCRATCH_PREFIX}{name}");
        self.backend.execute(&format!(
            "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} ({columns});"
        ))?;
        if !self.tables.contains(&table) {
            self.tables.push(table.clone());
        }
        Ok(table)
    }

    pub fn finish(mut self) -> Result<(), BackendError> {
        let statements = self.drop_statements();
        self.tables.clear();
        if statements.is_empty() {
            return Ok(());
        }
        self.backend.execute(&statements)?;
        Ok(())
    }

    fn drop_statements(&self) -> String {
        self.tables
            .iter()
            .map(|table| format!("DROP TABLE IF EXISTS {table};\n"))
            .collect()
    }
}

impl Drop for ScratchSpace<'_> {
    fn drop(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        let statements = self.drop_statements();
        if let Err(err) = self.backend.execute(&statements) {
            warn!(tables = ?self.tables, error = %err, "failed to drop scratch relations");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::store::SqliteBackend;

    #[test]
    fn quote_literal_doubles_quotes_and_splices_controls() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("a\nb"), "'a' || char(10) || 'b'");
        assert_eq!(quote_literal("\t"), "'' || char(9) || ''");
    }

    #[test]
    fn quoted_controls_roundtrip_through_sqlite() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let raw = "line1\nline2\t'quoted'\r\u{1}";
        let rows = backend.query_rows(&format!("SELECT {};", quote_literal(raw)))?;
        assert_eq!(rows, vec![vec![raw.to_string()]]);
        Ok(())
    }

    #[test]
    fn scratch_relations_are_dropped_on_finish_and_on_drop() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        {
            let mut scratch = ScratchSpace::new(&backend);
            let cur = scratch.create("cur", "id INTEGER")?;
            assert_eq!(cur, "m_cur");
            scratch.finish()?;
        }
        assert!(!backend.relation_names()?.iter().any(|n| n == "m_cur"));

        {
            let mut scratch = ScratchSpace::new(&backend);
            scratch.create("next", "id INTEGER")?;
        }
        assert!(!backend.relation_names()?.iter().any(|n| n == "m_next"));
        Ok(())
    }

    #[test]
    fn id_rows_render_tuples() {
        assert_eq!(id_rows(&[3, 1, 2]), "(3), (1), (2)");
    }
}
