//! Persistent symbol table, name allocator and relation collector.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::backend::Backend;
use crate::entities::{
    BASE_GRAPH_NAME, EDGE_ANNO_TABLE, EDGE_TABLE, GRAPH_PREFIX, Graph, GraphMetadata,
    METADATA_PREFIX, SCRATCH_PREFIX, VERTEX_ANNO_TABLE, VERTEX_TABLE,
};
use crate::error::{BackendError, QueryError, ResolutionError};
use crate::sql::quote_literal;

/// Relation holding `(name, value)` bindings.
pub const SYMBOL_TABLE: &str = "symbols";
/// Reserved graph variable bound to the full base graph.
pub const BASE_VARIABLE: &str = "$base";
/// Row of the symbol table that persists the allocation counter.
const COUNTER_KEY: &str = "id_counter";

/// Session view of the symbol table, mirrored in memory.
///
/// Bindings made during resolution stay pending until [`Environment::commit`];
/// the allocation counter is written through immediately.
pub struct Environment<'a> {
    backend: &'a dyn Backend,
    symbols: BTreeMap<String, String>,
    pending: BTreeMap<String, String>,
    cleared: bool,
    counter: i64,
}

impl<'a> Environment<'a> {
    /// Ensure the symbol relation exists and load every binding.
    pub fn load(backend: &'a dyn Backend) -> Result<Self, BackendError> {
        backend.execute(&create_symbol_table())?;
        let (symbols, counter) = read_symbols(backend)?;
        debug!(bindings = symbols.len(), counter, "environment loaded");
        Ok(Self {
            backend,
            symbols,
            pending: BTreeMap::new(),
            cleared: false,
            counter,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        if name == BASE_VARIABLE {
            return Some(BASE_GRAPH_NAME);
        }
        self.symbols.get(name).map(String::as_str)
    }

    pub fn set_value(&mut self, name: &str, value: &str) -> Result<(), QueryError> {
        if name == BASE_VARIABLE {
            return Err(ResolutionError::ReservedVariable {
                name: name.to_string(),
            }
            .into());
        }
        self.symbols.insert(name.to_string(), value.to_string());
        self.pending.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn allocate_graph(&mut self) -> Result<Graph, BackendError> {
        let id = self.next_id()?;
        Ok(Graph::new(format!("{GRAPH_PREFIX}{id}")))
    }

    pub fn allocate_graph_metadata(&mut self) -> Result<GraphMetadata, BackendError> {
        let id = self.next_id()?;
        Ok(GraphMetadata::new(format!("{METADATA_PREFIX}{id}")))
    }

    /// Bound `(variable, relation)` pairs in name order.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &str)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop scratch relations and allocated relations no binding reaches.
    /// Returns how many relations were dropped.
    pub fn gc(&self) -> Result<usize, BackendError> {
        let mut reachable: BTreeSet<String> = [
            VERTEX_TABLE,
            EDGE_TABLE,
            VERTEX_ANNO_TABLE,
            EDGE_ANNO_TABLE,
            SYMBOL_TABLE,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        let base = Graph::base();
        reachable.insert(base.vertex_table());
        reachable.insert(base.edge_table());
        for value in self.symbols.values() {
            reachable.insert(format!("{value}_vertex"));
            reachable.insert(format!("{value}_edge"));
        }

        let mut statements = String::new();
        let mut dropped = 0;
        for relation in self.backend.relation_names()? {
            let collectible = relation.starts_with(SCRATCH_PREFIX)
                || ((relation.starts_with(GRAPH_PREFIX) || relation.starts_with(METADATA_PREFIX))
                    && !reachable.contains(&relation));
            if collectible {
                statements.push_str(&format!("DROP TABLE IF EXISTS {relation};\n"));
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.backend.execute(&statements)?;
        }
        debug!(dropped, "gc sweep finished");
        Ok(dropped)
    }

    /// Forget every binding. The stored table is emptied on commit and the
    /// next gc collects what the bindings kept alive.
    ///
    /// The counter survives, so names allocated earlier in the same query
    /// are never handed out again.
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.pending.clear();
        self.cleared = true;
    }

    /// Persist pending bindings and any clear.
    pub fn commit(&mut self) -> Result<(), BackendError> {
        if self.cleared {
            self.backend.execute(&format!(
                "DROP TABLE IF EXISTS {SYMBOL_TABLE};\n{}",
                create_symbol_table()
            ))?;
            self.upsert(COUNTER_KEY, &self.counter.to_string())?;
            self.cleared = false;
        }
        let pending = std::mem::take(&mut self.pending);
        for (name, value) in &pending {
            self.upsert(name, value)?;
        }
        debug!(bindings = pending.len(), "environment committed");
        Ok(())
    }

    /// Drop pending bindings and any clear, returning to the stored table.
    pub fn discard(&mut self) -> Result<(), BackendError> {
        if self.pending.is_empty() && !self.cleared {
            return Ok(());
        }
        let (symbols, _) = read_symbols(self.backend)?;
        self.symbols = symbols;
        self.pending.clear();
        self.cleared = false;
        debug!(bindings = self.symbols.len(), "environment changes discarded");
        Ok(())
    }

    fn next_id(&mut self) -> Result<i64, BackendError> {
        let next = self.counter + 1;
        self.upsert(COUNTER_KEY, &next.to_string())?;
        self.counter = next;
        Ok(next)
    }

    fn upsert(&self, name: &str, value: &str) -> Result<(), BackendError> {
        self.backend.execute(&format!(
            "INSERT INTO {SYMBOL_TABLE} (name, value) VALUES ({}, {}) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value;",
            quote_literal(name),
            quote_literal(value)
        ))?;
        Ok(())
    }
}

/// Stored bindings and allocation counter.
fn read_symbols(backend: &dyn Backend) -> Result<(BTreeMap<String, String>, i64), BackendError> {
    let rows = backend.query_rows(&format!("SELECT name, value FROM {SYMBOL_TABLE};"))?;
    let mut symbols = BTreeMap::new();
    let mut counter = 0;
    for row in rows {
        let [name, value]: [String; 2] = row.try_into().map_err(|row: Vec<String>| {
            BackendError::Other(format!(
                "symbol table row has {} columns, expected 2",
                row.len()
            ))
        })?;
        if name == COUNTER_KEY {
            counter = value
                .trim()
                .parse()
                .map_err(|_| BackendError::UnexpectedOutput(value.clone()))?;
        } else {
            symbols.insert(name, value);
        }
    }
    Ok((symbols, counter))
}

fn create_symbol_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {SYMBOL_TABLE} (name TEXT PRIMARY KEY, value TEXT NOT NULL);"
    )
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::store::SqliteBackend;

    fn create_graph(backend: &SqliteBackend, graph: &Graph) -> Result<()> {
        backend.execute(&format!(
            "CREATE TABLE {} (id INTEGER); CREATE TABLE {} (id INTEGER);",
            graph.vertex_table(),
            graph.edge_table()
        ))?;
        Ok(())
    }

    #[test]
    fn base_variable_is_reserved() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        assert_eq!(env.lookup("$base"), Some("trace_base"));
        let err = env.set_value("$base", "trace_3").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(ResolutionError::ReservedVariable { .. })
        ));
        assert_eq!(env.lookup("$missing"), None);
        Ok(())
    }

    #[test]
    fn bindings_and_counter_persist_across_loads() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        {
            let mut env = Environment::load(&backend)?;
            let a = env.allocate_graph()?;
            let m = env.allocate_graph_metadata()?;
            assert_eq!(a.name(), "trace_1");
            assert_eq!(m.name(), "meta_2");
            env.set_value("$a", a.name())?;
            env.set_value("$a", "trace_9")?;
            env.commit()?;
        }
        let mut env = Environment::load(&backend)?;
        assert_eq!(env.lookup("$a"), Some("trace_9"));
        assert_eq!(env.allocate_graph()?.name(), "trace_3");
        let listed: Vec<_> = env.symbols().collect();
        assert_eq!(listed, vec![("$a", "trace_9")]);
        Ok(())
    }

    #[test]
    fn allocation_never_repeats() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let mut seen = BTreeSet::new();
        for _ in 0..50 {
            assert!(seen.insert(env.allocate_graph()?.name().to_string()));
        }
        Ok(())
    }

    #[test]
    fn gc_drops_only_unreachable_allocations_and_scratch() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let kept = env.allocate_graph()?;
        let orphan = env.allocate_graph()?;
        create_graph(&backend, &kept)?;
        create_graph(&backend, &orphan)?;
        backend.execute("CREATE TABLE m_cur (id INTEGER); CREATE TABLE audit_log (id INTEGER);")?;
        env.set_value("$kept", kept.name())?;

        assert_eq!(env.gc()?, 3);
        let names = backend.relation_names()?;
        assert!(names.contains(&kept.vertex_table()));
        assert!(names.contains(&kept.edge_table()));
        assert!(!names.contains(&orphan.vertex_table()));
        assert!(!names.iter().any(|n| n == "m_cur"));
        assert!(names.iter().any(|n| n == "audit_log"));
        assert!(names.iter().any(|n| n == "trace_base_vertex"));
        Ok(())
    }

    #[test]
    fn clear_forgets_bindings_but_keeps_counter() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        let g = env.allocate_graph()?;
        create_graph(&backend, &g)?;
        env.set_value("$g", g.name())?;

        env.commit()?;

        env.clear();
        assert_eq!(env.lookup("$g"), None);
        env.commit()?;
        env.gc()?;
        assert!(!backend.relation_names()?.contains(&g.vertex_table()));
        assert_eq!(env.allocate_graph()?.name(), "trace_2");

        let reloaded = Environment::load(&backend)?;
        assert_eq!(reloaded.symbols().count(), 0);
        Ok(())
    }

    #[test]
    fn discard_returns_to_stored_bindings() -> Result<()> {
        let backend = SqliteBackend::open_in_memory()?;
        let mut env = Environment::load(&backend)?;
        env.set_value("$a", "trace_1")?;
        env.commit()?;

        env.set_value("$a", "trace_7")?;
        env.set_value("$b", "trace_8")?;
        assert_eq!(Environment::load(&backend)?.lookup("$b"), None);
        env.discard()?;
        assert_eq!(env.lookup("$a"), Some("trace_1"));
        assert_eq!(env.lookup("$b"), None);

        env.clear();
        env.discard()?;
        assert_eq!(env.lookup("$a"), Some("trace_1"));
        env.commit()?;
        assert_eq!(Environment::load(&backend)?.symbols().count(), 1);
        Ok(())
    }
}
