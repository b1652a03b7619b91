use std::path::Path;

use anyhow::{Result, bail};

use provql::{QueryEngine, SqliteBackend};

pub(crate) fn cmd_symbols(store: &Path) -> Result<()> {
    let engine = QueryEngine::new(SqliteBackend::open(store)?);
    let symbols = engine.symbols()?;
    if symbols.is_empty() {
        println!("no variables bound");
        return Ok(());
    }
    for (name, relation) in symbols {
        println!("{name} -> {relation}");
    }
    Ok(())
}

pub(crate) fn cmd_gc(store: &Path) -> Result<()> {
    let engine = QueryEngine::new(SqliteBackend::open(store)?);
    let dropped = engine.collect_garbage()?;
    println!("dropped {dropped} relation(s)");
    Ok(())
}

pub(crate) fn cmd_reset(store: &Path, yes: bool) -> Result<()> {
    if !yes {
        bail!("reset drops every relation including the base graph; pass --yes to confirm");
    }
    let backend = SqliteBackend::open(store)?;
    backend.reset_storage()?;
    println!("reset {}", store.display());
    Ok(())
}
