use std::path::Path;

use anyhow::Result;

use provql::{GraphDocument, SqliteBackend, load_document};

pub(crate) fn cmd_load(store: &Path, file: &Path) -> Result<()> {
    let document = GraphDocument::read(file)?;
    let backend = SqliteBackend::open(store)?;
    let summary = load_document(&backend, &document)?;
    println!(
        "loaded {} vertices and {} edges from {}",
        summary.vertices,
        summary.edges,
        file.display()
    );
    Ok(())
}
