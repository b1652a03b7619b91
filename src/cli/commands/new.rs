use anyhow::Result;

use provql::{SqliteBackend, derive_db_path};

pub(crate) fn cmd_new(name: &str) -> Result<()> {
    let path = derive_db_path(name);
    let backend = SqliteBackend::create(&path)?;
    drop(backend);
    println!("created provql database at {}", path.display());
    Ok(())
}
