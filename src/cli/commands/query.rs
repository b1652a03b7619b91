use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};

use provql::{QueryEngine, SqliteBackend};

use super::util::emit_response;

pub(crate) fn cmd_query(
    store: &Path,
    text: Option<&str>,
    file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let query = match (text, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let engine = QueryEngine::new(SqliteBackend::open(store)?);
    let response = engine.respond(&query);
    emit_response(&response, json)?;
    if response.is_error() {
        bail!("query failed");
    }
    Ok(())
}
