use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use provql::Response;

pub(crate) fn require_store_path(path: Option<&Path>) -> Result<&Path> {
    match path {
        Some(p) => Ok(p),
        None => bail!("specify --db PATH (or PROVQL_DB) for this command"),
    }
}

/// Print a response; export responses are written to their destination first.
pub(crate) fn emit_response(response: &Response, json: bool) -> Result<()> {
    if let Response::Export { path, graph, .. } = response {
        fs::write(path, graph.to_dot()).with_context(|| format!("failed to write {path}"))?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        let text = response.to_string();
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
