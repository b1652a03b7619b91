use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;

use provql::{QueryEngine, SqliteBackend};

use super::util::emit_response;

pub(crate) fn cmd_repl(store: &Path) -> Result<()> {
    let engine = QueryEngine::new(SqliteBackend::open(store)?);
    let stdin = io::stdin();
    let mut input = String::new();
    let mut json = false;

    println!("provql REPL. Enter queries; `\\json` toggles JSON output, `\\symbols` lists bindings, `\\quit` leaves.");
    loop {
        print!("provql> ");
        io::stdout().flush().ok();
        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        let result: Result<()> = match line {
            "\\quit" | "\\exit" => break,
            "\\json" => {
                json = !json;
                println!("json output {}", if json { "on" } else { "off" });
                Ok(())
            }
            "\\symbols" => match engine.symbols() {
                Ok(symbols) => {
                    for (name, relation) in symbols {
                        println!("{name} -> {relation}");
                    }
                    Ok(())
                }
                Err(err) => Err(err.into()),
            },
            query => emit_response(&engine.respond(query), json),
        };

        if let Err(err) = result {
            eprintln!("error: {err:#}");
        }
    }

    Ok(())
}
