mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use provql::logging::init_logging;

#[derive(Parser)]
#[command(name = "provql", version, about = "Graph-algebra queries over a provenance store")]
struct Cli {
    /// Path to an existing provql database
    #[arg(
        short = 'd',
        long = "db",
        global = true,
        env = "PROVQL_DB",
        value_name = "PATH"
    )]
    store: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `provql::sql=debug`
    #[arg(long = "log-level", global = true, env = "PROVQL_LOG", value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new database initialised with the base schema and PRAGMAs
    New {
        /// Project name or path for the database file
        name: String,
    },
    /// Load a JSON graph document into the base graph
    Load {
        /// Document with `vertices` and `edges` arrays
        file: PathBuf,
    },
    /// Run a query and print its response
    Query {
        /// Query text; read from --file or stdin when omitted
        text: Option<String>,
        /// Read the query from a file
        #[arg(long = "file", short = 'f', value_name = "PATH", conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Print the response as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Interactive query loop
    Repl,
    /// List bound variables and the relations they name
    Symbols,
    /// Drop scratch relations and relations no variable reaches
    Gc,
    /// Drop every relation and reinstall the empty base schema
    Reset {
        /// Required confirmation flag
        #[arg(long = "yes")]
        yes: bool,
    },
}

pub(crate) fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Command::New { name } => commands::cmd_new(&name),
        Command::Load { file } => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_load(store_path, &file)
        }
        Command::Query { text, file, json } => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_query(store_path, text.as_deref(), file.as_deref(), json)
        }
        Command::Repl => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_repl(store_path)
        }
        Command::Symbols => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_symbols(store_path)
        }
        Command::Gc => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_gc(store_path)
        }
        Command::Reset { yes } => {
            let store_path = commands::require_store_path(cli.store.as_deref())?;
            commands::cmd_reset(store_path, yes)
        }
    }
}
