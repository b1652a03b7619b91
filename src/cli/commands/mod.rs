mod load;
mod new;
mod query;
mod repl;
mod storage;
mod util;

pub(crate) use load::cmd_load;
pub(crate) use new::cmd_new;
pub(crate) use query::cmd_query;
pub(crate) use repl::cmd_repl;
pub(crate) use storage::{cmd_gc, cmd_reset, cmd_symbols};

pub(crate) use util::require_store_path;
