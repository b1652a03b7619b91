//! Query driver: parse, resolve, execute under the transaction lock, collect.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::backend::{Backend, TransactionGuard};
use crate::environment::Environment;
use crate::error::{BackendError, QueryError};
use crate::program::ExecutionContext;
use crate::query::{ParseTree, parse};
use crate::resolver::resolve;
use crate::response::Response;

/// Runs queries against one backend. Queries issued through one engine run
/// one at a time, from parse through the final gc sweep.
pub struct QueryEngine<B: Backend> {
    backend: B,
    session: Mutex<()>,
}

impl<B: Backend> QueryEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: Mutex::new(()),
        }
    }

    fn session(&self) -> MutexGuard<'_, ()> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one query and return its last response, or `OK` if it produced none.
    ///
    /// Garbage collection runs after every query that got as far as loading
    /// the environment, whether or not execution succeeded.
    pub fn execute(&self, query: &str) -> Result<Response, QueryError> {
        let tree = parse(query)?;
        let _session = self.session();
        debug!(statements = tree.statements.len(), "parsed query");

        let mut env = Environment::load(&self.backend)?;
        let outcome = self.resolve_and_run(&tree, &mut env);
        let collected = env.gc();

        let response = outcome?;
        collected?;
        info!(return_type = response.return_type(), "query finished");
        Ok(response)
    }

    /// Like [`QueryEngine::execute`], folding failures into an error response.
    pub fn respond(&self, query: &str) -> Response {
        match self.execute(query) {
            Ok(response) => response,
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "query failed");
                Response::from(&err)
            }
        }
    }

    /// Bound `(variable, relation)` pairs, in name order.
    pub fn symbols(&self) -> Result<Vec<(String, String)>, BackendError> {
        let _session = self.session();
        let env = Environment::load(&self.backend)?;
        Ok(env
            .symbols()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    pub fn collect_garbage(&self) -> Result<usize, BackendError> {
        let _session = self.session();
        Environment::load(&self.backend)?.gc()
    }

    fn resolve_and_run(
        &self,
        tree: &ParseTree,
        env: &mut Environment<'_>,
    ) -> Result<Response, QueryError> {
        let program = resolve(tree, env)?;
        debug!(instructions = program.len(), "resolved program\n{program}");

        let mut ctx = ExecutionContext::new(&self.backend);
        {
            let _guard = TransactionGuard::begin(&self.backend);
            program.execute(&mut ctx)?;
        }
        Ok(ctx.into_last_response().unwrap_or_else(Response::ok))
    }
}
