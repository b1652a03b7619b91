//! Narrow contract between the query engine and the relational store.

use std::sync::{Condvar, Mutex, PoisonError};

use crate::error::BackendError;

/// Relational store the engine issues statements against.
///
/// Statements are plain text. Implementations must run multi-statement text
/// in order and stop at the first failing statement.
pub trait Backend {
    /// Run one or more statements and return the newline-delimited rows of
    /// the last statement that produced rows (columns joined by `|`).
    fn execute(&self, statements: &str) -> Result<String, BackendError>;

    /// Structured form of [`Backend::execute`] for callers that need to keep
    /// values containing delimiters intact.
    fn query_rows(&self, statements: &str) -> Result<Vec<Vec<String>>, BackendError>;

    /// Names of every relation currently present in the store.
    fn relation_names(&self) -> Result<Vec<String>, BackendError>;

    /// Acquire the session-wide execution lock, blocking until it is free.
    fn begin_transaction(&self);

    /// Release the execution lock taken by [`Backend::begin_transaction`].
    fn finalize_transaction(&self);

    /// Run a count-style statement and parse its single integer result.
    fn execute_for_long_result(&self, statement: &str) -> Result<i64, BackendError> {
        let output = self.execute(statement)?;
        let trimmed = output.trim();
        trimmed
            .parse::<i64>()
            .map_err(|_| BackendError::UnexpectedOutput(trimmed.to_string()))
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn execute(&self, statements: &str) -> Result<String, BackendError> {
        (**self).execute(statements)
    }

    fn query_rows(&self, statements: &str) -> Result<Vec<Vec<String>>, BackendError> {
        (**self).query_rows(statements)
    }

    fn relation_names(&self) -> Result<Vec<String>, BackendError> {
        (**self).relation_names()
    }

    fn begin_transaction(&self) {
        (**self).begin_transaction()
    }

    fn finalize_transaction(&self) {
        (**self).finalize_transaction()
    }

    fn execute_for_long_result(&self, statement: &str) -> Result<i64, BackendError> {
        (**self).execute_for_long_result(statement)
    }
}

/// Holds the execution lock for its lifetime and releases it exactly once on drop.
pub struct TransactionGuard<'a> {
    backend: &'a dyn Backend,
}

impl<'a> TransactionGuard<'a> {
    pub fn begin(backend: &'a dyn Backend) -> Self {
        backend.begin_transaction();
        Self { backend }
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        self.backend.finalize_transaction();
    }
}

/// Blocking, non-reentrant lock whose acquire and release happen in separate calls.
#[derive(Debug, Default)]
pub struct TransactionLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl TransactionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    pub fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_one();
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn lock_blocks_second_acquirer_until_release() {
        let lock = Arc::new(TransactionLock::new());
        let entered = Arc::new(AtomicUsize::new(0));
        lock.acquire();

        let waiter = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                lock.acquire();
                entered.fetch_add(1, Ordering::SeqCst);
                lock.release();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);
        lock.release();
        waiter.join().expect("waiter thread");
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert!(!lock.is_held());
    }
}
