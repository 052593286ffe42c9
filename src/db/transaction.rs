//! Thread-confined transaction state.
//!
//! A [`TransactionManager`] tracks at most one transaction per calling
//! thread. The first `start` on a thread acquires a connection and begins a
//! physical transaction; nested starts only deepen it. The connection is
//! committed or rolled back and released when the outermost scope ends.
//!
//! A rollback in a nested scope does not touch the database. It marks the
//! transaction, and the outermost `commit` then rolls back instead and
//! reports the forced rollback as an error.

use crate::db::driver::{ConnectionHandle, ConnectionProvider};
use crate::error::{DaoError, DaoResult};
use crate::models::{IsolationLevel, TransactionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, info, warn};

struct TransactionContext {
    handle: ConnectionHandle,
    isolation: IsolationLevel,
    depth: u32,
    marked_for_rollback: bool,
    started_at: Instant,
}

pub struct TransactionManager {
    data_source: String,
    provider: Arc<dyn ConnectionProvider>,
    contexts: Mutex<HashMap<ThreadId, TransactionContext>>,
}

impl TransactionManager {
    pub fn new(data_source: impl Into<String>, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            data_source: data_source.into(),
            provider,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a transaction on the calling thread, or deepen the active one.
    ///
    /// The isolation level of a nested start is ignored.
    pub fn start(&self, isolation: IsolationLevel) -> DaoResult<()> {
        let thread = thread::current().id();
        if let Some(ctx) = self.contexts().get_mut(&thread) {
            ctx.depth += 1;
            debug!(
                data_source = %self.data_source,
                depth = ctx.depth,
                "Nested transaction scope entered"
            );
            return Ok(());
        }

        let handle = ConnectionHandle::new(self.provider.acquire()?);
        if let Err(e) = handle.with(|conn| conn.begin(isolation)) {
            self.release(&handle);
            return Err(e);
        }

        info!(
            data_source = %self.data_source,
            connection = handle.id(),
            isolation = %isolation,
            "Transaction started"
        );

        self.contexts().insert(
            thread,
            TransactionContext {
                handle,
                isolation,
                depth: 1,
                marked_for_rollback: false,
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Leave the innermost scope.
    ///
    /// Returns [`TransactionState::Active`] while outer scopes remain and
    /// [`TransactionState::Committed`] once the physical commit succeeded.
    /// Fails with a transaction error when no transaction is active or when
    /// a nested scope rolled back, in which case the transaction has been
    /// rolled back and its connection released.
    pub fn commit(&self) -> DaoResult<TransactionState> {
        let ctx = {
            let mut contexts = self.contexts();
            let thread = thread::current().id();
            let Some(ctx) = contexts.get_mut(&thread) else {
                return Err(DaoError::transaction(format!(
                    "No active transaction to commit on data source '{}'",
                    self.data_source
                )));
            };
            if ctx.depth > 1 {
                ctx.depth -= 1;
                return Ok(TransactionState::Active);
            }
            match contexts.remove(&thread) {
                Some(ctx) => ctx,
                None => return Ok(TransactionState::Active),
            }
        };

        if ctx.marked_for_rollback {
            let rolled_back = ctx.handle.with(|conn| conn.rollback());
            self.release(&ctx.handle);
            warn!(
                data_source = %self.data_source,
                connection = ctx.handle.id(),
                "Commit refused: a nested scope rolled back, transaction rolled back instead"
            );
            return Err(DaoError::Transaction {
                message: "Transaction was marked for rollback by a nested scope and has been rolled back"
                    .to_string(),
                source: rolled_back.err().map(Box::new),
            });
        }

        let committed = ctx.handle.with(|conn| conn.commit());
        if committed.is_err() {
            let _ = ctx.handle.with(|conn| conn.rollback());
        }
        self.release(&ctx.handle);
        committed?;

        info!(
            data_source = %self.data_source,
            connection = ctx.handle.id(),
            isolation = %ctx.isolation,
            elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
            "Transaction committed"
        );
        Ok(TransactionState::Committed)
    }

    /// Leave the innermost scope by rolling back.
    ///
    /// The outermost scope rolls back physically and releases the
    /// connection. A nested scope only marks the transaction so that the
    /// outermost commit cannot succeed. Without an active transaction this
    /// does nothing.
    pub fn rollback(&self) -> DaoResult<TransactionState> {
        let ctx = {
            let mut contexts = self.contexts();
            let thread = thread::current().id();
            let Some(ctx) = contexts.get_mut(&thread) else {
                debug!(data_source = %self.data_source, "Rollback without an active transaction");
                return Ok(TransactionState::RolledBack);
            };
            if ctx.depth > 1 {
                ctx.depth -= 1;
                ctx.marked_for_rollback = true;
                debug!(
                    data_source = %self.data_source,
                    depth = ctx.depth,
                    "Nested scope rolled back, transaction marked for rollback"
                );
                return Ok(TransactionState::Active);
            }
            match contexts.remove(&thread) {
                Some(ctx) => ctx,
                None => return Ok(TransactionState::RolledBack),
            }
        };

        let rolled_back = ctx.handle.with(|conn| conn.rollback());
        self.release(&ctx.handle);
        rolled_back?;

        info!(
            data_source = %self.data_source,
            connection = ctx.handle.id(),
            "Transaction rolled back"
        );
        Ok(TransactionState::RolledBack)
    }

    /// Run `f` inside a transaction scope.
    ///
    /// Commits when `f` succeeds. When `f` fails, or panics, the scope is
    /// rolled back; failures are reported as transaction errors.
    pub fn run<T>(
        &self,
        isolation: IsolationLevel,
        f: impl FnOnce() -> DaoResult<T>,
    ) -> DaoResult<T> {
        self.start(isolation)?;

        let mut guard = UnwindGuard {
            manager: self,
            armed: true,
        };
        let outcome = f();
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.commit().map_err(DaoError::transaction_failed)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(
                        data_source = %self.data_source,
                        error = %rollback_err,
                        "Rollback after failed transaction block also failed"
                    );
                }
                Err(DaoError::transaction_failed(e))
            }
        }
    }

    /// Connection of the calling thread's transaction, if one is active.
    pub fn current_handle(&self) -> Option<ConnectionHandle> {
        self.contexts()
            .get(&thread::current().id())
            .map(|ctx| ctx.handle.clone())
    }

    pub fn is_active(&self) -> bool {
        self.contexts().contains_key(&thread::current().id())
    }

    /// Nesting depth on the calling thread, 0 without a transaction.
    pub fn depth(&self) -> u32 {
        self.contexts()
            .get(&thread::current().id())
            .map_or(0, |ctx| ctx.depth)
    }

    /// Isolation level of the calling thread's transaction.
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.contexts()
            .get(&thread::current().id())
            .map(|ctx| ctx.isolation)
    }

    pub fn is_marked_for_rollback(&self) -> bool {
        self.contexts()
            .get(&thread::current().id())
            .is_some_and(|ctx| ctx.marked_for_rollback)
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<ThreadId, TransactionContext>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, handle: &ConnectionHandle) {
        if let Some(conn) = handle.take() {
            self.provider.release(conn);
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        let leftover: Vec<_> = self.contexts().drain().map(|(_, ctx)| ctx).collect();
        for ctx in leftover {
            warn!(
                data_source = %self.data_source,
                connection = ctx.handle.id(),
                depth = ctx.depth,
                "Transaction still open at shutdown, rolling back"
            );
            let _ = ctx.handle.with(|conn| conn.rollback());
            self.release(&ctx.handle);
        }
    }
}

/// Rolls the scope back if the transactional block unwinds.
struct UnwindGuard<'a> {
    manager: &'a TransactionManager,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.manager.rollback();
        }
    }
}
