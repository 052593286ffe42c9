//! Capability interfaces between the engine and a database driver.
//!
//! The engine never touches a native connection type. A backend implements
//! the small traits below (`Query`, `Execute`, `Call`, `Metadata`,
//! `TransactionControl`) on its connection type and hands connections out
//! through a [`ConnectionProvider`]. The `sqlx` backends in [`crate::db::backend`]
//! are one such implementation; tests plug in an in-memory one.

use crate::db::procedure::CallableStatement;
use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, IsolationLevel, ProcedureColumn, Row, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A forward-only cursor over an open result.
pub trait Cursor: Send {
    /// Fetch the next row, `Ok(None)` once the result is exhausted.
    fn next_row(&mut self) -> DaoResult<Option<Row>>;
}

pub trait Query {
    /// Run a statement and collect every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> DaoResult<Vec<Row>>;

    /// Run a statement and return a lazy cursor over its rows.
    ///
    /// The connection stays checked out by the cursor until it is dropped.
    fn open_cursor(&mut self, sql: &str, params: &[Value]) -> DaoResult<Box<dyn Cursor>>;
}

pub trait Execute {
    /// Run a statement and return the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> DaoResult<u64>;

    /// Run one statement for every parameter set, returning the affected
    /// count of each.
    fn execute_batch(&mut self, sql: &str, batch: &[Vec<Value>]) -> DaoResult<Vec<u64>>;
}

pub trait Call {
    /// Invoke a stored procedure or function.
    ///
    /// The result holds the return value first (function calls only), then
    /// every OUT and IN_OUT value in declared order.
    fn call(&mut self, statement: &CallableStatement) -> DaoResult<Vec<Value>>;
}

pub trait Metadata {
    /// Primary key columns of a table, in key order.
    fn primary_keys(&mut self, table: &str) -> DaoResult<Vec<String>>;

    /// Parameter metadata of a procedure or function.
    ///
    /// `schema` of `None` means the connection's default schema.
    fn procedure_columns(
        &mut self,
        schema: Option<&str>,
        name: &str,
    ) -> DaoResult<Vec<ProcedureColumn>>;

    /// Schema unqualified names resolve against, usually derived from the user.
    fn current_schema(&mut self) -> DaoResult<Option<String>>;
}

pub trait TransactionControl {
    /// Leave auto-commit mode and apply the isolation level.
    fn begin(&mut self, isolation: IsolationLevel) -> DaoResult<()>;
    fn commit(&mut self) -> DaoResult<()>;
    fn rollback(&mut self) -> DaoResult<()>;
}

/// A physical connection with every capability the engine needs.
pub trait Connection: Query + Execute + Call + Metadata + TransactionControl + Send {
    /// Dialect spoken by this connection, `None` when unknown.
    ///
    /// Range queries are pushed down as LIMIT/OFFSET only for known dialects
    /// and windowed after fetching otherwise.
    fn database_type(&self) -> Option<DatabaseType>;
}

/// Hands out and takes back physical connections.
pub trait ConnectionProvider: Send + Sync {
    /// Acquire one connection, blocking until one is available.
    fn acquire(&self) -> DaoResult<Box<dyn Connection>>;

    /// Give a connection back.
    fn release(&self, connection: Box<dyn Connection>);

    /// Close the provider and every idle connection it holds.
    fn close(&self) {}
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to one physical connection.
///
/// Clones refer to the same connection. Once [`ConnectionHandle::take`] has
/// handed the connection back for release, every clone fails with a data
/// access error instead of touching a connection another caller now owns.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    slot: Arc<Mutex<Option<Box<dyn Connection>>>>,
}

impl ConnectionHandle {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            slot: Arc::new(Mutex::new(Some(connection))),
        }
    }

    /// Identity of the underlying connection; equal ids mean the same connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `f` against the connection.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Connection) -> DaoResult<R>) -> DaoResult<R> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_deref_mut() {
            Some(connection) => f(connection),
            None => Err(DaoError::data_access(format!(
                "Connection #{} has already been released",
                self.id
            ))),
        }
    }

    pub fn database_type(&self) -> Option<DatabaseType> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .and_then(|c| c.database_type())
    }

    /// Detach the connection for release. Returns `None` if already taken.
    pub fn take(&self) -> Option<Box<dyn Connection>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_released(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
