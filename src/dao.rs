//! Data access facade.
//!
//! A [`Dao`] is a cheap handle onto one data source. Each call borrows an
//! [`Executor`] from the data source's [`ExecutorFactory`], runs, and
//! finishes the executor before returning, on success and failure alike.
//!
//! On the calling thread of an open transaction, a regular `Dao` joins that
//! transaction's connection. A standalone `Dao` always works on a fresh
//! connection, committed independently of any surrounding transaction.

use crate::db::binding::Bindable;
use crate::db::executor::Executor;
use crate::db::factory::ExecutorFactory;
use crate::db::iterator::{RowIterator, RowPreprocessor};
use crate::error::DaoResult;
use crate::models::{
    BatchCommand, Command, IsolationLevel, IteratorBatchCommand, Page, Record, Row, Value,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Dao {
    factory: Arc<ExecutorFactory>,
    standalone: bool,
}

impl Dao {
    pub fn new(factory: Arc<ExecutorFactory>, standalone: bool) -> Self {
        Self {
            factory,
            standalone,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    pub fn data_source_name(&self) -> &str {
        self.factory.data_source()
    }

    fn with_executor<T>(&self, f: impl FnOnce(&Executor) -> DaoResult<T>) -> DaoResult<T> {
        let mut executor = self.factory.get(self.standalone)?;
        let result = f(&executor);
        executor.finish();
        result
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every row of a read.
    pub fn query(&self, sql: &str, params: &[Value]) -> DaoResult<Vec<Row>> {
        self.with_executor(|e| e.query(sql, params, -1, -1))
    }

    pub fn query_as<T: Bindable>(&self, sql: &str, params: &[Value]) -> DaoResult<Vec<T>> {
        self.with_executor(|e| e.query_as(sql, params, -1, -1))
    }

    /// First row of a read, if any.
    pub fn query_first(&self, sql: &str, params: &[Value]) -> DaoResult<Option<Row>> {
        let mut rows = self.with_executor(|e| e.query(sql, params, 0, 1))?;
        Ok(rows.pop())
    }

    pub fn query_first_as<T: Bindable>(&self, sql: &str, params: &[Value]) -> DaoResult<Option<T>> {
        let mut items = self.with_executor(|e| e.query_as(sql, params, 0, 1))?;
        Ok(items.pop())
    }

    /// Rows `[start, end)` of a read; a negative bound returns every row.
    pub fn query_range(
        &self,
        sql: &str,
        params: &[Value],
        start: i64,
        end: i64,
    ) -> DaoResult<Vec<Row>> {
        self.with_executor(|e| e.query(sql, params, start, end))
    }

    pub fn query_range_as<T: Bindable>(
        &self,
        sql: &str,
        params: &[Value],
        start: i64,
        end: i64,
    ) -> DaoResult<Vec<T>> {
        self.with_executor(|e| e.query_as(sql, params, start, end))
    }

    /// One 0-based page of a read with the total row count.
    pub fn query_page(
        &self,
        sql: &str,
        params: &[Value],
        page_size: u64,
        page_index: u64,
    ) -> DaoResult<Page<Row>> {
        self.with_executor(|e| e.query_page(sql, params, page_size, page_index))
    }

    pub fn query_page_as<T: Bindable>(
        &self,
        sql: &str,
        params: &[Value],
        page_size: u64,
        page_index: u64,
    ) -> DaoResult<Page<T>> {
        self.with_executor(|e| e.query_page_as(sql, params, page_size, page_index))
    }

    /// Lazily iterate a read.
    ///
    /// The iterator runs on its own connection, never a transaction's, and
    /// releases it when closed or dropped.
    pub fn query_iterator(
        &self,
        sql: &str,
        params: &[Value],
        preprocessor: Option<RowPreprocessor>,
    ) -> DaoResult<RowIterator> {
        self.factory
            .get(true)?
            .query_iterator(sql, params, preprocessor)
    }

    pub fn count(&self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        self.with_executor(|e| e.count(sql, params))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn execute(&self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        self.with_executor(|e| e.execute(sql, params))
    }

    pub fn execute_command(&self, command: &Command) -> DaoResult<u64> {
        self.execute(&command.statement, &command.params)
    }

    pub fn execute_batch(&self, batch: &BatchCommand) -> DaoResult<u64> {
        self.with_executor(|e| e.execute_batch(batch))
    }

    pub fn execute_iter_batch(&self, batch: IteratorBatchCommand) -> DaoResult<u64> {
        self.with_executor(|e| e.execute_iter_batch(batch))
    }

    pub fn insert(&self, record: impl Into<Record>, table: &str) -> DaoResult<u64> {
        let record = record.into();
        self.with_executor(|e| e.insert(record, table))
    }

    // =========================================================================
    // Primary-key operations
    // =========================================================================

    pub fn find<T: Bindable>(&self, table: &str, key: impl Into<Value>) -> DaoResult<Option<T>> {
        let key = key.into();
        self.with_executor(|e| e.find(table, key))
    }

    /// Find on the table `T` is bound to, see [`Bindable::table_name`].
    pub fn find_by_key<T: Bindable>(&self, key: impl Into<Value>) -> DaoResult<Option<T>> {
        let key = key.into();
        self.with_executor(|e| e.find_by_key(key))
    }

    /// Untyped [`Dao::find`].
    pub fn find_row(&self, table: &str, key: impl Into<Value>) -> DaoResult<Option<Row>> {
        let key = key.into();
        self.with_executor(|e| e.find_row(table, key))
    }

    /// Delete by the primary key carried in `record`.
    pub fn delete(&self, record: impl Into<Record>, table: &str) -> DaoResult<u64> {
        let record = record.into();
        self.with_executor(|e| e.delete(record, table))
    }

    pub fn delete_by_key(&self, table: &str, key: impl Into<Value>) -> DaoResult<u64> {
        let key = key.into();
        self.with_executor(|e| e.delete_by_key(table, key))
    }

    pub fn exists(&self, record: impl Into<Record>, table: &str) -> DaoResult<bool> {
        let record = record.into();
        self.with_executor(|e| e.exists(record, table))
    }

    // =========================================================================
    // Stored procedures
    // =========================================================================

    /// OUT and IN_OUT values of a procedure call, in declared order.
    pub fn call(&self, name: &str, params: &[Value]) -> DaoResult<Vec<Value>> {
        self.with_executor(|e| e.call(name, params))
    }

    /// Return value followed by OUT and IN_OUT values.
    pub fn call_function(&self, name: &str, params: &[Value]) -> DaoResult<Vec<Value>> {
        self.with_executor(|e| e.call_function(name, params))
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` in a transaction on the calling thread.
    ///
    /// `f` receives a joined (non-standalone) view of this data source, so
    /// everything it does through that view shares the transaction. Success
    /// commits; an error or panic rolls back, and errors come back as
    /// [`DaoError::Transaction`](crate::error::DaoError::Transaction).
    pub fn run_transaction<T>(
        &self,
        isolation: IsolationLevel,
        f: impl FnOnce(&Dao) -> DaoResult<T>,
    ) -> DaoResult<T> {
        let joined = Dao::new(self.factory.clone(), false);
        self.factory
            .transactions()
            .run(isolation, || f(&joined))
    }
}

impl std::fmt::Debug for Dao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("data_source", &self.data_source_name())
            .field("standalone", &self.standalone)
            .finish()
    }
}
