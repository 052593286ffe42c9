//! Connection-bound statement execution.
//!
//! An [`Executor`] runs on exactly one connection. It either owns that
//! connection, and gives it back to the provider on [`Executor::finish`], or
//! borrows it from the calling thread's transaction, in which case `finish`
//! leaves it alone. `finish` also runs on drop, so every exit path releases.
//!
//! Every entry point expands a sole list parameter into positional
//! parameters before binding.

use crate::db::binding::Bindable;
use crate::db::convert::TypeConverter;
use crate::db::driver::{ConnectionHandle, ConnectionProvider};
use crate::db::iterator::{RowIterator, RowPreprocessor};
use crate::db::procedure::{create_callable_statement, create_sp_params};
use crate::error::{DaoError, DaoResult};
use crate::models::{
    BatchCommand, IteratorBatchCommand, Page, Record, Row, Value, fix_sql, normalize_params,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct Executor {
    handle: ConnectionHandle,
    owns_connection: bool,
    provider: Arc<dyn ConnectionProvider>,
    converter: Arc<TypeConverter>,
    finished: bool,
}

impl Executor {
    pub(crate) fn new(
        handle: ConnectionHandle,
        owns_connection: bool,
        provider: Arc<dyn ConnectionProvider>,
        converter: Arc<TypeConverter>,
    ) -> Self {
        Self {
            handle,
            owns_connection,
            provider,
            converter,
            finished: false,
        }
    }

    /// Whether `finish` gives the connection back to the provider.
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// Identity of the bound connection.
    pub fn connection_id(&self) -> u64 {
        self.handle.id()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run a read.
    ///
    /// When both bounds are non-negative only rows in `[start, end)` are
    /// returned; a negative bound returns every row.
    pub fn query(&self, sql: &str, params: &[Value], start: i64, end: i64) -> DaoResult<Vec<Row>> {
        let sql = fix_sql(sql);
        let params = normalize_params(params.to_vec());
        let begun = Instant::now();

        let rows = match window(start, end) {
            None => self.handle.with(|conn| conn.query(&sql, &params))?,
            Some((offset, limit)) => match self.handle.database_type() {
                Some(db_type) => {
                    let windowed = db_type.limit_offset(&sql, limit, offset);
                    self.handle.with(|conn| conn.query(&windowed, &params))?
                }
                None => self
                    .handle
                    .with(|conn| conn.query(&sql, &params))?
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect(),
            },
        };

        debug!(
            sql = %sql,
            params = params.len(),
            rows = rows.len(),
            elapsed_ms = begun.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(rows)
    }

    /// [`Executor::query`] with every row mapped onto `T`.
    pub fn query_as<T: Bindable>(
        &self,
        sql: &str,
        params: &[Value],
        start: i64,
        end: i64,
    ) -> DaoResult<Vec<T>> {
        let rows = self.query(sql, params, start, end)?;
        Ok(self.converter.convert_rows(&rows))
    }

    /// Number of rows a read returns.
    pub fn count(&self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        let counting = format!("SELECT COUNT(*) FROM (\n{}\n) hydro_count", fix_sql(sql));
        let rows = self.query(&counting, params, -1, -1)?;
        rows.first()
            .and_then(Row::first_value)
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| DaoError::data_access("Count query returned no numeric result"))
    }

    /// One 0-based page of a read together with the total row count.
    pub fn query_page(
        &self,
        sql: &str,
        params: &[Value],
        page_size: u64,
        page_index: u64,
    ) -> DaoResult<Page<Row>> {
        if page_size == 0 {
            return Err(DaoError::invalid_input("Page size must be at least 1"));
        }
        let total = self.count(sql, params)?;
        let start = page_index.saturating_mul(page_size);
        let end = start.saturating_add(page_size);
        let items = self.query(sql, params, clamp_bound(start), clamp_bound(end))?;
        // Rows committed between the count and the fetch can outnumber the count.
        let total = total.max(start.saturating_add(items.len() as u64));
        Ok(Page::new(items, total, page_index, page_size))
    }

    /// [`Executor::query_page`] with every row mapped onto `T`.
    pub fn query_page_as<T: Bindable>(
        &self,
        sql: &str,
        params: &[Value],
        page_size: u64,
        page_index: u64,
    ) -> DaoResult<Page<T>> {
        let page = self.query_page(sql, params, page_size, page_index)?;
        let items = self.converter.convert_rows(&page.items);
        Ok(Page::new(
            items,
            page.total_count,
            page.page_index,
            page.page_size,
        ))
    }

    /// Open a lazy cursor over a read.
    ///
    /// The executor is consumed: the returned iterator takes over the
    /// connection and releases it when closed. If the cursor cannot be
    /// opened the connection is released right away.
    pub fn query_iterator(
        mut self,
        sql: &str,
        params: &[Value],
        preprocessor: Option<RowPreprocessor>,
    ) -> DaoResult<RowIterator> {
        let sql = fix_sql(sql);
        let params = normalize_params(params.to_vec());
        let cursor = self.handle.with(|conn| conn.open_cursor(&sql, &params))?;

        debug!(
            sql = %sql,
            params = params.len(),
            connection = self.handle.id(),
            "Cursor opened"
        );

        self.finished = true;
        Ok(RowIterator::new(
            cursor,
            self.handle.clone(),
            self.owns_connection,
            self.provider.clone(),
            preprocessor,
        ))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Run a write and return the affected row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        let sql = fix_sql(sql);
        let params = normalize_params(params.to_vec());
        let begun = Instant::now();
        let affected = self.handle.with(|conn| conn.execute(&sql, &params))?;
        debug!(
            sql = %sql,
            params = params.len(),
            rows_affected = affected,
            elapsed_ms = begun.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(affected)
    }

    /// Run a prepared batch; returns the summed affected row count.
    pub fn execute_batch(&self, batch: &BatchCommand) -> DaoResult<u64> {
        if batch.params.is_empty() {
            return Ok(0);
        }
        let sql = fix_sql(&batch.statement);
        let sets: Vec<Vec<Value>> = batch
            .params
            .iter()
            .map(|set| normalize_params(set.clone()))
            .collect();
        let counts = self.handle.with(|conn| conn.execute_batch(&sql, &sets))?;
        let affected = counts.iter().sum();
        debug!(
            sql = %sql,
            sets = sets.len(),
            rows_affected = affected,
            "Batch executed"
        );
        Ok(affected)
    }

    /// Run a lazily produced batch, flushing every `batch_size` sets.
    pub fn execute_iter_batch(&self, batch: IteratorBatchCommand) -> DaoResult<u64> {
        let sql = fix_sql(&batch.statement);
        let batch_size = batch.batch_size.max(1);
        let mut params = batch.params;
        let mut affected = 0;
        let mut flushes = 0;
        loop {
            let chunk: Vec<Vec<Value>> = params
                .by_ref()
                .take(batch_size)
                .map(normalize_params)
                .collect();
            if chunk.is_empty() {
                break;
            }
            let counts = self.handle.with(|conn| conn.execute_batch(&sql, &chunk))?;
            affected += counts.iter().sum::<u64>();
            flushes += 1;
            if chunk.len() < batch_size {
                break;
            }
        }
        debug!(
            sql = %sql,
            flushes,
            rows_affected = affected,
            "Iterator batch executed"
        );
        Ok(affected)
    }

    /// Insert a record into `table`; returns the affected row count.
    ///
    /// Each row becomes one `INSERT` naming exactly its columns.
    pub fn insert(&self, record: impl Into<Record>, table: &str) -> DaoResult<u64> {
        check_identifier(table)?;
        let mut affected = 0;
        for row in record.into().into_rows() {
            if row.is_empty() {
                return Err(DaoError::invalid_input(format!(
                    "Cannot insert a row without columns into '{table}'"
                )));
            }
            let columns: Vec<&str> = row.column_names().collect();
            for column in &columns {
                check_identifier(column)?;
            }
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            let values: Vec<Value> = row.values().cloned().collect();
            affected += self.handle.with(|conn| conn.execute(&sql, &values))?;
        }
        Ok(affected)
    }

    // =========================================================================
    // Primary-key operations
    // =========================================================================

    /// Look a row up by its single-column primary key.
    pub fn find_row(&self, table: &str, key: impl Into<Value>) -> DaoResult<Option<Row>> {
        let pk = self.primary_key(table)?;
        let sql = format!("SELECT * FROM {table} WHERE {pk} = ?");
        let mut rows = self.query(&sql, &[key.into()], 0, 1)?;
        Ok(rows.pop())
    }

    /// [`Executor::find_row`] mapped onto `T`.
    pub fn find<T: Bindable>(&self, table: &str, key: impl Into<Value>) -> DaoResult<Option<T>> {
        Ok(self
            .find_row(table, key)?
            .map(|row| self.converter.convert_row(&row)))
    }

    /// [`Executor::find`] on the table `T` declares through
    /// [`Bindable::table_name`].
    pub fn find_by_key<T: Bindable>(&self, key: impl Into<Value>) -> DaoResult<Option<T>> {
        let table = T::table_name().ok_or_else(|| {
            DaoError::configuration(format!(
                "{} does not declare a table name",
                std::any::type_name::<T>()
            ))
        })?;
        self.find(table, key)
    }

    /// Delete the rows whose primary keys match those of `record`.
    ///
    /// Accepts anything [`Executor::insert`] does: a map, the
    /// fields of a serialized struct, or a list of either.
    pub fn delete(&self, record: impl Into<Record>, table: &str) -> DaoResult<u64> {
        let pk = self.primary_key(table)?;
        let sql = format!("DELETE FROM {table} WHERE {pk} = ?");
        let mut affected = 0;
        for row in record.into().into_rows() {
            let key = key_of(&row, &pk, table)?;
            affected += self.execute(&sql, &[key])?;
        }
        Ok(affected)
    }

    pub fn delete_by_key(&self, table: &str, key: impl Into<Value>) -> DaoResult<u64> {
        let pk = self.primary_key(table)?;
        self.execute(&format!("DELETE FROM {table} WHERE {pk} = ?"), &[key.into()])
    }

    /// Whether a row with the primary key of `record` exists.
    ///
    /// `record` must flatten to exactly one row.
    pub fn exists(&self, record: impl Into<Record>, table: &str) -> DaoResult<bool> {
        let mut rows = record.into().into_rows();
        if rows.len() != 1 {
            return Err(DaoError::invalid_input(format!(
                "exists expects one record for '{table}', got {}",
                rows.len()
            )));
        }
        let row = rows.remove(0);
        let pk = self.primary_key(table)?;
        let key = key_of(&row, &pk, table)?;
        let sql = format!("SELECT 1 FROM {table} WHERE {pk} = ?");
        Ok(!self.query(&sql, &[key], 0, 1)?.is_empty())
    }

    fn primary_key(&self, table: &str) -> DaoResult<String> {
        check_identifier(table)?;
        let mut keys = self.handle.with(|conn| conn.primary_keys(table))?;
        match keys.len() {
            1 => keys.pop().ok_or_else(|| DaoError::configuration("Primary key vanished")),
            0 => Err(DaoError::configuration(format!(
                "Table '{table}' has no primary key"
            ))),
            n => Err(DaoError::configuration(format!(
                "Table '{table}' has a composite primary key of {n} columns; \
                 only single-column keys are supported"
            ))),
        }
    }

    // =========================================================================
    // Stored procedures
    // =========================================================================

    /// Call a stored procedure; returns its OUT and IN_OUT values in
    /// declared order.
    pub fn call(&self, name: &str, params: &[Value]) -> DaoResult<Vec<Value>> {
        self.call_inner(name, params, false)
    }

    /// Call a stored function; element 0 is the return value, followed by
    /// OUT and IN_OUT values in declared order.
    pub fn call_function(&self, name: &str, params: &[Value]) -> DaoResult<Vec<Value>> {
        self.call_inner(name, params, true)
    }

    fn call_inner(&self, name: &str, params: &[Value], function: bool) -> DaoResult<Vec<Value>> {
        let params = normalize_params(params.to_vec());
        let begun = Instant::now();
        let results = self.handle.with(|conn| {
            let sp_params = create_sp_params(name, &params, conn)?;
            let statement = create_callable_statement(name, sp_params, function);
            debug!(call = %statement.call_text(), "Calling stored routine");
            conn.call(&statement)
        })?;
        debug!(
            routine = %name,
            results = results.len(),
            elapsed_ms = begun.elapsed().as_millis() as u64,
            "Stored routine returned"
        );
        Ok(results)
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Release the connection if this executor owns it. Idempotent; borrowed
    /// connections are left to their transaction.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.owns_connection {
            if let Some(conn) = self.handle.take() {
                self.provider.release(conn);
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.finish();
    }
}

/// `(offset, limit)` for a `[start, end)` window, `None` for all rows.
fn window(start: i64, end: i64) -> Option<(u64, u64)> {
    if start < 0 || end < 0 {
        return None;
    }
    let (start, end) = (start as u64, end as u64);
    Some((start, end.saturating_sub(start)))
}

fn clamp_bound(bound: u64) -> i64 {
    i64::try_from(bound).unwrap_or(i64::MAX)
}

fn key_of(row: &Row, pk: &str, table: &str) -> DaoResult<Value> {
    match row.get(pk) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(DaoError::invalid_input(format!(
            "Record has no value for primary key '{pk}' of '{table}'"
        ))),
    }
}

/// Table and column names are interpolated into SQL, so only plain
/// (optionally schema-qualified) identifiers are accepted.
fn check_identifier(name: &str) -> DaoResult<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(DaoError::invalid_input(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        assert_eq!(window(-1, -1), None);
        assert_eq!(window(0, -1), None);
        assert_eq!(window(-1, 5), None);
        assert_eq!(window(10, 20), Some((10, 10)));
        assert_eq!(window(5, 3), Some((5, 0)));
    }

    #[test]
    fn test_check_identifier() {
        assert!(check_identifier("users").is_ok());
        assert!(check_identifier("hr.users").is_ok());
        assert!(check_identifier("user_name").is_ok());
        assert!(check_identifier("").is_err());
        assert!(check_identifier("users; DROP TABLE x").is_err());
        assert!(check_identifier("a..b").is_err());
        assert!(check_identifier("\"quoted\"").is_err());
    }

    #[test]
    fn test_key_of() {
        let row = Row::new().with("ID", 4).with("name", "x");
        assert_eq!(key_of(&row, "id", "t").unwrap(), Value::Int(4));
        let row = Row::new().with("id", Value::Null);
        assert!(key_of(&row, "id", "t").is_err());
    }
}
