//! SQLite connection.

use super::{Bridge, Checkout};
use crate::db::driver::{
    Call, Connection, Cursor, Execute, Metadata, Query, TransactionControl,
};
use crate::db::procedure::CallableStatement;
use crate::db::types::DecodeRow;
use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, IsolationLevel, ProcedureColumn, Row, Value};
use futures_util::StreamExt;
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;
use tracing::debug;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub(crate) struct SqliteConnection {
    checkout: Checkout<Sqlite>,
    bridge: Bridge,
}

impl SqliteConnection {
    pub(crate) fn new(checkout: Checkout<Sqlite>, bridge: Bridge) -> Self {
        Self { checkout, bridge }
    }

    fn run_raw(&mut self, sql: &str) -> DaoResult<()> {
        let mut conn = self.checkout.lock()?;
        self.bridge
            .run(sql, async { sqlx::raw_sql(sql).execute(&mut **conn).await })?;
        Ok(())
    }
}

/// Bind a parameter to a SQLite query.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(v) | Value::String(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::DateTimeUtc(v) => query.bind(*v),
        // SQLite doesn't have native JSON type, store as string
        Value::Json(v) => query.bind(v.to_string()),
        Value::List(_) => query.bind(value.to_json().to_string()),
    }
}

fn build<'q>(sql: &'q str, params: &'q [Value]) -> SqliteQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

impl Query for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> DaoResult<Vec<Row>> {
        let mut conn = self.checkout.lock()?;
        let rows = self
            .bridge
            .run("query", build(sql, params).fetch_all(&mut **conn))?;
        Ok(rows.iter().map(DecodeRow::decode_row).collect())
    }

    fn open_cursor(&mut self, sql: &str, params: &[Value]) -> DaoResult<Box<dyn Cursor>> {
        let mut conn = self.checkout.lock_owned()?;
        let sql = sql.to_string();
        let params = params.to_vec();
        Ok(self.bridge.spawn_cursor(move |tx| async move {
            let mut stream = build(&sql, &params).fetch(&mut **conn);
            while let Some(item) = stream.next().await {
                let item = item.map(|row| row.decode_row()).map_err(DaoError::from);
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        }))
    }
}

impl Execute for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        let mut conn = self.checkout.lock()?;
        let result = self
            .bridge
            .run("execute", build(sql, params).execute(&mut **conn))?;
        Ok(result.rows_affected())
    }

    fn execute_batch(&mut self, sql: &str, batch: &[Vec<Value>]) -> DaoResult<Vec<u64>> {
        let mut conn = self.checkout.lock()?;
        self.bridge.run("execute batch", async {
            let mut counts = Vec::with_capacity(batch.len());
            for params in batch {
                let result = build(sql, params).execute(&mut **conn).await?;
                counts.push(result.rows_affected());
            }
            Ok::<_, sqlx::Error>(counts)
        })
    }
}

impl Call for SqliteConnection {
    fn call(&mut self, statement: &CallableStatement) -> DaoResult<Vec<Value>> {
        Err(DaoError::configuration(format!(
            "SQLite has no stored routines; cannot call '{}'",
            statement.name
        )))
    }
}

impl Metadata for SqliteConnection {
    fn primary_keys(&mut self, table: &str) -> DaoResult<Vec<String>> {
        let mut conn = self.checkout.lock()?;
        self.bridge.run(
            "primary keys",
            sqlx::query_scalar::<_, String>(
                "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk",
            )
            .bind(table)
            .fetch_all(&mut **conn),
        )
    }

    fn procedure_columns(
        &mut self,
        _schema: Option<&str>,
        name: &str,
    ) -> DaoResult<Vec<ProcedureColumn>> {
        Err(DaoError::configuration(format!(
            "SQLite has no stored routines; '{name}' cannot be resolved"
        )))
    }

    fn current_schema(&mut self) -> DaoResult<Option<String>> {
        Ok(Some("main".to_string()))
    }
}

impl TransactionControl for SqliteConnection {
    fn begin(&mut self, isolation: IsolationLevel) -> DaoResult<()> {
        // SQLite transactions are always serializable.
        debug!(isolation = %isolation, "Beginning SQLite transaction");
        self.run_raw("BEGIN")
    }

    fn commit(&mut self) -> DaoResult<()> {
        self.run_raw("COMMIT")
    }

    fn rollback(&mut self) -> DaoResult<()> {
        self.run_raw("ROLLBACK")
    }
}

impl Connection for SqliteConnection {
    fn database_type(&self) -> Option<DatabaseType> {
        Some(DatabaseType::SQLite)
    }
}
