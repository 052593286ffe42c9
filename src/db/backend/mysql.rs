//! MySQL connection.

use super::{Bridge, Checkout, sql_type_code};
use crate::db::driver::{
    Call, Connection, Cursor, Execute, Metadata, Query, TransactionControl,
};
use crate::db::procedure::{CallableStatement, split_qualified_name};
use crate::db::types::DecodeRow;
use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, IsolationLevel, ProcedureColumn, Row, SpParamType, Value};
use futures_util::StreamExt;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::types::Json;
use tracing::trace;

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

const PRIMARY_KEYS: &str = r#"
    SELECT CONVERT(COLUMN_NAME USING utf8)
    FROM information_schema.KEY_COLUMN_USAGE
    WHERE CONSTRAINT_NAME = 'PRIMARY'
    AND TABLE_SCHEMA = COALESCE(?, DATABASE())
    AND LOWER(TABLE_NAME) = LOWER(?)
    ORDER BY ORDINAL_POSITION
    "#;

const PROCEDURE_COLUMNS: &str = r#"
    SELECT
        CONVERT(PARAMETER_NAME USING utf8) AS name,
        CONVERT(PARAMETER_MODE USING utf8) AS mode,
        CONVERT(DATA_TYPE USING utf8) AS type_name,
        CAST(ORDINAL_POSITION AS SIGNED) AS sequence
    FROM information_schema.PARAMETERS
    WHERE SPECIFIC_SCHEMA = COALESCE(?, DATABASE())
    AND LOWER(SPECIFIC_NAME) = LOWER(?)
    ORDER BY ORDINAL_POSITION
    "#;

pub(crate) struct MySqlConnection {
    checkout: Checkout<MySql>,
    bridge: Bridge,
}

impl MySqlConnection {
    pub(crate) fn new(checkout: Checkout<MySql>, bridge: Bridge) -> Self {
        Self { checkout, bridge }
    }

    fn run_raw(&mut self, sql: &str) -> DaoResult<()> {
        let mut conn = self.checkout.lock()?;
        self.bridge
            .run(sql, async { sqlx::raw_sql(sql).execute(&mut **conn).await })?;
        Ok(())
    }
}

/// Bind a parameter to a MySQL query.
fn bind_value<'q>(query: MySqlQuery<'q>, value: &'q Value) -> MySqlQuery<'q> {
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
        Value::Json(v) => query.bind(Json(v)),
        Value::List(_) => query.bind(Json(value.to_json())),
    }
}

fn build<'q>(sql: &'q str, params: &'q [Value]) -> MySqlQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

/// Session variable holding the value of the 1-based parameter `position`.
fn session_var(position: usize) -> String {
    format!("@hydro_p{position}")
}

/// Statements that make up one routine call on a single session.
#[derive(Debug, PartialEq)]
struct CallPlan<'a> {
    /// `SET @var = ?` for each IN_OUT slot, with the value it seeds.
    setup: Vec<(String, &'a Value)>,
    call: String,
    call_params: Vec<&'a Value>,
    /// `SELECT` reading OUT and IN_OUT variables back, if any.
    fetch: Option<String>,
}

fn call_plan(statement: &CallableStatement) -> CallPlan<'_> {
    let mut setup = Vec::new();
    let mut args = Vec::with_capacity(statement.params.len());
    let mut call_params = Vec::new();
    for (index, param) in statement.params.iter().enumerate() {
        let var = session_var(index + 1);
        match param.direction {
            SpParamType::In => {
                args.push("?".to_string());
                call_params.push(&param.value);
            }
            SpParamType::InOut => {
                setup.push((format!("SET {var} = ?"), &param.value));
                args.push(var);
            }
            SpParamType::Out => args.push(var),
        }
    }

    if statement.function {
        return CallPlan {
            setup,
            call: format!("SELECT {}({}) AS hydro_return", statement.name, args.join(", ")),
            call_params,
            fetch: None,
        };
    }

    let outputs: Vec<String> = statement
        .output_slots()
        .map(|(position, _)| session_var(position))
        .collect();
    CallPlan {
        setup,
        call: format!("CALL {}({})", statement.name, args.join(", ")),
        call_params,
        fetch: (!outputs.is_empty()).then(|| format!("SELECT {}", outputs.join(", "))),
    }
}

impl Query for MySqlConnection {
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

impl Execute for MySqlConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        let mut conn = self.checkout.lock()?;
        if params.is_empty() {
            // Routine DDL is refused by the prepared statement protocol.
            let result = self
                .bridge
                .run("execute", sqlx::raw_sql(sql).execute(&mut **conn))?;
            return Ok(result.rows_affected());
        }
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

impl Call for MySqlConnection {
    fn call(&mut self, statement: &CallableStatement) -> DaoResult<Vec<Value>> {
        let plan = call_plan(statement);
        trace!(call = %plan.call, setup = plan.setup.len(), "Calling MySQL routine");

        let mut conn = self.checkout.lock()?;
        let rows = self.bridge.run("call", async {
            for (sql, value) in &plan.setup {
                bind_value(sqlx::query(sql), value)
                    .execute(&mut **conn)
                    .await?;
            }
            let call = plan
                .call_params
                .iter()
                .fold(sqlx::query(&plan.call), |query, value| bind_value(query, value));
            if statement.function {
                return call.fetch_all(&mut **conn).await;
            }
            call.execute(&mut **conn).await?;
            match &plan.fetch {
                Some(fetch) => sqlx::query(fetch).fetch_all(&mut **conn).await,
                None => Ok(Vec::new()),
            }
        })?;

        let mut values: Vec<Value> = rows
            .first()
            .map(|row| row.decode_row().values().cloned().collect())
            .unwrap_or_default();
        values.resize(statement.result_len(), Value::Null);
        Ok(values)
    }
}

fn direction_code(mode: Option<&str>, sequence: i64) -> i32 {
    match mode.map(str::to_ascii_uppercase).as_deref() {
        Some("IN") => SpParamType::CODE_IN,
        Some("INOUT") => SpParamType::CODE_IN_OUT,
        Some("OUT") => SpParamType::CODE_OUT,
        None if sequence == 0 => SpParamType::CODE_RETURN,
        _ => 0,
    }
}

impl Metadata for MySqlConnection {
    fn primary_keys(&mut self, table: &str) -> DaoResult<Vec<String>> {
        let (schema, table) = split_qualified_name(table);
        let mut conn = self.checkout.lock()?;
        self.bridge.run(
            "primary keys",
            sqlx::query_scalar::<_, String>(PRIMARY_KEYS)
                .bind(schema)
                .bind(table)
                .fetch_all(&mut **conn),
        )
    }

    fn procedure_columns(
        &mut self,
        schema: Option<&str>,
        name: &str,
    ) -> DaoResult<Vec<ProcedureColumn>> {
        let mut conn = self.checkout.lock()?;
        let rows = self.bridge.run(
            "procedure columns",
            sqlx::query(PROCEDURE_COLUMNS)
                .bind(schema)
                .bind(name)
                .fetch_all(&mut **conn),
        )?;

        Ok(rows
            .iter()
            .map(DecodeRow::decode_row)
            .map(|r| {
                let sequence = r.get_i64("sequence").unwrap_or_default();
                let type_name = r.get_str("type_name").map(str::to_string);
                ProcedureColumn {
                    name: r.get_str("name").map(str::to_string),
                    column_type: direction_code(r.get_str("mode"), sequence),
                    data_type: type_name.as_deref().map_or(1111, sql_type_code),
                    type_name,
                    sequence: sequence as i32,
                }
            })
            .collect())
    }

    fn current_schema(&mut self) -> DaoResult<Option<String>> {
        let mut conn = self.checkout.lock()?;
        self.bridge.run(
            "current schema",
            sqlx::query_scalar::<_, Option<String>>("SELECT CONVERT(DATABASE() USING utf8)")
                .fetch_one(&mut **conn),
        )
    }
}

impl TransactionControl for MySqlConnection {
    fn begin(&mut self, isolation: IsolationLevel) -> DaoResult<()> {
        self.run_raw(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_sql()
        ))?;
        self.run_raw("START TRANSACTION")
    }

    fn commit(&mut self) -> DaoResult<()> {
        self.run_raw("COMMIT")
    }

    fn rollback(&mut self) -> DaoResult<()> {
        self.run_raw("ROLLBACK")
    }
}

impl Connection for MySqlConnection {
    fn database_type(&self) -> Option<DatabaseType> {
        Some(DatabaseType::MySQL)
    }
}
