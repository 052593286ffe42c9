//! PostgreSQL connection.

use super::{Bridge, Checkout, rewrite_placeholders, sql_type_code};
use crate::db::driver::{
    Call, Connection, Cursor, Execute, Metadata, Query, TransactionControl,
};
use crate::db::procedure::{CallableStatement, split_qualified_name};
use crate::db::types::DecodeRow;
use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, IsolationLevel, ProcedureColumn, Row, SpParamType, Value};
use futures_util::StreamExt;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::types::Json;
use sqlx::{Encode, Postgres, Type};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

const PRIMARY_KEYS: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
    AND lower(tc.table_name) = lower($1)
    AND tc.table_schema = COALESCE($2, current_schema())
    ORDER BY kcu.ordinal_position
    "#;

const PROCEDURE_COLUMNS: &str = r#"
    SELECT
        p.specific_name::text AS specific_name,
        p.parameter_name::text AS name,
        p.parameter_mode::text AS mode,
        p.data_type::text AS type_name,
        p.ordinal_position::int4 AS sequence
    FROM information_schema.parameters p
    JOIN information_schema.routines r
        ON r.specific_schema = p.specific_schema
        AND r.specific_name = p.specific_name
    WHERE lower(r.routine_name) = lower($1)
    AND r.routine_schema = COALESCE($2, current_schema())
    ORDER BY p.specific_name, p.ordinal_position
    "#;

pub(crate) struct PgConnection {
    checkout: Checkout<Postgres>,
    bridge: Bridge,
}

impl PgConnection {
    pub(crate) fn new(checkout: Checkout<Postgres>, bridge: Bridge) -> Self {
        Self { checkout, bridge }
    }

    fn run_raw(&mut self, sql: &str) -> DaoResult<()> {
        let mut conn = self.checkout.lock()?;
        self.bridge
            .run(sql, async { sqlx::raw_sql(sql).execute(&mut **conn).await })?;
        Ok(())
    }

    /// Run an already rewritten statement, binding `params` in order.
    fn fetch(&mut self, sql: &str, params: &[&Value]) -> DaoResult<Vec<Row>> {
        let mut conn = self.checkout.lock()?;
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));
        let rows = self.bridge.run("query", query.fetch_all(&mut **conn))?;
        Ok(rows.iter().map(DecodeRow::decode_row).collect())
    }
}

/// NULL whose type the server infers from context.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a PostgreSQL query.
fn bind_value<'q>(query: PgQuery<'q>, value: &'q Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(UntypedNull),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        // Bound as float8; numeric columns accept it through an assignment cast.
        Value::Decimal(v) => match v.parse::<f64>() {
            Ok(f) => query.bind(f),
            Err(_) => query.bind(v.as_str()),
        },
        Value::String(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::DateTimeUtc(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v)),
        Value::List(_) => query.bind(Json(value.to_json())),
    }
}

fn build<'q>(sql: &'q str, params: &'q [Value]) -> PgQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

impl Query for PgConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> DaoResult<Vec<Row>> {
        let sql = rewrite_placeholders(sql);
        let mut conn = self.checkout.lock()?;
        let rows = self
            .bridge
            .run("query", build(&sql, params).fetch_all(&mut **conn))?;
        Ok(rows.iter().map(DecodeRow::decode_row).collect())
    }

    fn open_cursor(&mut self, sql: &str, params: &[Value]) -> DaoResult<Box<dyn Cursor>> {
        let mut conn = self.checkout.lock_owned()?;
        let sql = rewrite_placeholders(sql);
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

impl Execute for PgConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        let sql = rewrite_placeholders(sql);
        let mut conn = self.checkout.lock()?;
        let result = self
            .bridge
            .run("execute", build(&sql, params).execute(&mut **conn))?;
        Ok(result.rows_affected())
    }

    fn execute_batch(&mut self, sql: &str, batch: &[Vec<Value>]) -> DaoResult<Vec<u64>> {
        let sql = rewrite_placeholders(sql);
        let mut conn = self.checkout.lock()?;
        self.bridge.run("execute batch", async {
            let mut counts = Vec::with_capacity(batch.len());
            for params in batch {
                let result = build(&sql, params).execute(&mut **conn).await?;
                counts.push(result.rows_affected());
            }
            Ok::<_, sqlx::Error>(counts)
        })
    }
}

/// Argument expression for one routine parameter, cast to its declared type
/// so overload resolution sees the right signature.
fn cast(expr: &str, type_name: Option<&str>) -> String {
    match type_name {
        Some(t) if !t.eq_ignore_ascii_case("USER-DEFINED") && !t.eq_ignore_ascii_case("ARRAY") => {
            format!("CAST({expr} AS {t})")
        }
        _ => expr.to_string(),
    }
}

/// Build the statement text for a routine call and the values it binds.
///
/// Procedures are invoked with `CALL`, passing NULL for OUT slots; the
/// returned row holds the OUT and INOUT values. Functions are invoked with
/// `SELECT * FROM`, passing inputs only.
fn call_sql(statement: &CallableStatement) -> (String, Vec<&Value>) {
    let mut args = Vec::with_capacity(statement.params.len());
    let mut bound = Vec::new();
    for param in &statement.params {
        let type_name = param.type_name.as_deref();
        if param.direction.is_input() {
            bound.push(&param.value);
            args.push(cast(&format!("${}", bound.len()), type_name));
        } else if !statement.function {
            args.push(cast("NULL", type_name));
        }
    }
    let sql = if statement.function {
        format!("SELECT * FROM {}({})", statement.name, args.join(", "))
    } else {
        format!("CALL {}({})", statement.name, args.join(", "))
    };
    (sql, bound)
}

impl Call for PgConnection {
    fn call(&mut self, statement: &CallableStatement) -> DaoResult<Vec<Value>> {
        let (sql, bound) = call_sql(statement);
        let rows = self.fetch(&sql, &bound)?;

        let mut values: Vec<Value> = rows
            .into_iter()
            .next()
            .map(|row| row.values().cloned().collect())
            .unwrap_or_default();
        let outputs = statement.output_slots().count();
        if statement.function && outputs > 0 && values.len() == outputs {
            // Functions with OUT parameters return them as the row; there is
            // no separate return value.
            values.insert(0, Value::Null);
        }
        values.resize(statement.result_len(), Value::Null);
        Ok(values)
    }
}

fn direction_code(mode: Option<&str>) -> i32 {
    match mode.map(str::to_ascii_uppercase).as_deref() {
        Some("INOUT") => SpParamType::CODE_IN_OUT,
        Some("OUT") => SpParamType::CODE_OUT,
        Some("IN") | Some("VARIADIC") | None => SpParamType::CODE_IN,
        Some(_) => 0,
    }
}

impl Metadata for PgConnection {
    fn primary_keys(&mut self, table: &str) -> DaoResult<Vec<String>> {
        let (schema, table) = split_qualified_name(table);
        let mut conn = self.checkout.lock()?;
        self.bridge.run(
            "primary keys",
            sqlx::query_scalar::<_, String>(PRIMARY_KEYS)
                .bind(table)
                .bind(schema)
                .fetch_all(&mut **conn),
        )
    }

    fn procedure_columns(
        &mut self,
        schema: Option<&str>,
        name: &str,
    ) -> DaoResult<Vec<ProcedureColumn>> {
        let name = Value::from(name);
        let schema = Value::from(schema);
        let rows = self.fetch(PROCEDURE_COLUMNS, &[&name, &schema])?;

        // Overloads share a name; the first signature wins.
        let first = rows
            .first()
            .and_then(|r| r.get_str("specific_name"))
            .map(str::to_string);
        Ok(rows
            .iter()
            .filter(|r| r.get_str("specific_name").map(str::to_string) == first)
            .map(|r| {
                let type_name = r.get_str("type_name").map(str::to_string);
                ProcedureColumn {
                    name: r.get_str("name").map(str::to_string),
                    column_type: direction_code(r.get_str("mode")),
                    data_type: type_name.as_deref().map_or(1111, sql_type_code),
                    type_name,
                    sequence: r.get_i64("sequence").unwrap_or_default() as i32,
                }
            })
            .collect())
    }

    fn current_schema(&mut self) -> DaoResult<Option<String>> {
        let mut conn = self.checkout.lock()?;
        self.bridge.run(
            "current schema",
            sqlx::query_scalar::<_, Option<String>>("SELECT current_schema()::text")
                .fetch_one(&mut **conn),
        )
    }
}

impl TransactionControl for PgConnection {
    fn begin(&mut self, isolation: IsolationLevel) -> DaoResult<()> {
        self.run_raw(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))
    }

    fn commit(&mut self) -> DaoResult<()> {
        self.run_raw("COMMIT")
    }

    fn rollback(&mut self) -> DaoResult<()> {
        self.run_raw("ROLLBACK")
    }
}

impl Connection for PgConnection {
    fn database_type(&self) -> Option<DatabaseType> {
        Some(DatabaseType::PostgreSQL)
    }
}
