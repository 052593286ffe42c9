//! In-memory driver that records every call, for engine state tests.

#![allow(dead_code)]

use hydro_dao::db::driver::{
    Call, Connection, ConnectionProvider, Cursor, Execute, Metadata, Query, TransactionControl,
};
use hydro_dao::db::CallableStatement;
use hydro_dao::error::{DaoError, DaoResult};
use hydro_dao::models::{DatabaseType, IsolationLevel, ProcedureColumn, Row, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Fixtures {
    rows: Vec<Row>,
    primary_keys: Vec<String>,
    procedures: HashMap<String, Vec<ProcedureColumn>>,
    fail_commit: bool,
}

/// Provider whose connections log `"<event>:<connection>"` entries,
/// e.g. `"begin:1"` or `"query:2"`.
pub struct MockProvider {
    events: Events,
    next_id: AtomicU64,
    fixtures: Arc<Fixtures>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::build(Fixtures::default())
    }

    fn build(fixtures: Fixtures) -> Self {
        Self {
            events: Arc::default(),
            next_id: AtomicU64::new(1),
            fixtures: Arc::new(fixtures),
        }
    }

    /// Rows returned by every query and cursor.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self::build(Fixtures {
            rows,
            ..Fixtures::default()
        })
    }

    pub fn with_primary_keys(keys: &[&str]) -> Self {
        Self::build(Fixtures {
            primary_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Fixtures::default()
        })
    }

    pub fn with_procedure(name: &str, columns: Vec<ProcedureColumn>) -> Self {
        Self::build(Fixtures {
            procedures: HashMap::from([(name.to_lowercase(), columns)]),
            ..Fixtures::default()
        })
    }

    /// Connections whose physical commit fails.
    pub fn failing_commit() -> Self {
        Self::build(Fixtures {
            fail_commit: true,
            ..Fixtures::default()
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of logged events of one kind, e.g. `count("release")`.
    pub fn count(&self, event: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.split(':').next() == Some(event))
            .count()
    }

    /// Logged event kinds in order, without connection ids.
    pub fn kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.split(':').next().unwrap_or_default().to_string())
            .collect()
    }
}

pub struct MockConnection {
    id: u64,
    events: Events,
    fixtures: Arc<Fixtures>,
}

impl MockConnection {
    fn log(&self, event: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{event}:{}", self.id));
    }
}

impl ConnectionProvider for MockProvider {
    fn acquire(&self) -> DaoResult<Box<dyn Connection>> {
        let conn = MockConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            events: self.events.clone(),
            fixtures: self.fixtures.clone(),
        };
        conn.log("acquire");
        Ok(Box::new(conn))
    }

    fn release(&self, connection: Box<dyn Connection>) {
        drop(connection);
        self.events.lock().unwrap().push("release:-".to_string());
    }
}

struct VecCursor(std::vec::IntoIter<Row>);

impl Cursor for VecCursor {
    fn next_row(&mut self) -> DaoResult<Option<Row>> {
        Ok(self.0.next())
    }
}

impl Query for MockConnection {
    fn query(&mut self, _sql: &str, _params: &[Value]) -> DaoResult<Vec<Row>> {
        self.log("query");
        Ok(self.fixtures.rows.clone())
    }

    fn open_cursor(&mut self, _sql: &str, _params: &[Value]) -> DaoResult<Box<dyn Cursor>> {
        self.log("cursor");
        Ok(Box::new(VecCursor(self.fixtures.rows.clone().into_iter())))
    }
}

impl Execute for MockConnection {
    fn execute(&mut self, _sql: &str, _params: &[Value]) -> DaoResult<u64> {
        self.log("execute");
        Ok(1)
    }

    fn execute_batch(&mut self, _sql: &str, batch: &[Vec<Value>]) -> DaoResult<Vec<u64>> {
        self.log("batch");
        Ok(vec![1; batch.len()])
    }
}

impl Call for MockConnection {
    /// Echoes a recognizable value per result slot: 42 for the return value,
    /// `out<position>` for each output slot.
    fn call(&mut self, statement: &CallableStatement) -> DaoResult<Vec<Value>> {
        self.log("call");
        let mut values = Vec::new();
        if statement.function {
            values.push(Value::Int(42));
        }
        values.extend(
            statement
                .output_slots()
                .map(|(position, _)| Value::String(format!("out{position}"))),
        );
        Ok(values)
    }
}

impl Metadata for MockConnection {
    fn primary_keys(&mut self, _table: &str) -> DaoResult<Vec<String>> {
        Ok(self.fixtures.primary_keys.clone())
    }

    fn procedure_columns(
        &mut self,
        _schema: Option<&str>,
        name: &str,
    ) -> DaoResult<Vec<ProcedureColumn>> {
        Ok(self
            .fixtures
            .procedures
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    fn current_schema(&mut self) -> DaoResult<Option<String>> {
        Ok(Some("public".to_string()))
    }
}

impl TransactionControl for MockConnection {
    fn begin(&mut self, _isolation: IsolationLevel) -> DaoResult<()> {
        self.log("begin");
        Ok(())
    }

    fn commit(&mut self) -> DaoResult<()> {
        self.log("commit");
        if self.fixtures.fail_commit {
            return Err(DaoError::data_access("commit refused"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> DaoResult<()> {
        self.log("rollback");
        Ok(())
    }
}

impl Connection for MockConnection {
    fn database_type(&self) -> Option<DatabaseType> {
        None
    }
}

/// Parameter metadata row.
pub fn column(name: &str, column_type: i32, sequence: i32) -> ProcedureColumn {
    ProcedureColumn {
        name: Some(name.to_string()),
        column_type,
        data_type: 4,
        type_name: Some("integer".to_string()),
        sequence,
    }
}

/// Rows `{ id: 0..n }`.
pub fn numbered_rows(n: i64) -> Vec<Row> {
    (0..n).map(|i| Row::new().with("id", i)).collect()
}
