//! Insertable shapes.

use super::{Row, Value};
use crate::error::{DaoError, DaoResult};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// What `insert` accepts.
///
/// - `List` inserts each element on its own; an empty list does nothing.
/// - `Map` inserts one row with exactly the given columns, NULLs included.
/// - `Fields` inserts one row built from a structured record's fields;
///   fields holding NULL are left out so column defaults apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    List(Vec<Record>),
    Map(Row),
    Fields(Row),
}

impl Record {
    /// Build a record from any serializable struct.
    ///
    /// Objects become [`Record::Fields`], arrays become [`Record::List`].
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> DaoResult<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| DaoError::invalid_input(format!("Cannot serialize record: {e}")))?;
        Self::from_json(json)
    }

    fn from_json(json: JsonValue) -> DaoResult<Self> {
        match json {
            JsonValue::Object(map) => Ok(Record::Fields(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            )),
            JsonValue::Array(items) => Ok(Record::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<DaoResult<_>>()?,
            )),
            other => Err(DaoError::invalid_input(format!(
                "Cannot insert a bare value: {other}"
            ))),
        }
    }

    /// Flatten into the rows that will be inserted, in order.
    pub fn into_rows(self) -> Vec<Row> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows);
        rows
    }

    fn collect_rows(self, rows: &mut Vec<Row>) {
        match self {
            Record::List(items) => items.into_iter().for_each(|r| r.collect_rows(rows)),
            Record::Map(row) => rows.push(row),
            Record::Fields(row) => rows.push(
                row.into_iter()
                    .filter(|(_, value)| !value.is_null())
                    .collect(),
            ),
        }
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Record::Map(row)
    }
}

impl From<&Row> for Record {
    fn from(row: &Row) -> Self {
        Record::Map(row.clone())
    }
}

impl<T: Into<Record>> From<Vec<T>> for Record {
    fn from(items: Vec<T>) -> Self {
        Record::List(items.into_iter().map(Into::into).collect())
    }
}
