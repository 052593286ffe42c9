//! Result rows with case-insensitive column lookup.

use super::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// One result record.
///
/// Columns keep the order the database returned them in. Lookups ignore
/// case: `row.get("name")`, `row.get("NAME")` and `row.get("Name")` all
/// resolve the same column. When two columns differ only in case, the first
/// one wins on lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Set a column, replacing the value of a column with the same
    /// case-insensitive name in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let key = column.to_lowercase();
        match self.index.get(&key) {
            Some(&pos) => self.columns[pos].1 = value.into(),
            None => {
                self.index.insert(key, self.columns.len());
                self.columns.push((column, value.into()));
            }
        }
    }

    /// Builder form of [`Row::insert`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|pos| &self.columns[pos].1)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        self.position(column).map(|pos| &mut self.columns[pos].1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Remove a column and return its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.position(column)?;
        let (_, value) = self.columns.remove(pos);
        self.rebuild_index();
        Some(value)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Value of the first column, used for scalar queries such as counts.
    pub fn first_value(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    /// Column names in result order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert to a JSON object, keeping column order.
    pub fn into_json(self) -> JsonValue {
        let map = self
            .columns
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&column.to_lowercase()).copied()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, (name, _)) in self.columns.iter().enumerate() {
            self.index.entry(name.to_lowercase()).or_insert(pos);
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
