//! Row to typed record conversion.
//!
//! Conversion is loss-tolerant: a column that has no matching field, or whose
//! value cannot be coerced, leaves that field unset and produces a warning.
//! It never fails the row. Warnings are logged once per distinct message
//! within one `convert_rows` call.

use crate::db::binding::{Bindable, Bindings, FieldKind, canonical_field_name};
use crate::db::lob::{LobEncoding, lob_value_to_string};
use crate::models::{Row, Value};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

/// Strings read as `true` for boolean fields, compared case-insensitively.
const AFFIRMATIVE: &[&str] = &["true", "yes", "y", "on"];

/// Maps rows onto [`Bindable`] types.
///
/// Holds two caches, both safe to share between threads:
/// - column name to canonical field name,
/// - the binding description of each target type, built on first use.
///
/// [`TypeConverter::clear`] empties both.
#[derive(Default)]
pub struct TypeConverter {
    field_names: Mutex<HashMap<String, String>>,
    bindings: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Distinct warnings raised during one conversion batch.
#[derive(Debug, Default)]
struct Warnings {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl Warnings {
    fn raise(&mut self, message: String) {
        if self.seen.insert(message.clone()) {
            warn!(warning = %message, "Row conversion");
            self.ordered.push(message);
        }
    }
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one row.
    pub fn convert_row<T: Bindable>(&self, row: &Row) -> T {
        let bindings = self.bindings::<T>();
        let mut warnings = Warnings::default();
        self.convert_with(&bindings, row, &mut warnings)
    }

    /// Convert a batch of rows.
    pub fn convert_rows<T: Bindable>(&self, rows: &[Row]) -> Vec<T> {
        self.convert_rows_with_warnings(rows).0
    }

    /// Convert a batch of rows and return the distinct warnings raised, in
    /// the order they first occurred.
    pub fn convert_rows_with_warnings<T: Bindable>(&self, rows: &[Row]) -> (Vec<T>, Vec<String>) {
        let bindings = self.bindings::<T>();
        let mut warnings = Warnings::default();
        let items = rows
            .iter()
            .map(|row| self.convert_with(&bindings, row, &mut warnings))
            .collect();
        (items, warnings.ordered)
    }

    /// Canonical field name for a column, memoized.
    pub fn field_name(&self, column: &str) -> String {
        let mut cache = self
            .field_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(name) = cache.get(column) {
            return name.clone();
        }
        let name = canonical_field_name(column);
        cache.insert(column.to_string(), name.clone());
        name
    }

    /// Forget every cached field name and binding description.
    pub fn clear(&self) {
        self.field_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn bindings<T: Bindable>(&self) -> Arc<Bindings<T>> {
        let key = TypeId::of::<T>();
        let cached = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(Ok(bindings)) = cached.map(|b| b.downcast::<Bindings<T>>()) {
            return bindings;
        }

        let built = Arc::new(Bindings::<T>::build());
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, built.clone());
        built
    }

    fn convert_with<T: Bindable>(
        &self,
        bindings: &Bindings<T>,
        row: &Row,
        warnings: &mut Warnings,
    ) -> T {
        let mut target = T::default();
        for (column, value) in row.iter() {
            let field = self.field_name(column);
            let Some(binding) = bindings.lookup(&field) else {
                warnings.raise(format!(
                    "Column '{column}' has no matching field on {}",
                    bindings.type_name()
                ));
                continue;
            };

            let converted = match coerce(binding.kind, value.clone()) {
                Ok(Some(converted)) => converted,
                Ok(None) => continue,
                Err(e) => {
                    warnings.raise(format!(
                        "Cannot convert column '{column}' for {}.{field}: {e}",
                        bindings.type_name()
                    ));
                    continue;
                }
            };

            if let Err(e) = binding.set(&mut target, converted) {
                warnings.raise(format!(
                    "Cannot set {}.{field} from column '{column}': {e}",
                    bindings.type_name()
                ));
            }
        }
        target
    }
}

/// Coerce a raw value for a field of the given kind. `Ok(None)` leaves the
/// field unset.
fn coerce(kind: FieldKind, value: Value) -> Result<Option<Value>, String> {
    if value.is_null() {
        return Ok(None);
    }
    let converted = match kind {
        FieldKind::Bool => Value::Bool(to_bool(&value)?),
        FieldKind::String => Value::String(to_canonical_string(value)?),
        FieldKind::Temporal => value.normalize_temporal(),
        FieldKind::Enum | FieldKind::Other => value,
    };
    Ok(Some(converted))
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        Value::Float(f) => Ok(*f != 0.0),
        Value::Decimal(s) => s
            .parse::<f64>()
            .map(|f| f != 0.0)
            .map_err(|_| format!("'{s}' is not a number")),
        Value::String(s) => {
            let s = s.trim();
            Ok(AFFIRMATIVE.iter().any(|a| a.eq_ignore_ascii_case(s)))
        }
        other => Err(format!("cannot read {} as bool", other.type_name())),
    }
}

/// Text form of a value for string fields. Numbers never use exponent
/// notation; byte values are read as UTF-8 large objects.
fn to_canonical_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) | Value::Decimal(s) => Ok(s),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        bytes @ Value::Bytes(_) => lob_value_to_string(&bytes, LobEncoding::Utf8)
            .map(Option::unwrap_or_default)
            .map_err(|e| e.to_string()),
        other => Ok(other.to_string()),
    }
}
