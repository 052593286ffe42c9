//! Column decoding from sqlx rows into [`Value`]s.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the declared column type into a logical category
//! 2. Database-specific decoders extract the value for that category
//!
//! Classification is shared by all backends; only extraction differs.

use crate::models::{DatabaseType, Row, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    /// Date and time without a zone.
    DateTime,
    /// Date and time with a zone, normalized to UTC.
    Timestamp,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Temporal types, before integers so "interval" and friends stay out
    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" | "timetz" => return TypeCategory::Time,
        "timestamptz" => return TypeCategory::Timestamp,
        "timestamp" if db == DatabaseType::MySQL => return TypeCategory::Timestamp,
        "timestamp" | "datetime" => return TypeCategory::DateTime,
        "interval" => return TypeCategory::Text,
        _ => {}
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "enum" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value, keeping the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => pg_numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as text.
fn pg_numeric_to_string(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    const NUMERIC_NEG: u16 = 0x4000;
    const NUMERIC_NAN: u16 = 0xC000;

    let word = |i: usize| -> Result<[u8; 2], sqlx::error::BoxDynError> {
        buf.get(i..i + 2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = i16::from_be_bytes(word(0)?).max(0) as usize;
    let weight = i64::from(i16::from_be_bytes(word(2)?));
    let sign = u16::from_be_bytes(word(4)?);
    let dscale = usize::from(u16::from_be_bytes(word(6)?));

    if sign == NUMERIC_NAN {
        return Ok("NaN".to_string());
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i).map(i16::from_be_bytes))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |j: i64| -> i16 {
        usize::try_from(j)
            .ok()
            .and_then(|j| digits.get(j).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for j in 0..=weight {
            if j == 0 {
                out.push_str(&digit(j).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(j)));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut j = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(j)));
            j += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Decode a driver row into a [`Row`].
pub trait DecodeRow {
    fn decode_row(&self) -> Row;
}

impl DecodeRow for MySqlRow {
    fn decode_row(&self) -> Row {
        let mut row = Row::with_capacity(self.len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            row.insert(col.name(), mysql::decode_column(self, idx, category));
        }
        row
    }
}

impl DecodeRow for PgRow {
    fn decode_row(&self) -> Row {
        let mut row = Row::with_capacity(self.len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            row.insert(col.name(), postgres::decode_column(self, idx, category));
        }
        row
    }
}

impl DecodeRow for SqliteRow {
    fn decode_row(&self) -> Row {
        let mut row = Row::with_capacity(self.len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::SQLite);
            row.insert(col.name(), sqlite::decode_column(self, idx, category));
        }
        row
    }
}

/// Decode column `idx` as `Option<T>`, mapping SQL NULL and decode failures
/// to `None`.
macro_rules! get {
    ($row:expr, $idx:expr, $t:ty) => {
        $row.try_get::<Option<$t>, _>($idx).ok().flatten()
    };
}

/// Whether column `idx` holds SQL NULL.
macro_rules! is_null {
    ($row:expr, $idx:expr) => {
        $row.try_get_raw($idx)
            .map(|raw| sqlx::ValueRef::is_null(&raw))
            .unwrap_or(true)
    };
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        if is_null!(row, idx) {
            return Value::Null;
        }
        match category {
            TypeCategory::Decimal => get!(row, idx, RawDecimal)
                .map(|d| Value::Decimal(d.0))
                .unwrap_or(Value::Null),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => get!(row, idx, bool).map(Value::Bool).unwrap_or(Value::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => get!(row, idx, Vec<u8>).map(Value::Bytes).unwrap_or(Value::Null),
            TypeCategory::Json => get!(row, idx, JsonValue).map(Value::Json).unwrap_or(Value::Null),
            TypeCategory::Date => get!(row, idx, NaiveDate).map(Value::Date).unwrap_or(Value::Null),
            TypeCategory::Time => get!(row, idx, NaiveTime).map(Value::Time).unwrap_or(Value::Null),
            TypeCategory::DateTime | TypeCategory::Timestamp => get!(row, idx, NaiveDateTime)
                .map(Value::DateTime)
                .or_else(|| get!(row, idx, DateTime<Utc>).map(Value::DateTimeUtc))
                .unwrap_or(Value::Null),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        if let Some(v) = get!(row, idx, i64) {
            return Value::Int(v);
        }
        if let Some(v) = get!(row, idx, u64) {
            return Value::from(v);
        }
        if let Some(v) = get!(row, idx, i32) {
            return Value::from(v);
        }
        if let Some(v) = get!(row, idx, u32) {
            return Value::from(v);
        }
        if let Some(v) = get!(row, idx, i8) {
            return Value::from(v);
        }
        get!(row, idx, u8).map(Value::from).unwrap_or(Value::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        get!(row, idx, f64)
            .or_else(|| get!(row, idx, f32).map(f64::from))
            .map(Value::Float)
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        get!(row, idx, String)
            .map(Value::String)
            .or_else(|| get!(row, idx, Vec<u8>).map(Value::Bytes))
            .unwrap_or(Value::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        if is_null!(row, idx) {
            return Value::Null;
        }
        match category {
            TypeCategory::Decimal => match row.try_get::<RawDecimal, _>(idx) {
                Ok(v) => Value::Decimal(v.0),
                Err(e) => {
                    tracing::error!("Failed to decode NUMERIC: {:?}", e);
                    Value::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => get!(row, idx, bool).map(Value::Bool).unwrap_or(Value::Null),
            TypeCategory::Float => get!(row, idx, f64)
                .or_else(|| get!(row, idx, f32).map(f64::from))
                .map(Value::Float)
                .unwrap_or(Value::Null),
            TypeCategory::Binary => get!(row, idx, Vec<u8>).map(Value::Bytes).unwrap_or(Value::Null),
            TypeCategory::Json => get!(row, idx, JsonValue).map(Value::Json).unwrap_or(Value::Null),
            TypeCategory::Date => get!(row, idx, NaiveDate).map(Value::Date).unwrap_or(Value::Null),
            TypeCategory::Time => get!(row, idx, NaiveTime).map(Value::Time).unwrap_or(Value::Null),
            TypeCategory::DateTime => get!(row, idx, NaiveDateTime)
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            TypeCategory::Timestamp => get!(row, idx, DateTime<Utc>)
                .map(Value::DateTimeUtc)
                .unwrap_or(Value::Null),
            _ => get!(row, idx, String).map(Value::String).unwrap_or(Value::Null),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Value {
        if let Some(v) = get!(row, idx, i64) {
            return Value::Int(v);
        }
        if let Some(v) = get!(row, idx, i32) {
            return Value::from(v);
        }
        get!(row, idx, i16).map(Value::from).unwrap_or(Value::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        if is_null!(row, idx) {
            return Value::Null;
        }
        let decoded = match category {
            TypeCategory::Integer => get!(row, idx, i64).map(Value::Int),
            TypeCategory::Boolean => get!(row, idx, bool).map(Value::Bool),
            TypeCategory::Float | TypeCategory::Decimal => get!(row, idx, f64).map(Value::Float),
            TypeCategory::Binary => get!(row, idx, Vec<u8>).map(Value::Bytes),
            TypeCategory::Date => get!(row, idx, NaiveDate).map(Value::Date),
            TypeCategory::Time => get!(row, idx, NaiveTime).map(Value::Time),
            TypeCategory::DateTime | TypeCategory::Timestamp => {
                get!(row, idx, NaiveDateTime).map(Value::DateTime)
            }
            TypeCategory::Json => get!(row, idx, String).map(|s| {
                serde_json::from_str::<JsonValue>(&s)
                    .map(Value::Json)
                    .unwrap_or(Value::String(s))
            }),
            _ => None,
        };
        // Column affinity is only a hint in SQLite; fall back on the stored class.
        decoded.unwrap_or_else(|| decode_dynamic(row, idx))
    }

    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
        if let Some(v) = get!(row, idx, i64) {
            return Value::Int(v);
        }
        if let Some(v) = get!(row, idx, f64) {
            return Value::Float(v);
        }
        if let Some(v) = get!(row, idx, String) {
            return Value::String(v);
        }
        get!(row, idx, Vec<u8>).map(Value::Bytes).unwrap_or(Value::Null)
    }
}
