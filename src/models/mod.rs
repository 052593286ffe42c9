//! Data models for the data-access engine.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;
pub mod page;
pub mod procedure;
pub mod record;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use command::{
    BatchCommand, Command, DEFAULT_BATCH_SIZE, IteratorBatchCommand, fix_sql, normalize_params,
};
pub use connection::{
    DataSourceConfig, DataSourceConfigError, DatabaseType, IsolationLevel, TransactionState,
};
pub use page::Page;
pub use procedure::{ProcedureColumn, SpParam, SpParamType};
pub use record::Record;
pub use row::Row;
pub use value::Value;
