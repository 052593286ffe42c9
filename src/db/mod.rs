//! Database abstraction layer.
//!
//! This module provides the synchronous data access engine:
//! - Driver capability traits and the `sqlx` backends
//! - Statement execution and paging
//! - Row to struct conversion
//! - Thread-bound transactions
//! - Stored procedure calls

pub mod backend;
pub mod binding;
pub mod convert;
pub mod driver;
pub mod executor;
pub mod factory;
pub mod iterator;
pub mod lob;
pub mod procedure;
pub mod transaction;
pub mod types;

pub use backend::SqlxProvider;
pub use binding::{Bindable, BindingBuilder, FieldKind, FromValue, NamedEnum};
pub use convert::TypeConverter;
pub use driver::{Connection, ConnectionHandle, ConnectionProvider, Cursor};
pub use executor::Executor;
pub use factory::ExecutorFactory;
pub use iterator::{RowIterator, RowPreprocessor};
pub use procedure::CallableStatement;
pub use transaction::TransactionManager;
