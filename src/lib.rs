//! Hydro DAO Library
//!
//! A synchronous data access engine over SQL databases (SQLite, PostgreSQL,
//! MySQL): windowed and paged queries, typed row mapping, thread-bound
//! nested transactions, lazy row iteration and stored procedure calls.

pub mod config;
pub mod dao;
pub mod data_sources;
pub mod db;
pub mod error;
pub mod format;
pub mod models;

pub use config::Config;
pub use dao::Dao;
pub use data_sources::DataSources;
pub use error::{DaoError, DaoResult, ErrorKind};
