//! Per-data-source executor creation.

use crate::db::convert::TypeConverter;
use crate::db::driver::{ConnectionHandle, ConnectionProvider};
use crate::db::executor::Executor;
use crate::db::transaction::TransactionManager;
use crate::error::DaoResult;
use std::sync::Arc;
use tracing::trace;

/// Hands out executors for one data source.
///
/// While the calling thread has an active transaction, non-standalone
/// executors borrow its connection. Otherwise, and always for standalone
/// requests, a fresh connection is acquired and owned by the executor.
pub struct ExecutorFactory {
    data_source: String,
    provider: Arc<dyn ConnectionProvider>,
    transactions: Arc<TransactionManager>,
    converter: Arc<TypeConverter>,
}

impl ExecutorFactory {
    pub fn new(data_source: impl Into<String>, provider: Arc<dyn ConnectionProvider>) -> Self {
        let data_source = data_source.into();
        let transactions = Arc::new(TransactionManager::new(
            data_source.clone(),
            provider.clone(),
        ));
        Self {
            data_source,
            provider,
            transactions,
            converter: Arc::new(TypeConverter::new()),
        }
    }

    pub fn get(&self, standalone: bool) -> DaoResult<Executor> {
        if !standalone {
            if let Some(handle) = self.transactions.current_handle() {
                trace!(
                    data_source = %self.data_source,
                    connection = handle.id(),
                    "Executor borrows transaction connection"
                );
                return Ok(Executor::new(
                    handle,
                    false,
                    self.provider.clone(),
                    self.converter.clone(),
                ));
            }
        }

        let handle = ConnectionHandle::new(self.provider.acquire()?);
        trace!(
            data_source = %self.data_source,
            connection = handle.id(),
            standalone,
            "Executor owns a fresh connection"
        );
        Ok(Executor::new(
            handle,
            true,
            self.provider.clone(),
            self.converter.clone(),
        ))
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn converter(&self) -> &Arc<TypeConverter> {
        &self.converter
    }

    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }
}
