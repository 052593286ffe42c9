//! Named data-source registry.

use crate::dao::Dao;
use crate::db::backend::SqlxProvider;
use crate::db::driver::{Connection, ConnectionProvider};
use crate::db::factory::ExecutorFactory;
use crate::error::{DaoError, DaoResult};
use crate::models::DataSourceConfig;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

struct DataSourceEntry {
    provider: Arc<dyn ConnectionProvider>,
    factory: OnceLock<Arc<ExecutorFactory>>,
}

/// Connection providers registered under a name, each with its lazily
/// created [`ExecutorFactory`].
#[derive(Default)]
pub struct DataSources {
    entries: RwLock<HashMap<String, DataSourceEntry>>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`. Names are unique.
    pub fn register(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn ConnectionProvider>,
    ) -> DaoResult<()> {
        let name = name.into();
        let mut entries = self.write();
        if entries.contains_key(&name) {
            return Err(DaoError::configuration(format!(
                "Data source '{name}' is already registered"
            )));
        }
        info!(data_source = %name, "Registered data source");
        entries.insert(
            name,
            DataSourceEntry {
                provider,
                factory: OnceLock::new(),
            },
        );
        Ok(())
    }

    /// Open an `sqlx` pool for `config` and register it under its id.
    pub fn connect(&self, config: &DataSourceConfig) -> DaoResult<()> {
        if self.contains(&config.id) {
            return Err(DaoError::configuration(format!(
                "Data source '{}' is already registered",
                config.id
            )));
        }
        let provider = SqlxProvider::connect(config)?;
        self.register(config.id.clone(), Arc::new(provider))
    }

    /// A [`Dao`] that joins the calling thread's transaction, if any.
    pub fn get_dao(&self, name: &str) -> DaoResult<Dao> {
        Ok(Dao::new(self.factory(name)?, false))
    }

    /// A [`Dao`] that always works on its own connection.
    pub fn get_dao_standalone(&self, name: &str) -> DaoResult<Dao> {
        Ok(Dao::new(self.factory(name)?, true))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Unregister `name`, handing its provider to `finalizer`.
    ///
    /// Returns `false` when nothing was registered under `name`.
    pub fn remove(&self, name: &str, finalizer: impl FnOnce(&dyn ConnectionProvider)) -> bool {
        let removed = self.write().remove(name);
        match removed {
            Some(entry) => {
                finalizer(entry.provider.as_ref());
                info!(data_source = %name, "Removed data source");
                true
            }
            None => false,
        }
    }

    /// Run `f` on a connection of `name`, releasing it afterwards whatever
    /// `f` returns.
    pub fn with_connection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn Connection) -> DaoResult<T>,
    ) -> DaoResult<T> {
        let provider = self.provider(name)?;
        let mut connection = provider.acquire()?;
        let result = f(connection.as_mut());
        provider.release(connection);
        result
    }

    fn provider(&self, name: &str) -> DaoResult<Arc<dyn ConnectionProvider>> {
        self.read()
            .get(name)
            .map(|entry| entry.provider.clone())
            .ok_or_else(|| unknown(name))
    }

    fn factory(&self, name: &str) -> DaoResult<Arc<ExecutorFactory>> {
        let entries = self.read();
        let entry = entries.get(name).ok_or_else(|| unknown(name))?;
        Ok(entry
            .factory
            .get_or_init(|| {
                debug!(data_source = %name, "Creating executor factory");
                Arc::new(ExecutorFactory::new(name, entry.provider.clone()))
            })
            .clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DataSourceEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DataSourceEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown(name: &str) -> DaoError {
    DaoError::configuration(format!("Unknown data source '{name}'"))
}

impl std::fmt::Debug for DataSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSources")
            .field("names", &self.names())
            .finish()
    }
}
