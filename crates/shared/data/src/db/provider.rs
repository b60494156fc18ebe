//! Provider name -> dialect + connection factory resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DataError, DataResult};

use super::connection::Connection;
use super::dialect::Dialect;

/// Creates unopened connections from a connection string.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, connection_string: &str) -> DataResult<Box<dyn Connection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(&str) -> DataResult<Box<dyn Connection>> + Send + Sync,
{
    fn create(&self, connection_string: &str) -> DataResult<Box<dyn Connection>> {
        self(connection_string)
    }
}

/// A backend: how to quote SQL for it and how to connect to it.
#[derive(Clone)]
pub struct DbProvider {
    name: String,
    dialect: Arc<dyn Dialect>,
    factory: Arc<dyn ConnectionFactory>,
}

impl DbProvider {
    pub fn new(
        name: impl Into<String>,
        dialect: Arc<dyn Dialect>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect,
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.dialect)
    }

    pub fn create_connection(&self, connection_string: &str) -> DataResult<Box<dyn Connection>> {
        if connection_string.trim().is_empty() {
            return Err(DataError::configuration(format!(
                "Connection string for provider {} is empty",
                self.name
            )));
        }
        self.factory.create(connection_string)
    }
}

impl fmt::Debug for DbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbProvider")
            .field("name", &self.name)
            .field("dialect", &self.dialect.name())
            .finish()
    }
}

/// Known providers, looked up case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, DbProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the sea-orm backed providers (`mysql`, `postgres`, `sqlite`)
    #[cfg(feature = "sea-orm")]
    pub fn with_defaults() -> Self {
        use super::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};
        use crate::sea_orm_backend::SeaOrmConnection;

        let mut registry = Self::new();
        let dialects: [Arc<dyn Dialect>; 3] = [
            Arc::new(MySqlDialect),
            Arc::new(PostgresDialect),
            Arc::new(SqliteDialect),
        ];
        for dialect in dialects {
            let name = dialect.name();
            let factory = move |url: &str| -> DataResult<Box<dyn Connection>> {
                Ok(Box::new(SeaOrmConnection::new(url)?))
            };
            registry.register(DbProvider::new(name, dialect, Arc::new(factory)));
        }
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: DbProvider) -> &mut Self {
        self.providers
            .insert(provider.name().to_ascii_lowercase(), provider);
        self
    }

    pub fn resolve(&self, name: &str) -> DataResult<&DbProvider> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DataError::configuration(format!("Unknown database provider: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.values().map(DbProvider::name).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlServerDialect;
    use crate::testing::FakeDatabase;

    fn registry(db: FakeDatabase) -> ProviderRegistry {
        let factory = move |_: &str| -> DataResult<Box<dyn Connection>> { Ok(db.boxed_connection()) };
        let mut registry = ProviderRegistry::new();
        registry.register(DbProvider::new("SqlServer", Arc::new(SqlServerDialect), Arc::new(factory)));
        registry
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = registry(FakeDatabase::new());
        let provider = registry.resolve("sqlserver").unwrap();

        assert_eq!(provider.dialect().name(), "sqlserver");
        assert!(provider.create_connection("Server=.").is_ok());
        assert_eq!(registry.names(), vec!["SqlServer"]);
    }

    #[test]
    fn test_unknown_provider_and_empty_url_fail_fast() {
        let registry = registry(FakeDatabase::new());

        assert!(matches!(registry.resolve("oracle"), Err(DataError::Configuration(_))));
        let provider = registry.resolve("SQLSERVER").unwrap();
        assert!(matches!(provider.create_connection("  "), Err(DataError::Configuration(_))));
    }
}
