//! One storage context, one unit of work and the identity repositories over them.

use std::sync::Arc;

use common::{AppResult, DatabaseConfig, StoreConfig};
use data::db::{Connection, Dialect};
use data::{DataResult, DbProvider, DbStorageContext, MappingOverrides, ProviderRegistry, UnitOfWork};

use crate::mapping::configurations;
use crate::repository::{
    RoleRepository, UserClaimRepository, UserLoginRepository, UserRepository, UserRoleRepository,
};

/// Everything the identity stores need for one logical operation.
///
/// Repositories share the unit of work, so mutations made through any of
/// them are flushed together by [`IdentityDataContext::save_changes`].
pub struct IdentityDataContext {
    storage: Arc<DbStorageContext>,
    unit_of_work: Arc<UnitOfWork>,
    users: Arc<UserRepository>,
    roles: Arc<RoleRepository>,
    user_roles: Arc<UserRoleRepository>,
    user_logins: Arc<UserLoginRepository>,
    user_claims: Arc<UserClaimRepository>,
}

impl IdentityDataContext {
    pub fn new(
        connection: Box<dyn Connection>,
        dialect: Arc<dyn Dialect>,
        overrides: &MappingOverrides,
    ) -> DataResult<Self> {
        let configurations = Arc::new(configurations(overrides)?);
        let storage = Arc::new(DbStorageContext::new(connection, dialect, configurations));
        Self::from_storage(storage)
    }

    /// Context over a fresh connection from `provider`
    pub fn from_provider(
        provider: &DbProvider,
        connection_string: &str,
        overrides: &MappingOverrides,
    ) -> DataResult<Self> {
        let connection = provider.create_connection(connection_string)?;
        Self::new(connection, provider.dialect(), overrides)
    }

    /// Resolve the configured provider and build a context for it
    pub fn from_config(
        registry: &ProviderRegistry,
        database: &DatabaseConfig,
        store: &StoreConfig,
    ) -> AppResult<Self> {
        let provider = registry.resolve(&database.provider)?;
        tracing::debug!(provider = provider.name(), "Creating identity data context");
        Ok(Self::from_provider(provider, &database.url, &store.mapping_overrides())?)
    }

    pub fn from_storage(storage: Arc<DbStorageContext>) -> DataResult<Self> {
        let unit_of_work = Arc::new(UnitOfWork::new(Arc::clone(&storage)));
        Ok(Self {
            users: UserRepository::new(Arc::clone(&unit_of_work))?,
            roles: RoleRepository::new(Arc::clone(&unit_of_work))?,
            user_roles: UserRoleRepository::new(Arc::clone(&unit_of_work))?,
            user_logins: UserLoginRepository::new(Arc::clone(&unit_of_work))?,
            user_claims: UserClaimRepository::new(Arc::clone(&unit_of_work))?,
            storage,
            unit_of_work,
        })
    }

    pub fn storage(&self) -> &Arc<DbStorageContext> {
        &self.storage
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn roles(&self) -> &RoleRepository {
        &self.roles
    }

    pub fn user_roles(&self) -> &UserRoleRepository {
        &self.user_roles
    }

    pub fn user_logins(&self) -> &UserLoginRepository {
        &self.user_logins
    }

    pub fn user_claims(&self) -> &UserClaimRepository {
        &self.user_claims
    }

    /// Persist everything registered through the repositories
    pub async fn save_changes(&self) -> DataResult<u64> {
        self.unit_of_work.save_changes().await
    }

    /// Drop pending work and release the connection
    pub async fn dispose(&self) -> DataResult<()> {
        self.unit_of_work.clear();
        self.storage.dispose().await
    }
}

impl std::fmt::Debug for IdentityDataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityDataContext")
            .field("unit_of_work", &self.unit_of_work)
            .finish()
    }
}
