//! Per-entity repository facade and the unit-of-work handler contract.

use std::sync::{Arc, Weak};

use crate::db::{
    DbCommand, DbCommandBuilder, DbEntityBuilder, DbQueryBuilder, DbStorageContext,
};
use crate::entity_ref::EntityRef;
use crate::error::{DataError, DataResult};
use crate::model_configuration::EntityConfiguration;
use crate::unit_of_work::UnitOfWork;
use crate::value::Value;

/// Types that can be mapped and tracked.
pub trait Entity: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Entity for T {}

/// Persists tracked entities of one type when a unit of work is saved.
///
/// The default methods queue insert/update/delete commands built from the
/// entity mapping. A repository overrides a method to issue its own SQL, or
/// to refuse a mutation the entity type does not support.
pub trait UnitOfWorkHandler<E: Entity>: Send + Sync {
    fn repository(&self) -> &DbRepository<E>;

    fn save_added_item(&self, entity: &EntityRef<E>) -> DataResult<()> {
        let repository = self.repository();
        let context = repository
            .command_builder()
            .insert_command(vec![entity.clone()], repository.storage().transaction())?;
        repository.storage().add_command(context)
    }

    fn save_changed_item(&self, entity: &EntityRef<E>) -> DataResult<()> {
        let repository = self.repository();
        let context = repository
            .command_builder()
            .update_command(vec![entity.clone()], repository.storage().transaction())?;
        repository.storage().add_command(context)
    }

    fn save_removed_item(&self, entity: &EntityRef<E>) -> DataResult<()> {
        let repository = self.repository();
        let context = repository
            .command_builder()
            .delete_command(vec![entity.clone()], repository.storage().transaction())?;
        repository.storage().add_command(context)
    }
}

/// Mapping, SQL builders and storage for one entity type.
///
/// Mutations are only registered with the unit of work; nothing reaches the
/// database until [`UnitOfWork::save_changes`] runs. Reads go straight to the
/// storage context.
pub struct DbRepository<E: Entity> {
    storage: Arc<DbStorageContext>,
    unit_of_work: Arc<UnitOfWork>,
    handler: Weak<dyn UnitOfWorkHandler<E>>,
    configuration: Arc<EntityConfiguration<E>>,
    command_builder: DbCommandBuilder<E>,
    entity_builder: DbEntityBuilder<E>,
}

impl<E: Entity> DbRepository<E> {
    /// Repository dispatching saved work to `handler`, usually the concrete
    /// repository wrapping this one (see [`Arc::new_cyclic`]).
    pub fn new(
        unit_of_work: Arc<UnitOfWork>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> DataResult<Self> {
        let configuration = unit_of_work.storage().configuration::<E>()?;
        Ok(Self::with_configuration(unit_of_work, configuration, handler))
    }

    /// Repository over a mapping that was already looked up.
    ///
    /// Infallible, so it can run inside [`Arc::new_cyclic`]:
    ///
    /// ```ignore
    /// let configuration = unit_of_work.storage().configuration::<Role>()?;
    /// let roles = Arc::new_cyclic(|handler: &Weak<RoleRepository>| RoleRepository {
    ///     inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
    /// });
    /// ```
    pub fn with_configuration(
        unit_of_work: Arc<UnitOfWork>,
        configuration: Arc<EntityConfiguration<E>>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> Self {
        let storage = Arc::clone(unit_of_work.storage());
        let query_builder = Arc::new(DbQueryBuilder::new(
            Arc::clone(&configuration),
            Arc::clone(storage.dialect()),
        ));
        Self {
            storage,
            unit_of_work,
            handler,
            command_builder: DbCommandBuilder::new(query_builder),
            entity_builder: DbEntityBuilder::new(Arc::clone(&configuration)),
            configuration,
        }
    }

    pub fn storage(&self) -> &Arc<DbStorageContext> {
        &self.storage
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    pub fn configuration(&self) -> &Arc<EntityConfiguration<E>> {
        &self.configuration
    }

    pub fn query_builder(&self) -> &Arc<DbQueryBuilder<E>> {
        self.command_builder.query_builder()
    }

    pub fn command_builder(&self) -> &DbCommandBuilder<E> {
        &self.command_builder
    }

    pub fn entity_builder(&self) -> &DbEntityBuilder<E> {
        &self.entity_builder
    }

    // Tracking

    /// Register `entity` for insertion and return the tracked handle
    pub fn add(&self, entity: impl Into<EntityRef<E>>) -> DataResult<EntityRef<E>> {
        let entity = entity.into();
        self.unit_of_work
            .register_added(entity.clone(), self.handler.clone())?;
        Ok(entity)
    }

    pub fn change(&self, entity: impl Into<EntityRef<E>>) -> DataResult<EntityRef<E>> {
        let entity = entity.into();
        self.unit_of_work
            .register_changed(entity.clone(), self.handler.clone())?;
        Ok(entity)
    }

    pub fn remove(&self, entity: impl Into<EntityRef<E>>) -> DataResult<EntityRef<E>> {
        let entity = entity.into();
        self.unit_of_work
            .register_removed(entity.clone(), self.handler.clone())?;
        Ok(entity)
    }

    // Queries

    /// Command for custom SQL, enlisted in the ambient transaction
    pub fn create_command(&self, sql: impl Into<String>) -> DataResult<DbCommand> {
        self.storage.create_command(sql)
    }

    /// Entity whose key equals `key` (one value per key column, in key order)
    pub async fn find_by_key(&self, key: &[Value]) -> DataResult<Option<E>> {
        let command = {
            let keys = self.configuration.key_property_configurations();
            if keys.len() != key.len() {
                return Err(DataError::argument(format!(
                    "{} has {} key columns but {} values were given",
                    self.configuration.entity_name(),
                    keys.len(),
                    key.len()
                )));
            }
            let mut command = self.create_command(self.query_builder().select_by_key_sql()?)?;
            for (property, value) in keys.iter().zip(key) {
                command
                    .parameters_mut()
                    .set_typed(property.name(), value.clone(), property.kind());
            }
            command
        };
        self.query_one(command).await
    }

    pub async fn find_all(&self) -> DataResult<Vec<E>> {
        let command = self.create_command(self.query_builder().select_sql())?;
        self.query_all(command).await
    }

    /// First entity whose properties equal the given values
    pub async fn find_one_by(&self, filters: &[(&str, Value)]) -> DataResult<Option<E>> {
        let command = self.filtered_command(filters)?;
        self.query_one(command).await
    }

    /// Every entity whose properties equal the given values
    pub async fn find_all_by(&self, filters: &[(&str, Value)]) -> DataResult<Vec<E>> {
        let command = self.filtered_command(filters)?;
        self.query_all(command).await
    }

    /// Run `command` and materialize its first row
    pub async fn query_one(&self, command: DbCommand) -> DataResult<Option<E>> {
        let shape = self.entity_builder.result_shape();
        let rows = self.storage.execute_reader(command, &shape).await?;
        self.entity_builder.build(&rows)
    }

    /// Run `command` and materialize every row
    pub async fn query_all(&self, command: DbCommand) -> DataResult<Vec<E>> {
        let shape = self.entity_builder.result_shape();
        let rows = self.storage.execute_reader(command, &shape).await?;
        self.entity_builder.build_all(&rows)
    }

    fn filtered_command(&self, filters: &[(&str, Value)]) -> DataResult<DbCommand> {
        let names: Vec<&str> = filters.iter().map(|(name, _)| *name).collect();
        let mut command = self.create_command(self.query_builder().select_where_sql(&names)?)?;
        for (name, value) in filters {
            let kind = self
                .configuration
                .property(name)
                .map(|p| p.kind())
                .ok_or_else(|| DataError::argument(format!("Property {} is not mapped", name)))?;
            command.parameters_mut().set_typed(name, value.clone(), kind);
        }
        Ok(command)
    }
}

impl<E: Entity> std::fmt::Debug for DbRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRepository")
            .field("entity", &self.configuration.entity_name())
            .field("table", &self.configuration.table_name())
            .finish()
    }
}
