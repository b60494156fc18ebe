//! Batches entity mutations across repositories into one atomic save.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};

use crate::db::DbStorageContext;
use crate::entity_ref::EntityRef;
use crate::error::{DataError, DataResult};
use crate::repository::{Entity, UnitOfWorkHandler};

/// Kind of mutation a work item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkType {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkType::Added => "added",
            WorkType::Changed => "changed",
            WorkType::Removed => "removed",
        };
        f.write_str(name)
    }
}

trait WorkItem: Send + Sync {
    fn entity_name(&self) -> &'static str;

    fn save(&self, work_type: WorkType) -> DataResult<()>;
}

struct EntityWork<E: Entity> {
    entity: EntityRef<E>,
    handler: Weak<dyn UnitOfWorkHandler<E>>,
}

impl<E: Entity> WorkItem for EntityWork<E> {
    fn entity_name(&self) -> &'static str {
        crate::model_configuration::short_type_name::<E>()
    }

    fn save(&self, work_type: WorkType) -> DataResult<()> {
        let handler = self
            .handler
            .upgrade()
            .ok_or(DataError::Disposed("UnitOfWorkHandler"))?;
        match work_type {
            WorkType::Added => handler.save_added_item(&self.entity),
            WorkType::Changed => handler.save_changed_item(&self.entity),
            WorkType::Removed => handler.save_removed_item(&self.entity),
        }
    }
}

struct Work {
    sequence: u64,
    registered_at: DateTime<Utc>,
    work_type: WorkType,
    item: Box<dyn WorkItem>,
}

/// Pending mutations awaiting a single atomic save.
///
/// Work items replay in registration order whichever repository registered
/// them, so a role added before a user-role link is inserted first. The work
/// list is emptied by every save attempt, successful or not.
pub struct UnitOfWork {
    storage: Arc<DbStorageContext>,
    work: Mutex<Vec<Work>>,
    sequence: AtomicU64,
}

impl UnitOfWork {
    pub fn new(storage: Arc<DbStorageContext>) -> Self {
        Self {
            storage,
            work: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn storage(&self) -> &Arc<DbStorageContext> {
        &self.storage
    }

    pub fn register_added<E: Entity>(
        &self,
        entity: EntityRef<E>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> DataResult<()> {
        self.register(WorkType::Added, entity, handler)
    }

    pub fn register_changed<E: Entity>(
        &self,
        entity: EntityRef<E>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> DataResult<()> {
        self.register(WorkType::Changed, entity, handler)
    }

    pub fn register_removed<E: Entity>(
        &self,
        entity: EntityRef<E>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> DataResult<()> {
        self.register(WorkType::Removed, entity, handler)
    }

    fn register<E: Entity>(
        &self,
        work_type: WorkType,
        entity: EntityRef<E>,
        handler: Weak<dyn UnitOfWorkHandler<E>>,
    ) -> DataResult<()> {
        if self.storage.is_disposed() {
            return Err(DataError::Disposed("DbStorageContext"));
        }
        let work = Work {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            registered_at: Utc::now(),
            work_type,
            item: Box::new(EntityWork { entity, handler }),
        };
        tracing::trace!(
            entity = work.item.entity_name(),
            %work_type,
            sequence = work.sequence,
            "Registered work"
        );
        self.lock_work().push(work);
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.lock_work().len()
    }

    pub fn has_changes(&self) -> bool {
        !self.lock_work().is_empty()
    }

    /// Discard pending work without saving it
    pub fn clear(&self) {
        self.lock_work().clear();
    }

    /// Replay every registered mutation and persist them in one transaction.
    ///
    /// Joins the storage context's ambient transaction when one already
    /// exists; otherwise begins one, commits it on success and rolls it back
    /// on failure. Returns the number of affected rows.
    pub async fn save_changes(&self) -> DataResult<u64> {
        let mut work = std::mem::take(&mut *self.lock_work());
        if work.is_empty() {
            return Ok(0);
        }
        work.sort_by_key(|w| w.sequence);
        if let (Some(first), Some(last)) = (work.first(), work.last()) {
            tracing::debug!(
                items = work.len(),
                first_registered = %first.registered_at,
                last_registered = %last.registered_at,
                "Saving unit of work"
            );
        }

        let transaction = if self.storage.transaction_exists() {
            None
        } else {
            Some(self.storage.create_transaction_context(false).await?)
        };

        let result = self.replay(&work).await;
        match (result, transaction) {
            (Ok(affected), Some(transaction)) => {
                transaction.commit().await?;
                Ok(affected)
            }
            (Ok(affected), None) => Ok(affected),
            (Err(err), transaction) => {
                self.storage.clear_commands();
                if let Some(transaction) = transaction {
                    if let Err(rollback_err) = transaction.rollback().await {
                        tracing::error!("Failed to rollback transaction: {}", rollback_err);
                    }
                }
                Err(err)
            }
        }
    }

    async fn replay(&self, work: &[Work]) -> DataResult<u64> {
        for item in work {
            item.item.save(item.work_type).map_err(|err| {
                tracing::debug!(
                    entity = item.item.entity_name(),
                    work_type = %item.work_type,
                    sequence = item.sequence,
                    error = %err,
                    "Work item failed"
                );
                err
            })?;
        }
        self.storage.save_changes().await
    }

    fn lock_work(&self) -> MutexGuard<'_, Vec<Work>> {
        self.work.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending", &self.pending_count())
            .field("storage", &self.storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqlServerDialect, TransactionId};
    use crate::model_configuration::{
        EntityConfiguration, EntityConfigurationBuilder, EntityConfigurationCollection,
        EntityTypeConfiguration,
    };
    use crate::repository::DbRepository;
    use crate::testing::FakeDatabase;
    use crate::value::Value;

    #[derive(Debug, Default, Clone)]
    struct Role {
        id: i32,
        name: String,
    }

    #[derive(Debug, Default, Clone)]
    struct Tag {
        role_id: i32,
        label: String,
    }

    struct RoleConfiguration;

    impl EntityTypeConfiguration<Role> for RoleConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<Role>) -> DataResult<()> {
            builder.to_table("Role");
            builder.has_key_property("Id", |r| &r.id, |r| &mut r.id)?;
            builder.property("Name", |r| &r.name, |r| &mut r.name);
            Ok(())
        }
    }

    struct TagConfiguration;

    impl EntityTypeConfiguration<Tag> for TagConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<Tag>) -> DataResult<()> {
            builder.to_table("Tag");
            builder.property("RoleId", |t| &t.role_id, |t| &mut t.role_id);
            builder.property("Label", |t| &t.label, |t| &mut t.label);
            builder.has_key(&["RoleId", "Label"])?;
            Ok(())
        }
    }

    struct RoleRepository {
        inner: DbRepository<Role>,
    }

    impl UnitOfWorkHandler<Role> for RoleRepository {
        fn repository(&self) -> &DbRepository<Role> {
            &self.inner
        }
    }

    struct TagRepository {
        inner: DbRepository<Tag>,
    }

    impl UnitOfWorkHandler<Tag> for TagRepository {
        fn repository(&self) -> &DbRepository<Tag> {
            &self.inner
        }

        fn save_changed_item(&self, _entity: &EntityRef<Tag>) -> DataResult<()> {
            Err(DataError::unsupported("Tag", "update"))
        }
    }

    struct Fixture {
        db: FakeDatabase,
        unit_of_work: Arc<UnitOfWork>,
        roles: Arc<RoleRepository>,
        tags: Arc<TagRepository>,
    }

    fn fixture() -> Fixture {
        let db = FakeDatabase::new();
        let mut configurations = EntityConfigurationCollection::new();
        configurations
            .register(EntityConfiguration::build(&RoleConfiguration).unwrap())
            .unwrap();
        configurations
            .register(EntityConfiguration::build(&TagConfiguration).unwrap())
            .unwrap();
        let storage = Arc::new(DbStorageContext::new(
            db.boxed_connection(),
            Arc::new(SqlServerDialect),
            Arc::new(configurations),
        ));
        let unit_of_work = Arc::new(UnitOfWork::new(storage));

        let roles = Arc::new_cyclic(|handler: &Weak<RoleRepository>| RoleRepository {
            inner: DbRepository::new(unit_of_work.clone(), handler.clone()).unwrap(),
        });
        let tags = Arc::new_cyclic(|handler: &Weak<TagRepository>| TagRepository {
            inner: DbRepository::new(unit_of_work.clone(), handler.clone()).unwrap(),
        });

        Fixture {
            db,
            unit_of_work,
            roles,
            tags,
        }
    }

    fn tag(role_id: i32, label: &str) -> Tag {
        Tag {
            role_id,
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_registration_does_not_touch_storage() {
        let f = fixture();
        f.roles.repository().add(Role::default()).unwrap();

        assert_eq!(f.unit_of_work.pending_count(), 1);
        assert!(f.db.executed().is_empty());
        assert_eq!(f.db.open_count(), 0);
    }

    #[tokio::test]
    async fn test_work_replays_in_registration_order_across_repositories() {
        let f = fixture();
        f.db.push_scalar(7);
        f.roles
            .repository()
            .add(Role {
                id: 0,
                name: "admin".to_string(),
            })
            .unwrap();
        f.tags.repository().add(tag(7, "ops")).unwrap();
        f.tags.repository().remove(tag(3, "old")).unwrap();

        let affected = f.unit_of_work.save_changes().await.unwrap();

        assert_eq!(affected, 3);
        let sql = f.db.executed_sql();
        assert!(sql[0].starts_with("INSERT INTO [Role]"));
        assert!(sql[1].starts_with("INSERT INTO [Tag]"));
        assert!(sql[2].starts_with("DELETE FROM [Tag]"));
        assert_eq!(f.db.commit_count(), 1);
        assert_eq!(f.db.committed().len(), 3);
        assert!(!f.unit_of_work.has_changes());
        assert!(!f.db.is_open());
    }

    #[tokio::test]
    async fn test_generated_key_visible_to_caller() {
        let f = fixture();
        f.db.push_scalar(42);
        let role = f.roles.repository().add(Role::default()).unwrap();

        f.unit_of_work.save_changes().await.unwrap();

        assert_eq!(role.read().id, 42);
    }

    #[tokio::test]
    async fn test_failure_during_replay_saves_nothing() {
        let f = fixture();
        f.roles.repository().add(Role::default()).unwrap();
        f.tags.repository().change(tag(1, "x")).unwrap();
        f.roles.repository().add(Role::default()).unwrap();

        let err = f.unit_of_work.save_changes().await.unwrap_err();

        assert!(matches!(err, DataError::Unsupported { .. }));
        assert!(f.db.executed().is_empty());
        assert!(f.db.committed().is_empty());
        assert_eq!(f.db.rollback_count(), 1);
        assert_eq!(f.unit_of_work.pending_count(), 0);
        assert_eq!(f.unit_of_work.storage().pending_commands(), 0);
        assert!(!f.unit_of_work.storage().transaction_exists());
        assert!(!f.db.is_open());
    }

    #[tokio::test]
    async fn test_driver_failure_rolls_back_earlier_statements() {
        let f = fixture();
        f.db.fail_when("DELETE FROM [Tag]");
        f.tags.repository().add(tag(1, "a")).unwrap();
        f.tags.repository().remove(tag(1, "b")).unwrap();
        f.tags.repository().add(tag(1, "c")).unwrap();

        let err = f.unit_of_work.save_changes().await.unwrap_err();

        assert!(matches!(err, DataError::Driver(_)));
        assert_eq!(f.db.executed().len(), 1);
        assert!(f.db.committed().is_empty());
        assert_eq!(f.unit_of_work.pending_count(), 0);
        assert_eq!(f.unit_of_work.storage().pending_commands(), 0);

        // nothing is replayed on the next save
        assert_eq!(f.unit_of_work.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_joins_existing_ambient_transaction() {
        let f = fixture();
        let storage = f.unit_of_work.storage().clone();
        let transaction = storage.create_transaction_context(false).await.unwrap();
        f.tags.repository().add(tag(2, "b")).unwrap();

        f.unit_of_work.save_changes().await.unwrap();
        assert_eq!(f.db.commit_count(), 0);
        assert_eq!(f.db.executed()[0].transaction, Some(TransactionId(1)));

        transaction.commit().await.unwrap();
        assert_eq!(f.db.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_save_after_dropped_transaction_commits() {
        let f = fixture();
        let storage = f.unit_of_work.storage().clone();
        {
            let _transaction = storage.create_transaction_context(false).await.unwrap();
        }
        f.roles.repository().add(Role::default()).unwrap();

        assert_eq!(f.unit_of_work.save_changes().await.unwrap(), 1);

        assert_eq!(f.db.rollback_count(), 1);
        assert_eq!(f.db.commit_count(), 1);
        assert_eq!(f.db.committed().len(), 1);
        assert!(!storage.transaction_exists());
        assert!(!f.db.is_open());
    }

    #[tokio::test]
    async fn test_find_by_key_binds_key_values() {
        let f = fixture();
        f.db.push_rows(vec![crate::db::Row::new().with("Id", 5).with("Name", "admin")]);

        let role = f.roles.repository().find_by_key(&[Value::Int32(5)]).await.unwrap().unwrap();

        assert_eq!(role.name, "admin");
        let executed = f.db.executed();
        assert_eq!(executed[0].sql, "SELECT [Id],[Name] FROM [Role] WHERE [Id]=@Id");
        assert_eq!(executed[0].parameter("Id"), Some(&Value::Int32(5)));
        assert!(f.roles.repository().find_by_key(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_handler_fails_save() {
        let f = fixture();
        f.roles.repository().add(Role::default()).unwrap();
        let Fixture { unit_of_work, roles, .. } = f;
        drop(roles);

        let err = unit_of_work.save_changes().await.unwrap_err();
        assert!(matches!(err, DataError::Disposed(_)));
    }
}
