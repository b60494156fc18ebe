//! Connection, command queue and transaction ownership for one unit of work.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{DataError, DataResult};
use crate::model_configuration::{EntityConfiguration, EntityConfigurationCollection};
use crate::value::{Value, ValueKind};

use super::command::DbCommand;
use super::command_context::{CommandExecution, DbCommandContext};
use super::connection::{ColumnShape, Connection, ConnectionState, Row, TransactionId};
use super::dialect::Dialect;
use super::provider::DbProvider;

#[derive(Default)]
struct StorageState {
    commands: VecDeque<Box<dyn CommandExecution>>,
    /// Transaction shared by every repository on this context
    ambient: Option<TransactionId>,
    /// Transactions begun through this context and not yet finished
    transactions: Vec<TransactionId>,
    /// One entry per `open()`: whether that call opened the connection
    opened: Vec<bool>,
    /// Transactions whose context was dropped unfinished, rolled back on the
    /// next `open()`
    abandoned: Vec<AbandonedTransaction>,
}

#[derive(Debug, Clone, Copy)]
struct AbandonedTransaction {
    id: TransactionId,
    /// The dropped context's `open()` was the one that opened the connection
    close: bool,
}

/// Owns the physical connection, the queue of pending commands and the
/// ambient transaction.
///
/// Shared as `Arc<DbStorageContext>` by every repository of one unit of work.
/// One instance serves one logical operation at a time.
pub struct DbStorageContext {
    connection: tokio::sync::Mutex<Box<dyn Connection>>,
    dialect: Arc<dyn Dialect>,
    configurations: Arc<EntityConfigurationCollection>,
    state: Mutex<StorageState>,
    disposed: AtomicBool,
}

impl DbStorageContext {
    pub fn new(
        connection: Box<dyn Connection>,
        dialect: Arc<dyn Dialect>,
        configurations: Arc<EntityConfigurationCollection>,
    ) -> Self {
        Self {
            connection: tokio::sync::Mutex::new(connection),
            dialect,
            configurations,
            state: Mutex::new(StorageState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Storage context over a fresh connection from `provider`
    pub fn from_provider(
        provider: &DbProvider,
        connection_string: &str,
        configurations: Arc<EntityConfigurationCollection>,
    ) -> DataResult<Self> {
        let connection = provider.create_connection(connection_string)?;
        Ok(Self::new(connection, provider.dialect(), configurations))
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn configurations(&self) -> &Arc<EntityConfigurationCollection> {
        &self.configurations
    }

    /// Registered mapping for `E`; an unregistered type is a configuration error
    pub fn configuration<E: Send + Sync + 'static>(&self) -> DataResult<Arc<EntityConfiguration<E>>> {
        self.configurations.get::<E>().ok_or_else(|| {
            DataError::configuration(format!(
                "No entity configuration registered for {}",
                std::any::type_name::<E>()
            ))
        })
    }

    // Connection lifecycle

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.lock().await.state()
    }

    /// Open the connection, remembering whether it was already open
    pub async fn open(&self) -> DataResult<()> {
        self.ensure_active()?;
        self.roll_back_abandoned().await;
        let opened = {
            let mut connection = self.connection.lock().await;
            if connection.state() == ConnectionState::Closed {
                connection.open().await?;
                true
            } else {
                false
            }
        };
        self.lock_state().opened.push(opened);
        Ok(())
    }

    /// Close the connection if the matching `open()` opened it, or always
    /// when `force` is set.
    ///
    /// A non-forced close leaves the connection open while a transaction
    /// begun through this context is still active.
    pub async fn close(&self, force: bool) -> DataResult<()> {
        let abandoned = {
            let mut state = self.lock_state();
            let should_close = if force {
                state.opened.clear();
                true
            } else {
                let opened = state.opened.pop().unwrap_or(true);
                opened && state.transactions.is_empty()
            };
            if !should_close {
                return Ok(());
            }
            if force {
                state.ambient = None;
                std::mem::take(&mut state.transactions)
            } else {
                Vec::new()
            }
        };
        if !abandoned.is_empty() {
            tracing::warn!(
                transactions = abandoned.len(),
                "Force-closing connection with open transactions"
            );
        }

        let mut connection = self.connection.lock().await;
        if connection.state() == ConnectionState::Open {
            connection.close().await?;
        }
        Ok(())
    }

    // Commands

    /// New command enlisted in the ambient transaction, if any
    pub fn create_command(&self, text: impl Into<String>) -> DataResult<DbCommand> {
        self.ensure_active()?;
        Ok(DbCommand::new(text).with_transaction(self.transaction()))
    }

    /// Queue a command context for the next [`save_changes`](Self::save_changes)
    pub fn add_command<E: Send + Sync + 'static>(&self, context: DbCommandContext<E>) -> DataResult<()> {
        self.add_boxed_command(Box::new(context))
    }

    pub fn add_boxed_command(&self, context: Box<dyn CommandExecution>) -> DataResult<()> {
        self.ensure_active()?;
        self.lock_state().commands.push_back(context);
        Ok(())
    }

    pub fn pending_commands(&self) -> usize {
        self.lock_state().commands.len()
    }

    /// Drop every queued command without executing it
    pub fn clear_commands(&self) {
        let mut commands = std::mem::take(&mut self.lock_state().commands);
        for command in commands.iter_mut() {
            command.dispose();
        }
    }

    // Transactions

    pub fn transaction_exists(&self) -> bool {
        self.lock_state().ambient.is_some()
    }

    /// The ambient transaction
    pub fn transaction(&self) -> Option<TransactionId> {
        self.lock_state().ambient
    }

    /// Begin a transaction.
    ///
    /// A non-private transaction becomes the ambient one that every command
    /// created or saved through this context joins. Only one ambient
    /// transaction may exist at a time.
    pub async fn create_transaction_context(&self, private: bool) -> DataResult<TransactionContext<'_>> {
        self.ensure_active()?;
        if !private && self.transaction_exists() {
            return Err(DataError::transaction(
                "An ambient transaction is already active on this storage context",
            ));
        }

        let depth = self.lock_state().opened.len();
        self.open().await?;
        let begun = self.connection.lock().await.begin_transaction().await;
        let id = match begun {
            Ok(id) => id,
            Err(err) => {
                if let Err(close_err) = self.close(false).await {
                    tracing::error!("Failed to close connection after begin failure: {}", close_err);
                }
                return Err(err);
            }
        };

        {
            let mut state = self.lock_state();
            state.transactions.push(id);
            if !private {
                state.ambient = Some(id);
            }
        }
        tracing::debug!(transaction = %id, private, "Transaction started");

        Ok(TransactionContext {
            storage: self,
            id,
            private,
            depth,
            finished: false,
        })
    }

    /// Commit the ambient transaction
    pub async fn commit_transaction(&self) -> DataResult<()> {
        let id = self
            .transaction()
            .ok_or_else(|| DataError::transaction("No ambient transaction to commit"))?;
        self.finish_transaction(id, true).await
    }

    /// Roll back the ambient transaction
    pub async fn rollback_transaction(&self) -> DataResult<()> {
        let id = self
            .transaction()
            .ok_or_else(|| DataError::transaction("No ambient transaction to roll back"))?;
        self.finish_transaction(id, false).await
    }

    async fn finish_transaction(&self, id: TransactionId, commit: bool) -> DataResult<()> {
        if !self.lock_state().transactions.contains(&id) {
            return Err(DataError::transaction(format!("{} is not active", id)));
        }

        let result = {
            let mut connection = self.connection.lock().await;
            if commit {
                connection.commit(id).await
            } else {
                connection.rollback(id).await
            }
        };
        {
            let mut state = self.lock_state();
            state.transactions.retain(|t| *t != id);
            if state.ambient == Some(id) {
                state.ambient = None;
            }
        }
        match &result {
            Ok(()) if commit => tracing::debug!(transaction = %id, "Transaction committed"),
            Ok(()) => tracing::debug!(transaction = %id, "Transaction rolled back"),
            Err(_) => {}
        }

        let closed = self.close(false).await;
        result?;
        closed
    }

    /// Stop tracking a transaction whose context was dropped unfinished.
    ///
    /// It stops being ambient at once; the rollback itself waits for the
    /// next `open()` or `dispose()`.
    fn abandon_transaction(&self, id: TransactionId, depth: usize) -> bool {
        let mut state = self.lock_state();
        if !state.transactions.contains(&id) {
            return false;
        }
        state.transactions.retain(|t| *t != id);
        if state.ambient == Some(id) {
            state.ambient = None;
        }
        let close = state.opened.get(depth).copied().unwrap_or(true);
        state.opened.truncate(depth);
        state.abandoned.push(AbandonedTransaction { id, close });
        true
    }

    async fn roll_back_abandoned(&self) {
        let abandoned = std::mem::take(&mut self.lock_state().abandoned);
        if abandoned.is_empty() {
            return;
        }

        let mut connection = self.connection.lock().await;
        for transaction in &abandoned {
            tracing::warn!(transaction = %transaction.id, "Rolling back abandoned transaction");
            if let Err(err) = connection.rollback(transaction.id).await {
                tracing::error!("Failed to rollback transaction: {}", err);
            }
        }

        let idle = {
            let state = self.lock_state();
            state.opened.is_empty() && state.transactions.is_empty()
        };
        if idle && abandoned.iter().any(|t| t.close) && connection.state() == ConnectionState::Open {
            if let Err(err) = connection.close().await {
                tracing::error!("Failed to close connection: {}", err);
            }
        }
    }

    // Execution

    /// Execute every queued command as one batch.
    ///
    /// Runs inside the ambient transaction when there is one, otherwise in a
    /// private transaction that is committed on success and rolled back on
    /// failure. The queue is emptied and the connection closed whatever the
    /// outcome.
    pub async fn save_changes(&self) -> DataResult<u64> {
        self.ensure_active()?;
        let mut commands: Vec<_> = std::mem::take(&mut self.lock_state().commands).into();
        if commands.is_empty() {
            return Ok(0);
        }
        tracing::debug!(commands = commands.len(), "Saving queued commands");

        let result = match self.open().await {
            Ok(()) => {
                let result = self.execute_batch(&mut commands).await;
                let closed = self.close(false).await;
                result.and_then(|affected| closed.map(|()| affected))
            }
            Err(err) => Err(err),
        };
        for command in commands.iter_mut() {
            command.dispose();
        }
        result
    }

    async fn execute_batch(&self, commands: &mut [Box<dyn CommandExecution>]) -> DataResult<u64> {
        let ambient = self.transaction();
        let mut connection = self.connection.lock().await;
        let (transaction, private) = match ambient {
            Some(id) => (id, false),
            None => (connection.begin_transaction().await?, true),
        };

        let result = Self::execute_all(&mut **connection, commands, transaction).await;
        if !private {
            return result;
        }

        match result {
            Ok(affected) => {
                connection.commit(transaction).await?;
                tracing::debug!(transaction = %transaction, affected, "Private transaction committed");
                Ok(affected)
            }
            Err(err) => {
                if let Err(rollback_err) = connection.rollback(transaction).await {
                    tracing::error!("Failed to rollback transaction: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn execute_all(
        connection: &mut dyn Connection,
        commands: &mut [Box<dyn CommandExecution>],
        transaction: TransactionId,
    ) -> DataResult<u64> {
        let mut affected = 0;
        for command in commands.iter_mut() {
            command.bind_transaction(Some(transaction))?;
            affected += command.execute(connection).await?;
            command.dispose();
        }
        Ok(affected)
    }

    /// Run an ad-hoc statement immediately
    pub async fn execute_non_query(&self, command: DbCommand) -> DataResult<u64> {
        let command = self.enlist(command);
        self.open().await?;
        let result = {
            let mut connection = self.connection.lock().await;
            tracing::trace!(sql = %command.text(), "executing command");
            connection.execute_non_query(&command).await
        };
        let closed = self.close(false).await;
        let affected = result?;
        closed.map(|()| affected)
    }

    /// Run an ad-hoc statement and return its first column of the first row
    pub async fn execute_scalar(&self, command: DbCommand, kind: ValueKind) -> DataResult<Option<Value>> {
        let command = self.enlist(command);
        self.open().await?;
        let result = {
            let mut connection = self.connection.lock().await;
            tracing::trace!(sql = %command.text(), "executing scalar");
            connection.execute_scalar(&command, kind).await
        };
        let closed = self.close(false).await;
        let value = result?;
        closed.map(|()| value)
    }

    /// Run an ad-hoc query, decoding rows into `columns`
    pub async fn execute_reader(&self, command: DbCommand, columns: &[ColumnShape]) -> DataResult<Vec<Row>> {
        let command = self.enlist(command);
        self.open().await?;
        let result = {
            let mut connection = self.connection.lock().await;
            tracing::trace!(sql = %command.text(), "executing reader");
            connection.execute_reader(&command, columns).await
        };
        let closed = self.close(false).await;
        let rows = result?;
        closed.map(|()| rows)
    }

    fn enlist(&self, mut command: DbCommand) -> DbCommand {
        if command.transaction().is_none() {
            command.set_transaction(self.transaction());
        }
        command
    }

    // Teardown

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Roll back abandoned transactions, drop queued commands and close the
    /// connection. Every later operation fails with `Disposed`.
    pub async fn dispose(&self) -> DataResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.clear_commands();

        let abandoned = {
            let mut state = self.lock_state();
            state.ambient = None;
            let mut abandoned = std::mem::take(&mut state.transactions);
            abandoned.extend(state.abandoned.drain(..).map(|t| t.id));
            abandoned
        };
        {
            let mut connection = self.connection.lock().await;
            for id in abandoned {
                tracing::warn!(transaction = %id, "Rolling back abandoned transaction");
                if let Err(err) = connection.rollback(id).await {
                    tracing::error!("Failed to rollback transaction: {}", err);
                }
            }
        }
        self.close(true).await
    }

    fn ensure_active(&self) -> DataResult<()> {
        if self.is_disposed() {
            return Err(DataError::Disposed("DbStorageContext"));
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DbStorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("DbStorageContext")
            .field("dialect", &self.dialect.name())
            .field("pending_commands", &state.commands.len())
            .field("ambient", &state.ambient)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A transaction begun through [`DbStorageContext::create_transaction_context`].
///
/// Must be finished with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). A context dropped while still active stops
/// being the ambient transaction immediately and is rolled back by the
/// storage context's next `open()` or `dispose()`.
#[must_use = "a transaction must be committed or rolled back"]
pub struct TransactionContext<'a> {
    storage: &'a DbStorageContext,
    id: TransactionId,
    private: bool,
    /// Depth of the `open()` this transaction holds
    depth: usize,
    finished: bool,
}

impl TransactionContext<'_> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Private transactions are not visible as the ambient transaction
    pub fn is_private(&self) -> bool {
        self.private
    }

    pub async fn commit(mut self) -> DataResult<()> {
        self.finished = true;
        self.storage.finish_transaction(self.id, true).await
    }

    pub async fn rollback(mut self) -> DataResult<()> {
        self.finished = true;
        self.storage.finish_transaction(self.id, false).await
    }
}

impl Drop for TransactionContext<'_> {
    fn drop(&mut self) {
        if !self.finished && self.storage.abandon_transaction(self.id, self.depth) {
            tracing::warn!(
                transaction = %self.id,
                "Transaction context dropped without commit or rollback"
            );
        }
    }
}

impl fmt::Debug for TransactionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("private", &self.private)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbCommandBuilder, DbQueryBuilder, SqlServerDialect};
    use crate::entity_ref::EntityRef;
    use crate::model_configuration::{EntityConfigurationBuilder, EntityTypeConfiguration};
    use crate::testing::FakeDatabase;
    use tokio_test::assert_ok;

    #[derive(Debug, Default, Clone)]
    struct Role {
        id: i32,
        name: String,
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

    fn storage(db: &FakeDatabase) -> DbStorageContext {
        let mut configurations = EntityConfigurationCollection::new();
        configurations
            .register(EntityConfiguration::build(&RoleConfiguration).unwrap())
            .unwrap();
        DbStorageContext::new(
            db.boxed_connection(),
            Arc::new(SqlServerDialect),
            Arc::new(configurations),
        )
    }

    fn delete_role(storage: &DbStorageContext, id: i32) -> DbCommandContext<Role> {
        let config = storage.configuration::<Role>().unwrap();
        let builder = DbCommandBuilder::new(Arc::new(DbQueryBuilder::new(config, storage.dialect().clone())));
        let role = EntityRef::new(Role {
            id,
            name: String::new(),
        });
        builder.delete_command(vec![role], storage.transaction()).unwrap()
    }

    #[tokio::test]
    async fn test_nested_open_keeps_connection_until_outer_close() {
        let db = FakeDatabase::new();
        let storage = storage(&db);

        assert_ok!(storage.open().await);
        assert_ok!(storage.open().await);
        assert_ok!(storage.close(false).await);
        assert_eq!(storage.connection_state().await, ConnectionState::Open);

        assert_ok!(storage.close(false).await);
        assert_eq!(storage.connection_state().await, ConnectionState::Closed);
        assert_eq!(db.open_count(), 1);
    }

    #[tokio::test]
    async fn test_already_open_connection_survives_close() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        assert_ok!(storage.open().await);

        // a second caller finds it open and must not close it
        assert_ok!(storage.open().await);
        assert_ok!(storage.close(false).await);
        assert!(db.is_open());

        assert_ok!(storage.close(true).await);
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_save_changes_uses_private_transaction() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        storage.add_command(delete_role(&storage, 1)).unwrap();
        storage.add_command(delete_role(&storage, 2)).unwrap();

        let affected = storage.save_changes().await.unwrap();

        assert_eq!(affected, 2);
        assert_eq!(storage.pending_commands(), 0);
        assert_eq!(db.commit_count(), 1);
        assert_eq!(db.committed().len(), 2);
        assert!(db.executed().iter().all(|c| c.transaction.is_some()));
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_save_changes_failure_rolls_back_and_clears() {
        let db = FakeDatabase::new();
        db.fail_when("@Id");
        let storage = storage(&db);
        storage.add_command(delete_role(&storage, 1)).unwrap();

        let result = storage.save_changes().await;

        assert!(matches!(result, Err(DataError::Driver(_))));
        assert_eq!(storage.pending_commands(), 0);
        assert_eq!(db.rollback_count(), 1);
        assert!(db.committed().is_empty());
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_ambient_transaction_is_joined_not_committed() {
        let db = FakeDatabase::new();
        let storage = storage(&db);

        let transaction = storage.create_transaction_context(false).await.unwrap();
        assert!(storage.transaction_exists());
        storage.add_command(delete_role(&storage, 1)).unwrap();
        storage.save_changes().await.unwrap();

        assert_eq!(db.commit_count(), 0);
        assert!(db.is_open());
        assert_eq!(db.executed()[0].transaction, Some(transaction.id()));

        transaction.commit().await.unwrap();
        assert_eq!(db.commit_count(), 1);
        assert!(!storage.transaction_exists());
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_second_ambient_transaction_is_rejected() {
        let db = FakeDatabase::new();
        let storage = storage(&db);

        let first = storage.create_transaction_context(false).await.unwrap();
        let second = storage.create_transaction_context(false).await;
        assert!(matches!(second, Err(DataError::Transaction(_))));

        first.rollback().await.unwrap();
        assert_eq!(db.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_ad_hoc_reader_joins_ambient_transaction() {
        let db = FakeDatabase::new();
        db.push_rows(vec![Row::new().with("Id", 1).with("Name", "admin")]);
        let storage = storage(&db);
        let transaction = storage.create_transaction_context(false).await.unwrap();

        let command = storage.create_command("SELECT [Id],[Name] FROM [Role]").unwrap();
        let shape = storage.configuration::<Role>().unwrap().result_shape();
        let rows = storage.execute_reader(command, &shape).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(db.executed()[0].transaction, Some(transaction.id()));
        transaction.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispose_rolls_back_abandoned_transaction() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        let transaction = storage.create_transaction_context(false).await.unwrap();
        drop(transaction);
        storage.add_command(delete_role(&storage, 1)).unwrap();

        storage.dispose().await.unwrap();

        assert_eq!(db.rollback_count(), 1);
        assert_eq!(storage.pending_commands(), 0);
        assert!(!db.is_open());
        assert!(matches!(storage.open().await, Err(DataError::Disposed(_))));
        assert!(matches!(storage.save_changes().await, Err(DataError::Disposed(_))));
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back_on_next_open() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        {
            let _transaction = storage.create_transaction_context(false).await.unwrap();
        }
        assert!(!storage.transaction_exists());

        storage.add_command(delete_role(&storage, 1)).unwrap();
        assert_eq!(storage.save_changes().await.unwrap(), 1);

        assert_eq!(db.rollback_count(), 1);
        assert_eq!(db.commit_count(), 1);
        assert_eq!(db.committed().len(), 1);
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_close_keeps_connection_while_transaction_active() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        let transaction = storage.create_transaction_context(false).await.unwrap();

        assert_ok!(storage.close(false).await);
        assert_eq!(storage.connection_state().await, ConnectionState::Open);
        assert!(storage.transaction_exists());

        assert_ok!(transaction.commit().await);
        assert_eq!(db.commit_count(), 1);
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn test_unregistered_entity_is_configuration_error() {
        let db = FakeDatabase::new();
        let storage = storage(&db);
        assert!(matches!(storage.configuration::<String>(), Err(DataError::Configuration(_))));
    }
}
