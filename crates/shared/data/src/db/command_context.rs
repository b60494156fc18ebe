//! One bound command plus the entities that drive its repeated execution.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity_ref::EntityRef;
use crate::error::{DataError, DataResult};
use crate::model_configuration::PropertyConfiguration;
use crate::value::{Value, ValueKind};

use super::command::DbCommand;
use super::connection::{ColumnShape, Connection, Row, TransactionId};
use super::parameters::DbParameterCollection;

/// Copies the relevant properties of one entity into the command parameters
pub type ParameterBinder<E> =
    Arc<dyn Fn(&E, &mut DbParameterCollection) -> DataResult<()> + Send + Sync>;

type KeySetter<E> = Arc<dyn Fn(&mut E, Value) -> DataResult<()> + Send + Sync>;

struct GeneratedKeyCapture<E> {
    property: String,
    kind: ValueKind,
    setter: KeySetter<E>,
}

/// A command and, optionally, the entities it is executed for.
///
/// Without entities the command runs once with whatever parameters are bound.
/// With entities it runs once per entity after the binder has refreshed the
/// parameters. With generated-key capture each insert runs as a scalar query
/// and the returned key is written back onto the entity.
pub struct DbCommandContext<E> {
    command: Option<DbCommand>,
    entities: Option<Vec<EntityRef<E>>>,
    binder: Option<ParameterBinder<E>>,
    generated_key: Option<GeneratedKeyCapture<E>>,
}

impl<E: Send + Sync + 'static> DbCommandContext<E> {
    /// Context that executes `command` once as-is
    pub fn new(command: DbCommand) -> Self {
        Self {
            command: Some(command),
            entities: None,
            binder: None,
            generated_key: None,
        }
    }

    /// Context that executes `command` once per entity.
    ///
    /// An empty entity list is rejected; use [`new`](Self::new) for a
    /// single execution.
    pub fn for_entities(
        command: DbCommand,
        entities: Vec<EntityRef<E>>,
        binder: ParameterBinder<E>,
    ) -> DataResult<Self> {
        if entities.is_empty() {
            return Err(DataError::argument(
                "DbCommandContext requires at least one entity when an entity list is given",
            ));
        }
        Ok(Self {
            command: Some(command),
            entities: Some(entities),
            binder: Some(binder),
            generated_key: None,
        })
    }

    /// Capture the database-assigned value of `key` after each insert
    pub fn capture_generated_key(&mut self, key: &PropertyConfiguration<E>) -> &mut Self {
        self.generated_key = Some(GeneratedKeyCapture {
            property: key.name().to_string(),
            kind: key.kind(),
            setter: key.setter(),
        });
        self
    }

    pub fn captures_generated_key(&self) -> bool {
        self.generated_key.is_some()
    }

    pub fn command(&self) -> DataResult<&DbCommand> {
        self.command.as_ref().ok_or(DataError::Disposed("DbCommandContext"))
    }

    pub fn command_mut(&mut self) -> DataResult<&mut DbCommand> {
        self.command.as_mut().ok_or(DataError::Disposed("DbCommandContext"))
    }

    pub fn parameters_mut(&mut self) -> DataResult<&mut DbParameterCollection> {
        Ok(self.command_mut()?.parameters_mut())
    }

    /// Entities driving execution; empty for a single-shot command
    pub fn entities(&self) -> &[EntityRef<E>] {
        self.entities.as_deref().unwrap_or(&[])
    }

    pub fn is_disposed(&self) -> bool {
        self.command.is_none()
    }

    /// Release the command. Every later operation fails with `Disposed`.
    pub fn dispose(&mut self) {
        self.command = None;
        self.entities = None;
        self.binder = None;
        self.generated_key = None;
    }

    /// Run the command and return the number of affected rows
    pub async fn execute(&mut self, connection: &mut dyn Connection) -> DataResult<u64> {
        let Some(entities) = self.entities.clone() else {
            let command = self.command()?;
            tracing::trace!(sql = %command.text(), "executing command");
            return connection.execute_non_query(command).await;
        };

        let mut affected = 0;
        for entity in &entities {
            self.bind(entity)?;
            let command = self.command()?;
            tracing::trace!(sql = %command.text(), "executing command");

            match &self.generated_key {
                Some(capture) => {
                    let kind = capture.kind;
                    let scalar = connection.execute_scalar(command, kind).await?;
                    if let Some(value) = scalar.filter(|v| !v.is_null()) {
                        self.write_generated_key(entity, value)?;
                    }
                    affected += 1;
                }
                None => {
                    affected += connection.execute_non_query(command).await?;
                }
            }
        }
        Ok(affected)
    }

    /// Run the command as a query, decoding rows into `columns`
    pub async fn execute_reader(
        &mut self,
        connection: &mut dyn Connection,
        columns: &[ColumnShape],
    ) -> DataResult<Vec<Row>> {
        let command = self.command()?;
        tracing::trace!(sql = %command.text(), "executing reader");
        connection.execute_reader(command, columns).await
    }

    /// Run the command and return the first column of the first row
    pub async fn execute_scalar(
        &mut self,
        connection: &mut dyn Connection,
        kind: ValueKind,
    ) -> DataResult<Option<Value>> {
        let command = self.command()?;
        tracing::trace!(sql = %command.text(), "executing scalar");
        connection.execute_scalar(command, kind).await
    }

    fn bind(&mut self, entity: &EntityRef<E>) -> DataResult<()> {
        let command = self
            .command
            .as_mut()
            .ok_or(DataError::Disposed("DbCommandContext"))?;
        if let Some(binder) = &self.binder {
            let entity = entity.read();
            binder(&entity, command.parameters_mut())?;
        }
        Ok(())
    }

    fn write_generated_key(&self, entity: &EntityRef<E>, value: Value) -> DataResult<()> {
        let Some(capture) = &self.generated_key else {
            return Ok(());
        };
        tracing::trace!(property = %capture.property, key = %value, "captured generated key");
        let mut entity = entity.write();
        (capture.setter)(&mut entity, value)
    }
}

impl<E> fmt::Debug for DbCommandContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCommandContext")
            .field("command", &self.command)
            .field("entities", &self.entities.as_ref().map(Vec::len))
            .field(
                "generated_key",
                &self.generated_key.as_ref().map(|c| c.property.as_str()),
            )
            .finish()
    }
}

/// Type-erased view of a [`DbCommandContext`] held in the storage queue.
#[async_trait]
pub trait CommandExecution: Send + fmt::Debug {
    fn command_text(&self) -> Option<&str>;

    /// Enlist the command in `transaction` before it is executed
    fn bind_transaction(&mut self, transaction: Option<TransactionId>) -> DataResult<()>;

    async fn execute(&mut self, connection: &mut dyn Connection) -> DataResult<u64>;

    fn dispose(&mut self);
}

#[async_trait]
impl<E: Send + Sync + 'static> CommandExecution for DbCommandContext<E> {
    fn command_text(&self) -> Option<&str> {
        self.command.as_ref().map(DbCommand::text)
    }

    fn bind_transaction(&mut self, transaction: Option<TransactionId>) -> DataResult<()> {
        self.command_mut()?.set_transaction(transaction);
        Ok(())
    }

    async fn execute(&mut self, connection: &mut dyn Connection) -> DataResult<u64> {
        DbCommandContext::execute(self, connection).await
    }

    fn dispose(&mut self) {
        DbCommandContext::dispose(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockConnection;
    use crate::model_configuration::{EntityConfiguration, EntityConfigurationBuilder, EntityTypeConfiguration};
    use mockall::predicate::*;

    #[derive(Debug, Default, Clone)]
    struct Claim {
        id: i32,
        claim_type: String,
    }

    struct ClaimConfiguration;

    impl EntityTypeConfiguration<Claim> for ClaimConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<Claim>) -> DataResult<()> {
            builder.has_key_property("Id", |c| &c.id, |c| &mut c.id)?;
            builder.property("ClaimType", |c| &c.claim_type, |c| &mut c.claim_type);
            Ok(())
        }
    }

    fn type_binder() -> ParameterBinder<Claim> {
        Arc::new(|claim: &Claim, params: &mut DbParameterCollection| {
            params.set("ClaimType", claim.claim_type.clone());
            Ok(())
        })
    }

    fn claim(claim_type: &str) -> EntityRef<Claim> {
        EntityRef::new(Claim {
            id: 0,
            claim_type: claim_type.to_string(),
        })
    }

    #[test]
    fn test_empty_entity_list_is_rejected() {
        let result = DbCommandContext::<Claim>::for_entities(DbCommand::new("INSERT"), vec![], type_binder());
        assert!(matches!(result, Err(DataError::Argument(_))));
    }

    #[tokio::test]
    async fn test_single_shot_executes_once() {
        let mut connection = MockConnection::new();
        connection
            .expect_execute_non_query()
            .withf(|cmd| cmd.text() == "DELETE FROM [Claim]")
            .times(1)
            .returning(|_| Ok(3));

        let mut context = DbCommandContext::<Claim>::new(DbCommand::new("DELETE FROM [Claim]"));
        let affected = context.execute(&mut connection).await.unwrap();

        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn test_rebinds_and_sums_per_entity() {
        let mut connection = MockConnection::new();
        let mut seq = mockall::Sequence::new();
        for expected in ["a", "b"] {
            connection
                .expect_execute_non_query()
                .withf(move |cmd| cmd.parameters().value("ClaimType") == Some(&Value::from(expected)))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(1));
        }

        let mut context = DbCommandContext::for_entities(
            DbCommand::new("UPDATE"),
            vec![claim("a"), claim("b")],
            type_binder(),
        )
        .unwrap();

        assert_eq!(context.execute(&mut connection).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_generated_key_written_back() {
        let config = EntityConfiguration::build(&ClaimConfiguration).unwrap();
        let mut connection = MockConnection::new();
        connection
            .expect_execute_scalar()
            .with(always(), eq(ValueKind::Int32))
            .times(1)
            .returning(|_, _| Ok(Some(Value::Int64(42))));

        let entity = claim("email");
        let mut context =
            DbCommandContext::for_entities(DbCommand::new("INSERT"), vec![entity.clone()], type_binder()).unwrap();
        context.capture_generated_key(config.generated_key().unwrap());

        assert_eq!(context.execute(&mut connection).await.unwrap(), 1);
        assert_eq!(entity.read().id, 42);
    }

    #[tokio::test]
    async fn test_missing_generated_key_leaves_entity_untouched() {
        let config = EntityConfiguration::build(&ClaimConfiguration).unwrap();
        let mut connection = MockConnection::new();
        connection
            .expect_execute_scalar()
            .times(2)
            .returning(|_, _| Ok(Some(Value::Null)));

        let first = claim("a");
        first.write().id = 7;
        let second = claim("b");
        let mut context = DbCommandContext::for_entities(
            DbCommand::new("INSERT"),
            vec![first.clone(), second.clone()],
            type_binder(),
        )
        .unwrap();
        context.capture_generated_key(config.generated_key().unwrap());

        context.execute(&mut connection).await.unwrap();

        assert_eq!(first.read().id, 7);
        assert_eq!(second.read().id, 0);
    }

    #[tokio::test]
    async fn test_disposed_context_fails() {
        let mut connection = MockConnection::new();
        let mut context = DbCommandContext::<Claim>::new(DbCommand::new("SELECT 1"));
        context.dispose();

        assert!(context.is_disposed());
        let err = context.execute(&mut connection).await.unwrap_err();
        assert!(matches!(err, DataError::Disposed(_)));
    }
}
