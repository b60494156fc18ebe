//! Turns entities plus a query template into executable command contexts.

use std::sync::Arc;

use crate::entity_ref::EntityRef;
use crate::error::DataResult;
use crate::model_configuration::{EntityConfiguration, PropertyConfiguration};

use super::command::DbCommand;
use super::command_context::{DbCommandContext, ParameterBinder};
use super::connection::TransactionId;
use super::parameters::DbParameterCollection;
use super::query_builder::DbQueryBuilder;

#[derive(Debug, Clone, Copy)]
enum Binding {
    Insert,
    Update,
    Delete,
}

impl Binding {
    fn includes<E>(self, property: &PropertyConfiguration<E>) -> bool {
        match self {
            Binding::Insert => !property.is_integer_key(),
            Binding::Update => true,
            Binding::Delete => property.is_key(),
        }
    }
}

/// Builds insert/update/delete command contexts for one entity type.
pub struct DbCommandBuilder<E> {
    query_builder: Arc<DbQueryBuilder<E>>,
}

impl<E: Send + Sync + 'static> DbCommandBuilder<E> {
    pub fn new(query_builder: Arc<DbQueryBuilder<E>>) -> Self {
        Self { query_builder }
    }

    pub fn query_builder(&self) -> &Arc<DbQueryBuilder<E>> {
        &self.query_builder
    }

    /// Insert command for `entities`. A generated integer key is captured
    /// and written back onto each entity.
    pub fn insert_command(
        &self,
        entities: Vec<EntityRef<E>>,
        transaction: Option<TransactionId>,
    ) -> DataResult<DbCommandContext<E>> {
        let configuration = self.query_builder.configuration();
        match configuration.generated_key() {
            Some(key) => {
                let sql = self.query_builder.insert_returning_key_sql()?;
                let mut context = self.context(sql, entities, transaction, Binding::Insert)?;
                context.capture_generated_key(key);
                Ok(context)
            }
            None => {
                let sql = self.query_builder.insert_sql()?;
                self.context(sql, entities, transaction, Binding::Insert)
            }
        }
    }

    pub fn update_command(
        &self,
        entities: Vec<EntityRef<E>>,
        transaction: Option<TransactionId>,
    ) -> DataResult<DbCommandContext<E>> {
        let sql = self.query_builder.update_sql()?;
        self.context(sql, entities, transaction, Binding::Update)
    }

    pub fn delete_command(
        &self,
        entities: Vec<EntityRef<E>>,
        transaction: Option<TransactionId>,
    ) -> DataResult<DbCommandContext<E>> {
        let sql = self.query_builder.delete_sql()?;
        self.context(sql, entities, transaction, Binding::Delete)
    }

    fn context(
        &self,
        sql: &str,
        entities: Vec<EntityRef<E>>,
        transaction: Option<TransactionId>,
        binding: Binding,
    ) -> DataResult<DbCommandContext<E>> {
        let command = DbCommand::new(sql).with_transaction(transaction);
        let binder = Self::binder(Arc::clone(self.query_builder.configuration()), binding);
        DbCommandContext::for_entities(command, entities, binder)
    }

    fn binder(configuration: Arc<EntityConfiguration<E>>, binding: Binding) -> ParameterBinder<E> {
        Arc::new(move |entity: &E, parameters: &mut DbParameterCollection| {
            for property in configuration
                .property_configurations()
                .iter()
                .filter(|p| binding.includes(*p))
            {
                parameters.set_typed(
                    property.name(),
                    property.parameter_value(entity),
                    property.kind(),
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockConnection, SqlServerDialect};
    use crate::model_configuration::{EntityConfigurationBuilder, EntityTypeConfiguration};
    use crate::value::Value;

    #[derive(Debug, Default, Clone)]
    struct User {
        id: i32,
        user_name: String,
        email: String,
    }

    struct UserConfiguration;

    impl EntityTypeConfiguration<User> for UserConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<User>) -> DataResult<()> {
            builder.to_table("User");
            builder.has_key_property("Id", |u| &u.id, |u| &mut u.id)?;
            builder.property("UserName", |u| &u.user_name, |u| &mut u.user_name);
            builder.property("Email", |u| &u.email, |u| &mut u.email);
            Ok(())
        }
    }

    fn command_builder() -> DbCommandBuilder<User> {
        let config = Arc::new(EntityConfiguration::build(&UserConfiguration).unwrap());
        DbCommandBuilder::new(Arc::new(DbQueryBuilder::new(config, Arc::new(SqlServerDialect))))
    }

    fn user(name: &str) -> EntityRef<User> {
        EntityRef::new(User {
            user_name: name.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_insert_binds_defaults_as_null_and_captures_key() {
        let mut connection = MockConnection::new();
        connection
            .expect_execute_scalar()
            .withf(|cmd, _| {
                let params = cmd.parameters();
                cmd.text().starts_with("INSERT INTO [User] ([UserName],[Email]) VALUES (@UserName,@Email)")
                    && params.value("UserName") == Some(&Value::from("alice"))
                    && params.value("Email") == Some(&Value::Null)
                    && !params.contains("Id")
                    && cmd.transaction() == Some(TransactionId(5))
            })
            .times(1)
            .returning(|_, _| Ok(Some(Value::Int32(42))));

        let alice = user("alice");
        let mut context = command_builder()
            .insert_command(vec![alice.clone()], Some(TransactionId(5)))
            .unwrap();
        assert!(context.captures_generated_key());

        context.execute(&mut connection).await.unwrap();
        assert_eq!(alice.read().id, 42);
    }

    #[tokio::test]
    async fn test_update_binds_every_property() {
        let mut connection = MockConnection::new();
        connection
            .expect_execute_non_query()
            .withf(|cmd| {
                cmd.parameters().value("Id") == Some(&Value::Int32(9))
                    && cmd.parameters().value("Email") == Some(&Value::from("b@example.com"))
                    && cmd.parameters().len() == 3
            })
            .times(1)
            .returning(|_| Ok(1));

        let bob = user("bob");
        {
            let mut entity = bob.write();
            entity.id = 9;
            entity.email = "b@example.com".to_string();
        }
        let mut context = command_builder().update_command(vec![bob], None).unwrap();

        assert_eq!(context.execute(&mut connection).await.unwrap(), 1);
        assert!(!context.captures_generated_key());
    }

    #[tokio::test]
    async fn test_delete_binds_only_keys() {
        let mut connection = MockConnection::new();
        connection
            .expect_execute_non_query()
            .withf(|cmd| {
                cmd.text() == "DELETE FROM [User] WHERE [Id]=@Id"
                    && cmd.parameters().len() == 1
                    && cmd.parameters().value("Id") == Some(&Value::Int32(3))
            })
            .times(1)
            .returning(|_| Ok(1));

        let deleted = user("carol");
        deleted.write().id = 3;
        let mut context = command_builder().delete_command(vec![deleted], None).unwrap();

        assert_eq!(context.execute(&mut connection).await.unwrap(), 1);
    }
}
