//! Role repository, including the role names of a user.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use data::db::{ColumnShape, DbStorageContext};
use data::{
    DataResult, DbRepository, EntityConfiguration, FieldValue, UnitOfWork, UnitOfWorkHandler, Value,
    ValueKind,
};
use domain::{Role, UserRole};

pub struct RoleRepository {
    inner: DbRepository<Role>,
    role_names_sql: String,
    name_column: String,
}

impl RoleRepository {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> DataResult<Arc<Self>> {
        let configuration = unit_of_work.storage().configuration::<Role>()?;
        let (role_names_sql, name_column) = role_names_query(unit_of_work.storage())?;
        Ok(Arc::new_cyclic(|handler: &Weak<Self>| Self {
            inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
            role_names_sql,
            name_column,
        }))
    }

    pub async fn find_by_id(&self, id: i32) -> DataResult<Option<Role>> {
        self.inner.find_by_key(&[Value::from(id)]).await
    }

    pub async fn find_by_name(&self, name: &str) -> DataResult<Option<Role>> {
        self.inner.find_one_by(&[("Name", Value::from(name))]).await
    }

    /// Names of the roles `user_id` belongs to
    pub async fn find_role_names_by_user_id(&self, user_id: i32) -> DataResult<Vec<String>> {
        let command = self
            .inner
            .create_command(self.role_names_sql.as_str())?
            .with_parameter("UserId", user_id);
        let shape = [ColumnShape::new(self.name_column.as_str(), ValueKind::String, true)];
        let rows = self.inner.storage().execute_reader(command, &shape).await?;
        rows.iter()
            .map(|row| {
                let value = row.get(&self.name_column).cloned().unwrap_or(Value::Null);
                String::from_value(value)
            })
            .collect()
    }
}

/// `SELECT r.[Name] FROM [Role] r INNER JOIN [UserRole] ur ON ur.[RoleId]=r.[Id] WHERE ur.[UserId]=@UserId`
fn role_names_query(storage: &DbStorageContext) -> DataResult<(String, String)> {
    let roles = storage.configuration::<Role>()?;
    let links = storage.configuration::<UserRole>()?;
    let dialect = storage.dialect();

    let name_column = column_name(&roles, "Name").to_string();
    let sql = format!(
        "SELECT r.{} FROM {} r INNER JOIN {} ur ON ur.{}=r.{} WHERE ur.{}={}UserId",
        dialect.quote_identifier(&name_column),
        dialect.quote_identifier(roles.table_name()),
        dialect.quote_identifier(links.table_name()),
        dialect.quote_identifier(column_name(&links, "RoleId")),
        dialect.quote_identifier(column_name(&roles, "Id")),
        dialect.quote_identifier(column_name(&links, "UserId")),
        dialect.parameter_marker(),
    );
    Ok((sql, name_column))
}

fn column_name<'a, E: 'static>(configuration: &'a EntityConfiguration<E>, property: &'a str) -> &'a str {
    configuration
        .property(property)
        .map(|p| p.column_name())
        .unwrap_or(property)
}

impl UnitOfWorkHandler<Role> for RoleRepository {
    fn repository(&self) -> &DbRepository<Role> {
        &self.inner
    }
}

impl Deref for RoleRepository {
    type Target = DbRepository<Role>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
