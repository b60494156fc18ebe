//! User repository with name and email lookups.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use data::{DataResult, DbRepository, UnitOfWork, UnitOfWorkHandler, Value};
use domain::User;

pub struct UserRepository {
    inner: DbRepository<User>,
}

impl UserRepository {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> DataResult<Arc<Self>> {
        let configuration = unit_of_work.storage().configuration::<User>()?;
        Ok(Arc::new_cyclic(|handler: &Weak<Self>| Self {
            inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
        }))
    }

    pub async fn find_by_id(&self, id: i32) -> DataResult<Option<User>> {
        self.inner.find_by_key(&[Value::from(id)]).await
    }

    pub async fn find_by_name(&self, user_name: &str) -> DataResult<Option<User>> {
        self.inner.find_one_by(&[("UserName", Value::from(user_name))]).await
    }

    pub async fn find_by_email(&self, email: &str) -> DataResult<Option<User>> {
        self.inner.find_one_by(&[("Email", Value::from(email))]).await
    }
}

impl UnitOfWorkHandler<User> for UserRepository {
    fn repository(&self) -> &DbRepository<User> {
        &self.inner
    }
}

impl Deref for UserRepository {
    type Target = DbRepository<User>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
