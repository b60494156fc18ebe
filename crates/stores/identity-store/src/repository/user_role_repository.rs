//! User-role links. Links are only ever inserted or deleted.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use data::{DataError, DataResult, DbRepository, EntityRef, UnitOfWork, UnitOfWorkHandler, Value};
use domain::UserRole;

pub struct UserRoleRepository {
    inner: DbRepository<UserRole>,
}

impl UserRoleRepository {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> DataResult<Arc<Self>> {
        let configuration = unit_of_work.storage().configuration::<UserRole>()?;
        Ok(Arc::new_cyclic(|handler: &Weak<Self>| Self {
            inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
        }))
    }

    pub async fn find(&self, user_id: i32, role_id: i32) -> DataResult<Option<UserRole>> {
        self.inner
            .find_by_key(&[Value::from(user_id), Value::from(role_id)])
            .await
    }

    pub async fn find_all_by_user_id(&self, user_id: i32) -> DataResult<Vec<UserRole>> {
        self.inner.find_all_by(&[("UserId", Value::from(user_id))]).await
    }
}

impl UnitOfWorkHandler<UserRole> for UserRoleRepository {
    fn repository(&self) -> &DbRepository<UserRole> {
        &self.inner
    }

    fn save_changed_item(&self, _entity: &EntityRef<UserRole>) -> DataResult<()> {
        Err(DataError::unsupported("UserRole", "update"))
    }
}

impl Deref for UserRoleRepository {
    type Target = DbRepository<UserRole>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
