//! External logins. A login row is replaced, never updated in place.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use data::{DataError, DataResult, DbRepository, EntityRef, UnitOfWork, UnitOfWorkHandler, Value};
use domain::{LoginInfo, UserLogin};

pub struct UserLoginRepository {
    inner: DbRepository<UserLogin>,
}

impl UserLoginRepository {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> DataResult<Arc<Self>> {
        let configuration = unit_of_work.storage().configuration::<UserLogin>()?;
        Ok(Arc::new_cyclic(|handler: &Weak<Self>| Self {
            inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
        }))
    }

    pub async fn find_all_by_user_id(&self, user_id: i32) -> DataResult<Vec<UserLogin>> {
        self.inner.find_all_by(&[("UserId", Value::from(user_id))]).await
    }

    pub async fn find_by_login(&self, login: &LoginInfo) -> DataResult<Option<UserLogin>> {
        self.inner
            .find_one_by(&[
                ("LoginProvider", Value::from(login.login_provider.as_str())),
                ("ProviderKey", Value::from(login.provider_key.as_str())),
            ])
            .await
    }
}

impl UnitOfWorkHandler<UserLogin> for UserLoginRepository {
    fn repository(&self) -> &DbRepository<UserLogin> {
        &self.inner
    }

    fn save_changed_item(&self, _entity: &EntityRef<UserLogin>) -> DataResult<()> {
        Err(DataError::unsupported("UserLogin", "update"))
    }
}

impl Deref for UserLoginRepository {
    type Target = DbRepository<UserLogin>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
