//! Claims stored per user.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use data::{DataResult, DbRepository, UnitOfWork, UnitOfWorkHandler, Value};
use domain::UserClaim;

pub struct UserClaimRepository {
    inner: DbRepository<UserClaim>,
}

impl UserClaimRepository {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> DataResult<Arc<Self>> {
        let configuration = unit_of_work.storage().configuration::<UserClaim>()?;
        Ok(Arc::new_cyclic(|handler: &Weak<Self>| Self {
            inner: DbRepository::with_configuration(unit_of_work, configuration, handler.clone()),
        }))
    }

    pub async fn find_all_by_user_id(&self, user_id: i32) -> DataResult<Vec<UserClaim>> {
        self.inner.find_all_by(&[("UserId", Value::from(user_id))]).await
    }
}

impl UnitOfWorkHandler<UserClaim> for UserClaimRepository {
    fn repository(&self) -> &DbRepository<UserClaim> {
        &self.inner
    }
}

impl Deref for UserClaimRepository {
    type Target = DbRepository<UserClaim>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
