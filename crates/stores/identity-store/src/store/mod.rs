//! Store contracts consumed by the identity framework and their implementations.
//!
//! Getters and setters on the two-factor and lockout stores only touch the
//! `User` value; the caller persists the change through [`UserStore::update`].

mod role_store;
mod user_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::AppResult;
use domain::{Claim, LoginInfo, Role, User};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

pub use role_store::IdentityRoleStore;
pub use user_store::IdentityUserStore;

/// User CRUD and lookups.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; the returned value carries the generated id once saved
    async fn create(&self, user: User) -> AppResult<User>;

    async fn update(&self, user: User) -> AppResult<()>;

    async fn delete(&self, user: User) -> AppResult<()>;

    async fn find_by_id(&self, id: i32) -> AppResult<Option<User>>;

    async fn find_by_name(&self, user_name: &str) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn users(&self) -> AppResult<Vec<User>>;
}

/// Role CRUD and lookups.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: Role) -> AppResult<Role>;

    async fn update(&self, role: Role) -> AppResult<()>;

    async fn delete(&self, role: Role) -> AppResult<()>;

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Role>>;

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    async fn roles(&self) -> AppResult<Vec<Role>>;
}

/// Role membership of users.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRoleStore: Send + Sync {
    /// Fails with a validation error when the role does not exist
    async fn add_to_role(&self, user: &User, role_name: &str) -> AppResult<()>;

    async fn remove_from_role(&self, user: &User, role_name: &str) -> AppResult<()>;

    async fn get_roles(&self, user: &User) -> AppResult<Vec<String>>;

    async fn is_in_role(&self, user: &User, role_name: &str) -> AppResult<bool>;
}

/// External logins linked to users.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserLoginStore: Send + Sync {
    async fn add_login(&self, user: &User, login: LoginInfo) -> AppResult<()>;

    async fn remove_login(&self, user: &User, login: LoginInfo) -> AppResult<()>;

    async fn get_logins(&self, user: &User) -> AppResult<Vec<LoginInfo>>;

    /// User owning `login`, if any
    async fn find_by_login(&self, login: LoginInfo) -> AppResult<Option<User>>;
}

/// Claims stored against users.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserClaimStore: Send + Sync {
    async fn get_claims(&self, user: &User) -> AppResult<Vec<Claim>>;

    async fn add_claim(&self, user: &User, claim: Claim) -> AppResult<()>;

    /// Remove every stored claim equal to `claim`
    async fn remove_claim(&self, user: &User, claim: Claim) -> AppResult<()>;
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserTwoFactorStore: Send + Sync {
    async fn set_two_factor_enabled(&self, user: &mut User, enabled: bool) -> AppResult<()>;

    async fn get_two_factor_enabled(&self, user: &User) -> AppResult<bool>;
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserLockoutStore: Send + Sync {
    async fn get_lockout_end_date(&self, user: &User) -> AppResult<Option<DateTime<Utc>>>;

    async fn set_lockout_end_date(&self, user: &mut User, end: Option<DateTime<Utc>>) -> AppResult<()>;

    /// Count a failed access attempt and return the new count
    async fn increment_access_failed_count(&self, user: &mut User) -> AppResult<i32>;

    async fn reset_access_failed_count(&self, user: &mut User) -> AppResult<()>;

    async fn get_access_failed_count(&self, user: &User) -> AppResult<i32>;

    async fn get_lockout_enabled(&self, user: &User) -> AppResult<bool>;

    async fn set_lockout_enabled(&self, user: &mut User, enabled: bool) -> AppResult<()>;
}
