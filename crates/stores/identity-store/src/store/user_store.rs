//! User store over an [`IdentityDataContext`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{AppError, AppResult, OptionExt};
use domain::{Claim, LoginInfo, User, UserClaim, UserLogin, UserRole};

use super::{
    UserClaimStore, UserLockoutStore, UserLoginStore, UserRoleStore, UserStore, UserTwoFactorStore,
};
use crate::context::IdentityDataContext;

/// Implements every user-facing store contract.
///
/// Mutations are registered with the context's unit of work. With
/// `auto_save_changes` set each mutating call flushes it immediately;
/// otherwise the caller decides when to call [`IdentityUserStore::save_changes`].
pub struct IdentityUserStore {
    context: Arc<IdentityDataContext>,
    auto_save_changes: bool,
}

impl IdentityUserStore {
    pub fn new(context: Arc<IdentityDataContext>, auto_save_changes: bool) -> Self {
        Self {
            context,
            auto_save_changes,
        }
    }

    pub fn context(&self) -> &Arc<IdentityDataContext> {
        &self.context
    }

    pub fn auto_save_changes(&self) -> bool {
        self.auto_save_changes
    }

    /// Flush pending mutations regardless of the auto-save setting
    pub async fn save_changes(&self) -> AppResult<u64> {
        Ok(self.context.save_changes().await?)
    }

    async fn save_if_auto(&self) -> AppResult<()> {
        if self.auto_save_changes {
            self.context.save_changes().await?;
        }
        Ok(())
    }

    fn require_persisted(&self, user: &User) -> AppResult<()> {
        if user.is_persisted() {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "User {} has not been saved",
                user.user_name
            )))
        }
    }
}

#[async_trait]
impl UserStore for IdentityUserStore {
    async fn create(&self, user: User) -> AppResult<User> {
        user.validate()?;
        if self.context.users().find_by_name(&user.user_name).await?.is_some() {
            return Err(AppError::conflict(format!("User {}", user.user_name)));
        }

        let tracked = self.context.users().add(user)?;
        self.save_if_auto().await?;
        let user = tracked.cloned();
        tracing::debug!(user_id = user.id, user_name = %user.user_name, "User created");
        Ok(user)
    }

    async fn update(&self, user: User) -> AppResult<()> {
        user.validate()?;
        self.require_persisted(&user)?;
        self.context.users().change(user)?;
        self.save_if_auto().await
    }

    async fn delete(&self, user: User) -> AppResult<()> {
        self.require_persisted(&user)?;
        self.context.users().remove(user)?;
        self.save_if_auto().await
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.context.users().find_by_id(id).await?)
    }

    async fn find_by_name(&self, user_name: &str) -> AppResult<Option<User>> {
        Ok(self.context.users().find_by_name(user_name).await?)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.context.users().find_by_email(email).await?)
    }

    async fn users(&self) -> AppResult<Vec<User>> {
        Ok(self.context.users().find_all().await?)
    }
}

#[async_trait]
impl UserRoleStore for IdentityUserStore {
    async fn add_to_role(&self, user: &User, role_name: &str) -> AppResult<()> {
        self.require_persisted(user)?;
        let role = self
            .context
            .roles()
            .find_by_name(role_name)
            .await?
            .ok_or_else(|| AppError::validation(format!("Role {} does not exist", role_name)))?;

        if self.context.user_roles().find(user.id, role.id).await?.is_some() {
            return Err(AppError::conflict(format!(
                "User {} in role {}",
                user.user_name, role.name
            )));
        }
        self.context.user_roles().add(UserRole::new(user.id, role.id))?;
        self.save_if_auto().await
    }

    async fn remove_from_role(&self, user: &User, role_name: &str) -> AppResult<()> {
        let Some(role) = self.context.roles().find_by_name(role_name).await? else {
            return Ok(());
        };
        self.context.user_roles().remove(UserRole::new(user.id, role.id))?;
        self.save_if_auto().await
    }

    async fn get_roles(&self, user: &User) -> AppResult<Vec<String>> {
        Ok(self.context.roles().find_role_names_by_user_id(user.id).await?)
    }

    async fn is_in_role(&self, user: &User, role_name: &str) -> AppResult<bool> {
        let Some(role) = self.context.roles().find_by_name(role_name).await? else {
            return Ok(false);
        };
        Ok(self.context.user_roles().find(user.id, role.id).await?.is_some())
    }
}

#[async_trait]
impl UserLoginStore for IdentityUserStore {
    async fn add_login(&self, user: &User, login: LoginInfo) -> AppResult<()> {
        self.require_persisted(user)?;
        self.context.user_logins().add(UserLogin::new(user.id, &login)?)?;
        self.save_if_auto().await
    }

    async fn remove_login(&self, user: &User, login: LoginInfo) -> AppResult<()> {
        self.context.user_logins().remove(UserLogin::new(user.id, &login)?)?;
        self.save_if_auto().await
    }

    async fn get_logins(&self, user: &User) -> AppResult<Vec<LoginInfo>> {
        let logins = self.context.user_logins().find_all_by_user_id(user.id).await?;
        Ok(logins.iter().map(UserLogin::login_info).collect())
    }

    async fn find_by_login(&self, login: LoginInfo) -> AppResult<Option<User>> {
        let Some(link) = self.context.user_logins().find_by_login(&login).await? else {
            return Ok(None);
        };
        let user = self
            .context
            .users()
            .find_by_id(link.user_id)
            .await?
            .ok_or_not_found()?;
        Ok(Some(user))
    }
}

#[async_trait]
impl UserClaimStore for IdentityUserStore {
    async fn get_claims(&self, user: &User) -> AppResult<Vec<Claim>> {
        let claims = self.context.user_claims().find_all_by_user_id(user.id).await?;
        Ok(claims.iter().map(UserClaim::claim).collect())
    }

    async fn add_claim(&self, user: &User, claim: Claim) -> AppResult<()> {
        self.require_persisted(user)?;
        self.context.user_claims().add(UserClaim::new(user.id, &claim)?)?;
        self.save_if_auto().await
    }

    async fn remove_claim(&self, user: &User, claim: Claim) -> AppResult<()> {
        let stored = self.context.user_claims().find_all_by_user_id(user.id).await?;
        for row in stored.into_iter().filter(|row| row.matches(&claim)) {
            self.context.user_claims().remove(row)?;
        }
        self.save_if_auto().await
    }
}

#[async_trait]
impl UserTwoFactorStore for IdentityUserStore {
    async fn set_two_factor_enabled(&self, user: &mut User, enabled: bool) -> AppResult<()> {
        user.two_factor_enabled = enabled;
        Ok(())
    }

    async fn get_two_factor_enabled(&self, user: &User) -> AppResult<bool> {
        Ok(user.two_factor_enabled)
    }
}

#[async_trait]
impl UserLockoutStore for IdentityUserStore {
    async fn get_lockout_end_date(&self, user: &User) -> AppResult<Option<DateTime<Utc>>> {
        Ok(user.lockout_end_date_utc)
    }

    async fn set_lockout_end_date(&self, user: &mut User, end: Option<DateTime<Utc>>) -> AppResult<()> {
        user.lockout_end_date_utc = end;
        Ok(())
    }

    async fn increment_access_failed_count(&self, user: &mut User) -> AppResult<i32> {
        Ok(user.record_failed_access())
    }

    async fn reset_access_failed_count(&self, user: &mut User) -> AppResult<()> {
        user.reset_access_failed_count();
        Ok(())
    }

    async fn get_access_failed_count(&self, user: &User) -> AppResult<i32> {
        Ok(user.access_failed_count)
    }

    async fn get_lockout_enabled(&self, user: &User) -> AppResult<bool> {
        Ok(user.lockout_enabled)
    }

    async fn set_lockout_enabled(&self, user: &mut User, enabled: bool) -> AppResult<()> {
        user.lockout_enabled = enabled;
        Ok(())
    }
}
