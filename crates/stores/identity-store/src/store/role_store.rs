//! Role store over an [`IdentityDataContext`].

use std::sync::Arc;

use async_trait::async_trait;

use common::{AppError, AppResult};
use domain::Role;

use super::RoleStore;
use crate::context::IdentityDataContext;

pub struct IdentityRoleStore {
    context: Arc<IdentityDataContext>,
    auto_save_changes: bool,
}

impl IdentityRoleStore {
    pub fn new(context: Arc<IdentityDataContext>, auto_save_changes: bool) -> Self {
        Self {
            context,
            auto_save_changes,
        }
    }

    pub fn context(&self) -> &Arc<IdentityDataContext> {
        &self.context
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
}

#[async_trait]
impl RoleStore for IdentityRoleStore {
    async fn create(&self, role: Role) -> AppResult<Role> {
        let role = Role::new(role.name)?;
        if self.context.roles().find_by_name(&role.name).await?.is_some() {
            return Err(AppError::conflict(format!("Role {}", role.name)));
        }

        let tracked = self.context.roles().add(role)?;
        self.save_if_auto().await?;
        let role = tracked.cloned();
        tracing::debug!(role_id = role.id, name = %role.name, "Role created");
        Ok(role)
    }

    async fn update(&self, role: Role) -> AppResult<()> {
        if role.id <= 0 {
            return Err(AppError::validation(format!("Role {} has not been saved", role.name)));
        }
        Role::new(role.name.as_str())?;
        self.context.roles().change(role)?;
        self.save_if_auto().await
    }

    async fn delete(&self, role: Role) -> AppResult<()> {
        self.context.roles().remove(role)?;
        self.save_if_auto().await
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Role>> {
        Ok(self.context.roles().find_by_id(id).await?)
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self.context.roles().find_by_name(name).await?)
    }

    async fn roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.context.roles().find_all().await?)
    }
}
