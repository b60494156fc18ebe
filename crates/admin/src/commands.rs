//! Admin commands over the store contracts.

use serde::Serialize;

use common::{AppResult, OptionExt};
use domain::{Role, User};
use identity_store::{RoleStore, UserRoleStore, UserStore};

/// Result of a command, printed as JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    User(User),
    Users(Vec<User>),
    Role(Role),
    Names(Vec<String>),
    Assigned { user: String, role: String },
}

pub async fn create_user(users: &dyn UserStore, user_name: &str, email: &str) -> AppResult<Output> {
    let user = users.create(User::new(user_name, email)?).await?;
    tracing::info!(user_id = user.id, "Created user {}", user.user_name);
    Ok(Output::User(user))
}

pub async fn create_role(roles: &dyn RoleStore, name: &str) -> AppResult<Output> {
    let role = roles.create(Role::new(name)?).await?;
    tracing::info!(role_id = role.id, "Created role {}", role.name);
    Ok(Output::Role(role))
}

pub async fn assign_role(
    users: &dyn UserStore,
    user_roles: &dyn UserRoleStore,
    user_name: &str,
    role: &str,
) -> AppResult<Output> {
    let user = users.find_by_name(user_name).await?.ok_or_not_found()?;
    user_roles.add_to_role(&user, role).await?;
    Ok(Output::Assigned {
        user: user.user_name,
        role: role.to_string(),
    })
}

/// Role names of `user_name`, or every role name when no user is given
pub async fn list_roles(
    users: &dyn UserStore,
    roles: &dyn RoleStore,
    user_roles: &dyn UserRoleStore,
    user_name: Option<&str>,
) -> AppResult<Output> {
    let names = match user_name {
        Some(user_name) => {
            let user = users.find_by_name(user_name).await?.ok_or_not_found()?;
            user_roles.get_roles(&user).await?
        }
        None => roles.roles().await?.into_iter().map(|role| role.name).collect(),
    };
    Ok(Output::Names(names))
}

pub async fn list_users(users: &dyn UserStore) -> AppResult<Output> {
    Ok(Output::Users(users.users().await?))
}
