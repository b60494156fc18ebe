//! Role domain entity and the user-role link.

use serde::{Deserialize, Serialize};

use crate::constants::is_valid_name;
use crate::error::{DomainError, DomainResult};

/// Role domain entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
}

impl Role {
    /// Create a new role, validating its name
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(DomainError::validation("Role name must be 1 to 256 characters"));
        }
        Ok(Self { id: 0, name })
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Membership of a user in a role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: i32,
    pub role_id: i32,
}

impl UserRole {
    pub fn new(user_id: i32, role_id: i32) -> Self {
        Self { user_id, role_id }
    }
}
