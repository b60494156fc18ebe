//! Shared configuration structures.
//!
//! Values come from the process environment; binaries load a `.env` file
//! with `dotenvy` before calling `from_env`.

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use data::MappingOverrides;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Entity names paired with the variable that overrides their table.
const TABLE_OVERRIDE_VARS: &[(&str, &str)] = &[
    ("User", "IDENTITY_USER_TABLE"),
    ("Role", "IDENTITY_ROLE_TABLE"),
    ("UserRole", "IDENTITY_USER_ROLE_TABLE"),
    ("UserLogin", "IDENTITY_USER_LOGIN_TABLE"),
    ("UserClaim", "IDENTITY_USER_CLAIM_TABLE"),
];

/// Database configuration.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Provider name resolved through `data::ProviderRegistry`
    pub provider: String,
    /// Connection string handed to the provider
    pub url: String,
}

impl DatabaseConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; both values are required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };
        Ok(Self {
            provider: required("DATABASE_PROVIDER")?,
            url: required("DATABASE_URL")?,
        })
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("provider", &self.provider)
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Identity store behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Flush the unit of work after every mutating store call
    pub auto_save_changes: bool,
    /// Entity name -> table name
    pub table_overrides: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_save_changes: true,
            table_overrides: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let auto_save_changes = match lookup("IDENTITY_AUTO_SAVE") {
            None => true,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                AppError::configuration(format!("IDENTITY_AUTO_SAVE must be true or false, got {}", value))
            })?,
        };

        let table_overrides = TABLE_OVERRIDE_VARS
            .iter()
            .filter_map(|(entity, key)| {
                lookup(key)
                    .map(|table| table.trim().to_string())
                    .filter(|table| !table.is_empty())
                    .map(|table| (entity.to_string(), table))
            })
            .collect();

        Ok(Self {
            auto_save_changes,
            table_overrides,
        })
    }

    /// Table renames in the form the entity mappings consume
    pub fn mapping_overrides(&self) -> MappingOverrides {
        self.table_overrides
            .iter()
            .fold(MappingOverrides::new(), |overrides, (entity, table)| {
                overrides.table(entity, table.as_str())
            })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
