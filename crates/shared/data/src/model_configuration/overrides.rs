//! Per-entity table and column renames supplied as configuration.
//!
//! Lets a deployment point the same entity type at differently named tables
//! (for example a legacy `AspNetUsers` schema) without a new mapping type.

use std::collections::HashMap;

use crate::error::DataResult;

use super::entity::EntityConfigurationBuilder;

/// Renames for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityOverride {
    pub table_name: Option<String>,
    /// property name -> column name
    pub columns: HashMap<String, String>,
}

/// Renames keyed by entity type name (e.g. `"User"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOverrides {
    entities: HashMap<String, EntityOverride>,
}

impl MappingOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entity` in `table_name` instead of the configured table
    pub fn table(mut self, entity: &str, table_name: impl Into<String>) -> Self {
        self.entities.entry(entity.to_string()).or_default().table_name = Some(table_name.into());
        self
    }

    /// Map `property` of `entity` to `column`
    pub fn column(mut self, entity: &str, property: &str, column: impl Into<String>) -> Self {
        self.entities
            .entry(entity.to_string())
            .or_default()
            .columns
            .insert(property.to_string(), column.into());
        self
    }

    pub fn get(&self, entity: &str) -> Option<&EntityOverride> {
        self.entities.get(entity)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn apply<E>(
        &self,
        entity: &str,
        builder: &mut EntityConfigurationBuilder<E>,
    ) -> DataResult<()> {
        let Some(entry) = self.entities.get(entity) else {
            return Ok(());
        };
        if let Some(table) = &entry.table_name {
            builder.set_table_name(table);
        }
        for (property, column) in &entry.columns {
            builder.rename_column(property, column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::model_configuration::{EntityConfiguration, EntityTypeConfiguration};

    #[derive(Default)]
    struct Role {
        id: i32,
        name: String,
    }

    struct RoleConfiguration;

    impl EntityTypeConfiguration<Role> for RoleConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<Role>) -> DataResult<()> {
            builder.to_table("Role");
            builder.has_key_property("Id", |r| &r.id, |r| &mut r.id)?;
            builder.property("Name", |r| &r.name, |r| &mut r.name);
            Ok(())
        }
    }

    #[test]
    fn test_overrides_rename_table_and_columns() {
        let overrides = MappingOverrides::new()
            .table("Role", "AspNetRoles")
            .column("Role", "Name", "role_name");

        let config = EntityConfiguration::build_with_overrides(&RoleConfiguration, &overrides).unwrap();

        assert_eq!(config.table_name(), "AspNetRoles");
        assert_eq!(config.property("Name").unwrap().column_name(), "role_name");
        assert_eq!(config.property("Name").unwrap().name(), "Name");
    }

    #[test]
    fn test_override_for_unmapped_property_fails() {
        let overrides = MappingOverrides::new().column("Role", "Missing", "x");

        let err = EntityConfiguration::build_with_overrides(&RoleConfiguration, &overrides).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }
}
