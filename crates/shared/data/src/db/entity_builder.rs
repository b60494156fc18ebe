//! Materializes entities from result rows.

use std::sync::Arc;

use crate::error::DataResult;
use crate::model_configuration::EntityConfiguration;

use super::connection::{ColumnShape, Row};

/// Populates `E` from rows using its mapping.
///
/// A column that is missing from the row or NULL resolves to the property's
/// default instead of failing.
pub struct DbEntityBuilder<E> {
    configuration: Arc<EntityConfiguration<E>>,
}

impl<E: Default> DbEntityBuilder<E> {
    pub fn new(configuration: Arc<EntityConfiguration<E>>) -> Self {
        Self { configuration }
    }

    /// Columns a reader must produce for [`build`](Self::build)
    pub fn result_shape(&self) -> Vec<ColumnShape> {
        self.configuration.result_shape()
    }

    /// First row as an entity, `None` when there are no rows
    pub fn build(&self, rows: &[Row]) -> DataResult<Option<E>> {
        rows.first().map(|row| self.materialize(row)).transpose()
    }

    /// Every row as an entity
    pub fn build_all(&self, rows: &[Row]) -> DataResult<Vec<E>> {
        rows.iter().map(|row| self.materialize(row)).collect()
    }

    pub fn materialize(&self, row: &Row) -> DataResult<E> {
        let mut entity = E::default();
        for property in self.configuration.property_configurations() {
            let value = match row.get(property.column_name()) {
                Some(value) if !value.is_null() => value.clone(),
                _ => property.default_value().clone(),
            };
            property.set_value(&mut entity, value)?;
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::model_configuration::{EntityConfigurationBuilder, EntityTypeConfiguration};
    use crate::value::Value;

    #[derive(Debug, Default, PartialEq)]
    struct Role {
        id: i32,
        name: String,
        description: Option<String>,
        active: bool,
    }

    struct RoleConfiguration;

    impl EntityTypeConfiguration<Role> for RoleConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<Role>) -> DataResult<()> {
            builder.has_key_property("Id", |r| &r.id, |r| &mut r.id)?;
            builder
                .property("Name", |r| &r.name, |r| &mut r.name)
                .has_column_name("RoleName");
            builder.property("Description", |r| &r.description, |r| &mut r.description);
            builder
                .property("Active", |r| &r.active, |r| &mut r.active)
                .has_default_value(true);
            Ok(())
        }
    }

    fn builder() -> DbEntityBuilder<Role> {
        DbEntityBuilder::new(Arc::new(EntityConfiguration::build(&RoleConfiguration).unwrap()))
    }

    #[test]
    fn test_build_reads_first_row_by_column_name() {
        let rows = vec![
            Row::new().with("Id", 1).with("RoleName", "admin").with("Active", false),
            Row::new().with("Id", 2).with("RoleName", "user"),
        ];

        let role = builder().build(&rows).unwrap().unwrap();
        assert_eq!(
            role,
            Role {
                id: 1,
                name: "admin".to_string(),
                description: None,
                active: false,
            }
        );
    }

    #[test]
    fn test_missing_and_null_columns_use_defaults() {
        let rows = vec![Row::new()
            .with("Id", Value::Int64(5))
            .with("RoleName", Value::Null)];

        let role = builder().build(&rows).unwrap().unwrap();
        assert_eq!(role.id, 5);
        assert_eq!(role.name, "");
        assert!(role.active);
    }

    #[test]
    fn test_build_without_rows_is_none() {
        assert!(builder().build(&[]).unwrap().is_none());
        assert!(builder().build_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_build_all_and_conversion_errors() {
        let rows = vec![
            Row::new().with("Id", 1).with("RoleName", "a"),
            Row::new().with("Id", 2).with("RoleName", "b"),
        ];
        let names: Vec<_> = builder().build_all(&rows).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let bad = vec![Row::new().with("Id", "not a number")];
        let err = builder().build(&bad).unwrap_err();
        assert!(matches!(err, DataError::Conversion { .. }));
    }
}
