//! Entity-to-table mapping built by a one-time configure pass.

use std::collections::HashMap;
use std::fmt;

use crate::db::ColumnShape;
use crate::error::{DataError, DataResult};
use crate::value::FieldValue;

use super::overrides::MappingOverrides;
use super::property::PropertyConfiguration;

/// Declarative mapping for one entity type.
///
/// Implementations are the single place where a table name, the mapped
/// properties and the key are declared. `configure` runs exactly once per
/// [`EntityConfiguration`] built from it.
///
/// # Example
///
/// ```ignore
/// struct UserConfiguration;
///
/// impl EntityTypeConfiguration<User> for UserConfiguration {
///     fn configure(&self, builder: &mut EntityConfigurationBuilder<User>) -> DataResult<()> {
///         builder.to_table("User");
///         builder.has_key_property("Id", |u| &u.id, |u| &mut u.id)?;
///         builder.property("UserName", |u| &u.user_name, |u| &mut u.user_name);
///         Ok(())
///     }
/// }
/// ```
pub trait EntityTypeConfiguration<E>: Send + Sync {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<E>) -> DataResult<()>;
}

/// Mutable view handed to [`EntityTypeConfiguration::configure`].
///
/// New properties can only be declared through this builder, so nothing can
/// be added to a configuration once it has been built.
pub struct EntityConfigurationBuilder<E> {
    table_name: String,
    properties: Vec<PropertyConfiguration<E>>,
    index: HashMap<String, usize>,
    keys: Vec<usize>,
}

impl<E: 'static> EntityConfigurationBuilder<E> {
    fn new() -> Self {
        Self {
            table_name: short_type_name::<E>().to_string(),
            properties: Vec::new(),
            index: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Set the table the entity is stored in (defaults to the type name)
    pub fn to_table(&mut self, table_name: impl Into<String>) -> &mut Self {
        self.table_name = table_name.into();
        self
    }

    /// Declare a mapped property, or return the one already declared under
    /// `name`. Declaration order is column order.
    pub fn property<T: FieldValue>(
        &mut self,
        name: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> &mut PropertyConfiguration<E> {
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => {
                self.properties
                    .push(PropertyConfiguration::new(name, get, get_mut));
                let position = self.properties.len() - 1;
                self.index.insert(name.to_string(), position);
                position
            }
        };
        &mut self.properties[position]
    }

    /// Look up a property declared earlier in this pass
    pub fn find_property(&mut self, name: &str) -> Option<&mut PropertyConfiguration<E>> {
        let position = *self.index.get(name)?;
        self.properties.get_mut(position)
    }

    /// Declare and mark a single key property in one step
    pub fn has_key_property<T: FieldValue>(
        &mut self,
        name: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> DataResult<&mut Self> {
        self.property(name, get, get_mut);
        self.has_key(&[name])
    }

    /// Mark already-declared properties as the key.
    ///
    /// One name declares a single key; several names declare a composite key
    /// whose column order follows the argument order.
    pub fn has_key(&mut self, names: &[&str]) -> DataResult<&mut Self> {
        if names.is_empty() {
            return Err(DataError::argument(format!(
                "HasKey on {} requires at least one property name",
                short_type_name::<E>()
            )));
        }

        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let position = *self.index.get(*name).ok_or_else(|| {
                DataError::argument(format!(
                    "Key property {} is not mapped on {}",
                    name,
                    short_type_name::<E>()
                ))
            })?;
            let kind = self.properties[position].kind();
            if !kind.is_key_compatible() {
                return Err(DataError::argument(format!(
                    "Property {} of type {} cannot be used as a key",
                    name, kind
                )));
            }
            if positions.contains(&position) {
                return Err(DataError::argument(format!(
                    "Key property {} is listed more than once",
                    name
                )));
            }
            positions.push(position);
        }

        for position in positions {
            if !self.keys.contains(&position) {
                self.keys.push(position);
            }
        }
        // Keys declared over several calls still number 0.. in declaration order
        let composite = self.keys.len() > 1;
        for (order, &position) in self.keys.iter().enumerate() {
            self.properties[position].mark_key(composite.then_some(order));
        }
        Ok(self)
    }
}

/// Read-only mapping of an entity type: table, ordered properties and key.
pub struct EntityConfiguration<E> {
    table_name: String,
    properties: Vec<PropertyConfiguration<E>>,
    index: HashMap<String, usize>,
    keys: Vec<usize>,
}

impl<E: 'static> EntityConfiguration<E> {
    /// Run the configure pass once and freeze the result
    pub fn build(configuration: &dyn EntityTypeConfiguration<E>) -> DataResult<Self> {
        Self::build_with_overrides(configuration, &MappingOverrides::default())
    }

    /// Run the configure pass, then apply table/column renames
    pub fn build_with_overrides(
        configuration: &dyn EntityTypeConfiguration<E>,
        overrides: &MappingOverrides,
    ) -> DataResult<Self> {
        let mut builder = EntityConfigurationBuilder::<E>::new();
        configuration.configure(&mut builder)?;
        overrides.apply(short_type_name::<E>(), &mut builder)?;

        if builder.table_name.trim().is_empty() {
            return Err(DataError::configuration(format!(
                "{} has no table name",
                short_type_name::<E>()
            )));
        }
        if builder.properties.is_empty() {
            return Err(DataError::configuration(format!(
                "{} maps no properties",
                short_type_name::<E>()
            )));
        }

        Ok(Self {
            table_name: builder.table_name,
            properties: builder.properties,
            index: builder.index,
            keys: builder.keys,
        })
    }
}

impl<E> EntityConfiguration<E> {
    /// Entity type name used in diagnostics
    pub fn entity_name(&self) -> &'static str {
        short_type_name::<E>()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// All mapped properties in declaration order
    pub fn property_configurations(&self) -> &[PropertyConfiguration<E>] {
        &self.properties
    }

    /// Key properties in the order they were declared
    pub fn key_property_configurations(&self) -> Vec<&PropertyConfiguration<E>> {
        self.keys.iter().map(|&i| &self.properties[i]).collect()
    }

    /// Properties that are not part of the key, in declaration order
    pub fn non_key_property_configurations(&self) -> Vec<&PropertyConfiguration<E>> {
        self.properties.iter().filter(|p| !p.is_key()).collect()
    }

    /// Previously declared property; never creates one
    pub fn property(&self, name: &str) -> Option<&PropertyConfiguration<E>> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    pub fn has_composite_key(&self) -> bool {
        self.keys.len() > 1
    }

    /// The single integer key assigned by the database, if any
    pub fn generated_key(&self) -> Option<&PropertyConfiguration<E>> {
        match self.keys.as_slice() {
            [single] if self.properties[*single].is_integer_key() => Some(&self.properties[*single]),
            _ => None,
        }
    }

    /// Column names and kinds a reader must produce to materialize `E`
    pub fn result_shape(&self) -> Vec<ColumnShape> {
        self.properties
            .iter()
            .map(|p| ColumnShape::new(p.column_name(), p.kind(), p.is_nullable()))
            .collect()
    }
}

impl<E> fmt::Debug for EntityConfiguration<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfiguration")
            .field("entity", &self.entity_name())
            .field("table_name", &self.table_name)
            .field("properties", &self.properties)
            .field("keys", &self.keys)
            .finish()
    }
}

impl<E> EntityConfigurationBuilder<E> {
    pub(crate) fn set_table_name(&mut self, table_name: &str) {
        self.table_name = table_name.to_string();
    }

    pub(crate) fn rename_column(&mut self, property: &str, column: &str) -> DataResult<()> {
        let position = *self.index.get(property).ok_or_else(|| {
            DataError::configuration(format!(
                "Column override targets unmapped property {} on {}",
                property,
                short_type_name::<E>()
            ))
        })?;
        self.properties[position].has_column_name(column);
        Ok(())
    }
}

/// Last path segment of the type name, without generic arguments
pub(crate) fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[derive(Debug, Default, Clone)]
    struct UserRole {
        user_id: i32,
        role_id: i32,
        note: Option<String>,
        created_at: chrono::DateTime<chrono::Utc>,
    }

    struct UserRoleConfiguration;

    impl EntityTypeConfiguration<UserRole> for UserRoleConfiguration {
        fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
            builder.to_table("UserRole");
            builder.property("UserId", |e| &e.user_id, |e| &mut e.user_id);
            builder.property("RoleId", |e| &e.role_id, |e| &mut e.role_id);
            builder
                .property("Note", |e| &e.note, |e| &mut e.note)
                .has_column_name("Comment");
            builder.has_key(&["UserId", "RoleId"])?;
            Ok(())
        }
    }

    #[test]
    fn test_composite_key_order_follows_declaration() {
        let config = EntityConfiguration::build(&UserRoleConfiguration).unwrap();
        let keys: Vec<_> = config
            .key_property_configurations()
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        assert_eq!(keys, vec!["UserId", "RoleId"]);
        assert_eq!(config.property("UserId").unwrap().key_order(), Some(0));
        assert_eq!(config.property("RoleId").unwrap().key_order(), Some(1));
        assert!(config.has_composite_key());
        assert!(config.generated_key().is_none());
    }

    #[test]
    fn test_keys_declared_one_at_a_time_form_ordered_composite() {
        struct OneByOne;
        impl EntityTypeConfiguration<UserRole> for OneByOne {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder.property("UserId", |e| &e.user_id, |e| &mut e.user_id);
                builder.property("RoleId", |e| &e.role_id, |e| &mut e.role_id);
                builder.has_key(&["UserId"])?;
                builder.has_key(&["RoleId"])?;
                Ok(())
            }
        }

        let config = EntityConfiguration::build(&OneByOne).unwrap();
        let orders: Vec<_> = config
            .key_property_configurations()
            .iter()
            .map(|p| (p.name().to_string(), p.key_order()))
            .collect();

        assert!(config.has_composite_key());
        assert_eq!(
            orders,
            vec![("UserId".to_string(), Some(0)), ("RoleId".to_string(), Some(1))]
        );
        assert!(config.generated_key().is_none());
    }

    #[test]
    fn test_property_lookup_is_stable_and_never_creates() {
        let config = EntityConfiguration::build(&UserRoleConfiguration).unwrap();
        let first = config.property("UserId").unwrap() as *const _;
        let second = config.property("UserId").unwrap() as *const _;

        assert_eq!(first, second);
        assert!(config.property("Missing").is_none());
        assert_eq!(config.property_configurations().len(), 3);
    }

    #[test]
    fn test_redeclaring_property_returns_same_configuration() {
        struct Twice;
        impl EntityTypeConfiguration<UserRole> for Twice {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder
                    .property("UserId", |e| &e.user_id, |e| &mut e.user_id)
                    .has_column_name("user_id");
                let again = builder.property("UserId", |e| &e.user_id, |e| &mut e.user_id);
                assert_eq!(again.column_name(), "user_id");
                Ok(())
            }
        }

        let config = EntityConfiguration::build(&Twice).unwrap();
        assert_eq!(config.property_configurations().len(), 1);
        assert_eq!(config.table_name(), "UserRole");
    }

    #[test]
    fn test_has_key_requires_names() {
        struct NoNames;
        impl EntityTypeConfiguration<UserRole> for NoNames {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder.property("UserId", |e| &e.user_id, |e| &mut e.user_id);
                builder.has_key(&[])?;
                Ok(())
            }
        }

        let err = EntityConfiguration::build(&NoNames).unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));
    }

    #[test]
    fn test_has_key_rejects_unsupported_type() {
        struct DateKey;
        impl EntityTypeConfiguration<UserRole> for DateKey {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder.has_key_property("CreatedAt", |e| &e.created_at, |e| &mut e.created_at)?;
                Ok(())
            }
        }

        let err = EntityConfiguration::build(&DateKey).unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));
    }

    #[test]
    fn test_single_integer_key_is_generated() {
        struct SingleKey;
        impl EntityTypeConfiguration<UserRole> for SingleKey {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder.has_key_property("UserId", |e| &e.user_id, |e| &mut e.user_id)?;
                builder.property("RoleId", |e| &e.role_id, |e| &mut e.role_id);
                Ok(())
            }
        }

        let config = EntityConfiguration::build(&SingleKey).unwrap();
        let key = config.generated_key().unwrap();
        assert_eq!(key.name(), "UserId");
        assert_eq!(key.key_order(), None);
        assert!(key.is_integer_key());
    }

    #[test]
    fn test_default_value_override_and_null_substitution() {
        struct WithDefault;
        impl EntityTypeConfiguration<UserRole> for WithDefault {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder
                    .property("Note", |e| &e.note, |e| &mut e.note)
                    .has_default_with(|| Value::String("n/a".to_string()));
                Ok(())
            }
        }

        let config = EntityConfiguration::build(&WithDefault).unwrap();
        let note = config.property("Note").unwrap();
        let mut entity = UserRole {
            note: Some("n/a".to_string()),
            ..Default::default()
        };

        assert_eq!(note.default_value(), &Value::String("n/a".to_string()));
        assert_eq!(note.parameter_value(&entity), Value::Null);

        entity.note = Some("kept".to_string());
        assert_eq!(note.parameter_value(&entity), Value::String("kept".to_string()));
    }

    #[test]
    fn test_type_name_is_default_table() {
        struct Unnamed;
        impl EntityTypeConfiguration<UserRole> for Unnamed {
            fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
                builder.property("UserId", |e| &e.user_id, |e| &mut e.user_id);
                Ok(())
            }
        }

        let config = EntityConfiguration::build(&Unnamed).unwrap();
        assert_eq!(config.table_name(), "UserRole");
        assert_eq!(config.entity_name(), "UserRole");
    }
}
