//! Parameterized SQL templates generated from an entity mapping.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DataError, DataResult};
use crate::model_configuration::{EntityConfiguration, PropertyConfiguration};

use super::dialect::Dialect;

/// Generates and caches the statements for one entity type.
///
/// Column references use the column name, placeholders use the property
/// name, so a renamed column still binds by property.
pub struct DbQueryBuilder<E> {
    configuration: Arc<EntityConfiguration<E>>,
    dialect: Arc<dyn Dialect>,
    insert_sql: OnceCell<String>,
    insert_returning_key_sql: OnceCell<String>,
    update_sql: OnceCell<String>,
    delete_sql: OnceCell<String>,
    select_sql: OnceCell<String>,
    select_by_key_sql: OnceCell<String>,
}

impl<E> DbQueryBuilder<E> {
    pub fn new(configuration: Arc<EntityConfiguration<E>>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            configuration,
            dialect,
            insert_sql: OnceCell::new(),
            insert_returning_key_sql: OnceCell::new(),
            update_sql: OnceCell::new(),
            delete_sql: OnceCell::new(),
            select_sql: OnceCell::new(),
            select_by_key_sql: OnceCell::new(),
        }
    }

    pub fn configuration(&self) -> &Arc<EntityConfiguration<E>> {
        &self.configuration
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn quoted_identifier(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    /// Placeholder for `property` as it appears in generated SQL
    pub fn parameter_name(&self, property: &PropertyConfiguration<E>) -> String {
        format!("{}{}", self.dialect.parameter_marker(), property.name())
    }

    /// Properties written by an insert: everything except a generated key
    pub fn insert_properties(&self) -> Vec<&PropertyConfiguration<E>> {
        self.configuration
            .property_configurations()
            .iter()
            .filter(|p| !p.is_integer_key())
            .collect()
    }

    /// `INSERT INTO [t] ([a],[b]) VALUES (@a,@b)`
    pub fn insert_sql(&self) -> DataResult<&str> {
        self.insert_sql
            .get_or_try_init(|| {
                let properties = self.insert_properties();
                if properties.is_empty() {
                    return Err(DataError::configuration(format!(
                        "{} has no insertable properties",
                        self.configuration.entity_name()
                    )));
                }
                let columns = properties
                    .iter()
                    .map(|p| self.quoted_identifier(p.column_name()))
                    .collect::<Vec<_>>()
                    .join(",");
                let values = properties
                    .iter()
                    .map(|p| self.parameter_name(p))
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.table(),
                    columns,
                    values
                ))
            })
            .map(String::as_str)
    }

    /// Insert adapted so that scalar execution yields the generated key;
    /// the plain insert when the entity has no generated key
    pub fn insert_returning_key_sql(&self) -> DataResult<&str> {
        self.insert_returning_key_sql
            .get_or_try_init(|| {
                let insert = self.insert_sql()?;
                Ok(match self.configuration.generated_key() {
                    Some(key) => self.dialect.generated_key_sql(insert, key.column_name()),
                    None => insert.to_string(),
                })
            })
            .map(String::as_str)
    }

    /// `UPDATE [t] SET [a]=@a,[b]=@b WHERE [k]=@k`
    pub fn update_sql(&self) -> DataResult<&str> {
        self.update_sql
            .get_or_try_init(|| {
                let assignments = self
                    .configuration
                    .non_key_property_configurations()
                    .into_iter()
                    .map(|p| self.predicate(p))
                    .collect::<Vec<_>>();
                if assignments.is_empty() {
                    return Err(DataError::configuration(format!(
                        "{} has no updatable properties",
                        self.configuration.entity_name()
                    )));
                }
                Ok(format!(
                    "UPDATE {} SET {} WHERE {}",
                    self.table(),
                    assignments.join(","),
                    self.key_predicate()?
                ))
            })
            .map(String::as_str)
    }

    /// `DELETE FROM [t] WHERE [k1]=@k1 AND [k2]=@k2`
    pub fn delete_sql(&self) -> DataResult<&str> {
        self.delete_sql
            .get_or_try_init(|| {
                Ok(format!(
                    "DELETE FROM {} WHERE {}",
                    self.table(),
                    self.key_predicate()?
                ))
            })
            .map(String::as_str)
    }

    /// `SELECT [a],[b] FROM [t]`
    pub fn select_sql(&self) -> &str {
        self.select_sql.get_or_init(|| {
            let columns = self
                .configuration
                .property_configurations()
                .iter()
                .map(|p| self.quoted_identifier(p.column_name()))
                .collect::<Vec<_>>()
                .join(",");
            format!("SELECT {} FROM {}", columns, self.table())
        })
    }

    /// Select filtered by the full key
    pub fn select_by_key_sql(&self) -> DataResult<&str> {
        self.select_by_key_sql
            .get_or_try_init(|| Ok(format!("{} WHERE {}", self.select_sql(), self.key_predicate()?)))
            .map(String::as_str)
    }

    /// Select filtered by equality on each named property, joined by `AND`
    pub fn select_where_sql(&self, properties: &[&str]) -> DataResult<String> {
        if properties.is_empty() {
            return Ok(self.select_sql().to_string());
        }
        let predicates = properties
            .iter()
            .map(|name| {
                self.configuration
                    .property(name)
                    .map(|p| self.predicate(p))
                    .ok_or_else(|| {
                        DataError::argument(format!(
                            "Property {} is not mapped on {}",
                            name,
                            self.configuration.entity_name()
                        ))
                    })
            })
            .collect::<DataResult<Vec<_>>>()?;
        Ok(format!("{} WHERE {}", self.select_sql(), predicates.join(" AND ")))
    }

    fn table(&self) -> String {
        self.quoted_identifier(self.configuration.table_name())
    }

    fn predicate(&self, property: &PropertyConfiguration<E>) -> String {
        format!(
            "{}={}",
            self.quoted_identifier(property.column_name()),
            self.parameter_name(property)
        )
    }

    fn key_predicate(&self) -> DataResult<String> {
        let keys = self.configuration.key_property_configurations();
        if keys.is_empty() {
            return Err(DataError::configuration(format!(
                "{} has no key",
                self.configuration.entity_name()
            )));
        }
        Ok(keys
            .into_iter()
            .map(|p| self.predicate(p))
            .collect::<Vec<_>>()
            .join(" AND "))
    }
}
