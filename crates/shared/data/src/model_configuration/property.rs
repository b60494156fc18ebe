//! Per-property mapping metadata and the accessor pair generated for it.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DataError, DataResult};
use crate::value::{FieldValue, Value, ValueKind};

type Getter<E> = Arc<dyn Fn(&E) -> Value + Send + Sync>;
type Setter<E> = Arc<dyn Fn(&mut E, Value) -> DataResult<()> + Send + Sync>;
type DefaultGenerator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Mapping of one scalar property of `E` to a column.
///
/// Created during the configure pass of an entity; fluent setters take
/// `&mut self` and are only reachable through the configuration builder.
pub struct PropertyConfiguration<E> {
    name: String,
    column_name: String,
    kind: ValueKind,
    nullable: bool,
    is_key: bool,
    is_integer_key: bool,
    key_order: Option<usize>,
    type_default: fn() -> Value,
    default_generator: Option<DefaultGenerator>,
    default_value: OnceCell<Value>,
    getter: Getter<E>,
    setter: Setter<E>,
}

impl<E: 'static> PropertyConfiguration<E> {
    pub(crate) fn new<T: FieldValue>(
        name: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        let property = name.to_string();
        Self {
            name: name.to_string(),
            column_name: name.to_string(),
            kind: T::KIND,
            nullable: T::NULLABLE,
            is_key: false,
            is_integer_key: false,
            key_order: None,
            type_default: T::default_value,
            default_generator: None,
            default_value: OnceCell::new(),
            getter: Arc::new(move |entity: &E| get(entity).to_value()),
            setter: Arc::new(move |entity: &mut E, value: Value| {
                let converted = T::from_value(value).map_err(|err| match err {
                    DataError::Conversion { expected, found, .. } => DataError::Conversion {
                        property: property.clone(),
                        expected,
                        found,
                    },
                    other => other,
                })?;
                *get_mut(entity) = converted;
                Ok(())
            }),
        }
    }
}

impl<E> PropertyConfiguration<E> {
    /// Property identifier, also used as the parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    /// Single integer key whose value the database assigns on insert
    pub fn is_integer_key(&self) -> bool {
        self.is_integer_key
    }

    /// Position within a composite key, `None` when not part of one
    pub fn key_order(&self) -> Option<usize> {
        self.key_order
    }

    /// Configured default, computed on first access
    pub fn default_value(&self) -> &Value {
        self.default_value.get_or_init(|| match &self.default_generator {
            Some(generate) => generate(),
            None => (self.type_default)(),
        })
    }

    /// Read the raw property value
    pub fn get_value(&self, entity: &E) -> Value {
        (self.getter)(entity)
    }

    /// Value to bind as a parameter: a nullable property still holding its
    /// default is written as NULL.
    pub fn parameter_value(&self, entity: &E) -> Value {
        let value = self.get_value(entity);
        if self.nullable && &value == self.default_value() {
            Value::Null
        } else {
            value
        }
    }

    /// Write a driver value onto the entity, converting to the field type
    pub fn set_value(&self, entity: &mut E, value: Value) -> DataResult<()> {
        (self.setter)(entity, value)
    }

    pub(crate) fn setter(&self) -> Setter<E> {
        self.setter.clone()
    }

    // Fluent configuration (configure pass only)

    /// Map the property to a column with a different name
    pub fn has_column_name(&mut self, column_name: impl Into<String>) -> &mut Self {
        self.column_name = column_name.into();
        self
    }

    /// Replace the type-derived default with a fixed value
    pub fn has_default_value(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.default_generator = Some(Arc::new(move || value.clone()));
        self.default_value = OnceCell::new();
        self
    }

    /// Compute the default lazily on first use
    pub fn has_default_with<F>(&mut self, generator: F) -> &mut Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default_generator = Some(Arc::new(generator));
        self.default_value = OnceCell::new();
        self
    }

    /// Never write NULL for this property, even when it holds its default
    pub fn is_required(&mut self) -> &mut Self {
        self.nullable = false;
        self
    }

    pub(crate) fn mark_key(&mut self, order: Option<usize>) {
        self.is_key = true;
        self.key_order = order;
        self.is_integer_key = order.is_none() && self.kind.is_integer();
    }
}

impl<E> fmt::Debug for PropertyConfiguration<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyConfiguration")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("is_key", &self.is_key)
            .field("is_integer_key", &self.is_integer_key)
            .field("key_order", &self.key_order)
            .finish()
    }
}
