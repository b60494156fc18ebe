//! Registry of entity configurations keyed by entity type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DataError, DataResult};

use super::entity::{short_type_name, EntityConfiguration};

/// All mappings a storage context knows about.
///
/// Filled once while wiring a storage context, then shared read-only.
#[derive(Default)]
pub struct EntityConfigurationCollection {
    configurations: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl EntityConfigurationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mapping for `E`; a second registration for the same type fails
    pub fn register<E: Send + Sync + 'static>(
        &mut self,
        configuration: EntityConfiguration<E>,
    ) -> DataResult<&mut Self> {
        let type_id = TypeId::of::<E>();
        if self.configurations.contains_key(&type_id) {
            return Err(DataError::configuration(format!(
                "{} is already registered",
                short_type_name::<E>()
            )));
        }
        self.configurations.insert(type_id, Arc::new(configuration));
        self.names.push(short_type_name::<E>());
        Ok(self)
    }

    /// Mapping for `E`, or `None` when the type was never registered
    pub fn get<E: Send + Sync + 'static>(&self) -> Option<Arc<EntityConfiguration<E>>> {
        self.configurations
            .get(&TypeId::of::<E>())
            .cloned()
            .and_then(|any| any.downcast::<EntityConfiguration<E>>().ok())
    }

    pub fn contains<E: 'static>(&self) -> bool {
        self.configurations.contains_key(&TypeId::of::<E>())
    }

    /// Registered entity names in registration order
    pub fn entity_names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}

impl std::fmt::Debug for EntityConfigurationCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityConfigurationCollection")
            .field("entities", &self.names)
            .finish()
    }
}
