//! Entity mapping model: properties, entities and the registry holding them.

mod collection;
mod entity;
mod overrides;
mod property;

pub use collection::EntityConfigurationCollection;
pub use entity::{EntityConfiguration, EntityConfigurationBuilder, EntityTypeConfiguration};
pub use overrides::{EntityOverride, MappingOverrides};
pub use property::PropertyConfiguration;

pub(crate) use entity::short_type_name;
