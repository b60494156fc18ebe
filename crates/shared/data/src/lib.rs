//! Data layer - Micro-ORM and unit-of-work persistence engine.
//!
//! This crate provides:
//! - Entity mappings declared once per type (`model_configuration`)
//! - SQL generation, command execution and the storage context (`db`)
//! - Repositories and the unit of work that batches their mutations
//!
//! Backends plug in through the [`db::Connection`] trait and a [`db::Dialect`].
//! The `sea-orm` feature ships a connection over sea-orm's drivers.

pub mod db;
pub mod entity_ref;
pub mod error;
pub mod model_configuration;
pub mod repository;
pub mod unit_of_work;
pub mod value;

#[cfg(feature = "sea-orm")]
pub mod sea_orm_backend;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use db::{
    DbCommand, DbCommandBuilder, DbCommandContext, DbEntityBuilder, DbParameterCollection,
    DbProvider, DbQueryBuilder, DbStorageContext, ProviderRegistry,
};
pub use entity_ref::EntityRef;
pub use error::{DataError, DataResult};
pub use model_configuration::{
    EntityConfiguration, EntityConfigurationBuilder, EntityConfigurationCollection,
    EntityTypeConfiguration, MappingOverrides, PropertyConfiguration,
};
pub use repository::{DbRepository, Entity, UnitOfWorkHandler};
pub use unit_of_work::{UnitOfWork, WorkType};
pub use value::{FieldValue, Value, ValueKind};
