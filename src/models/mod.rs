//! Data models shared across the facade.

pub mod entity;
pub mod schema;
pub mod table;
pub mod value;

pub use entity::Entity;
pub use schema::{SchemaDescriptor, StaticSchema, TableDdl};
pub use table::TabularResult;
pub use value::{SqlParams, SqlValue};
