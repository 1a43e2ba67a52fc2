//! Database access facade.
//!
//! Unifies raw parameterized SQL and a fluent query builder behind one
//! connection/session manager for SQLite, PostgreSQL and MySQL, and
//! normalizes heterogeneous connection strings (file-based, networked,
//! UNC-path, driver-specific) into a single construction routine.
//!
//! Raw SQL runs inside a scoped unit of work: commit on success, rollback
//! on failure, close on every path. Sessions are scoped per calling
//! context, so concurrent tasks never share an in-flight transaction.
//!
//! ```no_run
//! use db_manager::{DatabaseManager, params};
//!
//! # async fn demo() -> db_manager::DbResult<()> {
//! let url = DatabaseManager::build_url("sqlite", "C:/data/app.db", None, None, None, None);
//! let db = DatabaseManager::connect(&url, None, false).await?;
//!
//! let rows = db
//!     .sql_raw("SELECT id, name FROM users WHERE active = :a", params! { "a" => 1 })
//!     .await?;
//! for record in rows.to_records() {
//!     println!("{record:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;

pub use config::{Endpoint, PoolOptions};
pub use db::{
    ConnectionDescriptor, ContextId, DatabaseType, QueryHandle, Session, SessionMetadata,
    build_url,
};
pub use error::{DbError, DbResult};
pub use manager::DatabaseManager;
pub use models::{
    Entity, SchemaDescriptor, SqlParams, SqlValue, StaticSchema, TableDdl, TabularResult,
};
