//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection URL building and normalization
//! - Connection pool management
//! - Context-scoped sessions and their registry
//! - Statement execution with named-parameter binding
//! - Row decoding into the scalar value domain
//! - The fluent query builder

pub mod decode;
pub mod executor;
pub mod params;
pub mod pool;
pub mod query;
pub mod session;
pub mod url;

pub use params::PlaceholderStyle;
pub use pool::{DatabaseType, DbPool};
pub use query::QueryHandle;
pub use session::{ContextId, Session, SessionMetadata};
pub use url::{ConnectionDescriptor, build_url};
