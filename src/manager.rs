//! The database manager facade.
//!
//! One manager owns one engine pool and one session registry. Every raw-SQL
//! call runs inside a scoped unit of work (commit on success, rollback on
//! failure, close always); builder queries get standalone sessions whose
//! lifecycle ends at the tabular terminal.

use crate::config::Endpoint;
use crate::db::pool::DbPool;
use crate::db::query::QueryHandle;
use crate::db::session::{ContextId, Outcome, ScopeGuard, Session, SessionMetadata, SessionRegistry};
use crate::db::{DatabaseType, url};
use crate::error::DbResult;
use crate::models::{Entity, SchemaDescriptor, SqlParams, TabularResult};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Connection and session manager for one database endpoint.
///
/// Construction never fails on an unreachable store: the liveness probe's
/// outcome is logged and recorded in the health flag, and the manager
/// stays usable for retry.
pub struct DatabaseManager {
    pool: DbPool,
    registry: Arc<SessionRegistry>,
    endpoint: Endpoint,
    connected: AtomicBool,
}

impl DatabaseManager {
    /// Connect to a database endpoint.
    ///
    /// Opens the pool lazily, probes connectivity (reported, not raised),
    /// and - when a schema is supplied and the probe succeeded - issues
    /// idempotent DDL for every described table. Fails only for malformed
    /// URLs or unsupported schemes.
    pub async fn connect(
        database_url: &str,
        schema: Option<&dyn SchemaDescriptor>,
        echo_queries: bool,
    ) -> DbResult<Self> {
        let endpoint = Endpoint::parse(database_url)?;
        let pool = DbPool::open(&endpoint, echo_queries)?;
        let manager = Self {
            pool,
            registry: Arc::new(SessionRegistry::new()),
            endpoint,
            connected: AtomicBool::new(false),
        };

        match manager.pool.probe().await {
            Ok(()) => {
                manager.connected.store(true, Ordering::Relaxed);
                let server_version = manager.pool.server_version().await;
                info!(
                    db_type = %manager.pool.db_type(),
                    database = ?manager.endpoint.database,
                    server_version = ?server_version,
                    "Database connected"
                );

                if let Some(schema) = schema {
                    info!("Creating tables");
                    if let Err(e) = manager.create_all(schema).await {
                        warn!(error = %e, "Table creation failed");
                    }
                }
            }
            Err(e) => {
                warn!(
                    connection = %manager.endpoint.masked_connection_string(),
                    error = %e,
                    "Database connection failed"
                );
            }
        }

        Ok(manager)
    }

    /// Build a connection URL from driver, database and optional fields.
    ///
    /// See [`build_url`](crate::build_url) for the normalization rules.
    pub fn build_url(
        driver: &str,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
        host: Option<&str>,
        port: Option<&str>,
    ) -> String {
        url::build_url(driver, database, user, password, host, port)
    }

    /// Run `body` inside the calling context's unit of work.
    ///
    /// Acquires the context's session (reusing an open one), then
    /// guarantees exactly one outcome: commit-then-close when `body`
    /// returns `Ok`, rollback-then-close and re-propagation when it
    /// returns `Err`. Close runs on both paths. When the call is nested
    /// inside another unit of work on the same context, the session is
    /// shared and the outermost scope completes it.
    pub async fn with_session<T, F, Fut>(&self, body: F) -> DbResult<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let context = ContextId::current();
        let (session, owns_scope) = self.registry.acquire(&self.pool).await?;

        if !owns_scope {
            // Nested acquisition: the scope that inserted the slot commits,
            // rolls back and closes.
            return body(session).await;
        }

        let mut guard = ScopeGuard::new(Arc::clone(&self.registry), context);
        let result = body(session.clone()).await;
        guard.disarm();
        self.registry.remove(context).await;

        match result {
            Ok(value) => {
                session.finish(Outcome::Commit).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.finish(Outcome::Rollback).await {
                    warn!(
                        session_id = %session.id(),
                        error = %rollback_err,
                        "Rollback failed after unit-of-work error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Execute a raw SQL statement inside a scoped unit of work.
    ///
    /// `params` maps `:name` placeholders to values; they are bound through
    /// the driver, never concatenated into the statement. All rows are
    /// materialized before the session closes; zero rows yield an empty
    /// result, never an error.
    pub async fn sql_raw(&self, statement: &str, params: SqlParams) -> DbResult<TabularResult> {
        let statement = statement.to_string();
        self.with_session(move |session| async move {
            session.fetch_all(&statement, &params).await
        })
        .await
    }

    /// Start a fluent query over a mapped entity.
    ///
    /// The returned handle is bound to a fresh session that is not scoped
    /// by a unit of work: it stays open across chained calls until the
    /// tabular terminal or an explicit close ends it.
    pub async fn orm<E: Entity>(&self) -> DbResult<QueryHandle> {
        let session = Session::begin(&self.pool, ContextId::current()).await?;
        Ok(QueryHandle::for_entity::<E>(session, self.pool.clone()))
    }

    /// Create every table the schema describes, skipping existing ones.
    pub async fn create_all(&self, schema: &dyn SchemaDescriptor) -> DbResult<()> {
        for table in schema.tables() {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                table.name, table.columns_sql
            );
            crate::db::executor::execute_on_pool(&self.pool, &ddl, &SqlParams::new()).await?;
            debug!(table = %table.name, "Ensured table");
        }
        Ok(())
    }

    /// Drop every table the schema describes. Destructive; callers accept
    /// that by invoking it.
    pub async fn drop_all(&self, schema: &dyn SchemaDescriptor) -> DbResult<()> {
        // Reverse creation order, so dependents go first
        for table in schema.tables().iter().rev() {
            let ddl = format!("DROP TABLE IF EXISTS {}", table.name);
            crate::db::executor::execute_on_pool(&self.pool, &ddl, &SqlParams::new()).await?;
            debug!(table = %table.name, "Dropped table");
        }
        Ok(())
    }

    /// Whether the last probe reached the database.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Re-probe connectivity and refresh the health flag.
    pub async fn ping(&self) -> DbResult<()> {
        let result = self.pool.probe().await;
        self.connected.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    /// The engine this manager is bound to.
    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Database name from the connection URL, when one was present.
    pub fn database(&self) -> Option<&str> {
        self.endpoint.database.as_deref()
    }

    /// Number of currently open context-scoped sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.count().await
    }

    /// Metadata for all open context-scoped sessions.
    pub async fn list_sessions(&self) -> Vec<SessionMetadata> {
        self.registry.list_all().await
    }

    /// Close the underlying pool. Outstanding sessions become unusable.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Connection pool closed");
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("db_type", &self.pool.db_type())
            .field("database", &self.endpoint.database)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
