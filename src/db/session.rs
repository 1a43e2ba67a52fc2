//! Sessions and the context-scoped session registry.
//!
//! A [`Session`] wraps one transaction taken from the engine pool. The
//! [`SessionRegistry`] maps calling-context identities to open sessions so
//! that repeated acquisition within one context returns the same session,
//! while concurrent contexts each get their own. The registry is owned by
//! the manager, never process-wide.

use crate::db::executor;
use crate::db::pool::{DatabaseType, DbPool};
use crate::error::{DbError, DbResult};
use crate::models::{SqlParams, TabularResult};
use chrono::{DateTime, Utc};
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Identity of the calling context: the current tokio task when inside
/// one, the OS thread otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Task(tokio::task::Id),
    Thread(std::thread::ThreadId),
}

impl ContextId {
    /// Identity of the context executing this call.
    pub fn current() -> Self {
        match tokio::task::try_id() {
            Some(id) => Self::Task(id),
            None => Self::Thread(std::thread::current().id()),
        }
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(id) => write!(f, "task-{}", id),
            Self::Thread(id) => write!(f, "{:?}", id),
        }
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    /// MySQL transaction
    MySql(Transaction<'static, MySql>),
    /// PostgreSQL transaction
    Postgres(Transaction<'static, Postgres>),
    /// SQLite transaction
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

/// How a session's unit of work ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Commit,
    Rollback,
}

struct SessionInner {
    tx: Option<DbTransaction>,
}

/// A logical unit-of-work handle bound to one pooled connection.
///
/// Cloning yields another handle to the same session; state mutation is
/// exclusive to the context that opened it, guarded by an async mutex.
#[derive(Clone)]
pub struct Session {
    id: Arc<str>,
    context: ContextId,
    db_type: DatabaseType,
    started_at: DateTime<Utc>,
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    /// Begin a new session, taking a transaction from the pool.
    pub(crate) async fn begin(pool: &DbPool, context: ContextId) -> DbResult<Self> {
        let tx = match pool {
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await.map_err(DbError::from)?),
            DbPool::Postgres(p) => {
                DbTransaction::Postgres(p.begin().await.map_err(DbError::from)?)
            }
            DbPool::SQLite(p) => DbTransaction::SQLite(p.begin().await.map_err(DbError::from)?),
        };
        let id: Arc<str> = generate_session_id().into();
        debug!(session_id = %id, context = %context, "Session started");
        Ok(Self {
            id,
            context,
            db_type: pool.db_type(),
            started_at: Utc::now(),
            inner: Arc::new(Mutex::new(SessionInner { tx: Some(tx) })),
        })
    }

    /// Session identifier, for logs and diagnostics.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Context that opened this session.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// When this session was opened.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the session still holds its transaction.
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.tx.is_some()
    }

    /// Run a query in this session and materialize all rows.
    ///
    /// Zero matching rows yield an empty result, never an error.
    pub async fn fetch_all(&self, sql: &str, params: &SqlParams) -> DbResult<TabularResult> {
        let mut inner = self.inner.lock().await;
        let tx = inner.tx.as_mut().ok_or_else(|| self.closed_error())?;
        executor::fetch_in_tx(tx, self.db_type, sql, params).await
    }

    /// Execute a statement in this session, returning affected rows.
    pub async fn execute(&self, sql: &str, params: &SqlParams) -> DbResult<u64> {
        let mut inner = self.inner.lock().await;
        let tx = inner.tx.as_mut().ok_or_else(|| self.closed_error())?;
        executor::execute_in_tx(tx, self.db_type, sql, params).await
    }

    /// End the unit of work: commit or roll back, then close.
    ///
    /// The transaction is taken out of the shared slot before the outcome
    /// runs, so the connection returns to the pool on every path, even when
    /// commit or rollback itself fails. Finishing an already-closed session
    /// is a no-op.
    pub(crate) async fn finish(&self, outcome: Outcome) -> DbResult<()> {
        let tx = { self.inner.lock().await.tx.take() };
        let Some(tx) = tx else {
            return Ok(());
        };
        let result = match outcome {
            Outcome::Commit => tx.commit().await,
            Outcome::Rollback => tx.rollback().await,
        };
        match &result {
            Ok(()) => debug!(session_id = %self.id, outcome = ?outcome, "Session closed"),
            Err(e) => warn!(session_id = %self.id, outcome = ?outcome, error = %e, "Session close failed"),
        }
        result
    }

    /// Roll back and close. No-op when already closed.
    pub async fn close(&self) -> DbResult<()> {
        self.finish(Outcome::Rollback).await
    }

    fn closed_error(&self) -> DbError {
        DbError::session("Session is already closed", self.id.to_string())
    }
}

/// Metadata about an open session (for listing without consuming).
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    /// Unique session identifier
    pub session_id: String,
    /// Context that owns the session
    pub context: String,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// Seconds since the session started
    pub age_secs: u64,
}

/// Registry mapping calling contexts to their open sessions.
///
/// Slots are inserted explicitly on first acquisition and removed
/// explicitly when the owning scope completes.
pub(crate) struct SessionRegistry {
    slots: RwLock<HashMap<ContextId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Session for the current context: the open slot if one exists,
    /// otherwise a freshly begun session inserted under this context.
    ///
    /// The boolean is true when this call created the slot; only that
    /// acquisition's scope completes the session.
    pub async fn acquire(&self, pool: &DbPool) -> DbResult<(Session, bool)> {
        let context = ContextId::current();
        {
            let slots = self.slots.read().await;
            if let Some(session) = slots.get(&context) {
                return Ok((session.clone(), false));
            }
        }
        // A context runs one call at a time, so no other insert can race
        // this slot between the read and the write.
        let session = Session::begin(pool, context).await?;
        let mut slots = self.slots.write().await;
        slots.insert(context, session.clone());
        Ok((session, true))
    }

    /// The current context's open session, if any.
    pub async fn current(&self) -> Option<Session> {
        let slots = self.slots.read().await;
        slots.get(&ContextId::current()).cloned()
    }

    /// Remove a context's slot, returning the session it held.
    pub async fn remove(&self, context: ContextId) -> Option<Session> {
        self.slots.write().await.remove(&context)
    }

    /// Get the number of open slots.
    pub async fn count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// List all open sessions with their metadata.
    pub async fn list_all(&self) -> Vec<SessionMetadata> {
        let slots = self.slots.read().await;
        slots
            .values()
            .map(|session| {
                let age = Utc::now()
                    .signed_duration_since(session.started_at())
                    .num_seconds()
                    .max(0) as u64;
                SessionMetadata {
                    session_id: session.id().to_string(),
                    context: session.context().to_string(),
                    started_at: session.started_at(),
                    age_secs: age,
                }
            })
            .collect()
    }
}

/// Reclaims a unit-of-work's registry slot if its scope is abandoned.
///
/// The `Drop` implementation spawns a task to roll back and remove the
/// slot when the scope's future is dropped mid-flight (cancellation,
/// panic unwind). If the tokio runtime is shutting down when `Drop` runs,
/// the spawned task may not execute; at that point pool teardown closes
/// the connection anyway. Completed scopes disarm the guard first.
pub(crate) struct ScopeGuard {
    registry: Arc<SessionRegistry>,
    context: ContextId,
    armed: bool,
}

impl ScopeGuard {
    pub fn new(registry: Arc<SessionRegistry>, context: ContextId) -> Self {
        Self {
            registry,
            context,
            armed: true,
        }
    }

    /// Disarm the guard; the scope is completing normally.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let context = self.context;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(session) = registry.remove(context).await {
                    warn!(
                        session_id = %session.id(),
                        context = %context,
                        "Session reclaimed from abandoned scope"
                    );
                    if let Err(e) = session.finish(Outcome::Rollback).await {
                        warn!(error = %e, "Rollback of reclaimed session failed");
                    }
                }
            });
        }
    }
}

/// Generate a unique session ID.
fn generate_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert!(id.starts_with("ses_"));
        assert_eq!(id.len(), 4 + 32); // "ses_" + 32 hex chars
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.count().await, 0);
        assert!(registry.list_all().await.is_empty());
        assert!(registry.current().await.is_none());
    }

    #[tokio::test]
    async fn test_context_id_stable_within_task() {
        let a = ContextId::current();
        let b = ContextId::current();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_context_ids_differ_across_tasks() {
        let here = ContextId::current();
        let there = tokio::spawn(async { ContextId::current() }).await.unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_context_id_outside_runtime_uses_thread() {
        let id = ContextId::current();
        assert!(matches!(id, ContextId::Thread(_)));
    }
}
