//! Fluent query builder bound to a mapped entity.
//!
//! A [`QueryHandle`] composes a SELECT lazily; nothing executes until a
//! terminal operation runs. Fetch terminals go through the bound session
//! and leave its lifecycle to the caller; the tabular terminal reads
//! directly from the pool and always closes the session, because it is
//! defined as the end of that session's life.

use crate::db::executor;
use crate::db::pool::DbPool;
use crate::db::session::Session;
use crate::error::DbResult;
use crate::models::{Entity, SqlParams, SqlValue, TabularResult};
use std::fmt::Write as _;
use tracing::warn;

/// A composable query over one mapped entity, bound to one session.
pub struct QueryHandle {
    session: Session,
    pool: DbPool,
    table: &'static str,
    columns: &'static [&'static str],
    filters: Vec<String>,
    joins: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: SqlParams,
}

impl QueryHandle {
    pub(crate) fn for_entity<E: Entity>(session: Session, pool: DbPool) -> Self {
        Self {
            session,
            pool,
            table: E::TABLE,
            columns: E::COLUMNS,
            filters: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            params: SqlParams::new(),
        }
    }

    /// Add a filter condition; conditions are ANDed together.
    /// Use `:name` placeholders and bind values with [`QueryHandle::bind`].
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filters.push(condition.into());
        self
    }

    /// Bind a value for a `:name` placeholder used in a filter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a join clause, e.g. `"JOIN owners ON owners.id = vehicles.owner_id"`.
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    /// Add an ordering expression, e.g. `"plate DESC"`.
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    /// Cap the number of returned rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skip the first `n` rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// The session this query is bound to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The composed SELECT statement.
    pub fn statement(&self) -> String {
        self.statement_limited(self.limit)
    }

    fn statement_limited(&self, limit: Option<u64>) -> String {
        compose_select(
            self.columns,
            self.table,
            &self.joins,
            &self.filters,
            &self.order_by,
            limit,
            self.offset,
        )
    }

    /// Execute through the bound session and return all rows.
    ///
    /// The session stays open for further fetches; end it with
    /// [`QueryHandle::close`] or [`QueryHandle::to_table`].
    pub async fn all(&self) -> DbResult<TabularResult> {
        self.session
            .fetch_all(&self.statement(), &self.params)
            .await
    }

    /// Execute through the bound session and return the first row, if any.
    pub async fn first(&self) -> DbResult<Option<Vec<SqlValue>>> {
        let sql = self.statement_limited(Some(1));
        let table = self.session.fetch_all(&sql, &self.params).await?;
        Ok(table.into_rows().into_iter().next())
    }

    /// Execute directly against the pool and convert to a tabular result,
    /// then close the bound session - success or failure.
    pub async fn to_table(self) -> DbResult<TabularResult> {
        let result = executor::fetch_on_pool(&self.pool, &self.statement(), &self.params).await;
        if let Err(e) = self.session.close().await {
            warn!(session_id = %self.session.id(), error = %e, "Closing query session failed");
        }
        result
    }

    /// Close the bound session without executing.
    pub async fn close(self) -> DbResult<()> {
        self.session.close().await
    }
}

/// Assemble a SELECT from its composed parts.
fn compose_select(
    columns: &[&str],
    table: &str,
    joins: &[String],
    filters: &[String],
    order_by: &[String],
    limit: Option<u64>,
    offset: Option<u64>,
) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", projection, table);
    for join in joins {
        sql.push(' ');
        sql.push_str(join);
    }
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filters.join(" AND "));
    }
    if !order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by.join(", "));
    }
    if let Some(n) = limit {
        let _ = write!(sql, " LIMIT {}", n);
    }
    if let Some(n) = offset {
        let _ = write!(sql, " OFFSET {}", n);
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_projection_uses_entity_columns() {
        let sql = compose_select(
            &["id", "plate", "owner_id"],
            "vehicles",
            &[],
            &[],
            &[],
            None,
            None,
        );
        assert_eq!(sql, "SELECT id, plate, owner_id FROM vehicles");
    }

    #[test]
    fn test_empty_projection_selects_star() {
        let sql = compose_select(&[], "vehicles", &[], &[], &[], None, None);
        assert_eq!(sql, "SELECT * FROM vehicles");
    }

    #[test]
    fn test_filters_are_anded() {
        let sql = compose_select(
            &["id"],
            "vehicles",
            &[],
            &strings(&["plate = :p", "owner_id = :o"]),
            &[],
            None,
            None,
        );
        assert_eq!(
            sql,
            "SELECT id FROM vehicles WHERE plate = :p AND owner_id = :o"
        );
    }

    #[test]
    fn test_join_precedes_where() {
        let sql = compose_select(
            &["id"],
            "vehicles",
            &strings(&["JOIN owners ON owners.id = vehicles.owner_id"]),
            &strings(&["owners.name = :n"]),
            &[],
            None,
            None,
        );
        assert_eq!(
            sql,
            "SELECT id FROM vehicles JOIN owners ON owners.id = vehicles.owner_id \
             WHERE owners.name = :n"
        );
    }

    #[test]
    fn test_order_limit_offset_placement() {
        let sql = compose_select(
            &["id"],
            "vehicles",
            &[],
            &strings(&["active = :a"]),
            &strings(&["plate DESC", "id"]),
            Some(10),
            Some(20),
        );
        assert_eq!(
            sql,
            "SELECT id FROM vehicles WHERE active = :a ORDER BY plate DESC, id LIMIT 10 OFFSET 20"
        );
    }
}
