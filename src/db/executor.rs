//! Statement execution against a live session or directly against the pool.
//!
//! Both entry points expand `:name` placeholders, bind values through the
//! driver, and materialize rows into an owned [`TabularResult`] so results
//! outlive the session that produced them.
//!
//! The code structure is intentionally parallel across the three database
//! submodules to make differences obvious.

use crate::db::decode::DecodeRow;
use crate::db::params::{
    bind_mysql_value, bind_postgres_value, bind_sqlite_value, expand_named,
};
use crate::db::pool::{DatabaseType, DbPool};
use crate::db::session::DbTransaction;
use crate::error::{DbError, DbResult};
use crate::models::{SqlParams, TabularResult};
use tracing::debug;

/// Run a query inside a session's transaction and materialize all rows.
pub(crate) async fn fetch_in_tx(
    tx: &mut DbTransaction,
    db_type: DatabaseType,
    sql: &str,
    params: &SqlParams,
) -> DbResult<TabularResult> {
    let (stmt, values) = expand_named(sql, params, db_type.placeholder())?;
    debug!(sql = %stmt, params = values.len(), "Executing query in session");
    match tx {
        DbTransaction::MySql(tx) => mysql::fetch(&mut **tx, &stmt, &values).await,
        DbTransaction::Postgres(tx) => postgres::fetch(&mut **tx, &stmt, &values).await,
        DbTransaction::SQLite(tx) => sqlite::fetch(&mut **tx, &stmt, &values).await,
    }
}

/// Execute a statement inside a session's transaction.
pub(crate) async fn execute_in_tx(
    tx: &mut DbTransaction,
    db_type: DatabaseType,
    sql: &str,
    params: &SqlParams,
) -> DbResult<u64> {
    let (stmt, values) = expand_named(sql, params, db_type.placeholder())?;
    debug!(sql = %stmt, params = values.len(), "Executing statement in session");
    match tx {
        DbTransaction::MySql(tx) => mysql::execute(&mut **tx, &stmt, &values).await,
        DbTransaction::Postgres(tx) => postgres::execute(&mut **tx, &stmt, &values).await,
        DbTransaction::SQLite(tx) => sqlite::execute(&mut **tx, &stmt, &values).await,
    }
}

/// Run a query directly against the pool, outside any session.
pub(crate) async fn fetch_on_pool(
    pool: &DbPool,
    sql: &str,
    params: &SqlParams,
) -> DbResult<TabularResult> {
    let (stmt, values) = expand_named(sql, params, pool.db_type().placeholder())?;
    debug!(sql = %stmt, params = values.len(), "Executing query on pool");
    match pool {
        DbPool::MySql(p) => mysql::fetch(p, &stmt, &values).await,
        DbPool::Postgres(p) => postgres::fetch(p, &stmt, &values).await,
        DbPool::SQLite(p) => sqlite::fetch(p, &stmt, &values).await,
    }
}

/// Execute a statement directly against the pool, outside any session.
pub(crate) async fn execute_on_pool(
    pool: &DbPool,
    sql: &str,
    params: &SqlParams,
) -> DbResult<u64> {
    let (stmt, values) = expand_named(sql, params, pool.db_type().placeholder())?;
    debug!(sql = %stmt, params = values.len(), "Executing statement on pool");
    match pool {
        DbPool::MySql(p) => mysql::execute(p, &stmt, &values).await,
        DbPool::Postgres(p) => postgres::execute(p, &stmt, &values).await,
        DbPool::SQLite(p) => sqlite::execute(p, &stmt, &values).await,
    }
}

/// Materialize driver rows into an owned tabular result.
fn rows_to_table<R: DecodeRow>(rows: Vec<R>) -> TabularResult {
    if rows.is_empty() {
        return TabularResult::empty();
    }
    let columns = rows[0].column_names();
    let data = rows.iter().map(|r| r.decode_values()).collect();
    TabularResult::new(columns, data)
}

mod mysql {
    use super::*;
    use crate::models::SqlValue;
    use futures_util::TryStreamExt;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Executor, MySql};

    pub async fn fetch<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<TabularResult>
    where
        E: Executor<'c, Database = MySql>,
    {
        // When there are no bound values, run raw SQL to avoid prepared
        // statement restrictions.
        let rows: Vec<MySqlRow> = if values.is_empty() {
            executor.fetch(sql).try_collect().await.map_err(DbError::from)?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_mysql_value(query, value);
            }
            query.fetch(executor).try_collect().await.map_err(DbError::from)?
        };
        Ok(rows_to_table(rows))
    }

    pub async fn execute<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<u64>
    where
        E: Executor<'c, Database = MySql>,
    {
        let result = if values.is_empty() {
            executor.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_mysql_value(query, value);
            }
            executor.execute(query).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}

mod postgres {
    use super::*;
    use crate::models::SqlValue;
    use futures_util::TryStreamExt;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, Postgres};

    pub async fn fetch<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<TabularResult>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let rows: Vec<PgRow> = if values.is_empty() {
            executor.fetch(sql).try_collect().await.map_err(DbError::from)?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_postgres_value(query, value);
            }
            query.fetch(executor).try_collect().await.map_err(DbError::from)?
        };
        Ok(rows_to_table(rows))
    }

    pub async fn execute<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<u64>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let result = if values.is_empty() {
            executor.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_postgres_value(query, value);
            }
            executor.execute(query).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}

mod sqlite {
    use super::*;
    use crate::models::SqlValue;
    use futures_util::TryStreamExt;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, Sqlite};

    pub async fn fetch<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<TabularResult>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows: Vec<SqliteRow> = if values.is_empty() {
            executor.fetch(sql).try_collect().await.map_err(DbError::from)?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_sqlite_value(query, value);
            }
            query.fetch(executor).try_collect().await.map_err(DbError::from)?
        };
        Ok(rows_to_table(rows))
    }

    pub async fn execute<'c, E>(executor: E, sql: &str, values: &[SqlValue]) -> DbResult<u64>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = if values.is_empty() {
            executor.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_sqlite_value(query, value);
            }
            executor.execute(query).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}
