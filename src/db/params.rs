//! Named-placeholder expansion and driver-specific parameter binding.
//!
//! Statements use `:name` placeholders regardless of engine; this module
//! rewrites them into the engine's positional form and hands the values to
//! sqlx's bind API, so parameter values never touch the statement text.

use crate::error::{DbError, DbResult};
use crate::models::{SqlParams, SqlValue};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// Positional placeholder syntax understood by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (SQLite, MySQL)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

/// Rewrite `:name` placeholders into positional form, returning the
/// rewritten statement and the values in binding order.
///
/// Single-quoted literals, double-quoted identifiers, `--` and `/* */`
/// comments pass through untouched, as does the `::type` cast syntax.
/// Each occurrence of a name binds its value again, so names may repeat.
/// A placeholder with no entry in `params` is an input error.
pub fn expand_named(
    sql: &str,
    params: &SqlParams,
    style: PlaceholderStyle,
) -> DbResult<(String, Vec<SqlValue>)> {
    let bytes = sql.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(sql.len() + 8);
    let mut ordered: Vec<SqlValue> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                let end = quoted_end(bytes, i, quote);
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| i + p + 1)
                    .unwrap_or(bytes.len());
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = block_comment_end(bytes, i);
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                // cast, not a placeholder
                out.extend_from_slice(b"::");
                i += 2;
            }
            b':' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let name = &sql[start..end];
                let value = params.get(name).ok_or_else(|| {
                    DbError::invalid_input(format!("No value bound for placeholder :{name}"))
                })?;
                ordered.push(value.clone());
                match style {
                    PlaceholderStyle::Question => out.push(b'?'),
                    PlaceholderStyle::Dollar => {
                        out.extend_from_slice(format!("${}", ordered.len()).as_bytes())
                    }
                }
                i = end;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    let text = String::from_utf8(out)
        .map_err(|e| DbError::internal(format!("Placeholder rewrite corrupted statement: {e}")))?;
    Ok((text, ordered))
}

/// Index one past the closing quote, honoring doubled-quote escapes.
fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a value to a PostgreSQL query.
pub(crate) fn bind_postgres_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_expand_question_style() {
        let p = params! { "a" => 1 };
        let (sql, values) = expand_named(
            "SELECT id FROM t WHERE active = :a",
            &p,
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(sql, "SELECT id FROM t WHERE active = ?");
        assert_eq!(values, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_expand_dollar_style_numbers_in_order() {
        let p = params! { "a" => 1, "b" => "x" };
        let (sql, values) = expand_named(
            "SELECT * FROM t WHERE a = :a AND b = :b",
            &p,
            PlaceholderStyle::Dollar,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], SqlValue::Int(1));
        assert_eq!(values[1], SqlValue::Text("x".to_string()));
    }

    #[test]
    fn test_repeated_name_binds_per_occurrence() {
        let p = params! { "v" => 7 };
        let (sql, values) = expand_named(
            "SELECT * FROM t WHERE a = :v OR b = :v",
            &p,
            PlaceholderStyle::Dollar,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 OR b = $2");
        assert_eq!(values, vec![SqlValue::Int(7), SqlValue::Int(7)]);
    }

    #[test]
    fn test_string_literal_untouched() {
        let p = params! { "a" => 1 };
        let (sql, values) = expand_named(
            "SELECT ':a' AS lit, id FROM t WHERE x = :a",
            &p,
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(sql, "SELECT ':a' AS lit, id FROM t WHERE x = ?");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let p = SqlParams::new();
        let (sql, values) =
            expand_named("SELECT 'it''s :fine'", &p, PlaceholderStyle::Question).unwrap();
        assert_eq!(sql, "SELECT 'it''s :fine'");
        assert!(values.is_empty());
    }

    #[test]
    fn test_comments_untouched() {
        let p = params! { "a" => 1 };
        let (sql, _) = expand_named(
            "SELECT id -- not :a here\nFROM t /* nor :a */ WHERE x = :a",
            &p,
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT id -- not :a here\nFROM t /* nor :a */ WHERE x = ?"
        );
    }

    #[test]
    fn test_cast_syntax_untouched() {
        let p = SqlParams::new();
        let (sql, values) =
            expand_named("SELECT x::text FROM t", &p, PlaceholderStyle::Dollar).unwrap();
        assert_eq!(sql, "SELECT x::text FROM t");
        assert!(values.is_empty());
    }

    #[test]
    fn test_missing_binding_is_input_error() {
        let p = SqlParams::new();
        let err = expand_named("SELECT :missing", &p, PlaceholderStyle::Question).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_no_placeholders_passes_through() {
        let p = SqlParams::new();
        let (sql, values) = expand_named("SELECT 1", &p, PlaceholderStyle::Question).unwrap();
        assert_eq!(sql, "SELECT 1");
        assert!(values.is_empty());
    }

    #[test]
    fn test_multibyte_text_preserved() {
        let p = params! { "n" => "café" };
        let (sql, values) = expand_named(
            "SELECT 'héllo' FROM t WHERE name = :n",
            &p,
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(sql, "SELECT 'héllo' FROM t WHERE name = ?");
        assert_eq!(values[0], SqlValue::Text("café".to_string()));
    }
}
