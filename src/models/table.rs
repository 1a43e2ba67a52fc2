//! Tabular query results.

use crate::models::SqlValue;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A materialized query result: ordered column names plus fixed-arity rows.
///
/// Row and column order always match the underlying query's result order.
/// Rows are fully owned, so the result stays valid after the session that
/// produced it has closed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl TabularResult {
    /// Create a result from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Create an empty result (a query that matched nothing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in result order.
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Consume the result, yielding its rows.
    pub fn into_rows(self) -> Vec<Vec<SqlValue>> {
        self.rows
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a cell by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)
    }

    /// Project into name-to-value records for an external tabular sink.
    ///
    /// Pure and non-mutating: the record order and per-record key order
    /// mirror the result's row and column order.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TabularResult {
        TabularResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("ada".to_string())],
                vec![SqlValue::Int(2), SqlValue::Text("grace".to_string())],
            ],
        )
    }

    #[test]
    fn test_empty_result() {
        let result = TabularResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(result.to_records().is_empty());
    }

    #[test]
    fn test_value_lookup() {
        let result = sample();
        assert_eq!(result.value(1, "name"), Some(&SqlValue::Text("grace".to_string())));
        assert_eq!(result.value(0, "missing"), None);
        assert_eq!(result.value(9, "id"), None);
    }

    #[test]
    fn test_to_records_preserves_order() {
        let records = sample().to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], serde_json::json!(1));
        assert_eq!(records[1]["name"], serde_json::json!("grace"));
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }
}
