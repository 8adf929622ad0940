//! Tabular query output returned by a SQL executor.

use serde::{Deserialize, Serialize};

/// Result of running a diagnostic statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Column names in select order.
    pub columns: Vec<String>,

    /// Row data (each row is a vector of JSON values).
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryOutput {
    /// Creates an output from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    /// Creates a single-row output.
    pub fn single(columns: &[&str], row: Vec<serde_json::Value>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
        self.rows.get(row)?.get(idx).filter(|v| !v.is_null())
    }

    /// Reads an integer, accepting numeric strings (MySQL status values).
    pub fn get_i64(&self, row: usize, column: &str) -> Option<i64> {
        match self.value(row, column)? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads a float, accepting numeric strings.
    pub fn get_f64(&self, row: usize, column: &str) -> Option<f64> {
        match self.value(row, column)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads a string.
    pub fn get_str(&self, row: usize, column: &str) -> Option<String> {
        match self.value(row, column)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let out = QueryOutput::single(&["Value", "cnt", "ver"], vec![json!("42"), json!(7), json!(null)]);
        assert_eq!(out.get_i64(0, "value"), Some(42));
        assert_eq!(out.get_f64(0, "cnt"), Some(7.0));
        assert_eq!(out.get_str(0, "ver"), None);
        assert_eq!(out.get_i64(1, "cnt"), None);
        assert_eq!(out.get_i64(0, "missing"), None);
    }
}
