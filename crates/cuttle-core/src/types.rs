//! Values passed through pooled connections
//!
//! The pool never looks inside these; they exist so drivers and callers share
//! one vocabulary for parameters and results.

use serde::{Deserialize, Serialize};

/// A statement parameter or result cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(text) = self {
            Some(text)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(n) = self {
            Some(*n)
        } else {
            None
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Rows returned by a query, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// A result with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// The cell at `row` in the named column
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementResult {
    pub affected_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_lookup_by_column() {
        let result = QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![Value::Int(7), "ron".into()]],
        };

        assert_eq!(result.value(0, "name").and_then(Value::as_text), Some("ron"));
        assert_eq!(result.value(0, "id").and_then(Value::as_int), Some(7));
        assert_eq!(result.value(0, "missing"), None);
        assert_eq!(result.value(1, "id"), None);
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_optional_values_become_null() {
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Value::from(true), Value::Bool(true));
    }

    #[test]
    fn test_values_serialize_untagged() {
        let params = vec![Value::Int(1), Value::Null, "paul".into()];
        let json = serde_json::to_string(&params).expect("serialize");
        assert_eq!(json, r#"[1,null,"paul"]"#);
    }
}
