//! Uniform query results
//!
//! Every backend returns the same shape: an ordered column-name list and a
//! row list. Column order is backend-dependent (PostgreSQL lower-cases
//! unquoted identifiers, and SELECT * order differs across engines), so
//! consumers resolve columns by name through [`ResultSet::column_number`],
//! never by hard-coded position.

use crate::value::Value;
use flatstage_common::{Result, StageError};

/// A (column-name list, row list) pair returned by a backend for one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in the order the backend returned them
    pub columns: Vec<String>,
    /// Rows, each with one value per column
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Create a result set from parts
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the result set has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a column name to its positional index.
    ///
    /// Tries an exact match first, then a case-insensitive match (one
    /// supported backend returns all-lowercase identifiers even when the
    /// query used mixed case). Unknown names are a schema error naming the
    /// available columns.
    pub fn column_number(&self, name: &str) -> Result<usize> {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return Ok(idx);
        }
        if let Some(idx) = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
        {
            return Ok(idx);
        }
        Err(StageError::missing_column(name, &self.columns))
    }

    /// Fetch one value by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_number(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .ok_or_else(|| StageError::scalar(format!("row {} out of range", row)))
    }

    /// Merge another result set into this one.
    ///
    /// The two sets must carry the same columns but may order them
    /// differently; the other set's rows are re-ordered by column name to
    /// match this set before concatenating. Merging into an empty set
    /// adopts the other set wholesale.
    pub fn merge(&mut self, other: ResultSet) -> Result<()> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }

        let mapping = self
            .columns
            .iter()
            .map(|name| other.column_number(name))
            .collect::<Result<Vec<usize>>>()?;

        self.rows.reserve(other.rows.len());
        for row in &other.rows {
            self.rows
                .push(mapping.iter().map(|&i| row[i].clone()).collect());
        }
        Ok(())
    }

    /// First value of the first row, for single-scalar queries.
    pub fn scalar(&self) -> Result<&Value> {
        self.rows
            .first()
            .and_then(|r| r.first())
            .ok_or_else(|| StageError::scalar("query returned no rows".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec!["markerKey".into(), "symbol".into()],
            vec![
                vec![Value::Int(1), Value::Text("Kit".into())],
                vec![Value::Int(2), Value::Text("Pax6".into())],
            ],
        )
    }

    #[test]
    fn test_column_number_exact() {
        assert_eq!(sample().column_number("symbol").unwrap(), 1);
    }

    #[test]
    fn test_column_number_case_insensitive_fallback() {
        // A lowercasing backend returns "markerkey" for "markerKey".
        let rs = ResultSet::new(vec!["markerkey".into()], vec![]);
        assert_eq!(rs.column_number("markerKey").unwrap(), 0);
    }

    #[test]
    fn test_column_number_missing_lists_available() {
        let err = sample().column_number("accID").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("accID"));
        assert!(msg.contains("markerKey"));
        assert!(msg.contains("symbol"));
    }

    #[test]
    fn test_merge_reorders_by_name() {
        let mut base = sample();
        let other = ResultSet::new(
            vec!["symbol".into(), "markerKey".into()],
            vec![vec![Value::Text("Trp53".into()), Value::Int(3)]],
        );

        base.merge(other).unwrap();

        assert_eq!(base.len(), 3);
        assert_eq!(
            base.rows[2],
            vec![Value::Int(3), Value::Text("Trp53".into())]
        );
    }

    #[test]
    fn test_merge_into_empty_adopts_other() {
        let mut base = ResultSet::default();
        base.merge(sample()).unwrap();
        assert_eq!(base.columns, vec!["markerKey", "symbol"]);
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_merge_missing_column_fails() {
        let mut base = sample();
        let other = ResultSet::new(vec!["symbol".into()], vec![]);
        assert!(base.merge(other).is_err());
    }

    #[test]
    fn test_scalar() {
        assert_eq!(sample().scalar().unwrap(), &Value::Int(1));
        assert!(ResultSet::default().scalar().is_err());
    }
}
