//! Read-only lookup caches
//!
//! Some collation steps resolve the same small domain over and over (a
//! marker key to its display symbol, a term key to its abbreviation). A
//! [`LookupCache`] is populated once from a two-column query and treated
//! as read-only for the remainder of the process; a missing key is an
//! ordinary `None`, not an error.

use crate::backend::QueryBackend;
use crate::resultset::ResultSet;
use flatstage_common::Result;
use std::collections::HashMap;
use tracing::debug;

/// A key → value map built once from a query
#[derive(Debug, Clone)]
pub struct LookupCache {
    name: String,
    map: HashMap<String, String>,
}

impl LookupCache {
    /// Populate the cache by running `sql` against the backend.
    pub async fn load(
        backend: &dyn QueryBackend,
        name: impl Into<String>,
        sql: &str,
        key_column: &str,
        value_column: &str,
    ) -> Result<Self> {
        let results = backend.execute(sql).await?;
        Self::from_results(name, &results, key_column, value_column)
    }

    /// Build the cache from an already-fetched result set.
    pub fn from_results(
        name: impl Into<String>,
        results: &ResultSet,
        key_column: &str,
        value_column: &str,
    ) -> Result<Self> {
        let name = name.into();
        let key_idx = results.column_number(key_column)?;
        let value_idx = results.column_number(value_column)?;

        let mut map = HashMap::with_capacity(results.len());
        for row in &results.rows {
            if row[key_idx].is_null() {
                continue;
            }
            map.insert(row[key_idx].to_string(), row[value_idx].to_string());
        }

        debug!(cache = %name, entries = map.len(), "lookup cache loaded");
        Ok(Self { name, map })
    }

    /// Look a key up; `None` when the source had no such key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_from_results_builds_map() {
        let results = ResultSet::new(
            vec!["markerKey".into(), "symbol".into()],
            vec![
                vec![Value::Int(1), Value::Text("Kit".into())],
                vec![Value::Int(2), Value::Text("Pax6".into())],
                vec![Value::Null, Value::Text("orphan".into())],
            ],
        );

        let cache =
            LookupCache::from_results("symbols", &results, "markerKey", "symbol").unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("1"), Some("Kit"));
        assert_eq!(cache.get("2"), Some("Pax6"));
        assert_eq!(cache.get("99"), None);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let results = ResultSet::new(vec!["markerKey".into()], vec![]);
        assert!(LookupCache::from_results("bad", &results, "markerKey", "symbol").is_err());
    }
}
