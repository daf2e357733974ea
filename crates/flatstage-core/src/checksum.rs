//! Checksum gate for incremental rebuilds
//!
//! A job may fingerprint its source data and compare the fingerprint
//! against the value persisted by its last successful run; a match means
//! the downstream extraction is provably unnecessary for this run. Row
//! hashes fold into the accumulator as they stream by (wrapping addition),
//! so peak memory is constant and the final value is identical no matter
//! where any internal fold boundary falls. Persistence is one small text
//! file per checksum prefix, holding a single decimal integer.

use crate::backend::QueryBackend;
use crate::value::Value;
use flatstage_common::{Result, StageError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xxhash_rust::xxh64::Xxh64;

const HASH_SEED: u64 = 0x666c_6174;

/// Extension used for persisted checksum files.
pub const FILE_EXTENSION: &str = "checksum";

fn hash_row(row: &[Value]) -> u64 {
    let mut hasher = Xxh64::new(HASH_SEED);
    for value in row {
        // Tag each field with its shape so NULL, "" and 0 stay distinct.
        match value {
            Value::Null => hasher.update(&[0x00]),
            Value::Bool(b) => hasher.update(&[0x01, u8::from(*b)]),
            Value::Int(n) => {
                hasher.update(&[0x02]);
                hasher.update(&n.to_le_bytes());
            },
            Value::Float(x) => {
                hasher.update(&[0x03]);
                hasher.update(&x.to_le_bytes());
            },
            Value::Text(s) => {
                hasher.update(&[0x04]);
                hasher.update(s.as_bytes());
            },
        }
        hasher.update(&[0x1f]);
    }
    hasher.digest()
}

/// Execute `sql` and fingerprint its full result set.
///
/// Row hashes combine commutatively, so the result does not depend on the
/// order the backend returns rows in.
pub async fn hash_results(backend: &dyn QueryBackend, sql: &str) -> Result<i64> {
    let results = backend.execute(sql).await?;

    let mut acc: u64 = 0;
    for row in &results.rows {
        acc = acc.wrapping_add(hash_row(row));
    }
    // Fold in the row count so duplicate-row cancellation cannot collide
    // with a genuinely unchanged set.
    let mut hasher = Xxh64::new(HASH_SEED);
    hasher.update(&(results.rows.len() as u64).to_le_bytes());
    let value = acc.wrapping_add(hasher.digest()) as i64;

    debug!(rows = results.rows.len(), value, "result set hashed");
    Ok(value)
}

/// Execute a query returning one scalar and read it as an integer.
pub async fn single_count(backend: &dyn QueryBackend, sql: &str) -> Result<i64> {
    let results = backend.execute(sql).await?;
    results
        .scalar()?
        .as_i64()
        .ok_or_else(|| StageError::scalar(format!("'{}' did not return an integer", sql)))
}

/// A freshly computed fingerprint paired with its persisted predecessor
#[derive(Debug, Clone)]
pub struct Checksum {
    prefix: String,
    path: PathBuf,
    value: i64,
}

impl Checksum {
    /// Bind a computed `value` to the checksum file for `prefix` in `dir`.
    pub fn new(prefix: impl Into<String>, dir: impl AsRef<Path>, value: i64) -> Self {
        let prefix = prefix.into();
        let path = dir
            .as_ref()
            .join(format!("{}.{}", prefix, FILE_EXTENSION));
        Self {
            prefix,
            path,
            value,
        }
    }

    /// The persisted file this checksum compares against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// This run's computed value.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Read the persisted value; `Ok(None)` when no previous run recorded
    /// one. An unparsable file is an error rather than a silent rebuild.
    pub fn stored(&self) -> Result<Option<i64>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StageError::Io(e)),
        };
        let value = content
            .trim()
            .parse::<i64>()
            .map_err(|e| StageError::Checksum {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(value))
    }

    /// True when the computed value equals the persisted one, meaning the
    /// caller may skip its job for this run.
    pub fn matches(&self) -> Result<bool> {
        Ok(self.stored()? == Some(self.value))
    }

    /// Persist the computed value. Call only after a successful full run:
    /// a failed job must leave its checksum unmodified so the next run
    /// cannot mistake the failure for freshness.
    pub fn update(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{}\n", self.value))?;
        info!(prefix = %self.prefix, value = self.value, "checksum updated");
        Ok(())
    }
}

/// Several checksums gating one job as a unit
#[derive(Debug, Clone, Default)]
pub struct ChecksumGroup {
    members: Vec<Checksum>,
}

impl ChecksumGroup {
    pub fn new(members: Vec<Checksum>) -> Self {
        Self { members }
    }

    pub fn push(&mut self, checksum: Checksum) {
        self.members.push(checksum);
    }

    /// True only when every member matches its persisted value.
    pub fn matches(&self) -> Result<bool> {
        for member in &self.members {
            if !member.matches()? {
                return Ok(false);
            }
        }
        Ok(!self.members.is_empty())
    }

    /// Persist every member's value. There is no partial-group update:
    /// skip decisions stay all-or-nothing.
    pub fn update(&self) -> Result<()> {
        for member in &self.members {
            member.update()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(values: &[Value]) -> Vec<Value> {
        values.to_vec()
    }

    #[test]
    fn test_row_hash_distinguishes_null_empty_and_zero() {
        let null = hash_row(&row(&[Value::Null]));
        let empty = hash_row(&row(&[Value::Text(String::new())]));
        let zero = hash_row(&row(&[Value::Int(0)]));
        assert_ne!(null, empty);
        assert_ne!(null, zero);
        assert_ne!(empty, zero);
    }

    #[test]
    fn test_accumulator_is_fold_boundary_independent() {
        let rows: Vec<Vec<Value>> = (0..100)
            .map(|i| row(&[Value::Int(i), Value::Text(format!("sym{}", i))]))
            .collect();

        // Fold all at once vs in arbitrary partial sums.
        let all: u64 = rows.iter().fold(0u64, |acc, r| acc.wrapping_add(hash_row(r)));
        for split in [1, 7, 50, 99] {
            let (a, b) = rows.split_at(split);
            let partial = a.iter().fold(0u64, |acc, r| acc.wrapping_add(hash_row(r)));
            let total = b
                .iter()
                .fold(partial, |acc, r| acc.wrapping_add(hash_row(r)));
            assert_eq!(total, all);
        }
    }

    #[test]
    fn test_single_value_change_changes_hash() {
        let before = hash_row(&row(&[Value::Int(5), Value::Text("Kit".into())]));
        let after = hash_row(&row(&[Value::Int(5), Value::Text("Kim".into())]));
        assert_ne!(before, after);
    }

    #[test]
    fn test_stored_is_none_before_first_update() {
        let dir = tempfile::tempdir().unwrap();
        let checksum = Checksum::new("markers", dir.path(), 42);
        assert_eq!(checksum.stored().unwrap(), None);
        assert!(!checksum.matches().unwrap());
    }

    #[test]
    fn test_update_then_match() {
        let dir = tempfile::tempdir().unwrap();
        let checksum = Checksum::new("markers", dir.path(), 42);
        checksum.update().unwrap();

        assert_eq!(checksum.stored().unwrap(), Some(42));
        assert!(checksum.matches().unwrap());

        // A different computed value against the same file must not match.
        let changed = Checksum::new("markers", dir.path(), 43);
        assert!(!changed.matches().unwrap());
    }

    #[test]
    fn test_garbage_checksum_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let checksum = Checksum::new("markers", dir.path(), 1);
        std::fs::write(checksum.path(), "not a number\n").unwrap();
        assert!(matches!(
            checksum.stored(),
            Err(StageError::Checksum { .. })
        ));
    }

    #[test]
    fn test_group_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = Checksum::new("a", dir.path(), 1);
        let b = Checksum::new("b", dir.path(), 2);
        let group = ChecksumGroup::new(vec![a.clone(), b.clone()]);

        assert!(!group.matches().unwrap());

        a.update().unwrap();
        // One member stale: the group must not report a match.
        assert!(!group.matches().unwrap());

        group.update().unwrap();
        assert!(group.matches().unwrap());
    }

    #[test]
    fn test_empty_group_never_matches() {
        assert!(!ChecksumGroup::default().matches().unwrap());
    }
}
