//! Chunked extraction controller
//!
//! A gatherer is one configured extraction unit: an ordered list of SQL
//! templates, a key field, and the collation logic that turns raw chunk
//! results into final output rows. The controller walks the key domain in
//! fixed-size chunks so a multi-million-row table never materializes in
//! memory at once; each chunk's queries run to completion before the next
//! chunk begins, and rows reach the output file in chunk order.
//!
//! Templates may carry `{lo}` / `{hi}` placeholders, substituted with each
//! chunk's half-open key range; templates without placeholders run
//! unchanged once per chunk (lookup data repeated per chunk). The
//! single-shot mode instead substitutes a `{filter}` clause, which is how
//! refresh-by-key regenerates the slice of output belonging to one source
//! record.
//!
//! A mid-run query failure aborts the whole job. No partial state is
//! retained: the output file is incomplete and must be discarded by the
//! caller, and the job's checksum must not be updated.

use crate::backend::QueryBackend;
use crate::chunk::{chunks, Chunk};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::resultset::ResultSet;
use crate::value::Value;
use crate::writer::{BulkWriter, FileId};
use flatstage_common::{Result, StageError};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Placeholder substituted with a chunk's inclusive lower bound.
pub const LO_PLACEHOLDER: &str = "{lo}";

/// Placeholder substituted with a chunk's exclusive upper bound.
pub const HI_PLACEHOLDER: &str = "{hi}";

/// Placeholder substituted with the single-shot key filter clause.
pub const FILTER_PLACEHOLDER: &str = "{filter}";

/// One SQL command template inside a gatherer
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    name: String,
    sql: String,
}

impl SqlTemplate {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the template slices by key range.
    pub fn is_ranged(&self) -> bool {
        self.sql.contains(LO_PLACEHOLDER) && self.sql.contains(HI_PLACEHOLDER)
    }

    fn validate(&self) -> Result<()> {
        let has_lo = self.sql.contains(LO_PLACEHOLDER);
        let has_hi = self.sql.contains(HI_PLACEHOLDER);
        if has_lo != has_hi {
            return Err(StageError::template(format!(
                "template '{}' must use both {} and {} or neither",
                self.name, LO_PLACEHOLDER, HI_PLACEHOLDER
            )));
        }
        Ok(())
    }

    fn for_chunk(&self, chunk: Chunk) -> String {
        self.sql
            .replace(LO_PLACEHOLDER, &chunk.lo.to_string())
            .replace(HI_PLACEHOLDER, &chunk.hi.to_string())
    }

    fn for_filter(&self, clause: &str) -> String {
        self.sql.replace(FILTER_PLACEHOLDER, clause)
    }
}

/// How a single-shot run scopes its queries
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMode {
    /// Regenerate the whole output
    FullRebuild,
    /// Regenerate only the slice affected by one source record
    ByKey { field: String, value: i64 },
}

impl RefreshMode {
    pub fn by_key(field: impl Into<String>, value: i64) -> Self {
        Self::ByKey {
            field: field.into(),
            value,
        }
    }

    fn filter_clause(&self) -> String {
        match self {
            RefreshMode::FullRebuild => "1 = 1".to_string(),
            RefreshMode::ByKey { field, value } => format!("{} = {}", field, value),
        }
    }
}

/// Script-supplied collation: one chunk's result sets in, output rows out.
///
/// Rows come back in the order this callback produces them, which is the
/// order they land in the output file.
pub trait Collator: Send {
    fn collate(&mut self, chunk: &[ResultSet]) -> Result<Vec<Vec<Value>>>;
}

impl<F> Collator for F
where
    F: FnMut(&[ResultSet]) -> Result<Vec<Vec<Value>>> + Send,
{
    fn collate(&mut self, chunk: &[ResultSet]) -> Result<Vec<Vec<Value>>> {
        self(chunk)
    }
}

/// Totals reported by a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub chunks: u64,
    pub rows: u64,
}

/// One configured extraction job; immutable for the run's lifetime
pub struct Gatherer {
    name: String,
    backend: Arc<dyn QueryBackend>,
    templates: Vec<SqlTemplate>,
    key_field: String,
    chunk_size: i64,
    min_key: Option<i64>,
    max_key: Option<i64>,
    min_key_sql: Option<String>,
    max_key_sql: Option<String>,
}

impl Gatherer {
    /// Configure a gatherer over `templates`, sliced by `key_field`.
    ///
    /// The first template is the primary query; in open-range mode its
    /// empty result terminates the run.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn QueryBackend>,
        key_field: impl Into<String>,
        templates: Vec<SqlTemplate>,
    ) -> Result<Self> {
        let name = name.into();
        if templates.is_empty() {
            return Err(StageError::template(format!(
                "job '{}' needs at least one SQL template",
                name
            )));
        }
        for template in &templates {
            template.validate()?;
        }
        Ok(Self {
            name,
            backend,
            templates,
            key_field: key_field.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_key: None,
            max_key: None,
            min_key_sql: None,
            max_key_sql: None,
        })
    }

    /// Override the default chunk size for this job.
    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Supply the key bounds directly instead of querying for them.
    pub fn with_key_range(mut self, min_key: i64, max_key: i64) -> Self {
        self.min_key = Some(min_key);
        self.max_key = Some(max_key);
        self
    }

    /// Supply the two dedicated bound queries. Omitting the maximum query
    /// puts the job in open-range mode, which terminates on the first
    /// chunk whose primary query yields no rows.
    pub fn with_range_queries(
        mut self,
        min_key_sql: impl Into<String>,
        max_key_sql: Option<String>,
    ) -> Self {
        self.min_key_sql = Some(min_key_sql.into());
        self.max_key_sql = max_key_sql;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Execute the job across its whole key domain, in chunks.
    #[instrument(skip_all, fields(job = %self.name, run_id = %Uuid::new_v4()))]
    pub async fn run(
        &self,
        collator: &mut dyn Collator,
        writer: &mut BulkWriter,
        file: FileId,
    ) -> Result<RunStats> {
        let min_key = match (self.min_key, &self.min_key_sql) {
            (Some(v), _) => Some(v),
            (None, Some(sql)) => self.scalar_key(sql).await?,
            (None, None) => {
                return Err(StageError::config(format!(
                    "job '{}' has neither an explicit key range nor range queries",
                    self.name
                )))
            },
        };
        let Some(min_key) = min_key else {
            info!("source has no rows; nothing to stage");
            return Ok(RunStats::default());
        };
        let max_key = match (self.max_key, &self.max_key_sql) {
            (Some(v), _) => Some(v),
            (None, Some(sql)) => self.scalar_key(sql).await?,
            (None, None) => None,
        };

        info!(
            min_key,
            max_key = ?max_key,
            chunk_size = self.chunk_size,
            key_field = %self.key_field,
            "chunked extraction started"
        );

        let mut stats = RunStats::default();
        match max_key {
            Some(max_key) => {
                for chunk in chunks(min_key, max_key, self.chunk_size) {
                    let results = self.execute_chunk(chunk).await?;
                    self.stage_rows(collator, writer, file, &results, &mut stats)?;
                    stats.chunks += 1;
                }
            },
            None => {
                let mut lo = min_key;
                loop {
                    let chunk = Chunk {
                        lo,
                        hi: lo.saturating_add(self.chunk_size),
                    };
                    let results = self.execute_chunk(chunk).await?;
                    if results[0].is_empty() {
                        break;
                    }
                    self.stage_rows(collator, writer, file, &results, &mut stats)?;
                    stats.chunks += 1;
                    lo = chunk.hi;
                }
            },
        }

        info!(chunks = stats.chunks, rows = stats.rows, "chunked extraction finished");
        Ok(stats)
    }

    /// Execute the job once, without chunking.
    ///
    /// Every template runs exactly one time; templates carrying a
    /// `{filter}` placeholder are scoped by the refresh mode's key filter.
    #[instrument(skip_all, fields(job = %self.name, run_id = %Uuid::new_v4(), mode = ?mode))]
    pub async fn run_once(
        &self,
        mode: &RefreshMode,
        collator: &mut dyn Collator,
        writer: &mut BulkWriter,
        file: FileId,
    ) -> Result<RunStats> {
        let clause = mode.filter_clause();
        let mut results = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let sql = template.for_filter(&clause);
            debug!(template = %template.name(), "executing");
            results.push(self.backend.execute(&sql).await?);
        }

        let mut stats = RunStats::default();
        self.stage_rows(collator, writer, file, &results, &mut stats)?;
        info!(rows = stats.rows, "single-shot extraction finished");
        Ok(stats)
    }

    async fn execute_chunk(&self, chunk: Chunk) -> Result<Vec<ResultSet>> {
        debug!(lo = chunk.lo, hi = chunk.hi, "executing chunk");
        let mut results = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let sql = if template.is_ranged() {
                template.for_chunk(chunk)
            } else {
                template.sql.clone()
            };
            results.push(self.backend.execute(&sql).await?);
        }
        Ok(results)
    }

    fn stage_rows(
        &self,
        collator: &mut dyn Collator,
        writer: &mut BulkWriter,
        file: FileId,
        results: &[ResultSet],
        stats: &mut RunStats,
    ) -> Result<()> {
        let rows = collator.collate(results)?;
        stats.rows += rows.len() as u64;
        writer.add_rows(file, rows)
    }

    /// Run a bound query and read its single key, `None` when the source
    /// is empty (MIN/MAX over no rows is NULL).
    async fn scalar_key(&self, sql: &str) -> Result<Option<i64>> {
        let results = self.backend.execute(sql).await?;
        match results.rows.first().and_then(|row| row.first()) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                StageError::scalar(format!("'{}' did not return an integer key", sql))
            }),
        }
    }
}
