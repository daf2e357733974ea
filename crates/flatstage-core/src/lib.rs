//! Flatstage Core Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The reusable extract-transform-stage engine: pull rows from a
//! relational source, reshape them in memory, and serialize them into a
//! delimiter-escaped flat-file format built for fast bulk loading.
//!
//! # Components
//!
//! - [`backend`]: backend-agnostic query execution (PostgreSQL, MySQL,
//!   SQLite behind one trait, selected once per process)
//! - [`gatherer`]: the chunked extraction controller and its single-shot
//!   variant, with explicit full-rebuild vs refresh-by-key modes
//! - [`writer`]: the caching multi-file bulk output writer
//! - [`cleaner`]: the streaming record repair filter between a bulk-copy
//!   producer and a bulk-load consumer
//! - [`checksum`]: the fingerprint gate that lets unchanged jobs skip
//!   re-extraction
//! - [`lookup`]: populate-once, read-only lookup caches
//!
//! # Example
//!
//! ```no_run
//! use flatstage_core::{backend, Gatherer, SqlTemplate, BulkWriter, OutputField};
//! use flatstage_core::config::StageConfig;
//! use flatstage_common::Result;
//!
//! async fn stage_markers() -> Result<()> {
//!     let config = StageConfig::load()?;
//!     let backend = backend::connect(&config.database).await?;
//!
//!     let job = Gatherer::new(
//!         "marker",
//!         backend,
//!         "_Marker_key",
//!         vec![SqlTemplate::new(
//!             "primary",
//!             "SELECT _Marker_key, symbol FROM marker \
//!              WHERE _Marker_key >= {lo} AND _Marker_key < {hi}",
//!         )],
//!     )?
//!     .with_range_queries(
//!         "SELECT MIN(_Marker_key) FROM marker".to_string(),
//!         Some("SELECT MAX(_Marker_key) FROM marker".to_string()),
//!     );
//!
//!     let mut writer = BulkWriter::new(&config.staging.data_dir)?;
//!     let file = writer.create_file(
//!         "marker",
//!         &["_Marker_key", "symbol"],
//!         &[OutputField::Auto, OutputField::column("symbol")],
//!         config.staging.cache_size,
//!     )?;
//!
//!     let mut collate = |chunk: &[flatstage_core::ResultSet]| -> Result<Vec<Vec<flatstage_core::Value>>> {
//!         Ok(chunk[0].rows.clone())
//!     };
//!     job.run(&mut collate, &mut writer, file).await?;
//!     writer.close_all()
//! }
//! ```

pub mod backend;
pub mod checksum;
pub mod chunk;
pub mod cleaner;
pub mod config;
pub mod gatherer;
pub mod lookup;
pub mod resultset;
pub mod value;
pub mod writer;

// Re-export commonly used types
pub use backend::{connect, BackendKind, QueryBackend};
pub use checksum::{hash_results, single_count, Checksum, ChecksumGroup};
pub use cleaner::{clean_stream, CleanStats, RecordCleaner};
pub use config::StageConfig;
pub use gatherer::{Collator, Gatherer, RefreshMode, RunStats, SqlTemplate};
pub use resultset::ResultSet;
pub use value::Value;
pub use writer::{BulkWriter, FileId, OutputField};
