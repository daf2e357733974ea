//! End-to-end engine tests against an in-memory SQLite backend
//!
//! These exercise the real extraction path: backend adapter → gatherer →
//! bulk writer → staged file on disk, plus the checksum gate over live
//! query results. SQLite keeps the whole suite self-contained.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use flatstage_core::backend::{self, BackendKind, QueryBackend};
use flatstage_core::config::DatabaseConfig;
use flatstage_core::gatherer::{Gatherer, RefreshMode, SqlTemplate};
use flatstage_core::lookup::LookupCache;
use flatstage_core::writer::{BulkWriter, OutputField, FIELD_DELIMITER, RECORD_TERMINATOR};
use flatstage_core::{checksum, ResultSet, Value};
use flatstage_common::Result;
use std::sync::Arc;

/// Connect an in-memory database and seed a small marker table.
///
/// The pool is pinned to one connection; separate connections would each
/// see their own empty `:memory:` database.
async fn seeded_backend() -> Arc<dyn QueryBackend> {
    let config = DatabaseConfig {
        backend: BackendKind::Sqlite,
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout_secs: 5,
    };
    let backend = backend::connect(&config).await.unwrap();

    backend
        .run("CREATE TABLE marker (marker_key INTEGER PRIMARY KEY, symbol TEXT, name TEXT)")
        .await
        .unwrap();
    backend
        .run(
            "INSERT INTO marker (marker_key, symbol, name) VALUES \
             (1, 'Kit', 'KIT proto-oncogene'), \
             (2, 'Pax6', 'paired box 6'), \
             (4, 'Trp53', 'transformation related protein 53'), \
             (7, 'Bmp4', NULL), \
             (9, 'Sox2', 'SRY-box 2')",
        )
        .await
        .unwrap();

    backend
}

fn passthrough() -> impl FnMut(&[ResultSet]) -> Result<Vec<Vec<Value>>> + Send {
    |chunk: &[ResultSet]| Ok(chunk[0].rows.clone())
}

#[tokio::test]
async fn adapter_decodes_typed_rows_and_nulls() {
    let backend = seeded_backend().await;

    let results = backend
        .execute("SELECT marker_key, symbol, name FROM marker ORDER BY marker_key")
        .await
        .unwrap();

    assert_eq!(results.columns, vec!["marker_key", "symbol", "name"]);
    assert_eq!(results.len(), 5);
    assert_eq!(results.rows[0][0], Value::Int(1));
    assert_eq!(results.rows[0][1], Value::Text("Kit".into()));
    // The NULL name decodes as Null, not as an empty string.
    assert_eq!(results.rows[3][2], Value::Null);
}

#[tokio::test]
async fn adapter_reports_columns_for_empty_results() {
    let backend = seeded_backend().await;

    let results = backend
        .execute("SELECT marker_key, symbol FROM marker WHERE marker_key > 999")
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(results.columns, vec!["marker_key", "symbol"]);
    assert_eq!(results.column_number("SYMBOL").unwrap(), 1);
}

#[tokio::test]
async fn adapter_merges_differently_ordered_results() {
    let backend = seeded_backend().await;

    let mut first = backend
        .execute("SELECT marker_key, symbol FROM marker WHERE marker_key < 4 ORDER BY marker_key")
        .await
        .unwrap();
    let second = backend
        .execute("SELECT symbol, marker_key FROM marker WHERE marker_key > 4 ORDER BY marker_key")
        .await
        .unwrap();

    first.merge(second).unwrap();

    assert_eq!(first.columns, vec!["marker_key", "symbol"]);
    assert_eq!(first.len(), 4);
    assert_eq!(first.rows[2], vec![Value::Int(7), Value::Text("Bmp4".into())]);
}

#[tokio::test]
async fn chunked_run_stages_all_rows_in_key_order() {
    let backend = seeded_backend().await;
    let dir = tempfile::tempdir().unwrap();

    let job = Gatherer::new(
        "marker",
        backend,
        "marker_key",
        vec![SqlTemplate::new(
            "primary",
            "SELECT marker_key, symbol, name FROM marker \
             WHERE marker_key >= {lo} AND marker_key < {hi} ORDER BY marker_key",
        )],
    )
    .unwrap()
    .with_chunk_size(3)
    .with_range_queries(
        "SELECT MIN(marker_key) FROM marker".to_string(),
        Some("SELECT MAX(marker_key) FROM marker".to_string()),
    );

    let mut writer = BulkWriter::new(dir.path()).unwrap();
    let file = writer
        .create_file(
            "marker",
            &["marker_key", "symbol", "name"],
            &[
                OutputField::Auto,
                OutputField::column("marker_key"),
                OutputField::column("symbol"),
                OutputField::column("name"),
            ],
            100,
        )
        .unwrap();

    let mut collate = passthrough();
    let stats = job.run(&mut collate, &mut writer, file).await.unwrap();

    // Keys 1..=9 with chunk size 3: [1,4) [4,7) [7,10).
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.rows, 5);

    let path = writer.path(file).unwrap().to_path_buf();
    writer.close_all().unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|l| l.ends_with(RECORD_TERMINATOR)));

    // AUTO keys run 1..=5 across chunk boundaries; source keys ascend.
    let first_fields: Vec<&str> = lines[0].split(FIELD_DELIMITER).collect();
    assert_eq!(first_fields[0], "1");
    assert_eq!(first_fields[1], "1");
    assert_eq!(first_fields[2], "Kit");
    let last_fields: Vec<&str> = lines[4].split(FIELD_DELIMITER).collect();
    assert_eq!(last_fields[0], "5");
    assert_eq!(last_fields[1], "9");

    // Bmp4's NULL name serialized as an empty field.
    let bmp4: Vec<&str> = lines[3]
        .strip_suffix(RECORD_TERMINATOR)
        .unwrap()
        .split(FIELD_DELIMITER)
        .collect();
    assert_eq!(bmp4[2], "Bmp4");
    assert_eq!(bmp4[3], "");
}

#[tokio::test]
async fn empty_source_stages_nothing() {
    let backend = seeded_backend().await;
    backend.run("DELETE FROM marker").await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let job = Gatherer::new(
        "marker",
        backend,
        "marker_key",
        vec![SqlTemplate::new(
            "primary",
            "SELECT marker_key FROM marker WHERE marker_key >= {lo} AND marker_key < {hi}",
        )],
    )
    .unwrap()
    .with_range_queries(
        "SELECT MIN(marker_key) FROM marker".to_string(),
        Some("SELECT MAX(marker_key) FROM marker".to_string()),
    );

    let mut writer = BulkWriter::new(dir.path()).unwrap();
    let file = writer
        .create_file("marker", &["marker_key"], &[OutputField::column("marker_key")], 10)
        .unwrap();

    let mut collate = passthrough();
    let stats = job.run(&mut collate, &mut writer, file).await.unwrap();
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.rows, 0);
}

#[tokio::test]
async fn open_range_mode_stops_on_first_empty_chunk() {
    let backend = seeded_backend().await;
    let dir = tempfile::tempdir().unwrap();

    let job = Gatherer::new(
        "marker",
        backend,
        "marker_key",
        vec![SqlTemplate::new(
            "primary",
            "SELECT marker_key, symbol FROM marker \
             WHERE marker_key >= {lo} AND marker_key < {hi} ORDER BY marker_key",
        )],
    )
    .unwrap()
    .with_chunk_size(5)
    .with_range_queries("SELECT MIN(marker_key) FROM marker".to_string(), None);

    let mut writer = BulkWriter::new(dir.path()).unwrap();
    let file = writer
        .create_file(
            "marker",
            &["marker_key", "symbol"],
            &[OutputField::column("symbol")],
            10,
        )
        .unwrap();

    let mut collate = passthrough();
    let stats = job.run(&mut collate, &mut writer, file).await.unwrap();

    // [1,6) and [6,11) carry rows; [11,16) is empty and terminates.
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.rows, 5);
}

#[tokio::test]
async fn refresh_by_key_stages_one_slice() {
    let backend = seeded_backend().await;
    let dir = tempfile::tempdir().unwrap();

    let job = Gatherer::new(
        "marker",
        backend,
        "marker_key",
        vec![SqlTemplate::new(
            "primary",
            "SELECT marker_key, symbol FROM marker WHERE {filter} ORDER BY marker_key",
        )],
    )
    .unwrap();

    let mut writer = BulkWriter::new(dir.path()).unwrap();
    let file = writer
        .create_file(
            "marker",
            &["marker_key", "symbol"],
            &[
                OutputField::column("marker_key"),
                OutputField::column("symbol"),
            ],
            10,
        )
        .unwrap();

    let mut collate = passthrough();
    let stats = job
        .run_once(
            &RefreshMode::by_key("marker_key", 4),
            &mut collate,
            &mut writer,
            file,
        )
        .await
        .unwrap();
    assert_eq!(stats.rows, 1);

    let path = writer.path(file).unwrap().to_path_buf();
    writer.close_all().unwrap();
    assert_eq!(
        std::fs::read_to_string(path).unwrap(),
        "4&=&Trp53#=#\n"
    );
}

#[tokio::test]
async fn full_rebuild_single_shot_stages_everything() {
    let backend = seeded_backend().await;
    let dir = tempfile::tempdir().unwrap();

    let job = Gatherer::new(
        "marker",
        backend,
        "marker_key",
        vec![SqlTemplate::new(
            "primary",
            "SELECT marker_key, symbol FROM marker WHERE {filter} ORDER BY marker_key",
        )],
    )
    .unwrap();

    let mut writer = BulkWriter::new(dir.path()).unwrap();
    let file = writer
        .create_file(
            "marker",
            &["marker_key", "symbol"],
            &[OutputField::column("symbol")],
            10,
        )
        .unwrap();

    let mut collate = passthrough();
    let stats = job
        .run_once(&RefreshMode::FullRebuild, &mut collate, &mut writer, file)
        .await
        .unwrap();
    assert_eq!(stats.rows, 5);
}

#[tokio::test]
async fn checksum_gate_skips_unchanged_and_catches_changes() {
    let backend = seeded_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let sql = "SELECT marker_key, symbol, name FROM marker ORDER BY marker_key";

    let first = checksum::hash_results(backend.as_ref(), sql).await.unwrap();
    let second = checksum::hash_results(backend.as_ref(), sql).await.unwrap();
    assert_eq!(first, second);

    let gate = checksum::Checksum::new("marker", dir.path(), first);
    assert!(!gate.matches().unwrap());
    gate.update().unwrap();
    assert!(gate.matches().unwrap());

    backend
        .run("UPDATE marker SET symbol = 'Kitl' WHERE marker_key = 1")
        .await
        .unwrap();
    let changed = checksum::hash_results(backend.as_ref(), sql).await.unwrap();
    assert_ne!(first, changed);

    let stale = checksum::Checksum::new("marker", dir.path(), changed);
    assert!(!stale.matches().unwrap());
}

#[tokio::test]
async fn single_count_reads_a_scalar() {
    let backend = seeded_backend().await;
    let count = checksum::single_count(backend.as_ref(), "SELECT COUNT(*) FROM marker")
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn lookup_cache_loads_once_and_resolves() {
    let backend = seeded_backend().await;
    let cache = LookupCache::load(
        backend.as_ref(),
        "symbols",
        "SELECT marker_key, symbol FROM marker",
        "marker_key",
        "symbol",
    )
    .await
    .unwrap();

    assert_eq!(cache.len(), 5);
    assert_eq!(cache.get("2"), Some("Pax6"));
    assert_eq!(cache.get("3"), None);
}

#[tokio::test]
async fn source_failure_propagates_unmodified() {
    let backend = seeded_backend().await;
    let err = backend.execute("SELECT nope FROM does_not_exist").await;
    assert!(err.is_err());
}
