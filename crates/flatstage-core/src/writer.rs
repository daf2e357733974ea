//! Bulk-copy output writer
//!
//! A factory for many concurrently open staged output files. Rows are
//! buffered per file and flushed whenever a file's buffer reaches its
//! cache size, so peak memory stays flat no matter how many rows a job
//! produces. Files are created at job start, appended to across all
//! chunks, and closed exactly once at job end.
//!
//! # Wire format
//!
//! One record per line: fields joined by [`FIELD_DELIMITER`], each record
//! terminated by [`RECORD_TERMINATOR`] immediately before the newline.
//! NULL serializes as an empty field. An [`OutputField::Auto`] column is
//! replaced by a per-file 1-based monotonic integer. The delimiter and
//! terminator are sequences that must never occur inside a data value; the
//! record cleaner downstream depends on their being unambiguous.

use crate::value::Value;
use flatstage_common::{Result, StageError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Private field separator of the staged flat-file format.
pub const FIELD_DELIMITER: &str = "&=&";

/// Private record terminator; written immediately before each newline.
pub const RECORD_TERMINATOR: &str = "#=#";

/// Extension used for staged output files.
pub const FILE_EXTENSION: &str = "bcp";

/// One slot of an output file's field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputField {
    /// Emit the per-file monotonic counter instead of a source value
    Auto,
    /// Emit the named input column
    Column(String),
}

impl OutputField {
    /// Shorthand for a named column
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }
}

/// Handle to one registered output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(usize);

enum Slot {
    Auto,
    Input(usize),
}

struct BulkFile {
    name: String,
    path: PathBuf,
    out: BufWriter<File>,
    slots: Vec<Slot>,
    input_width: usize,
    cache_size: usize,
    buffer: Vec<Vec<Value>>,
    appended: u64,
}

impl BulkFile {
    /// Serialize and write every buffered row, clearing the buffer.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // Ordinal of the first buffered row within the whole file.
        let base = self.appended - self.buffer.len() as u64;
        for (i, row) in self.buffer.drain(..).enumerate() {
            let auto_key = (base + i as u64 + 1).to_string();
            let mut record = String::new();
            for (slot_idx, slot) in self.slots.iter().enumerate() {
                if slot_idx > 0 {
                    record.push_str(FIELD_DELIMITER);
                }
                match slot {
                    Slot::Auto => record.push_str(&auto_key),
                    Slot::Input(col) => record.push_str(&row[*col].to_string()),
                }
            }
            record.push_str(RECORD_TERMINATOR);
            record.push('\n');
            self.out.write_all(record.as_bytes())?;
        }
        // The cache bound promises rows leave memory here, not at close.
        self.out.flush()?;
        debug!(file = %self.name, rows = self.appended, "buffer flushed");
        Ok(())
    }
}

/// Caching multi-file output factory
pub struct BulkWriter {
    out_dir: PathBuf,
    files: Vec<BulkFile>,
    closed: bool,
}

impl BulkWriter {
    /// Create a writer rooted at `out_dir`, creating the directory if needed.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self {
            out_dir,
            files: Vec::new(),
            closed: false,
        })
    }

    /// Register a new logical output stream.
    ///
    /// `output_fields` may reorder, omit, or duplicate names from
    /// `input_fields`, and may include [`OutputField::Auto`] slots. Every
    /// named output field must resolve against `input_fields` (exact match
    /// first, then case-insensitive); otherwise this is a schema error.
    /// The input field count fixes the column count every later batch must
    /// match.
    pub fn create_file(
        &mut self,
        name: &str,
        input_fields: &[&str],
        output_fields: &[OutputField],
        cache_size: usize,
    ) -> Result<FileId> {
        if self.closed {
            return Err(StageError::closed("bulk writer"));
        }

        let slots = output_fields
            .iter()
            .map(|field| match field {
                OutputField::Auto => Ok(Slot::Auto),
                OutputField::Column(name) => resolve_input(input_fields, name).map(Slot::Input),
            })
            .collect::<Result<Vec<Slot>>>()?;

        let path = self.out_dir.join(format!("{}.{}", name, FILE_EXTENSION));
        let out = BufWriter::new(File::create(&path)?);
        info!(file = name, path = %path.display(), "output file created");

        self.files.push(BulkFile {
            name: name.to_string(),
            path,
            out,
            slots,
            input_width: input_fields.len(),
            cache_size: cache_size.max(1),
            buffer: Vec::new(),
            appended: 0,
        });
        Ok(FileId(self.files.len() - 1))
    }

    /// Append one row; see [`BulkWriter::add_rows`].
    pub fn add_row(&mut self, id: FileId, row: Vec<Value>) -> Result<()> {
        self.add_rows(id, vec![row])
    }

    /// Append a batch of rows to a file, flushing its buffer whenever the
    /// cache size is reached.
    ///
    /// The whole batch is shape-checked against the file's established
    /// column count before any row is buffered, so a mismatched batch
    /// reports an error without corrupting the file.
    pub fn add_rows(&mut self, id: FileId, rows: Vec<Vec<Value>>) -> Result<()> {
        if self.closed {
            return Err(StageError::closed("bulk writer"));
        }
        let file = self.file_mut(id)?;

        for row in &rows {
            if row.len() != file.input_width {
                return Err(StageError::ColumnCountMismatch {
                    file: file.name.clone(),
                    expected: file.input_width,
                    actual: row.len(),
                });
            }
        }

        for row in rows {
            file.buffer.push(row);
            file.appended += 1;
            if file.buffer.len() >= file.cache_size {
                file.flush_buffer()?;
            }
        }
        Ok(())
    }

    /// Total rows appended to a file so far (buffered rows included).
    pub fn row_count(&self, id: FileId) -> Result<u64> {
        Ok(self.file_ref(id)?.appended)
    }

    /// On-disk path of a registered file.
    pub fn path(&self, id: FileId) -> Result<&Path> {
        Ok(self.file_ref(id)?.path.as_path())
    }

    /// Flush every open file's remaining buffer and close all handles.
    ///
    /// Appending rows, or closing again, after this is a lifecycle error.
    pub fn close_all(&mut self) -> Result<()> {
        if self.closed {
            return Err(StageError::closed("bulk writer"));
        }
        for file in &mut self.files {
            file.flush_buffer()?;
            file.out.flush()?;
            info!(file = %file.name, rows = file.appended, "output file closed");
        }
        self.closed = true;
        Ok(())
    }

    fn file_mut(&mut self, id: FileId) -> Result<&mut BulkFile> {
        self.files
            .get_mut(id.0)
            .ok_or_else(|| StageError::config(format!("unknown output file id {}", id.0)))
    }

    fn file_ref(&self, id: FileId) -> Result<&BulkFile> {
        self.files
            .get(id.0)
            .ok_or_else(|| StageError::config(format!("unknown output file id {}", id.0)))
    }
}

fn resolve_input(input_fields: &[&str], name: &str) -> Result<usize> {
    if let Some(idx) = input_fields.iter().position(|c| *c == name) {
        return Ok(idx);
    }
    if let Some(idx) = input_fields
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
    {
        return Ok(idx);
    }
    let available: Vec<String> = input_fields.iter().map(|s| s.to_string()).collect();
    Err(StageError::missing_column(name, &available))
}
