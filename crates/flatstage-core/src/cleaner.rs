//! Record repair for raw bulk-copy streams
//!
//! Sits between a bulk-copy producer and a bulk-load consumer. The
//! producer may split one logical record across several physical lines and
//! may embed literal tabs, newlines, and control characters inside field
//! values; the consumer expects exactly one physical line per logical
//! record with no unescaped tabs or newlines. The cleaner walks the stream
//! one physical line at a time:
//!
//! 1. Strip the trailing newline.
//! 2. Delete every character outside the allow-list (alphanumerics, space,
//!    and a fixed punctuation set). A literal TAB is the exception: it
//!    escapes to backslash-TAB instead of being deleted.
//! 3. A cleaned line ending with the record terminator completes the
//!    accumulated record (terminator stripped).
//! 4. Any other line is a continuation: its line break is data, preserved
//!    as a backslash-newline escape.
//!
//! A stream ending with a non-empty buffer means the producer failed to
//! terminate its last record; that record is emitted anyway and logged as
//! an anomaly rather than being dropped.

use crate::writer::RECORD_TERMINATOR;
use flatstage_common::{Result, StageError};
use std::io::{BufRead, Write};
use tracing::warn;

/// Punctuation characters that survive cleaning.
const ALLOWED_PUNCT: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

/// Counters reported by [`clean_stream`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    /// Physical input lines consumed
    pub lines_in: u64,
    /// Logical records emitted
    pub records_out: u64,
    /// Disallowed characters deleted
    pub chars_dropped: u64,
}

/// Streaming reassembler of logical records from physical lines
#[derive(Debug, Default)]
pub struct RecordCleaner {
    buffer: String,
    stats: CleanStats,
    finished: bool,
}

impl RecordCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> CleanStats {
        self.stats
    }

    /// Feed one physical line; returns a completed logical record when the
    /// line carried the record terminator.
    pub fn push_line(&mut self, line: &str) -> Result<Option<String>> {
        if self.finished {
            return Err(StageError::closed("record cleaner"));
        }
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.stats.lines_in += 1;

        let cleaned = self.clean_chars(line);
        match cleaned.strip_suffix(RECORD_TERMINATOR) {
            Some(body) => {
                let mut record = std::mem::take(&mut self.buffer);
                record.push_str(body);
                self.stats.records_out += 1;
                Ok(Some(record))
            },
            None => {
                // Continuation: the physical break is record-internal data.
                self.buffer.push_str(&cleaned);
                self.buffer.push('\\');
                self.buffer.push('\n');
                Ok(None)
            },
        }
    }

    /// Signal end of input.
    ///
    /// A non-empty buffer at this point is an upstream anomaly (the
    /// producer never terminated its last record); the partial record is
    /// emitted rather than dropped, minus the trailing continuation escape
    /// that never belonged to the data.
    pub fn finish(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Err(StageError::closed("record cleaner"));
        }
        self.finished = true;

        if self.buffer.is_empty() {
            return Ok(None);
        }
        let record = std::mem::take(&mut self.buffer);
        let record = record.strip_suffix("\\\n").unwrap_or(&record).to_string();
        warn!(
            lines_in = self.stats.lines_in,
            "input ended without a record terminator; emitting trailing partial record"
        );
        self.stats.records_out += 1;
        Ok(Some(record))
    }

    fn clean_chars(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        for c in line.chars() {
            if c == '\t' {
                // Escaped, not deleted: tabs are data to the consumer.
                out.push('\\');
                out.push('\t');
            } else if c == ' ' || c.is_alphanumeric() || ALLOWED_PUNCT.contains(c) {
                out.push(c);
            } else {
                self.stats.chars_dropped += 1;
            }
        }
        out
    }
}

/// Drive a whole stream through a [`RecordCleaner`], one output line per
/// logical record.
pub fn clean_stream<R: BufRead, W: Write>(reader: R, writer: &mut W) -> Result<CleanStats> {
    let mut cleaner = RecordCleaner::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(record) = cleaner.push_line(&line)? {
            writer.write_all(record.as_bytes())?;
            writer.write_all(b"\n")?;
        }
    }
    if let Some(record) = cleaner.finish()? {
        writer.write_all(record.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(cleaner.stats())
}
