//! Intermediate record store: one JSON [`IssueRecord`] per line.
//!
//! Both ends stream. The writer appends line by line and the reader yields
//! records lazily, so neither holds the corpus in memory.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::IssueRecord;

pub struct RecordWriter {
    out: BufWriter<File>,
    written: usize,
}

impl RecordWriter {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        Self::open(path, false)
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn append(path: &Path) -> Result<Self> {
        Self::open(path, true)
    }

    fn open(path: &Path, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, record: &IssueRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flushes and returns the number of records written by this writer.
    pub fn finish(mut self) -> Result<usize> {
        self.out.flush()?;
        Ok(self.written)
    }
}

pub struct RecordReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl RecordReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl Iterator for RecordReader {
    /// `(line number, record)`; line numbers start at 1.
    type Item = Result<(usize, IssueRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(
                parse_line(trimmed)
                    .map(|r| (line_no, r))
                    .map_err(|e| e.at_line(line_no)),
            );
        }
    }
}

fn parse_line(line: &str) -> Result<IssueRecord> {
    let record: IssueRecord = serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
        line: None,
        source_id: source_id_hint(line),
        field: "line",
        reason: format!("is not a valid record: {}", e),
    })?;
    record.validate()?;
    Ok(record)
}

/// Best-effort id extraction so a broken line can still be traced back to
/// its issue.
fn source_id_hint(line: &str) -> Option<i64> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()?
        .get("id")?
        .as_i64()
}

/// Counts non-blank lines without parsing them.
pub fn count_records(path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}
