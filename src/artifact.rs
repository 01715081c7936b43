//! CSV artifacts.
//!
//! Compiled artifacts grow by appending batches under a fixed header.
//! Canonical and projected outputs are written once as whole tables.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CohortError, Result};
use crate::table::{FlatRow, Table};

/// An append-only CSV whose header is locked at first write.
///
/// Appending takes `&mut self`; one artifact has exactly one writer.
#[derive(Debug)]
pub struct CompiledArtifact {
    path: PathBuf,
    columns: Vec<String>,
    rows_written: usize,
}

impl CompiledArtifact {
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            columns,
            rows_written: 0,
        }
    }

    /// Rows appended through this handle.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append `rows` in exactly the artifact's column order.
    ///
    /// Missing columns are written as empty cells and keys outside the
    /// schema are dropped. An empty batch does not touch the file.
    pub fn append(&mut self, rows: &[FlatRow]) -> Result<usize> {
        if rows.is_empty() {
            info!(path = %self.path.display(), "Nothing to append (empty batch)");
            return Ok(0);
        }

        ensure_parent(&self.path)?;

        let has_header = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if has_header {
            self.verify_header()?;
        }

        if let Some(first) = rows.first() {
            let missing: Vec<&str> = self
                .columns
                .iter()
                .map(String::as_str)
                .filter(|c| !first.contains_key(c))
                .collect();
            if !missing.is_empty() {
                debug!(path = %self.path.display(), ?missing, "Batch lacks schema columns");
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !has_header {
            wtr.write_record(&self.columns)?;
        }
        for row in rows {
            wtr.write_record(row.project(&self.columns).map(|c| c.unwrap_or("")))?;
        }
        wtr.flush()?;

        self.rows_written += rows.len();
        Ok(rows.len())
    }

    fn verify_header(&self) -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let headers = rdr.headers()?;

        if headers.iter().ne(self.columns.iter().map(String::as_str)) {
            return Err(CohortError::SchemaMismatch {
                path: self.path.clone(),
                expected: self.columns.len(),
                found: headers.len(),
            });
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read a whole CSV artifact. Empty cells become nulls.
///
/// Ragged rows are an error; the artifact is malformed.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let columns: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    let mut table = Table::new(columns);

    for record in rdr.records() {
        let record = record?;
        let mut row = FlatRow::new();
        for (column, value) in table.columns.iter().zip(record.iter()) {
            if value.is_empty() {
                row.set_null(column.as_str());
            } else {
                row.set(column.as_str(), value);
            }
        }
        table.rows.push(row);
    }

    Ok(table)
}

/// Write `table` to `path`, replacing any previous file.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    ensure_parent(path)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    wtr.write_record(&table.columns)?;
    for row in &table.rows {
        wtr.write_record(row.project(&table.columns).map(|c| c.unwrap_or("")))?;
    }
    wtr.flush()?;

    debug!(path = %path.display(), rows = table.len(), "Wrote table");
    Ok(())
}
