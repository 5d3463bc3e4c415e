//! Data writers for cleaned tracks and rendered documents.
//!
//! This module provides functions for writing pipeline output:
//! - CSV with the cleaned, time-ordered samples of a track
//! - HTML documents produced by the web map renderer
//! - Row subsets of an input CSV (outlier filter survivors)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::track::Track;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
pub(crate) fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a track to CSV.
///
/// Columns are `time, lat, lon`, one column per channel (named by
/// [`Channel::column_name`](super::track::Channel::column_name)), and
/// `terrain` when any sample carries a terrain class. Times are written in
/// their parsed (offset-adjusted) form when available.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `track` - Track to write
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_track_csv(path: &Path, track: &Track) -> Result<()> {
    ensure_parent_dirs(path)?;
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();
    let with_terrain = track.samples().iter().any(|s| s.terrain.is_some());

    let mut header: Vec<String> = vec!["time".into(), "lat".into(), "lon".into()];
    header.extend(track.channels().iter().map(|c| c.column_name().to_string()));
    if with_terrain {
        header.push("terrain".into());
    }

    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for sample in track.samples() {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        row.push(sample.time.display());
        row.push(format!("{:.6}", sample.position.lat));
        row.push(format!("{:.6}", sample.position.lon));
        row.extend(sample.readings.iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        if with_terrain {
            row.push(
                sample
                    .terrain
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            );
        }

        csv_writer
            .write_record(&row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write an HTML document to disk.
pub fn write_html(path: &Path, html: &str) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    writer
        .write_all(html.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })?;

    Ok(())
}

/// Copy the rows of a CSV file whose zero-based data-row index is in `keep`.
///
/// The header row is copied when `has_headers` is set. Rows keep their
/// original order; `keep` must be ascending.
///
/// # Returns
///
/// The number of data rows written.
pub fn write_selected_rows(
    src: &Path,
    dest: &Path,
    has_headers: bool,
    keep: &[usize],
) -> Result<usize> {
    let src_str = src.display().to_string();
    let dest_str = dest.display().to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_path(src)
        .map_err(|e| WriteError::CsvError {
            path: src_str.clone(),
            source: e,
        })?;

    ensure_parent_dirs(dest)?;
    let buf_writer = create_buffered_writer(dest)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(buf_writer);

    if has_headers {
        let headers = reader.headers().map_err(|e| WriteError::CsvError {
            path: src_str.clone(),
            source: e,
        })?;
        csv_writer
            .write_record(headers)
            .map_err(|e| WriteError::CsvError {
                path: dest_str.clone(),
                source: e,
            })?;
    }

    let mut wanted = keep.iter().copied().peekable();
    let mut written = 0;
    for (i, record) in reader.records().enumerate() {
        let Some(&next) = wanted.peek() else { break };
        let record = record.map_err(|e| WriteError::CsvError {
            path: src_str.clone(),
            source: e,
        })?;
        if i == next {
            wanted.next();
            csv_writer
                .write_record(&record)
                .map_err(|e| WriteError::CsvError {
                    path: dest_str.clone(),
                    source: e,
                })?;
            written += 1;
        }
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: dest_str,
        source: e,
    })?;

    Ok(written)
}
