//! Run one pipeline over every CSV log in a directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info};
use rayon::prelude::*;
use regex::Regex;
use thiserror::Error;

use super::{PipelineKind, Report};
use crate::config::{JobConfig, PipelineConfig};

/// Errors that can occur while preparing a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to read directory {folder}: {source}")]
    ReadDir {
        folder: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No CSV files found in {folder}")]
    NoFilesFound { folder: PathBuf },

    #[error("Invalid file name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Per-file results of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<Report>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Work item for parallel batch runs.
#[derive(Debug, Clone)]
struct BatchTask {
    src: PathBuf,
    dest: PathBuf,
}

/// CSV files directly inside `folder`, sorted by name.
pub fn find_input_files(folder: &Path) -> std::result::Result<Vec<PathBuf>, BatchError> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .map_err(|source| BatchError::ReadDir {
            folder: folder.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();

    if files.is_empty() {
        return Err(BatchError::NoFilesFound {
            folder: folder.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

/// Output file name for an input log.
///
/// Loggers name files after the run date (`20260213_shock.csv`); the
/// 8-digit stamp gives `<kind>_20260213.<ext>`. Names without a stamp keep
/// the input stem.
pub fn dated_output_name(input: &Path, kind: PipelineKind) -> std::result::Result<String, BatchError> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let date_pattern = Regex::new(r"(?:^|\D)(\d{8})(?:\D|$)")?;

    let tag = date_pattern
        .captures(&stem)
        .and_then(|caps| caps.get(1))
        .map_or(stem.as_str(), |m| m.as_str())
        .to_string();

    Ok(format!("{}_{}.{}", kind.name(), tag, kind.extension()))
}

fn plan_tasks(
    files: &[PathBuf],
    output_dir: &Path,
    kind: PipelineKind,
) -> std::result::Result<Vec<BatchTask>, BatchError> {
    let mut used: HashSet<String> = HashSet::with_capacity(files.len());
    let mut tasks = Vec::with_capacity(files.len());

    for src in files {
        let mut name = dated_output_name(src, kind)?;
        if !used.insert(name.clone()) {
            // several logs from the same day
            let stem = src
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            name = format!("{}_{}.{}", kind.name(), stem, kind.extension());
            used.insert(name.clone());
        }
        tasks.push(BatchTask {
            src: src.clone(),
            dest: output_dir.join(name),
        });
    }

    Ok(tasks)
}

/// Run `kind` over every CSV in `input_dir`, in parallel.
///
/// # Arguments
///
/// * `kind` - Pipeline to run
/// * `input_dir` - Directory containing the CSV logs
/// * `output_dir` - Directory receiving one artifact per log
/// * `limit` - Maximum number of files to process (None for all)
/// * `template` - Per-run overrides (threshold, zoom, color scheme); its
///   paths are replaced for every file
/// * `config` - Pipeline configuration
/// * `on_done` - Called once per finished file
///
/// A failing file is recorded in the outcome and does not stop the batch.
pub fn run_batch<F>(
    kind: PipelineKind,
    input_dir: &Path,
    output_dir: &Path,
    limit: Option<usize>,
    template: &JobConfig,
    config: &PipelineConfig,
    on_done: F,
) -> Result<BatchOutcome>
where
    F: Fn() + Sync,
{
    let mut files = find_input_files(input_dir)?;
    files.truncate(limit.unwrap_or(usize::MAX));
    let tasks = plan_tasks(&files, output_dir, kind)?;
    info!("Running {} pipeline over {} files", kind, tasks.len());

    let results: Vec<(BatchTask, Result<Report>)> = tasks
        .into_par_iter()
        .map(|task| {
            let job = JobConfig {
                input_path: task.src.clone(),
                output_path: task.dest.clone(),
                ..template.clone()
            };
            let result = kind.run(&job, config);
            on_done();
            (task, result)
        })
        .collect();

    let mut outcome = BatchOutcome::default();
    for (task, result) in results {
        match result {
            Ok(report) => {
                info!(
                    "{} -> {} ({} of {} samples)",
                    task.src.file_name().unwrap_or_default().to_string_lossy(),
                    task.dest.display(),
                    report.retained_rows,
                    report.input_rows
                );
                outcome.succeeded.push(report);
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", task.src.display(), e);
                outcome.failed.push((task.src, format!("{:#}", e)));
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const AIR_QUALITY: &str = "Time,Lat,Lng,PM25,VOC\n\
        2026-02-02 10:00:00,30.500,114.300,12,0.2\n\
        2026-02-02 10:00:01,30.501,114.301,14,0.3\n";

    #[test]
    fn test_dated_output_name() {
        assert_eq!(
            dated_output_name(Path::new("/logs/20260213_shock.csv"), PipelineKind::Vibration).unwrap(),
            "vibration_20260213.html"
        );
        assert_eq!(
            dated_output_name(Path::new("20260122.csv"), PipelineKind::Station).unwrap(),
            "station_20260122.png"
        );
        assert_eq!(
            dated_output_name(Path::new("morning_run.csv"), PipelineKind::Heatmap).unwrap(),
            "heatmap_morning_run.html"
        );
        // nine digits is not a date stamp
        assert_eq!(
            dated_output_name(Path::new("123456789.csv"), PipelineKind::Terrain).unwrap(),
            "terrain_123456789.html"
        );
    }

    #[test]
    fn test_find_input_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.csv"), "x").unwrap();
        fs::write(dir.path().join("a.CSV"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = find_input_files(dir.path()).unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }

    #[test]
    fn test_find_input_files_empty() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_input_files(dir.path()),
            Err(BatchError::NoFilesFound { .. })
        ));
    }

    #[test]
    fn test_plan_tasks_same_day() {
        let files = vec![
            PathBuf::from("20260202_am.csv"),
            PathBuf::from("20260202_pm.csv"),
        ];
        let tasks = plan_tasks(&files, Path::new("out"), PipelineKind::Heatmap).unwrap();

        assert_eq!(tasks[0].dest, PathBuf::from("out/heatmap_20260202.html"));
        assert_eq!(tasks[1].dest, PathBuf::from("out/heatmap_20260202_pm.html"));
    }

    #[test]
    fn test_run_batch_records_failures() {
        let dir = TempDir::new().unwrap();
        let input_dir = dir.path().join("logs");
        fs::create_dir_all(&input_dir).unwrap();
        fs::write(input_dir.join("20260202.csv"), AIR_QUALITY).unwrap();
        fs::write(input_dir.join("20260203.csv"), AIR_QUALITY).unwrap();
        fs::write(input_dir.join("20260204.csv"), "Time,Lat\n").unwrap();
        let output_dir = dir.path().join("maps");

        let done = AtomicUsize::new(0);
        let outcome = run_batch(
            PipelineKind::Heatmap,
            &input_dir,
            &output_dir,
            None,
            &JobConfig::new("", ""),
            &PipelineConfig::default(),
            || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert!(output_dir.join("heatmap_20260202.html").exists());
        assert!(output_dir.join("heatmap_20260203.html").exists());
    }

    #[test]
    fn test_run_batch_limit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20260202.csv"), AIR_QUALITY).unwrap();
        fs::write(dir.path().join("20260203.csv"), AIR_QUALITY).unwrap();
        let output_dir = dir.path().join("maps");

        let outcome = run_batch(
            PipelineKind::Heatmap,
            dir.path(),
            &output_dir,
            Some(1),
            &JobConfig::new("", ""),
            &PipelineConfig::default(),
            || {},
        )
        .unwrap();

        assert_eq!(outcome.succeeded.len(), 1);
        assert!(output_dir.join("heatmap_20260202.html").exists());
        assert!(!output_dir.join("heatmap_20260203.html").exists());
    }
}
