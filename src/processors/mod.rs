//! Data processing modules.
//!
//! Each pipeline module exposes `load`, `clean`, the pipeline-specific
//! transform or map builder, and a `run` entry point that writes one
//! artifact and returns a [`Report`].

pub mod batch;
pub mod heatmap;
pub mod outlier;
pub mod station;
pub mod terrain;
pub mod vibration;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::{JobConfig, PipelineConfig};

// Re-export key types for convenience
pub use batch::{dated_output_name, find_input_files, run_batch, BatchError, BatchOutcome};
pub use outlier::{filter_track, mad_mask, retained_indices, robust_band, Axis, Band, OutlierError};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub pipeline: &'static str,
    pub input_rows: usize,
    pub retained_rows: usize,
    pub output_path: PathBuf,
    /// Side outputs such as the processed CSV of the station pipeline.
    pub extra_outputs: Vec<PathBuf>,
}

/// The available pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Station,
    Heatmap,
    Terrain,
    Vibration,
}

impl PipelineKind {
    pub fn name(self) -> &'static str {
        match self {
            PipelineKind::Station => "station",
            PipelineKind::Heatmap => "heatmap",
            PipelineKind::Terrain => "terrain",
            PipelineKind::Vibration => "vibration",
        }
    }

    /// Extension of the main artifact.
    pub fn extension(self) -> &'static str {
        match self {
            PipelineKind::Station => "png",
            _ => "html",
        }
    }

    pub fn run(self, job: &JobConfig, config: &PipelineConfig) -> Result<Report> {
        match self {
            PipelineKind::Station => station::run(job, config),
            PipelineKind::Heatmap => heatmap::run(job, config),
            PipelineKind::Terrain => terrain::run(job, config),
            PipelineKind::Vibration => vibration::run(job, config),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reading as popup text; blank or absent readings show as `n/a`.
pub(crate) fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "n/a".to_string(),
    }
}
