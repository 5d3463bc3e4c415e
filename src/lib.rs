//! Map pipeline for mobile environmental and vibration sensor logs.
//!
//! This crate provides tools for:
//! - Loading CSV logs from the air station, handheld air-quality,
//!   barometric terrain and accelerometer loggers
//! - Robust MAD outlier rejection of GPS positions and signal columns
//! - Resampling, signal vector magnitude and severity ranking
//! - Static multi-panel PNG maps and interactive Leaflet web maps
//! - Parallel batch runs over a directory of logs
//!
//! # Example
//!
//! ```no_run
//! use sensing_pipeline::core::loaders::{load_track, CsvLayout};
//! use sensing_pipeline::processors::outlier::{default_order, filter_track};
//!
//! let track = load_track("20260213_shock.csv", &CsvLayout::shock()).unwrap();
//! let cleaned = filter_track(&track, &default_order(), 3.5).unwrap();
//! println!("kept {} of {} samples", cleaned.len(), track.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{JobConfig, PipelineConfig};
pub use crate::core::track::{Channel, Sample, Track};
pub use processors::{PipelineKind, Report};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
