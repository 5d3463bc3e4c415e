//! Configuration types for the sensing pipelines.
//!
//! Two layers:
//! - [`JobConfig`]: one pipeline invocation (input, output and the
//!   per-run overrides given on the command line)
//! - [`PipelineConfig`]: YAML file with the tuned constants of every
//!   pipeline; every field has a serde default so partial files work

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::track::Channel;
use crate::processors::outlier::{default_order, Axis};
use crate::visualization::web_map::TileProvider;
use crate::visualization::{ColorScale, VisualizationError};

/// Errors raised while reading or writing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Settings of a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// MAD threshold override.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Initial zoom override for web maps.
    #[serde(default)]
    pub zoom_level: Option<u8>,
    /// Color scheme override for panels and heat layers.
    #[serde(default)]
    pub color_scheme: Option<String>,
}

impl JobConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            threshold: None,
            zoom_level: None,
            color_scheme: None,
        }
    }

    pub fn threshold_or(&self, default: f64) -> f64 {
        self.threshold.unwrap_or(default)
    }

    pub fn zoom_or(&self, default: u8) -> u8 {
        self.zoom_level.unwrap_or(default)
    }

    /// Resolved color scheme override, if one was given.
    pub fn color_scale(&self) -> Result<Option<ColorScale>, VisualizationError> {
        self.color_scheme
            .as_deref()
            .map(ColorScale::by_name)
            .transpose()
    }
}

/// Outlier filter settings shared by every pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Columns filtered one after another; each pass sees the survivors
    /// of the previous one.
    #[serde(default = "default_order")]
    pub order: Vec<Axis>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
        }
    }
}

/// One static panel: a channel and the scale it is drawn with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    pub channel: Channel,
    pub color_scheme: String,
}

impl PanelSpec {
    fn new(channel: Channel, color_scheme: &str) -> Self {
        Self {
            channel,
            color_scheme: color_scheme.to_string(),
        }
    }
}

/// Static multi-panel station map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Points after resampling along the sample index
    #[serde(default = "default_station_samples")]
    pub samples: usize,

    /// Margin around the track in degrees
    #[serde(default = "default_station_pad")]
    pub pad_deg: f64,

    /// Hours added to the logged UTC times (China Standard Time)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i64,

    /// Label printed after the sampling period
    #[serde(default = "default_zone_label")]
    pub zone_label: String,

    /// MAD threshold; no position filtering when unset
    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default = "default_station_panels")]
    pub panels: Vec<PanelSpec>,

    #[serde(default = "default_station_title")]
    pub title: String,

    #[serde(default = "default_station_width")]
    pub width: u32,

    #[serde(default = "default_station_height")]
    pub height: u32,

    #[serde(default = "default_point_size")]
    pub point_size: u32,

    #[serde(default = "default_point_alpha")]
    pub alpha: f64,

    /// Titles and tick labels need system fonts
    #[serde(default = "default_true")]
    pub draw_text: bool,

    /// Write the cleaned, time-sorted samples next to the image
    #[serde(default = "default_true")]
    pub write_processed_csv: bool,
}

fn default_station_samples() -> usize {
    600
}

fn default_station_pad() -> f64 {
    0.003
}

fn default_utc_offset() -> i64 {
    8
}

fn default_zone_label() -> String {
    "CST".to_string()
}

fn default_station_panels() -> Vec<PanelSpec> {
    vec![
        PanelSpec::new(Channel::Pm25, "viridis"),
        PanelSpec::new(Channel::Pm10, "plasma"),
        PanelSpec::new(Channel::Voc, "cividis"),
        PanelSpec::new(Channel::Temperature, "coolwarm"),
        PanelSpec::new(Channel::Humidity, "ylgnbu"),
    ]
}

fn default_station_title() -> String {
    "Mobile Environmental Sensing Analysis".to_string()
}

fn default_station_width() -> u32 {
    2600
}

fn default_station_height() -> u32 {
    900
}

fn default_point_size() -> u32 {
    4
}

fn default_point_alpha() -> f64 {
    0.85
}

fn default_true() -> bool {
    true
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            samples: default_station_samples(),
            pad_deg: default_station_pad(),
            utc_offset_hours: default_utc_offset(),
            zone_label: default_zone_label(),
            threshold: None,
            panels: default_station_panels(),
            title: default_station_title(),
            width: default_station_width(),
            height: default_station_height(),
            point_size: default_point_size(),
            alpha: default_point_alpha(),
            draw_text: true,
            write_processed_csv: true,
        }
    }
}

/// Air-quality heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapConfig {
    #[serde(default = "default_heatmap_zoom")]
    pub zoom: u8,

    /// MAD threshold; no position filtering when unset
    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default = "default_heat_radius")]
    pub radius: f64,

    #[serde(default = "default_heat_blur")]
    pub blur: f64,

    #[serde(default = "default_min_opacity")]
    pub min_opacity: f64,

    /// Pixel radius of the individual point markers
    #[serde(default = "default_marker_radius")]
    pub point_radius: f64,
}

fn default_heatmap_zoom() -> u8 {
    17
}

fn default_heat_radius() -> f64 {
    15.0
}

fn default_heat_blur() -> f64 {
    10.0
}

fn default_min_opacity() -> f64 {
    0.4
}

fn default_marker_radius() -> f64 {
    2.0
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            zoom: default_heatmap_zoom(),
            threshold: None,
            radius: default_heat_radius(),
            blur: default_heat_blur(),
            min_opacity: default_min_opacity(),
            point_radius: default_marker_radius(),
        }
    }
}

/// Terrain (road gradient) map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    #[serde(default = "default_terrain_threshold")]
    pub threshold: f64,

    #[serde(default = "default_terrain_zoom")]
    pub zoom: u8,

    /// Fixes with lat or lon at or below this are dropped
    #[serde(default = "default_min_coordinate")]
    pub min_coordinate: f64,

    /// One popup marker every this many samples
    #[serde(default = "default_marker_every")]
    pub marker_every: usize,

    #[serde(default = "default_terrain_tiles")]
    pub tiles: TileProvider,
}

fn default_terrain_threshold() -> f64 {
    3.0
}

fn default_terrain_zoom() -> u8 {
    15
}

fn default_min_coordinate() -> f64 {
    1.0
}

fn default_marker_every() -> usize {
    3
}

fn default_terrain_tiles() -> TileProvider {
    TileProvider::CartoDarkMatter
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            threshold: default_terrain_threshold(),
            zoom: default_terrain_zoom(),
            min_coordinate: default_min_coordinate(),
            marker_every: default_marker_every(),
            tiles: default_terrain_tiles(),
        }
    }
}

/// Marker group of the vibration map: the strongest `fraction` of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityLevel {
    pub fraction: f64,
    pub color: String,
    pub label: String,
    /// Visible when the page opens
    #[serde(default)]
    pub show: bool,
}

/// Vibration (road roughness) map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibrationConfig {
    #[serde(default = "default_vibration_threshold")]
    pub threshold: f64,

    #[serde(default = "default_vibration_zoom")]
    pub zoom: u8,

    #[serde(default = "default_vibration_tiles")]
    pub tiles: TileProvider,

    #[serde(default = "default_levels")]
    pub levels: Vec<SeverityLevel>,

    /// Share of the strongest samples feeding the heat layer
    #[serde(default = "default_heat_fraction")]
    pub heat_fraction: f64,

    #[serde(default = "default_vibration_heat_radius")]
    pub heat_radius: f64,

    #[serde(default = "default_vibration_heat_blur")]
    pub heat_blur: f64,
}

fn default_vibration_threshold() -> f64 {
    3.5
}

fn default_vibration_zoom() -> u8 {
    16
}

fn default_vibration_tiles() -> TileProvider {
    TileProvider::CartoPositron
}

fn default_levels() -> Vec<SeverityLevel> {
    let level = |fraction: f64, color: &str, label: &str, show: bool| SeverityLevel {
        fraction,
        color: color.to_string(),
        label: label.to_string(),
        show,
    };
    vec![
        level(0.05, "#943126", "Level 1: severe impact (Top 5%)", false),
        level(0.10, "#CB4335", "Level 2: moderate vibration (Top 10%)", true),
        level(0.20, "#F39C12", "Level 3: light bumps (Top 20%)", false),
    ]
}

fn default_heat_fraction() -> f64 {
    0.15
}

fn default_vibration_heat_radius() -> f64 {
    12.0
}

fn default_vibration_heat_blur() -> f64 {
    8.0
}

impl Default for VibrationConfig {
    fn default() -> Self {
        Self {
            threshold: default_vibration_threshold(),
            zoom: default_vibration_zoom(),
            tiles: default_vibration_tiles(),
            levels: default_levels(),
            heat_fraction: default_heat_fraction(),
            heat_radius: default_vibration_heat_radius(),
            heat_blur: default_vibration_heat_blur(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub outlier: OutlierConfig,

    #[serde(default)]
    pub station: StationConfig,

    #[serde(default)]
    pub heatmap: HeatmapConfig,

    #[serde(default)]
    pub terrain: TerrainConfig,

    #[serde(default)]
    pub vibration: VibrationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
