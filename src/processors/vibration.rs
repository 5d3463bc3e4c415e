//! Road roughness map from the accelerometer logger.
//!
//! The vibration intensity of a sample is the signal vector magnitude
//! (SVM) of its two acceleration axes. Samples are ranked by SVM and the
//! strongest shares are drawn as marker groups and a heat layer.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use super::outlier::{filter_track, Axis};
use super::Report;
use crate::config::{JobConfig, PipelineConfig, SeverityLevel, VibrationConfig};
use crate::core::loaders::{load_track, CsvLayout};
use crate::core::track::{Channel, Track};
use crate::core::transforms::{
    centroid, drop_invalid_positions, rank_descending, signal_vector_magnitude, top_fraction,
    PositionValidity,
};
use crate::core::writers::write_html;
use crate::visualization::web_map::{
    AntPath, CircleMarker, Corner, HeatLayer, LayerContent, LayerControl, Legend, LegendTheme,
    Overlay, WebMap,
};
use crate::visualization::ColorScale;

/// Acceleration axes combined into the SVM.
pub const SVM_AXES: [Channel; 2] = [Channel::AccelX, Channel::AccelY];

/// Cleaned samples with their SVM and the ranking by SVM.
#[derive(Debug, Clone)]
pub struct RankedTrack {
    pub track: Track,
    pub svm: Vec<f64>,
    /// Sample indices, strongest first
    pub ranked: Vec<usize>,
}

impl RankedTrack {
    pub fn new(track: Track) -> Self {
        let svm = signal_vector_magnitude(&track, &SVM_AXES);
        let ranked = rank_descending(&svm);
        Self { track, svm, ranked }
    }

    /// Strongest `fraction` of the samples.
    pub fn top(&self, fraction: f64) -> &[usize] {
        top_fraction(&self.ranked, fraction)
    }
}

pub fn load(path: &Path) -> Result<Track> {
    load_track(path, &CsvLayout::shock())
        .with_context(|| format!("Failed to load shock log: {}", path.display()))
}

/// Drop missing fixes and MAD-filter positions.
pub fn clean(track: &Track, threshold: f64, order: &[Axis]) -> Result<Track> {
    let located = drop_invalid_positions(track, PositionValidity::NonZero);
    Ok(filter_track(&located, order, threshold)?)
}

fn level_markers(ranked: &RankedTrack, level: &SeverityLevel) -> Vec<CircleMarker> {
    let samples = ranked.track.samples();
    ranked
        .top(level.fraction)
        .iter()
        .map(|&i| CircleMarker {
            location: [samples[i].position.lat, samples[i].position.lon],
            radius: 5.0,
            color: level.color.clone(),
            fill_color: level.color.clone(),
            fill_opacity: 0.7,
            opacity: 1.0,
            weight: 3.0,
            popup: Some(format!(
                "<div style='width:180px; font-family: sans-serif;'>\
                 <b>Vibration response</b><br><hr>\
                 <b>SVM:</b> {:.3} g<br>\
                 <b>Sample time:</b> {}<br>\
                 <b>Sensor:</b> MPU6050</div>",
                ranked.svm[i],
                samples[i].time.raw
            )),
            popup_max_width: 250,
        })
        .collect()
}

fn legend(levels: &[SeverityLevel]) -> Legend {
    Legend {
        position: Corner::BottomLeft,
        title: "MPU6050 ride analysis".to_string(),
        entries: levels
            .iter()
            .map(|l| (l.color.clone(), l.label.clone()))
            .collect(),
        note: Some("Processing: signal vector magnitude (SVM)".to_string()),
        theme: LegendTheme::Light,
    }
}

/// Build the web map: the sampling path, one marker group per severity
/// level, and a heat layer of the strongest samples weighted by SVM.
pub fn build_map(
    ranked: &RankedTrack,
    zoom: u8,
    config: &VibrationConfig,
    scale_override: Option<ColorScale>,
) -> Result<WebMap> {
    let (lat, lon) = centroid(&ranked.track).ok_or_else(|| anyhow!("no samples left to map"))?;

    let mut map = WebMap::new("Road surface anomaly analysis", [lat, lon], zoom).with_tiles(config.tiles);
    map.fullscreen = true;

    let path = AntPath {
        points: ranked
            .track
            .samples()
            .iter()
            .map(|s| [s.position.lat, s.position.lon])
            .collect(),
        color: "#5D6D7E".to_string(),
        pulse_color: "#FFFFFF".to_string(),
        weight: 3,
        delay: 1500,
        dash_array: [10, 20],
        tooltip: Some("Sampling track".to_string()),
    };
    map.add_overlay(Overlay::new("Sampling track", LayerContent::AntPaths { paths: vec![path] }));

    for level in &config.levels {
        let markers = level_markers(ranked, level);
        if markers.is_empty() {
            warn!("No samples in level '{}' ({} samples total)", level.label, ranked.track.len());
        }
        let mut overlay = Overlay::new(level.label.clone(), LayerContent::CircleMarkers { markers });
        overlay.show = level.show;
        map.add_overlay(overlay);
    }

    let samples = ranked.track.samples();
    let heat_points: Vec<[f64; 3]> = ranked
        .top(config.heat_fraction)
        .iter()
        .map(|&i| [samples[i].position.lat, samples[i].position.lon, ranked.svm[i]])
        .collect();
    let mut heat = HeatLayer {
        radius: config.heat_radius,
        blur: config.heat_blur,
        min_opacity: 0.5,
        ..HeatLayer::new(heat_points)
    };
    if let Some(scale) = scale_override {
        heat = heat.with_gradient(&scale.hex_stops());
    }
    map.add_overlay(Overlay::new("Vibration heat distribution", LayerContent::Heatmap(heat)));

    map.legend = Some(legend(&config.levels));
    map.layer_control = Some(LayerControl {
        position: Corner::TopRight,
        collapsed: false,
    });

    Ok(map)
}

/// Run the vibration pipeline end to end.
pub fn run(job: &JobConfig, config: &PipelineConfig) -> Result<Report> {
    let section = &config.vibration;
    let threshold = job.threshold_or(section.threshold);
    let scale_override = job.color_scale()?;

    let raw = load(&job.input_path)?;
    info!("Loaded {} samples from {}", raw.len(), job.input_path.display());

    let cleaned = clean(&raw, threshold, &config.outlier.order)?;
    info!("Retained {} of {} samples after cleaning", cleaned.len(), raw.len());

    let ranked = RankedTrack::new(cleaned);
    let map = build_map(&ranked, job.zoom_or(section.zoom), section, scale_override)?;
    let html = map.render_html()?;
    write_html(&job.output_path, &html)
        .with_context(|| format!("Failed to write vibration map: {}", job.output_path.display()))?;
    info!("Saved vibration map to {}", job.output_path.display());

    Ok(Report {
        pipeline: "vibration",
        input_rows: raw.len(),
        retained_rows: ranked.track.len(),
        output_path: job.output_path.clone(),
        extra_outputs: Vec::new(),
    })
}
