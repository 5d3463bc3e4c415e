//! Interactive air-quality heatmap of a handheld sensor run.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::info;

use super::outlier::{filter_track, Axis};
use super::{format_reading, Report};
use crate::config::{HeatmapConfig, JobConfig, PipelineConfig};
use crate::core::loaders::{load_track, CsvLayout};
use crate::core::track::{Channel, Track};
use crate::core::transforms::{centroid, drop_invalid_positions, PositionValidity};
use crate::core::writers::write_html;
use crate::visualization::web_map::{
    CircleMarker, Corner, HeatLayer, LayerContent, LayerControl, Overlay, TileProvider, WebMap,
};
use crate::visualization::ColorScale;

const VOC_GRADIENT: [(f64, &str); 3] = [(0.2, "blue"), (0.5, "lime"), (1.0, "red")];

pub fn load(path: &Path) -> Result<Track> {
    load_track(path, &CsvLayout::air_quality())
        .with_context(|| format!("Failed to load air-quality log: {}", path.display()))
}

/// Drop missing fixes and apply the MAD filter when a threshold is given.
pub fn clean(track: &Track, threshold: Option<f64>, order: &[Axis]) -> Result<Track> {
    let located = drop_invalid_positions(track, PositionValidity::NonZero);
    match threshold {
        Some(t) => Ok(filter_track(&located, order, t)?),
        None => Ok(located),
    }
}

/// `[lat, lon, value]` triples for a channel, skipping blank readings.
fn weighted_points(track: &Track, channel: Channel) -> Vec<[f64; 3]> {
    track
        .samples()
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let value = track.reading(i, channel)?;
            value
                .is_finite()
                .then_some([s.position.lat, s.position.lon, value])
        })
        .collect()
}

fn heat_layer(points: Vec<[f64; 3]>, config: &HeatmapConfig) -> HeatLayer {
    HeatLayer {
        radius: config.radius,
        blur: config.blur,
        min_opacity: config.min_opacity,
        ..HeatLayer::new(points)
    }
}

/// Build the web map: PM2.5 heat (shown), VOC heat (hidden) and the raw
/// points with popups (hidden) over street and satellite tiles.
pub fn build_map(
    track: &Track,
    zoom: u8,
    config: &HeatmapConfig,
    scale_override: Option<ColorScale>,
) -> Result<WebMap> {
    let (lat, lon) = centroid(track).ok_or_else(|| anyhow!("no samples left to map"))?;

    let mut map = WebMap::new("Mobile air-quality heatmap", [lat, lon], zoom)
        .with_tiles(TileProvider::OpenStreetMap)
        .with_tiles(TileProvider::GoogleSatellite);
    map.control_scale = false;

    let mut pm25 = heat_layer(weighted_points(track, Channel::Pm25), config);
    let voc_stops: Vec<(f64, String)> = match scale_override {
        Some(scale) => {
            pm25 = pm25.with_gradient(&scale.hex_stops());
            scale.hex_stops()
        }
        None => VOC_GRADIENT
            .iter()
            .map(|(p, c)| (*p, c.to_string()))
            .collect(),
    };
    let voc = heat_layer(weighted_points(track, Channel::Voc), config).with_gradient(&voc_stops);

    map.add_overlay(Overlay::new("PM2.5 Heatmap", LayerContent::Heatmap(pm25)));
    map.add_overlay(Overlay::new("VOC Heatmap", LayerContent::Heatmap(voc)).hidden());

    let markers = track
        .samples()
        .iter()
        .enumerate()
        .map(|(i, s)| CircleMarker {
            location: [s.position.lat, s.position.lon],
            radius: config.point_radius,
            color: "white".to_string(),
            fill_color: "blue".to_string(),
            fill_opacity: 0.2,
            opacity: 1.0,
            weight: 1.0,
            popup: Some(format!(
                "PM2.5: {} | VOC: {}",
                format_reading(track.reading(i, Channel::Pm25)),
                format_reading(track.reading(i, Channel::Voc))
            )),
            popup_max_width: 300,
        })
        .collect();
    map.add_overlay(Overlay::new("Individual Points", LayerContent::CircleMarkers { markers }).hidden());

    map.layer_control = Some(LayerControl {
        position: Corner::TopRight,
        collapsed: false,
    });

    Ok(map)
}

/// Run the heatmap pipeline end to end.
pub fn run(job: &JobConfig, config: &PipelineConfig) -> Result<Report> {
    let section = &config.heatmap;
    let threshold = job.threshold.or(section.threshold);
    let scale_override = job.color_scale()?;

    let raw = load(&job.input_path)?;
    info!("Loaded {} samples from {}", raw.len(), job.input_path.display());

    let cleaned = clean(&raw, threshold, &config.outlier.order)?;
    info!("Retained {} of {} samples after cleaning", cleaned.len(), raw.len());

    let map = build_map(&cleaned, job.zoom_or(section.zoom), section, scale_override)?;
    let html = map.render_html()?;
    write_html(&job.output_path, &html)
        .with_context(|| format!("Failed to write heatmap: {}", job.output_path.display()))?;
    info!("Saved heatmap to {}", job.output_path.display());

    Ok(Report {
        pipeline: "heatmap",
        input_rows: raw.len(),
        retained_rows: cleaned.len(),
        output_path: job.output_path.clone(),
        extra_outputs: Vec::new(),
    })
}
