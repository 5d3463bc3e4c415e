//! Road gradient map from the barometric terrain logger.
//!
//! Each pair of consecutive samples becomes one animated segment styled by
//! the terrain class of its first sample. Every few samples a marker shows
//! the environmental readings.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::info;

use super::outlier::{filter_track, Axis};
use super::{format_reading, Report};
use crate::config::{JobConfig, PipelineConfig, TerrainConfig};
use crate::core::loaders::{load_track, CsvLayout};
use crate::core::track::{Channel, Sample, Terrain, Track};
use crate::core::transforms::{centroid, drop_invalid_positions, every_nth, PositionValidity};
use crate::core::writers::write_html;
use crate::visualization::web_map::{
    AntPath, CircleMarker, Corner, LayerContent, Legend, LegendTheme, Overlay, WebMap,
};

/// Drawing style of a terrain class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainStyle {
    pub color: &'static str,
    /// Animation period in milliseconds
    pub delay: u32,
    pub weight: u32,
    pub label: &'static str,
}

const UPHILL: TerrainStyle = TerrainStyle {
    color: "#EC7063",
    delay: 1200,
    weight: 6,
    label: "Uphill (energy loss)",
};

const DOWNHILL: TerrainStyle = TerrainStyle {
    color: "#58D68D",
    delay: 600,
    weight: 6,
    label: "Downhill (kinetic gain)",
};

const FLAT: TerrainStyle = TerrainStyle {
    color: "#5DADE2",
    delay: 2000,
    weight: 3,
    label: "Flat (steady state)",
};

const MARKER_COLOR: &str = "#BDC3C7";

/// Style for a terrain class. Unknown and missing classes draw as flat road.
pub fn style_for(terrain: Option<&Terrain>) -> TerrainStyle {
    match terrain {
        Some(Terrain::Uphill) => UPHILL,
        Some(Terrain::Downhill) => DOWNHILL,
        _ => FLAT,
    }
}

pub fn load(path: &Path) -> Result<Track> {
    load_track(path, &CsvLayout::terrain())
        .with_context(|| format!("Failed to load terrain log: {}", path.display()))
}

/// Drop fixes at or below `config.min_coordinate` and MAD-filter positions.
pub fn clean(track: &Track, threshold: f64, config: &TerrainConfig, order: &[Axis]) -> Result<Track> {
    let located = drop_invalid_positions(track, PositionValidity::Above(config.min_coordinate));
    Ok(filter_track(&located, order, threshold)?)
}

fn segment(track: &Track, i: usize, from: &Sample, to: &Sample) -> AntPath {
    let style = style_for(from.terrain.as_ref());
    let terrain = from
        .terrain
        .as_ref()
        .map_or_else(|| "n/a".to_string(), |t| t.to_string());
    AntPath {
        points: vec![
            [from.position.lat, from.position.lon],
            [to.position.lat, to.position.lon],
        ],
        color: style.color.to_string(),
        pulse_color: "#FFFFFF".to_string(),
        weight: style.weight,
        delay: style.delay,
        dash_array: [10, 20],
        tooltip: Some(format!(
            "Time: {} | Pressure: {}hPa | Terrain: {}",
            from.time.raw,
            format_reading(track.reading(i, Channel::Pressure)),
            terrain
        )),
    }
}

fn node_popup(track: &Track, i: usize) -> String {
    let fmt = |channel: Channel, digits: usize| match track.reading(i, channel) {
        Some(v) if v.is_finite() => format!("{:.*}", digits, v),
        _ => "n/a".to_string(),
    };
    format!(
        "<div style='width:150px; font-family: sans-serif; font-size:12px;'>\
         <b style='color:#34495E;'>BMP280 environment</b><hr>\
         <b>Pressure:</b> {} hPa<br>\
         <b>Temperature:</b> {} °C<br>\
         <b>Humidity:</b> {} %</div>",
        fmt(Channel::Pressure, 2),
        fmt(Channel::Temperature, 1),
        fmt(Channel::Humidity, 1)
    )
}

fn legend() -> Legend {
    Legend {
        position: Corner::BottomRight,
        title: "Terrain dynamics (BMP280)".to_string(),
        entries: [UPHILL, DOWNHILL, FLAT]
            .iter()
            .map(|s| (s.color.to_string(), s.label.to_string()))
            .collect(),
        note: Some("Detected from barometric pressure gradient".to_string()),
        theme: LegendTheme::Dark,
    }
}

/// Build the web map: terrain-styled segments, sampled environment
/// markers and the terrain legend over dark tiles.
pub fn build_map(track: &Track, zoom: u8, config: &TerrainConfig) -> Result<WebMap> {
    let (lat, lon) = centroid(track).ok_or_else(|| anyhow!("no samples left to map"))?;

    let mut map = WebMap::new("Road terrain and environment", [lat, lon], zoom).with_tiles(config.tiles);
    map.fullscreen = true;

    let samples = track.samples();
    let paths: Vec<AntPath> = samples
        .windows(2)
        .enumerate()
        .map(|(i, pair)| segment(track, i, &pair[0], &pair[1]))
        .collect();
    map.add_overlay(Overlay::new("Terrain segments", LayerContent::AntPaths { paths }).fixed());

    let step = config.marker_every.max(1);
    let nodes = every_nth(track, step);
    let markers = nodes
        .samples()
        .iter()
        .enumerate()
        .map(|(k, s)| CircleMarker {
            location: [s.position.lat, s.position.lon],
            radius: 2.0,
            color: MARKER_COLOR.to_string(),
            fill_color: MARKER_COLOR.to_string(),
            fill_opacity: 0.2,
            opacity: 0.4,
            weight: 3.0,
            popup: Some(node_popup(&nodes, k)),
            popup_max_width: 200,
        })
        .collect();
    map.add_overlay(Overlay::new("Sampling nodes", LayerContent::CircleMarkers { markers }).fixed());

    map.legend = Some(legend());

    Ok(map)
}

/// Run the terrain pipeline end to end.
pub fn run(job: &JobConfig, config: &PipelineConfig) -> Result<Report> {
    let section = &config.terrain;
    let threshold = job.threshold_or(section.threshold);

    let raw = load(&job.input_path)?;
    info!("Loaded {} samples from {}", raw.len(), job.input_path.display());

    let cleaned = clean(&raw, threshold, section, &config.outlier.order)?;
    info!("Retained {} of {} samples after cleaning", cleaned.len(), raw.len());

    let map = build_map(&cleaned, job.zoom_or(section.zoom), section)?;
    let html = map.render_html()?;
    write_html(&job.output_path, &html)
        .with_context(|| format!("Failed to write terrain map: {}", job.output_path.display()))?;
    info!("Saved terrain map to {}", job.output_path.display());

    Ok(Report {
        pipeline: "terrain",
        input_rows: raw.len(),
        retained_rows: cleaned.len(),
        output_path: job.output_path.clone(),
        extra_outputs: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CSV: &str = "10:00:00,5.0,60.0,1013.25,Uphill,30.5000,114.3000,12\n\
        10:00:01,5.1,60.5,1013.20,Downhill,30.5001,114.3001,12\n\
        10:00:02,5.2,61.0,1013.10,Flat,30.5002,114.3002,12\n\
        10:00:03,5.3,61.5,1013.00,Bridge,30.5003,114.3003,12\n\
        10:00:04,5.4,62.0,1012.90,Flat,0.5,0.5,12\n";

    fn load_fixture(dir: &TempDir) -> Track {
        let path = dir.path().join("20260213_data.csv");
        fs::write(&path, CSV).unwrap();
        load(&path).unwrap()
    }

    #[test]
    fn test_style_for() {
        assert_eq!(style_for(Some(&Terrain::Uphill)).color, "#EC7063");
        assert_eq!(style_for(Some(&Terrain::Downhill)).delay, 600);
        assert_eq!(style_for(Some(&Terrain::Other("Bridge".into()))), FLAT);
        assert_eq!(style_for(None), FLAT);
    }

    #[test]
    fn test_clean_drops_low_coordinates() {
        let dir = TempDir::new().unwrap();
        let track = load_fixture(&dir);

        let cleaned = clean(&track, 3.0, &TerrainConfig::default(), &[Axis::Latitude, Axis::Longitude]).unwrap();

        assert_eq!(cleaned.len(), 4);
    }

    #[test]
    fn test_build_map_segments_and_nodes() {
        let dir = TempDir::new().unwrap();
        let track = load_fixture(&dir);
        let cleaned = clean(&track, 3.0, &TerrainConfig::default(), &[Axis::Latitude]).unwrap();

        let map = build_map(&cleaned, 15, &TerrainConfig::default()).unwrap();

        assert!(map.fullscreen);
        assert_eq!(map.base_layers[0].name, "CartoDB dark_matter");
        match &map.overlays[0].layer {
            LayerContent::AntPaths { paths } => {
                assert_eq!(paths.len(), 3);
                assert_eq!(paths[0].color, "#EC7063");
                assert_eq!(paths[0].weight, 6);
                assert_eq!(paths[1].delay, 600);
                assert_eq!(paths[2].color, "#5DADE2");
                assert_eq!(
                    paths[0].tooltip.as_deref(),
                    Some("Time: 10:00:00 | Pressure: 1013.25hPa | Terrain: Uphill")
                );
            }
            other => panic!("unexpected layer {:?}", other),
        }
        match &map.overlays[1].layer {
            LayerContent::CircleMarkers { markers } => {
                // samples 0 and 3
                assert_eq!(markers.len(), 2);
                let popup = markers[1].popup.as_deref().unwrap();
                assert!(popup.contains("1013.00 hPa"));
                assert!(popup.contains("5.3 °C"));
            }
            other => panic!("unexpected layer {:?}", other),
        }
        let legend = map.legend.as_ref().unwrap();
        assert_eq!(legend.position, Corner::BottomRight);
        assert_eq!(legend.entries.len(), 3);
    }

    #[test]
    fn test_run_writes_html() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("terrain.csv");
        fs::write(&input, CSV).unwrap();
        let output = dir.path().join("terrain.html");

        let report = run(&JobConfig::new(&input, &output), &PipelineConfig::default()).unwrap();

        assert_eq!(report.input_rows, 5);
        assert_eq!(report.retained_rows, 4);
        let html = fs::read_to_string(&output).unwrap();
        assert!(html.contains("L.polyline.antPath"));
        assert!(html.contains("\"fullscreen\":true"));
    }
}
