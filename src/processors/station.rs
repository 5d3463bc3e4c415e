//! Static multi-panel map of a mobile air station run.
//!
//! load → drop zero fixes → optional MAD filter → sort by time → write the
//! processed CSV → resample along the sample index → render one scatter
//! panel per channel.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use super::outlier::{filter_track, Axis};
use super::Report;
use crate::config::{JobConfig, PipelineConfig, StationConfig};
use crate::core::loaders::{load_track, CsvLayout};
use crate::core::track::Track;
use crate::core::transforms::{
    drop_invalid_positions, padded_extent, resample_linear, sampling_period, sort_by_time,
    PositionValidity, ResampledTrack,
};
use crate::core::writers::write_track_csv;
use crate::visualization::{render_panels, ColorScale, Panel, PanelOptions};

/// Load a station export, shifting logged UTC times by the configured offset.
pub fn load(path: &Path, config: &StationConfig) -> Result<Track> {
    let layout = CsvLayout::station().with_utc_offset(config.utc_offset_hours);
    load_track(path, &layout)
        .with_context(|| format!("Failed to load station log: {}", path.display()))
}

/// Drop missing fixes, apply the MAD filter when a threshold is given, and
/// order samples by time.
pub fn clean(track: &Track, threshold: Option<f64>, order: &[Axis]) -> Result<Track> {
    let located = drop_invalid_positions(track, PositionValidity::NonZero);
    let filtered = match threshold {
        Some(t) => filter_track(&located, order, t)?,
        None => located,
    };
    Ok(sort_by_time(&filtered))
}

/// Resample the cleaned track to `samples` evenly spaced points.
pub fn transform(track: &Track, samples: usize) -> Result<ResampledTrack> {
    Ok(resample_linear(track, samples)?)
}

/// `<stem>_processed.csv` next to the image.
pub fn processed_csv_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "station".to_string());
    image_path.with_file_name(format!("{}_processed.csv", stem))
}

/// Render the configured panels over the padded track extent.
///
/// `scale_override` replaces every panel's own scale.
pub fn render(
    resampled: &ResampledTrack,
    subtitle: Option<String>,
    config: &StationConfig,
    scale_override: Option<ColorScale>,
    output_path: &Path,
) -> Result<()> {
    let extent = padded_extent(&resampled.lat, &resampled.lon, config.pad_deg)
        .ok_or_else(|| anyhow!("no finite positions to plot"))?;

    let panels = config
        .panels
        .iter()
        .map(|spec| {
            let values = resampled
                .column(spec.channel)
                .ok_or_else(|| anyhow!("track has no {} channel", spec.channel))?;
            let scale = match scale_override {
                Some(scale) => scale,
                None => ColorScale::by_name(&spec.color_scheme)?,
            };
            Ok(Panel {
                title: spec.channel.title(),
                values,
                scale,
            })
        })
        .collect::<Result<Vec<Panel<'_>>>>()?;

    let options = PanelOptions {
        width: config.width,
        height: config.height,
        point_size: config.point_size,
        alpha: config.alpha,
        draw_text: config.draw_text,
        title: Some(config.title.clone()),
        subtitle,
    };

    render_panels(
        output_path,
        &resampled.lat,
        &resampled.lon,
        &panels,
        extent,
        &options,
    )
    .with_context(|| format!("Failed to render panels: {}", output_path.display()))
}

/// Run the station pipeline end to end.
pub fn run(job: &JobConfig, config: &PipelineConfig) -> Result<Report> {
    let section = &config.station;
    let threshold = job.threshold.or(section.threshold);
    let scale_override = job.color_scale()?;

    if job.zoom_level.is_some() {
        warn!("Zoom level has no effect on static panel output");
    }

    let raw = load(&job.input_path, section)?;
    info!("Loaded {} samples from {}", raw.len(), job.input_path.display());

    let period = sampling_period(&raw, &section.zone_label);

    let cleaned = clean(&raw, threshold, &config.outlier.order)?;
    info!("Retained {} of {} samples after cleaning", cleaned.len(), raw.len());

    let mut extra_outputs = Vec::new();
    if section.write_processed_csv {
        let csv_path = processed_csv_path(&job.output_path);
        write_track_csv(&csv_path, &cleaned)
            .with_context(|| format!("Failed to write processed CSV: {}", csv_path.display()))?;
        info!("Wrote processed samples to {}", csv_path.display());
        extra_outputs.push(csv_path);
    }

    let resampled = transform(&cleaned, section.samples)?;
    render(&resampled, period, section, scale_override, &job.output_path)?;
    info!("Saved panels to {}", job.output_path.display());

    Ok(Report {
        pipeline: "station",
        input_rows: raw.len(),
        retained_rows: cleaned.len(),
        output_path: job.output_path.clone(),
        extra_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_station_csv(dir: &Path) -> PathBuf {
        let path = dir.join("20260122.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "Date_UTC,Time_UTC,Lat,Lon,PM25,PM10,VOC,Temp,Humi").unwrap();
        writeln!(file, "2026-01-22,01:00:02,30.5020,114.3020,14,20,0.3,5.5,60").unwrap();
        writeln!(file, "2026-01-22,01:00:00,30.5000,114.3000,12,18,0.2,5.0,61").unwrap();
        writeln!(file, "2026-01-22,01:00:01,0,0,99,99,9.9,9,9").unwrap();
        writeln!(file, "2026-01-22,01:00:01,30.5010,114.3010,13,19,0.25,5.2,60").unwrap();
        path
    }

    fn no_text_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.station.width = 800;
        config.station.height = 300;
        config.station.samples = 20;
        config.station.draw_text = false;
        config
    }

    #[test]
    fn test_clean_drops_zero_fix_and_sorts() {
        let dir = TempDir::new().unwrap();
        let path = write_station_csv(dir.path());
        let track = load(&path, &StationConfig::default()).unwrap();

        let cleaned = clean(&track, None, &[]).unwrap();

        assert_eq!(cleaned.len(), 3);
        assert_eq!(
            cleaned.column(crate::core::track::Channel::Pm25),
            Some(vec![12.0, 13.0, 14.0])
        );
        assert_eq!(cleaned.samples()[0].time.display(), "2026-01-22 09:00:00");
    }

    #[test]
    fn test_processed_csv_path() {
        assert_eq!(
            processed_csv_path(Path::new("/out/station.png")),
            PathBuf::from("/out/station_processed.csv")
        );
    }

    #[test]
    fn test_run_writes_image_and_csv() {
        let dir = TempDir::new().unwrap();
        let input = write_station_csv(dir.path());
        let output = dir.path().join("out").join("station.png");
        let job = JobConfig::new(&input, &output);

        let report = run(&job, &no_text_config()).unwrap();

        assert_eq!(report.input_rows, 4);
        assert_eq!(report.retained_rows, 3);
        assert!(output.exists());
        let csv = fs::read_to_string(dir.path().join("out").join("station_processed.csv")).unwrap();
        assert!(csv.starts_with("time,lat,lon,pm25,pm10,voc,temp,humidity"));
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_run_needs_two_samples() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("single.csv");
        fs::write(
            &input,
            "Date_UTC,Time_UTC,Lat,Lon,PM25,PM10,VOC,Temp,Humi\n2026-01-22,01:00:00,30.5,114.3,12,18,0.2,5,61\n",
        )
        .unwrap();
        let job = JobConfig::new(&input, dir.path().join("single.png"));

        assert!(run(&job, &no_text_config()).is_err());
    }

    #[test]
    fn test_run_rejects_unknown_scheme() {
        let dir = TempDir::new().unwrap();
        let input = write_station_csv(dir.path());
        let mut job = JobConfig::new(&input, dir.path().join("station.png"));
        job.color_scheme = Some("rainbow".to_string());

        assert!(run(&job, &no_text_config()).is_err());
    }
}
