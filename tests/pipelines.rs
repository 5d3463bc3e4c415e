use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use sensing_pipeline::core::loaders::{load_track, CsvLayout, LoaderError};
use sensing_pipeline::processors::outlier::{filter_track, Axis};
use sensing_pipeline::{JobConfig, PipelineConfig, PipelineKind};
use tempfile::TempDir;

/// Shock log whose positions carry one drifted fix per axis.
fn write_shock_log(path: &Path) {
    let lat = [6.0, 1.0, 3.0, 1.0, 20.0, 6.0, 0.0];
    let lon = [1.0, 3.0, 0.0, 6.0, 0.0, 3.0, 0.0];
    let mut csv = String::new();
    for (k, (dlat, dlon)) in lat.iter().zip(lon.iter()).enumerate() {
        let _ = writeln!(
            csv,
            "10:00:{:02},{},{},Flat,{:.3},{:.3}",
            k,
            0.1 * k as f64,
            -0.2,
            30.0 + dlat * 1e-3,
            120.0 + dlon * 1e-3
        );
    }
    fs::write(path, csv).unwrap();
}

#[test]
fn filter_order_changes_survivors_of_loaded_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("20260213_shock.csv");
    write_shock_log(&path);

    let track = load_track(&path, &CsvLayout::shock()).unwrap();
    let lat_first = filter_track(&track, &[Axis::Latitude, Axis::Longitude], 3.0).unwrap();
    let lon_first = filter_track(&track, &[Axis::Longitude, Axis::Latitude], 3.0).unwrap();

    assert_eq!(track.len(), 7);
    assert_eq!(lat_first.len(), 6);
    assert_eq!(lon_first.len(), 5);
}

#[test]
fn yaml_config_drives_vibration_run() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("20260213_shock.csv");
    write_shock_log(&input);

    let config_path = dir.path().join("pipeline.yaml");
    fs::write(
        &config_path,
        "outlier:\n  order: [longitude, latitude]\nvibration:\n  threshold: 3.0\n  zoom: 12\n",
    )
    .unwrap();
    let config = PipelineConfig::from_yaml(&config_path).unwrap();

    let output = dir.path().join("maps").join("vibration.html");
    let report = PipelineKind::Vibration
        .run(&JobConfig::new(&input, &output), &config)
        .unwrap();

    assert_eq!(report.input_rows, 7);
    assert_eq!(report.retained_rows, 5);
    let html = fs::read_to_string(&output).unwrap();
    assert!(html.contains("\"zoom\":12"));
    assert!(html.contains("basemaps.cartocdn.com/light_all"));
}

#[test]
fn terrain_run_with_threshold_override() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("20260213_data.csv");
    let mut csv = String::new();
    for k in 0..9 {
        let terrain = ["Uphill", "Downhill", "Flat"][k % 3];
        let _ = writeln!(
            csv,
            "10:00:{:02},20.{},55,1008.{},{},{:.4},{:.4},40",
            k,
            k,
            k,
            terrain,
            30.5 + k as f64 * 1e-4,
            114.3 + k as f64 * 1e-4
        );
    }
    fs::write(&input, csv).unwrap();
    let output = dir.path().join("terrain.html");
    let mut job = JobConfig::new(&input, &output);
    job.threshold = Some(2.0);

    let report = PipelineKind::Terrain.run(&job, &PipelineConfig::default()).unwrap();

    assert_eq!(report.retained_rows, 9);
    let html = fs::read_to_string(&output).unwrap();
    // 8 segments plus the legend colors
    assert!(html.matches("#EC7063").count() >= 3);
    assert!(html.contains("dark_all"));
}

#[test]
fn station_run_missing_file_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let job = JobConfig::new(dir.path().join("missing.csv"), dir.path().join("out.png"));

    let err = PipelineKind::Station
        .run(&job, &PipelineConfig::default())
        .unwrap_err();

    let loader_error = err.downcast_ref::<LoaderError>();
    assert!(matches!(loader_error, Some(LoaderError::FileNotFound(_))));
}

#[test]
fn heatmap_run_with_color_scheme_override() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("20260202_air.csv");
    fs::write(
        &input,
        "Time,Lat,Lng,PM25,VOC\n\
         2026-02-02 10:00:00,30.500,114.300,12,0.2\n\
         2026-02-02 10:00:01,30.501,114.301,14,\n\
         2026-02-02 10:00:02,0,0,80,0.9\n\
         2026-02-02 10:00:03,30.502,114.302,15,0.4\n",
    )
    .unwrap();
    let output = dir.path().join("heatmap.html");
    let mut job = JobConfig::new(&input, &output);
    job.color_scheme = Some("plasma".to_string());

    let report = PipelineKind::Heatmap.run(&job, &PipelineConfig::default()).unwrap();

    assert_eq!(report.input_rows, 4);
    assert_eq!(report.retained_rows, 3);
    let html = fs::read_to_string(&output).unwrap();
    assert!(html.contains("\"gradient\""));
    assert!(html.contains("PM2.5: 14 | VOC: n/a"));

    job.color_scheme = Some("rainbow".to_string());
    assert!(PipelineKind::Heatmap.run(&job, &PipelineConfig::default()).is_err());
}

#[test]
fn empty_outlier_order_keeps_every_fix() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("20260213_shock.csv");
    write_shock_log(&input);
    let config_path = dir.path().join("pipeline.yaml");
    fs::write(&config_path, "outlier:\n  order: []\n").unwrap();
    let config = PipelineConfig::from_yaml(&config_path).unwrap();

    let output = dir.path().join("vibration.html");
    let report = PipelineKind::Vibration
        .run(&JobConfig::new(&input, &output), &config)
        .unwrap();

    assert_eq!(report.input_rows, 7);
    assert_eq!(report.retained_rows, 7);
}
