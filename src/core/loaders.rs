//! Data loaders for mobile sensor CSV logs.
//!
//! This module provides a single CSV reader driven by a [`CsvLayout`]:
//! - Header layouts look columns up by name (`Lat`, `Lon`, `PM25`, ...)
//! - Positional layouts read headerless files by field index
//!
//! Presets cover the four log formats produced by the field loggers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;

use super::track::{Channel, Position, Sample, Terrain, Timestamp, Track};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error at row {row}, column {column}: {value:?} is not a number")]
    ParseError {
        row: usize,
        column: String,
        value: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Timestamp formats accepted for full date-time cells.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M",
];

/// Reference to a CSV column, by header name or by field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Named(String),
    Position(usize),
}

impl ColumnRef {
    pub fn named(name: &str) -> Self {
        ColumnRef::Named(name.to_string())
    }

    fn describe(&self) -> String {
        match self {
            ColumnRef::Named(name) => name.clone(),
            ColumnRef::Position(idx) => format!("#{}", idx),
        }
    }
}

impl std::str::FromStr for ColumnRef {
    type Err = std::convert::Infallible;

    /// `#3` selects field 3 by position; anything else is a header name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix('#').map(str::parse::<usize>) {
            Some(Ok(idx)) => Ok(ColumnRef::Position(idx)),
            _ => Ok(ColumnRef::Named(s.to_string())),
        }
    }
}

/// Where the sample time lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeColumns {
    /// One cell with the full timestamp (or a time of day).
    Single(ColumnRef),
    /// Date and time of day split over two cells.
    DateAndTime { date: ColumnRef, time: ColumnRef },
}

/// Column layout of a sensor log.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvLayout {
    pub has_headers: bool,
    pub time: TimeColumns,
    pub lat: ColumnRef,
    pub lon: ColumnRef,
    pub channels: Vec<(Channel, ColumnRef)>,
    pub terrain: Option<ColumnRef>,
    /// Hours added to parsed timestamps (logs are written in UTC).
    pub utc_offset_hours: i64,
}

impl CsvLayout {
    /// Mobile air station export: `Date_UTC, Time_UTC, Lat, Lon, PM25, PM10, VOC, Temp, Humi`.
    pub fn station() -> Self {
        Self {
            has_headers: true,
            time: TimeColumns::DateAndTime {
                date: ColumnRef::named("Date_UTC"),
                time: ColumnRef::named("Time_UTC"),
            },
            lat: ColumnRef::named("Lat"),
            lon: ColumnRef::named("Lon"),
            channels: vec![
                (Channel::Pm25, ColumnRef::named("PM25")),
                (Channel::Pm10, ColumnRef::named("PM10")),
                (Channel::Voc, ColumnRef::named("VOC")),
                (Channel::Temperature, ColumnRef::named("Temp")),
                (Channel::Humidity, ColumnRef::named("Humi")),
            ],
            terrain: None,
            utc_offset_hours: 8,
        }
    }

    /// Handheld air-quality export: `Time, Lat, Lng, PM25, VOC`.
    pub fn air_quality() -> Self {
        Self {
            has_headers: true,
            time: TimeColumns::Single(ColumnRef::named("Time")),
            lat: ColumnRef::named("Lat"),
            lon: ColumnRef::named("Lng"),
            channels: vec![
                (Channel::Pm25, ColumnRef::named("PM25")),
                (Channel::Voc, ColumnRef::named("VOC")),
            ],
            terrain: None,
            utc_offset_hours: 0,
        }
    }

    /// Headerless barometer log: `time, temp, hum, pres, terrain, lat, lon, ref`.
    pub fn terrain() -> Self {
        Self {
            has_headers: false,
            time: TimeColumns::Single(ColumnRef::Position(0)),
            lat: ColumnRef::Position(5),
            lon: ColumnRef::Position(6),
            channels: vec![
                (Channel::Temperature, ColumnRef::Position(1)),
                (Channel::Humidity, ColumnRef::Position(2)),
                (Channel::Pressure, ColumnRef::Position(3)),
                (Channel::Reference, ColumnRef::Position(7)),
            ],
            terrain: Some(ColumnRef::Position(4)),
            utc_offset_hours: 0,
        }
    }

    /// Headerless accelerometer log: `time, val1, val2, terrain, lat, lon`.
    pub fn shock() -> Self {
        Self {
            has_headers: false,
            time: TimeColumns::Single(ColumnRef::Position(0)),
            lat: ColumnRef::Position(4),
            lon: ColumnRef::Position(5),
            channels: vec![
                (Channel::AccelX, ColumnRef::Position(1)),
                (Channel::AccelY, ColumnRef::Position(2)),
            ],
            terrain: Some(ColumnRef::Position(3)),
            utc_offset_hours: 0,
        }
    }

    pub fn with_utc_offset(mut self, hours: i64) -> Self {
        self.utc_offset_hours = hours;
        self
    }
}

/// Layout with every column resolved to a field index.
struct ResolvedLayout {
    time: (usize, Option<usize>),
    lat: usize,
    lon: usize,
    channels: Vec<(String, usize)>,
    terrain: Option<usize>,
    min_fields: usize,
}

fn resolve_column(
    column: &ColumnRef,
    header_map: Option<&HashMap<String, usize>>,
    missing: &mut Vec<String>,
) -> usize {
    match (column, header_map) {
        (ColumnRef::Position(idx), _) => *idx,
        (ColumnRef::Named(name), Some(map)) => match map.get(name) {
            Some(&idx) => idx,
            None => {
                missing.push(name.clone());
                0
            }
        },
        (ColumnRef::Named(name), None) => {
            missing.push(format!("{} (file has no header row)", name));
            0
        }
    }
}

fn resolve_layout(layout: &CsvLayout, headers: Option<&StringRecord>) -> Result<ResolvedLayout> {
    let header_map: Option<HashMap<String, usize>> = headers.map(|h| {
        h.iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect()
    });
    let map = header_map.as_ref();
    let mut missing = Vec::new();

    let time = match &layout.time {
        TimeColumns::Single(col) => (resolve_column(col, map, &mut missing), None),
        TimeColumns::DateAndTime { date, time } => (
            resolve_column(date, map, &mut missing),
            Some(resolve_column(time, map, &mut missing)),
        ),
    };
    let lat = resolve_column(&layout.lat, map, &mut missing);
    let lon = resolve_column(&layout.lon, map, &mut missing);
    let channels: Vec<(String, usize)> = layout
        .channels
        .iter()
        .map(|(_, col)| (col.describe(), resolve_column(col, map, &mut missing)))
        .collect();
    let terrain = layout
        .terrain
        .as_ref()
        .map(|col| resolve_column(col, map, &mut missing));

    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let min_fields = [Some(time.0), time.1, Some(lat), Some(lon), terrain]
        .into_iter()
        .flatten()
        .chain(channels.iter().map(|(_, idx)| *idx))
        .max()
        .map_or(0, |m| m + 1);

    Ok(ResolvedLayout {
        time,
        lat,
        lon,
        channels,
        terrain,
        min_fields,
    })
}

/// Parse a numeric cell. Blank cells become NaN.
fn parse_number(record: &StringRecord, idx: usize, column: &str, row: usize) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| LoaderError::ParseError {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a timestamp cell into a date-time, trying each known format.
///
/// Returns `None` for time-of-day only values and unrecognised text.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn open_csv(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoaderError::FileNotFound(path.to_path_buf()),
        _ => LoaderError::Io(e),
    })
}

/// Load a sensor track from a CSV file.
///
/// # Arguments
///
/// * `path` - Path to the CSV log
/// * `layout` - Column layout describing where each field lives
///
/// # Returns
///
/// A `Track` with one sample per data row, in file order.
///
/// # Errors
///
/// Returns an error if the file is missing, a required column is absent,
/// a numeric cell cannot be parsed, or the file holds no data rows.
pub fn load_track<P: AsRef<Path>>(path: P, layout: &CsvLayout) -> Result<Track> {
    let path = path.as_ref();
    let file = open_csv(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(layout.has_headers)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let headers = if layout.has_headers {
        Some(reader.headers()?.clone())
    } else {
        None
    };
    let resolved = resolve_layout(layout, headers.as_ref())?;
    let offset = Duration::hours(layout.utc_offset_hours);

    let channels: Vec<Channel> = layout.channels.iter().map(|(c, _)| *c).collect();
    let mut track = Track::new(channels);

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;

        if record.len() < resolved.min_fields {
            return Err(LoaderError::MissingColumns(format!(
                "row {} has {} fields, layout needs {}",
                row,
                record.len(),
                resolved.min_fields
            )));
        }

        let raw_time = match resolved.time {
            (idx, None) => record.get(idx).unwrap_or("").to_string(),
            (date_idx, Some(time_idx)) => format!(
                "{} {}",
                record.get(date_idx).unwrap_or(""),
                record.get(time_idx).unwrap_or("")
            ),
        };
        let parsed = parse_timestamp(&raw_time).map(|t| t + offset);

        let lat = parse_number(&record, resolved.lat, &layout.lat.describe(), row)?;
        let lon = parse_number(&record, resolved.lon, &layout.lon.describe(), row)?;

        let readings = resolved
            .channels
            .iter()
            .map(|(name, idx)| parse_number(&record, *idx, name, row))
            .collect::<Result<Vec<f64>>>()?;

        let terrain = resolved
            .terrain
            .map(|idx| Terrain::parse(record.get(idx).unwrap_or("")));

        track.push(Sample {
            time: Timestamp::new(raw_time, parsed),
            position: Position::new(lat, lon),
            readings,
            terrain,
        });
    }

    if track.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(track)
}

/// Load a single numeric column from a CSV file.
///
/// Used by the standalone `filter` command, which works on any column of
/// any log. When `has_headers` is false the column must be positional.
pub fn load_column<P: AsRef<Path>>(path: P, column: &ColumnRef, has_headers: bool) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let file = open_csv(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let headers = if has_headers {
        Some(reader.headers()?.clone())
    } else {
        None
    };
    let header_map: Option<HashMap<String, usize>> = headers.as_ref().map(|h| {
        h.iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect()
    });
    let mut missing = Vec::new();
    let idx = resolve_column(column, header_map.as_ref(), &mut missing);
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let name = column.describe();
    let mut values = Vec::with_capacity(1024);
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() <= idx {
            return Err(LoaderError::MissingColumns(format!(
                "row {} has no field {}",
                i + 1,
                name
            )));
        }
        values.push(parse_number(&record, idx, &name, i + 1)?);
    }

    if values.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_station_csv() -> Result<()> {
        let file = write_csv(&[
            "Date_UTC,Time_UTC,Lat,Lon,PM25,PM10,VOC,Temp,Humi",
            "2026-01-22,01:00:00,31.20,121.40,12,20,0.3,8.5,60",
            "2026-01-22,01:00:05,31.21,121.41,14,22,0.4,8.6,61",
        ]);

        let track = load_track(file.path(), &CsvLayout::station())?;

        assert_eq!(track.len(), 2);
        assert_eq!(track.latitudes(), vec![31.20, 31.21]);
        assert_eq!(track.column(Channel::Pm10), Some(vec![20.0, 22.0]));

        // UTC 01:00 becomes 09:00 China Standard Time
        let first = track.samples()[0].time.parsed.unwrap();
        assert_eq!(first.format("%H:%M:%S").to_string(), "09:00:00");

        Ok(())
    }

    #[test]
    fn test_load_air_quality_csv() -> Result<()> {
        let file = write_csv(&[
            "Time,Lat,Lng,PM25,VOC",
            "2026-02-02 10:15:00,30.5,114.3,35,0.8",
        ]);

        let track = load_track(file.path(), &CsvLayout::air_quality())?;

        assert_eq!(track.len(), 1);
        assert_eq!(track.longitudes(), vec![114.3]);
        assert_eq!(track.column(Channel::Voc), Some(vec![0.8]));
        assert!(track.samples()[0].time.parsed.is_some());

        Ok(())
    }

    #[test]
    fn test_load_terrain_csv_headerless() -> Result<()> {
        let file = write_csv(&[
            "10:00:01,21.5,55.0,1008.2,Uphill,30.51,114.31,40.0",
            "10:00:02,21.6,55.1,1008.1,Flat,30.52,114.32,41.0",
        ]);

        let track = load_track(file.path(), &CsvLayout::terrain())?;

        assert_eq!(track.len(), 2);
        assert_eq!(track.column(Channel::Pressure), Some(vec![1008.2, 1008.1]));
        assert_eq!(track.samples()[0].terrain, Some(Terrain::Uphill));
        assert_eq!(track.samples()[0].time.raw, "10:00:01");
        assert!(track.samples()[0].time.parsed.is_none());

        Ok(())
    }

    #[test]
    fn test_load_shock_csv() -> Result<()> {
        let file = write_csv(&["10:00:01,0.3,-0.4,Flat,30.51,114.31"]);

        let track = load_track(file.path(), &CsvLayout::shock())?;

        assert_eq!(track.column(Channel::AccelY), Some(vec![-0.4]));
        assert_eq!(track.samples()[0].position, Position::new(30.51, 114.31));

        Ok(())
    }

    #[test]
    fn test_missing_header_column() {
        let file = write_csv(&["Time,Lat,PM25,VOC", "2026-02-02 10:15:00,30.5,35,0.8"]);

        let err = load_track(file.path(), &CsvLayout::air_quality()).unwrap_err();

        match err {
            LoaderError::MissingColumns(cols) => assert_eq!(cols, "Lng"),
            other => panic!("Expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_short_positional_row() {
        let file = write_csv(&["10:00:01,0.3,-0.4,Flat,30.51"]);

        let err = load_track(file.path(), &CsvLayout::shock()).unwrap_err();

        assert!(matches!(err, LoaderError::MissingColumns(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = load_track("/definitely/not/here.csv", &CsvLayout::station()).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }

    #[test]
    fn test_blank_cell_is_nan_and_text_is_error() {
        let file = write_csv(&["10:00:01,,-0.4,Flat,30.51,114.31"]);
        let track = load_track(file.path(), &CsvLayout::shock()).unwrap();
        assert!(track.reading(0, Channel::AccelX).unwrap().is_nan());

        let file = write_csv(&["10:00:01,abc,-0.4,Flat,30.51,114.31"]);
        let err = load_track(file.path(), &CsvLayout::shock()).unwrap_err();
        match err {
            LoaderError::ParseError { row, value, .. } => {
                assert_eq!(row, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_is_empty() {
        let file = write_csv(&["Time,Lat,Lng,PM25,VOC"]);
        let err = load_track(file.path(), &CsvLayout::air_quality()).unwrap_err();
        assert!(matches!(err, LoaderError::EmptyFile(_)));
    }

    #[test]
    fn test_load_column_by_name_and_position() -> Result<()> {
        let file = write_csv(&["a,b", "1,10", "2,20"]);
        assert_eq!(load_column(file.path(), &ColumnRef::named("b"), true)?, vec![10.0, 20.0]);

        let file = write_csv(&["1,10", "2,20"]);
        assert_eq!(load_column(file.path(), &ColumnRef::Position(0), false)?, vec![1.0, 2.0]);

        Ok(())
    }

    #[test]
    fn test_column_ref_from_str() {
        assert_eq!("#4".parse::<ColumnRef>().unwrap(), ColumnRef::Position(4));
        assert_eq!(" PM25 ".parse::<ColumnRef>().unwrap(), ColumnRef::named("PM25"));
        assert_eq!("#x".parse::<ColumnRef>().unwrap(), ColumnRef::named("#x"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2026-02-13 08:30:00").is_some());
        assert!(parse_timestamp("2026/02/13 08:30:00").is_some());
        assert!(parse_timestamp("2026-02-13T08:30:00.250").is_some());
        assert!(parse_timestamp("08:30:00").is_none());
    }
}
