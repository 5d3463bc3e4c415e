//! Sample and track containers for mobile sensor logs.
//!
//! A [`Track`] is an ordered collection of [`Sample`]s that all carry the
//! same list of [`Channel`]s. Tracks are never mutated after loading:
//! every cleaning step builds a new track from a subset of the samples.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A measured quantity carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Pm25,
    Pm10,
    Voc,
    Temperature,
    Humidity,
    Pressure,
    AccelX,
    AccelY,
    Reference,
}

impl Channel {
    /// Human readable label used in panel titles and popups.
    pub fn label(self) -> &'static str {
        match self {
            Channel::Pm25 => "PM2.5",
            Channel::Pm10 => "PM10",
            Channel::Voc => "VOC",
            Channel::Temperature => "Temp",
            Channel::Humidity => "Humidity",
            Channel::Pressure => "Pressure",
            Channel::AccelX => "Accel X",
            Channel::AccelY => "Accel Y",
            Channel::Reference => "Reference",
        }
    }

    /// Unit suffix, empty when the sensor reports a raw index.
    pub fn unit(self) -> &'static str {
        match self {
            Channel::Pm25 | Channel::Pm10 => "µg/m³",
            Channel::Temperature => "°C",
            Channel::Humidity => "%",
            Channel::Pressure => "hPa",
            Channel::AccelX | Channel::AccelY => "g",
            Channel::Voc | Channel::Reference => "",
        }
    }

    /// Column name used when writing processed CSV files.
    pub fn column_name(self) -> &'static str {
        match self {
            Channel::Pm25 => "pm25",
            Channel::Pm10 => "pm10",
            Channel::Voc => "voc",
            Channel::Temperature => "temp",
            Channel::Humidity => "humidity",
            Channel::Pressure => "pressure",
            Channel::AccelX => "accel_x",
            Channel::AccelY => "accel_y",
            Channel::Reference => "ref",
        }
    }

    /// Panel title: label plus unit in parentheses when there is one.
    pub fn title(self) -> String {
        match self.unit() {
            "" => self.label().to_string(),
            unit => format!("{} ({})", self.label(), unit),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Road gradient class reported by the barometric terrain logger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terrain {
    Uphill,
    Downhill,
    Flat,
    Other(String),
}

impl Terrain {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("uphill") {
            Terrain::Uphill
        } else if trimmed.eq_ignore_ascii_case("downhill") {
            Terrain::Downhill
        } else if trimmed.eq_ignore_ascii_case("flat") {
            Terrain::Flat
        } else {
            Terrain::Other(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Terrain::Uphill => "Uphill",
            Terrain::Downhill => "Downhill",
            Terrain::Flat => "Flat",
            Terrain::Other(s) => s,
        }
    }
}

impl fmt::Display for Terrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample time as written in the log, plus the parsed value when the text
/// carries a full date and time.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    pub raw: String,
    pub parsed: Option<NaiveDateTime>,
}

impl Timestamp {
    pub fn new(raw: impl Into<String>, parsed: Option<NaiveDateTime>) -> Self {
        Self {
            raw: raw.into(),
            parsed,
        }
    }

    /// Text form for output: the parsed time when available, else the raw text.
    pub fn display(&self) -> String {
        match self.parsed {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.raw.clone(),
        }
    }
}

/// WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: Timestamp,
    pub position: Position,
    /// Readings aligned with the owning track's channel list.
    pub readings: Vec<f64>,
    pub terrain: Option<Terrain>,
}

/// Ordered collection of samples sharing one channel list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    channels: Vec<Channel>,
    samples: Vec<Sample>,
}

impl Track {
    /// Creates an empty track carrying the given channels.
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            samples: Vec::new(),
        }
    }

    /// Samples missing a reading for a channel read as NaN there, like a
    /// blank CSV cell.
    pub fn from_samples(channels: Vec<Channel>, samples: Vec<Sample>) -> Self {
        Self { channels, samples }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    #[inline]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn channel_index(&self, channel: Channel) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }

    pub fn latitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.position.lat).collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.position.lon).collect()
    }

    /// Signal column for a channel, `None` when the track does not carry it.
    pub fn column(&self, channel: Channel) -> Option<Vec<f64>> {
        let idx = self.channel_index(channel)?;
        Some(
            self.samples
                .iter()
                .map(|s| s.readings.get(idx).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    /// Single reading of sample `i`.
    pub fn reading(&self, i: usize, channel: Channel) -> Option<f64> {
        let idx = self.channel_index(channel)?;
        self.samples
            .get(i)
            .map(|s| s.readings.get(idx).copied().unwrap_or(f64::NAN))
    }

    /// New track holding the samples at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Track {
        Track {
            channels: self.channels.clone(),
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
        }
    }
}
