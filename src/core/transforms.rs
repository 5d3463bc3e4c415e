//! Track transformations: cleaning, ordering, resampling and ranking.
//!
//! Every function here takes a track (or a column) by reference and returns
//! new data; nothing is modified in place.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::track::{Channel, Track};

/// Errors raised by transforms that need a minimum amount of data.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Rule deciding which GPS fixes count as valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "min")]
pub enum PositionValidity {
    /// Latitude and longitude both non-zero (no fix is logged as 0,0).
    /// Blank coordinates never pass.
    NonZero,
    /// Latitude and longitude both strictly above the given value.
    Above(f64),
}

impl PositionValidity {
    pub fn accepts(self, lat: f64, lon: f64) -> bool {
        match self {
            PositionValidity::NonZero => {
                lat.is_finite() && lon.is_finite() && lat != 0.0 && lon != 0.0
            }
            PositionValidity::Above(min) => lat > min && lon > min,
        }
    }
}

/// Keep only samples whose position passes the validity rule.
pub fn drop_invalid_positions(track: &Track, rule: PositionValidity) -> Track {
    let keep: Vec<usize> = track
        .samples()
        .iter()
        .enumerate()
        .filter(|(_, s)| rule.accepts(s.position.lat, s.position.lon))
        .map(|(i, _)| i)
        .collect();
    track.select(&keep)
}

/// Stable sort by parsed timestamp. Samples without one follow the timed
/// samples in their original order.
pub fn sort_by_time(track: &Track) -> Track {
    let samples = track.samples();
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| match (samples[a].time.parsed, samples[b].time.parsed) {
        (Some(ta), Some(tb)) => ta.cmp(&tb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    track.select(&order)
}

/// Track resampled to evenly spaced points along the sample index.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledTrack {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub channels: Vec<(Channel, Vec<f64>)>,
}

impl ResampledTrack {
    pub fn len(&self) -> usize {
        self.lat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lat.is_empty()
    }

    pub fn column(&self, channel: Channel) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| v.as_slice())
    }
}

/// `n` evenly spaced positions over `[start, end]`, endpoints included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Linear interpolation of `values` (sampled at integer positions
/// `0..values.len()`) at fractional positions `at`.
fn interp_index(values: &[f64], at: &[f64]) -> Vec<f64> {
    let last = values.len() - 1;
    at.iter()
        .map(|&t| {
            let t = t.clamp(0.0, last as f64);
            let lo = (t.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = t - lo as f64;
            if frac == 0.0 || lo == hi {
                values[lo]
            } else {
                values[lo] + (values[hi] - values[lo]) * frac
            }
        })
        .collect()
}

/// Resample latitude, longitude and every channel to `n` points by linear
/// interpolation along the sample index.
///
/// # Errors
///
/// Returns `InvalidInput` if the track has fewer than two samples or `n` is zero.
pub fn resample_linear(track: &Track, n: usize) -> Result<ResampledTrack> {
    if track.len() < 2 {
        return Err(TransformError::InvalidInput(format!(
            "interpolation needs at least 2 samples, got {}",
            track.len()
        )));
    }
    if n == 0 {
        return Err(TransformError::InvalidInput(
            "resample count must be positive".to_string(),
        ));
    }

    let at = linspace(0.0, (track.len() - 1) as f64, n);

    let channels = track
        .channels()
        .iter()
        .filter_map(|&c| track.column(c).map(|col| (c, interp_index(&col, &at))))
        .collect();

    Ok(ResampledTrack {
        lat: interp_index(&track.latitudes(), &at),
        lon: interp_index(&track.longitudes(), &at),
        channels,
    })
}

/// Signal vector magnitude: Euclidean norm of the given axes per sample.
///
/// Axes the track does not carry are skipped.
pub fn signal_vector_magnitude(track: &Track, axes: &[Channel]) -> Vec<f64> {
    let columns: Vec<Vec<f64>> = axes.iter().filter_map(|&a| track.column(a)).collect();
    (0..track.len())
        .map(|i| columns.iter().map(|c| c[i] * c[i]).sum::<f64>().sqrt())
        .collect()
}

/// Indices of `values` ordered largest first. Ties keep input order and NaN
/// values sort last.
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| match (values[a].is_nan(), values[b].is_nan()) {
        (false, false) => values[b].partial_cmp(&values[a]).unwrap_or(Ordering::Equal),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    });
    order
}

/// Leading `floor(len * fraction)` entries of a ranking.
pub fn top_fraction(ranked: &[usize], fraction: f64) -> &[usize] {
    let count = (ranked.len() as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
    &ranked[..count.min(ranked.len())]
}

/// Every `n`-th sample starting with the first.
pub fn every_nth(track: &Track, n: usize) -> Track {
    let step = n.max(1);
    let keep: Vec<usize> = (0..track.len()).step_by(step).collect();
    track.select(&keep)
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

fn finite_min_max(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Bounding box of the positions widened by `pad` degrees on every side.
pub fn padded_extent(lat: &[f64], lon: &[f64], pad: f64) -> Option<Extent> {
    let (lat_min, lat_max) = finite_min_max(lat)?;
    let (lon_min, lon_max) = finite_min_max(lon)?;
    Some(Extent {
        lon_min: lon_min - pad,
        lon_max: lon_max + pad,
        lat_min: lat_min - pad,
        lat_max: lat_max + pad,
    })
}

/// Mean position of the track, used to center web maps.
pub fn centroid(track: &Track) -> Option<(f64, f64)> {
    if track.is_empty() {
        return None;
    }
    let n = track.len() as f64;
    let lat = track.samples().iter().map(|s| s.position.lat).sum::<f64>() / n;
    let lon = track.samples().iter().map(|s| s.position.lon).sum::<f64>() / n;
    Some((lat, lon))
}

/// Sampling period banner, e.g. `Sampling Period: 2026-01-22 09:00 - 10:30 (CST)`.
pub fn sampling_period(track: &Track, zone_label: &str) -> Option<String> {
    let mut times = track.samples().iter().filter_map(|s| s.time.parsed);
    let first = times.next()?;
    let (start, end) = times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
    Some(format!(
        "Sampling Period: {} - {} ({})",
        start.format("%Y-%m-%d %H:%M"),
        end.format("%H:%M"),
        zone_label
    ))
}
