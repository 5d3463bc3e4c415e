//! Robust outlier rejection with the median absolute deviation (MAD).
//!
//! A value is kept when it lies inside
//! `median ± threshold * MAD / 0.6745`, where `MAD / 0.6745` estimates the
//! standard deviation of normally distributed data. A column with zero MAD
//! is left untouched.
//!
//! Several columns are filtered by sequential narrowing: each pass
//! recomputes median and MAD on the survivors of the previous pass, so the
//! axis order can change the result.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::track::{Channel, Track};

/// Converts a MAD into a standard deviation estimate under normality.
pub const MAD_TO_SIGMA: f64 = 0.6745;

/// Errors that can occur during outlier filtering.
#[derive(Debug, Error, PartialEq)]
pub enum OutlierError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for outlier operations.
pub type Result<T> = std::result::Result<T, OutlierError>;

/// Tolerance band around the median of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub median: f64,
    pub mad: f64,
    /// Half width: `threshold * mad / 0.6745`.
    pub bound: f64,
}

impl Band {
    #[inline]
    pub fn lower(&self) -> f64 {
        self.median - self.bound
    }

    #[inline]
    pub fn upper(&self) -> f64 {
        self.median + self.bound
    }

    /// Inclusive on both ends. NaN is never inside.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower() && value <= self.upper()
    }
}

/// Median of the finite values; the mean of the two middle values for an
/// even count.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(OutlierError::InvalidInput(format!(
            "threshold must be a positive number, got {}",
            threshold
        )))
    }
}

/// Compute the tolerance band of a column.
///
/// # Returns
///
/// `Ok(None)` when the MAD is zero: the column is constant around its
/// median and cannot support a band.
///
/// # Errors
///
/// Returns `InvalidInput` for an empty column, a column without any finite
/// value, or a threshold that is not a positive number.
pub fn robust_band(values: &[f64], threshold: f64) -> Result<Option<Band>> {
    check_threshold(threshold)?;
    if values.is_empty() {
        return Err(OutlierError::InvalidInput(
            "cannot filter an empty column".to_string(),
        ));
    }

    let m = median(values).ok_or_else(|| {
        OutlierError::InvalidInput("column has no finite values".to_string())
    })?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    // deviations of finite values are finite, so a median exists
    let mad = median(&deviations).unwrap_or(0.0);

    if mad == 0.0 {
        return Ok(None);
    }

    Ok(Some(Band {
        median: m,
        mad,
        bound: threshold * (mad / MAD_TO_SIGMA),
    }))
}

/// Keep-mask for a single column.
///
/// The mask has one entry per input value. With zero MAD every entry is
/// `true`.
pub fn mad_mask(values: &[f64], threshold: f64) -> Result<Vec<bool>> {
    match robust_band(values, threshold)? {
        None => Ok(vec![true; values.len()]),
        Some(band) => Ok(values.iter().map(|&v| band.contains(v)).collect()),
    }
}

/// Indices of the values kept by [`mad_mask`], in ascending order.
pub fn retained_indices(values: &[f64], threshold: f64) -> Result<Vec<usize>> {
    Ok(mad_mask(values, threshold)?
        .into_iter()
        .enumerate()
        .filter(|(_, keep)| *keep)
        .map(|(i, _)| i)
        .collect())
}

/// Column of a track that can be filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Latitude,
    Longitude,
    Channel(Channel),
}

impl Axis {
    fn values(self, track: &Track) -> Result<Vec<f64>> {
        match self {
            Axis::Latitude => Ok(track.latitudes()),
            Axis::Longitude => Ok(track.longitudes()),
            Axis::Channel(c) => track.column(c).ok_or_else(|| {
                OutlierError::InvalidInput(format!("track has no {} channel", c))
            }),
        }
    }
}

/// Latitude first, then longitude: the order used by the field scripts.
pub fn default_order() -> Vec<Axis> {
    vec![Axis::Latitude, Axis::Longitude]
}

/// Sequentially narrow a set of aligned columns.
///
/// Each column is filtered on the rows that survived every earlier column.
///
/// # Arguments
///
/// * `columns` - Columns of equal length, in filtering order
/// * `threshold` - Band width in estimated standard deviations
///
/// # Returns
///
/// Indices of the surviving rows, ascending. Once a pass removes every
/// row the remaining columns are skipped and the result is empty.
pub fn sequential_indices(columns: &[&[f64]], threshold: f64) -> Result<Vec<usize>> {
    check_threshold(threshold)?;
    let len = columns.first().map_or(0, |c| c.len());
    if columns.iter().any(|c| c.len() != len) {
        return Err(OutlierError::InvalidInput(
            "columns must have equal length".to_string(),
        ));
    }

    let mut survivors: Vec<usize> = (0..len).collect();
    for (pass, column) in columns.iter().enumerate() {
        if pass > 0 && survivors.is_empty() {
            debug!("MAD pass {} removed every row", pass);
            break;
        }
        let values: Vec<f64> = survivors.iter().map(|&i| column[i]).collect();
        let mask = mad_mask(&values, threshold)?;
        survivors = survivors
            .into_iter()
            .zip(mask)
            .filter(|(_, keep)| *keep)
            .map(|(i, _)| i)
            .collect();
    }
    Ok(survivors)
}

/// Filter a track on the given axes in order.
///
/// Returns a new track holding the surviving samples; the input is not
/// modified. An empty order keeps every sample.
pub fn filter_track(track: &Track, order: &[Axis], threshold: f64) -> Result<Track> {
    check_threshold(threshold)?;
    if order.is_empty() {
        debug!("MAD filter: no axes given, keeping all {} samples", track.len());
        return Ok(track.clone());
    }

    let columns = order
        .iter()
        .map(|axis| axis.values(track))
        .collect::<Result<Vec<Vec<f64>>>>()?;
    let refs: Vec<&[f64]> = columns.iter().map(|c| c.as_slice()).collect();

    let keep = sequential_indices(&refs, threshold)?;
    debug!(
        "MAD filter (threshold {}, order {:?}): kept {} of {} samples",
        threshold,
        order,
        keep.len(),
        track.len()
    );
    Ok(track.select(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::{Position, Sample, Timestamp};

    fn gps_track(lat: &[f64], lon: &[f64]) -> Track {
        let samples = lat
            .iter()
            .zip(lon)
            .map(|(&la, &lo)| Sample {
                time: Timestamp::new("", None),
                position: Position::new(la, lo),
                readings: Vec::new(),
                terrain: None,
            })
            .collect();
        Track::from_samples(Vec::new(), samples)
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_single_outlier_excluded() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 1000.0];

        let band = robust_band(&values, 3.0).unwrap().unwrap();
        assert_eq!(band.median, 5.5);
        assert_eq!(band.mad, 2.5);
        assert!((band.bound - 11.119).abs() < 1e-3);

        assert_eq!(retained_indices(&values, 3.0).unwrap(), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_mad_keeps_everything() {
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];

        assert_eq!(robust_band(&values, 3.0).unwrap(), None);
        assert_eq!(mad_mask(&values, 3.0).unwrap(), vec![true; 5]);
        assert_eq!(retained_indices(&values, 0.01).unwrap().len(), 5);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        assert!(matches!(mad_mask(&[], 3.0), Err(OutlierError::InvalidInput(_))));
        assert!(matches!(
            mad_mask(&[f64::NAN, f64::NAN], 3.0),
            Err(OutlierError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bad_threshold_is_invalid() {
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                mad_mask(&[1.0, 2.0, 3.0], t),
                Err(OutlierError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_nan_is_dropped_by_band() {
        let values = [1.0, 2.0, f64::NAN, 3.0, 4.0];
        assert_eq!(
            mad_mask(&values, 3.0).unwrap(),
            vec![true, true, false, true, true]
        );
    }

    #[test]
    fn test_band_is_inclusive() {
        let band = Band {
            median: 0.0,
            mad: 1.0,
            bound: 2.0,
        };
        assert!(band.contains(2.0));
        assert!(band.contains(-2.0));
        assert!(!band.contains(2.0001));
        assert!(!band.contains(f64::NAN));
    }

    /// One engineered outlier per axis; the second pass sees a different
    /// median/MAD depending on which axis went first.
    #[test]
    fn test_sequential_order_matters() {
        let lat: Vec<f64> = [6.0, 1.0, 3.0, 1.0, 20.0, 6.0, 0.0]
            .iter()
            .map(|d| 30.0 + d * 1e-3)
            .collect();
        let lon: Vec<f64> = [1.0, 3.0, 0.0, 6.0, 0.0, 3.0, 0.0]
            .iter()
            .map(|d| 120.0 + d * 1e-3)
            .collect();
        let track = gps_track(&lat, &lon);

        let lat_first = filter_track(&track, &[Axis::Latitude, Axis::Longitude], 3.0).unwrap();
        let lon_first = filter_track(&track, &[Axis::Longitude, Axis::Latitude], 3.0).unwrap();

        assert_eq!(lat_first.len(), 6);
        assert_eq!(lon_first.len(), 5);
    }

    #[test]
    fn test_sequential_indices_length_mismatch() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        assert!(sequential_indices(&[&a, &b], 3.0).is_err());
    }

    #[test]
    fn test_filter_track_on_channel() {
        let samples = [1.0, 2.0, 3.0, 4.0, 500.0]
            .iter()
            .map(|&v| Sample {
                time: Timestamp::new("", None),
                position: Position::new(30.0, 120.0),
                readings: vec![v],
                terrain: None,
            })
            .collect();
        let track = Track::from_samples(vec![Channel::Pm25], samples);

        let filtered = filter_track(&track, &[Axis::Channel(Channel::Pm25)], 3.0).unwrap();
        assert_eq!(filtered.column(Channel::Pm25), Some(vec![1.0, 2.0, 3.0, 4.0]));

        let missing = filter_track(&track, &[Axis::Channel(Channel::Voc)], 3.0);
        assert!(missing.is_err());
    }

    #[test]
    fn test_empty_order_keeps_track() {
        let track = gps_track(&[30.0, 30.1, 30.2, 30.3, 90.0], &[120.0; 5]);

        let filtered = filter_track(&track, &[], 3.0).unwrap();

        assert_eq!(filtered, track);
        assert!(filter_track(&track, &[], -1.0).is_err());
    }

    #[test]
    fn test_exhausted_pass_skips_remaining_columns() {
        let a = [0.0, 1.0, 2.0, 3.0];
        let b = [0.0, 1.0, 2.0, 3.0];

        // band [1.35, 1.65] keeps none of the first column
        assert_eq!(sequential_indices(&[&a, &b], 0.1).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_filter_empty_track_is_invalid() {
        let track = gps_track(&[], &[]);
        assert!(matches!(
            filter_track(&track, &default_order(), 3.0),
            Err(OutlierError::InvalidInput(_))
        ));
    }
}
