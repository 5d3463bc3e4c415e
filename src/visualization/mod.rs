//! Visualization tools for sensor tracks.
//!
//! This module provides:
//! - Static multi-panel scatter maps (PNG) rendered with plotters
//! - Interactive web map documents (see [`web_map`])
//! - Named color scales shared by both (see [`colors`])

pub mod colors;
pub mod web_map;

use std::path::Path;

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::transforms::Extent;
pub use colors::ColorScale;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to plot")]
    EmptyTrack,

    #[error("Unknown color scheme: {0} (expected one of: {known})", known = ColorScale::names().join(", "))]
    UnknownColorScheme(String),

    #[error("panel '{panel}' has {values} values for {positions} positions")]
    LengthMismatch {
        panel: String,
        values: usize,
        positions: usize,
    },
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

const SUBTITLE_COLOR: RGBColor = RGBColor(0x33, 0x33, 0x33);

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// One scatter panel: a signal column drawn over the shared positions.
#[derive(Debug, Clone)]
pub struct Panel<'a> {
    pub title: String,
    pub values: &'a [f64],
    pub scale: ColorScale,
}

/// Layout and styling of a panel figure.
#[derive(Debug, Clone)]
pub struct PanelOptions {
    pub width: u32,
    pub height: u32,
    pub point_size: u32,
    pub alpha: f64,
    /// Titles, axis labels and color bar ticks need system fonts; headless
    /// hosts without fonts can switch text off.
    pub draw_text: bool,
    pub title: Option<String>,
    pub subtitle: Option<String>,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            width: 2600,
            height: 900,
            point_size: 4,
            alpha: 0.85,
            draw_text: true,
            title: None,
            subtitle: None,
        }
    }
}

/// Finite min/max of a column, widened when flat.
fn value_range(values: &[f64]) -> (f64, f64) {
    let mut lo = f64::MAX;
    let mut hi = f64::MIN;
    for &v in values.iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo > hi {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    (lo, hi)
}

/// Widen a degenerate extent so the chart has a non-empty range.
fn usable_extent(extent: Extent) -> Extent {
    let mut e = extent;
    if e.lon_max - e.lon_min < 1e-9 {
        e.lon_min -= 1e-4;
        e.lon_max += 1e-4;
    }
    if e.lat_max - e.lat_min < 1e-9 {
        e.lat_min -= 1e-4;
        e.lat_max += 1e-4;
    }
    e
}

/// Render side-by-side scatter panels (longitude on x, latitude on y) with
/// a horizontal color bar under each, and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `lat` / `lon` - Positions shared by every panel
/// * `panels` - One entry per signal, colored by its own scale
/// * `extent` - Map window in degrees
/// * `options` - Figure size, marker style and text switches
pub fn render_panels(
    output_path: &Path,
    lat: &[f64],
    lon: &[f64],
    panels: &[Panel<'_>],
    extent: Extent,
    options: &PanelOptions,
) -> Result<()> {
    if panels.is_empty() || lat.is_empty() {
        return Err(VisualizationError::EmptyTrack);
    }
    for panel in panels {
        if panel.values.len() != lat.len() || lon.len() != lat.len() {
            return Err(VisualizationError::LengthMismatch {
                panel: panel.title.clone(),
                values: panel.values.len(),
                positions: lat.len().min(lon.len()),
            });
        }
    }
    crate::core::writers::ensure_parent_dirs(output_path)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let extent = usable_extent(extent);
    let alpha = options.alpha.clamp(0.0, 1.0);

    let root = BitMapBackend::new(output_path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let header_px: i32 = if options.draw_text { 120 } else { 10 };
    let (header, body) = root.split_vertically(header_px);

    if options.draw_text {
        let center_x = (options.width / 2) as i32;
        if let Some(title) = &options.title {
            let style = TextStyle::from(("sans-serif", 44).into_font())
                .pos(Pos::new(HPos::Center, VPos::Top));
            header
                .draw(&Text::new(title.clone(), (center_x, 18), style))
                .map_err(plot_err)?;
        }
        if let Some(subtitle) = &options.subtitle {
            let style = TextStyle::from(("sans-serif", 28).into_font())
                .color(&SUBTITLE_COLOR)
                .pos(Pos::new(HPos::Center, VPos::Top));
            header
                .draw(&Text::new(subtitle.clone(), (center_x, 72), style))
                .map_err(plot_err)?;
        }
    }

    let areas = body.split_evenly((1, panels.len()));

    for (i, (area, panel)) in areas.iter().zip(panels).enumerate() {
        let bar_px: i32 = if options.draw_text { 70 } else { 30 };
        let area_height = area.dim_in_pixel().1 as i32;
        let (map_area, bar_area) = area.split_vertically((area_height - bar_px).max(1));

        let mut builder = ChartBuilder::on(&map_area);
        builder.margin(10);
        if options.draw_text {
            builder
                .caption(&panel.title, ("sans-serif", 28))
                .x_label_area_size(30)
                .y_label_area_size(if i == 0 { 60 } else { 0 });
        }

        let mut chart = builder
            .build_cartesian_2d(extent.lon_min..extent.lon_max, extent.lat_min..extent.lat_max)
            .map_err(plot_err)?;

        if options.draw_text {
            chart
                .configure_mesh()
                .x_labels(4)
                .y_labels(5)
                .x_label_formatter(&|v| format!("{:.3}", v))
                .y_label_formatter(&|v| format!("{:.3}", v))
                .label_style(("sans-serif", 14))
                .draw()
                .map_err(plot_err)?;
        } else {
            chart
                .plotting_area()
                .draw(&Rectangle::new(
                    [(extent.lon_min, extent.lat_min), (extent.lon_max, extent.lat_max)],
                    BLACK.stroke_width(1),
                ))
                .map_err(plot_err)?;
        }

        let (vmin, vmax) = value_range(panel.values);
        let scale = panel.scale;
        let size = options.point_size;

        chart
            .draw_series(
                lon.iter()
                    .zip(lat)
                    .zip(panel.values)
                    .filter(|((x, y), v)| x.is_finite() && y.is_finite() && v.is_finite())
                    .map(|((&x, &y), &v)| {
                        let [r, g, b] = scale.map_value(v, vmin, vmax);
                        Circle::new((x, y), size, RGBColor(r, g, b).mix(alpha).filled())
                    }),
            )
            .map_err(plot_err)?;

        draw_color_bar(&bar_area, scale, vmin, vmax, options.draw_text)?;
    }

    root.present().map_err(plot_err)?;

    Ok(())
}

/// Horizontal color bar with optional tick labels.
fn draw_color_bar<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    scale: ColorScale,
    vmin: f64,
    vmax: f64,
    draw_text: bool,
) -> Result<()> {
    let (width, _) = area.dim_in_pixel();
    let left = (width as f64 * 0.075) as i32;
    let right = width as i32 - left;
    let top = 6;
    let bottom = top + 16;
    let steps = (right - left).max(2);

    for px in 0..steps {
        let t = px as f64 / (steps - 1) as f64;
        let [r, g, b] = scale.color_at(t);
        area.draw(&Rectangle::new(
            [(left + px, top), (left + px + 1, bottom)],
            RGBColor(r, g, b).filled(),
        ))
        .map_err(plot_err)?;
    }
    area.draw(&Rectangle::new([(left, top), (left + steps, bottom)], BLACK.stroke_width(1)))
        .map_err(plot_err)?;

    if draw_text {
        let style = TextStyle::from(("sans-serif", 14).into_font()).pos(Pos::new(HPos::Center, VPos::Top));
        for k in 0..5 {
            let t = k as f64 / 4.0;
            let x = left + (t * (steps - 1) as f64) as i32;
            let label = format!("{:.1}", vmin + (vmax - vmin) * t);
            area.draw(&Text::new(label, (x, bottom + 4), style.clone()))
                .map_err(plot_err)?;
        }
    }

    Ok(())
}
