//! Named sequential and diverging color scales.
//!
//! Scales are piecewise-linear gradients over a handful of stops sampled
//! from the matplotlib colormaps of the same name. Neighbouring stops are
//! blended in linear sRGB.

use palette::{LinSrgb, Mix, Srgb};

use super::VisualizationError;

/// Stop position in [0, 1] and its RGB color.
type Stop = (f64, [u8; 3]);

const VIRIDIS: &[Stop] = &[
    (0.0, [68, 1, 84]),
    (0.25, [59, 82, 139]),
    (0.5, [33, 145, 140]),
    (0.75, [94, 201, 98]),
    (1.0, [253, 231, 37]),
];

const PLASMA: &[Stop] = &[
    (0.0, [13, 8, 135]),
    (0.25, [126, 3, 168]),
    (0.5, [204, 71, 120]),
    (0.75, [248, 149, 64]),
    (1.0, [240, 249, 33]),
];

const CIVIDIS: &[Stop] = &[
    (0.0, [0, 32, 77]),
    (0.25, [64, 77, 107]),
    (0.5, [124, 123, 120]),
    (0.75, [188, 175, 111]),
    (1.0, [255, 234, 70]),
];

const COOLWARM: &[Stop] = &[
    (0.0, [59, 76, 192]),
    (0.25, [141, 176, 254]),
    (0.5, [221, 221, 221]),
    (0.75, [244, 154, 123]),
    (1.0, [180, 4, 38]),
];

const YLGNBU: &[Stop] = &[
    (0.0, [255, 255, 217]),
    (0.25, [199, 233, 180]),
    (0.5, [65, 182, 196]),
    (0.75, [34, 94, 168]),
    (1.0, [8, 29, 88]),
];

// leaflet.heat default ramp
const HEAT: &[Stop] = &[
    (0.0, [0, 0, 255]),
    (0.4, [0, 0, 255]),
    (0.6, [0, 255, 255]),
    (0.7, [0, 255, 0]),
    (0.8, [255, 255, 0]),
    (1.0, [255, 0, 0]),
];

/// Color for values that cannot be placed on a scale (NaN).
pub const MISSING_COLOR: [u8; 3] = [180, 180, 180];

/// A named gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    name: &'static str,
    stops: &'static [Stop],
}

impl ColorScale {
    pub const VIRIDIS: ColorScale = ColorScale { name: "viridis", stops: VIRIDIS };
    pub const PLASMA: ColorScale = ColorScale { name: "plasma", stops: PLASMA };
    pub const CIVIDIS: ColorScale = ColorScale { name: "cividis", stops: CIVIDIS };
    pub const COOLWARM: ColorScale = ColorScale { name: "coolwarm", stops: COOLWARM };
    pub const YLGNBU: ColorScale = ColorScale { name: "ylgnbu", stops: YLGNBU };
    pub const HEAT: ColorScale = ColorScale { name: "heat", stops: HEAT };

    const ALL: [ColorScale; 6] = [
        Self::VIRIDIS,
        Self::PLASMA,
        Self::CIVIDIS,
        Self::COOLWARM,
        Self::YLGNBU,
        Self::HEAT,
    ];

    /// Look up a scale by name (case-insensitive).
    pub fn by_name(name: &str) -> Result<Self, VisualizationError> {
        Self::ALL
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| VisualizationError::UnknownColorScheme(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Names of every built-in scale.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.name).collect()
    }

    /// Color at position `t` in [0, 1]; out-of-range positions are clamped.
    pub fn color_at(&self, t: f64) -> [u8; 3] {
        if t.is_nan() {
            return MISSING_COLOR;
        }
        let t = t.clamp(0.0, 1.0);

        let upper = self
            .stops
            .iter()
            .position(|(pos, _)| *pos >= t)
            .unwrap_or(self.stops.len() - 1);
        if upper == 0 {
            return self.stops[0].1;
        }

        let (p0, c0) = self.stops[upper - 1];
        let (p1, c1) = self.stops[upper];
        let span = p1 - p0;
        let frac = if span > 0.0 { (t - p0) / span } else { 1.0 };

        let mixed = to_linear(c0).mix(to_linear(c1), frac as f32);
        let (r, g, b) = Srgb::<f32>::from_linear(mixed)
            .into_format::<u8>()
            .into_components();
        [r, g, b]
    }

    /// Color for `value` normalised over `[min, max]`.
    pub fn map_value(&self, value: f64, min: f64, max: f64) -> [u8; 3] {
        let span = max - min;
        let t = if span > 0.0 { (value - min) / span } else { 0.5 };
        self.color_at(t)
    }

    /// Stops as `(position, "#rrggbb")`, the form web heat layers take.
    pub fn hex_stops(&self) -> Vec<(f64, String)> {
        self.stops.iter().map(|(p, c)| (*p, to_hex(*c))).collect()
    }
}

fn to_linear(rgb: [u8; 3]) -> LinSrgb<f32> {
    Srgb::new(rgb[0], rgb[1], rgb[2])
        .into_format::<f32>()
        .into_linear()
}

/// `#rrggbb` form of a color.
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}
