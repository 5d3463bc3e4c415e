//! Interactive web map documents.
//!
//! A [`WebMap`] describes base tile layers, overlay layers (heatmaps,
//! animated paths, circle markers), a legend and the map controls.
//! [`WebMap::render_html`] turns it into a standalone Leaflet page: the
//! map description is embedded as JSON and a small script builds the
//! Leaflet layers from it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Result, VisualizationError};

const LEAFLET_VERSION: &str = "1.9.4";

/// Background imagery composited beneath the overlays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLayer {
    pub name: String,
    pub url: String,
    pub attribution: String,
    pub max_zoom: u8,
}

/// Built-in tile sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileProvider {
    OpenStreetMap,
    CartoPositron,
    CartoDarkMatter,
    GoogleSatellite,
    GoogleStreet,
}

impl TileProvider {
    pub fn layer(self) -> TileLayer {
        let (name, url, attribution, max_zoom) = match self {
            TileProvider::OpenStreetMap => (
                "OpenStreetMap",
                "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
                "&copy; OpenStreetMap contributors",
                19,
            ),
            TileProvider::CartoPositron => (
                "CartoDB positron",
                "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
                "&copy; OpenStreetMap contributors &copy; CARTO",
                20,
            ),
            TileProvider::CartoDarkMatter => (
                "CartoDB dark_matter",
                "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
                "&copy; OpenStreetMap contributors &copy; CARTO",
                20,
            ),
            TileProvider::GoogleSatellite => (
                "Google Satellite",
                "https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}",
                "Google",
                20,
            ),
            TileProvider::GoogleStreet => (
                "Google Street",
                "https://mt1.google.com/vt/lyrs=m&x={x}&y={y}&z={z}",
                "Google",
                20,
            ),
        };
        TileLayer {
            name: name.to_string(),
            url: url.to_string(),
            attribution: attribution.to_string(),
            max_zoom,
        }
    }
}

impl FromStr for TileProvider {
    type Err = VisualizationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "openstreetmap" | "osm" => Ok(TileProvider::OpenStreetMap),
            "cartopositron" | "cartodbpositron" | "positron" => Ok(TileProvider::CartoPositron),
            "cartodarkmatter" | "cartodbdarkmatter" | "darkmatter" => {
                Ok(TileProvider::CartoDarkMatter)
            }
            "googlesatellite" | "satellite" => Ok(TileProvider::GoogleSatellite),
            "googlestreet" | "street" => Ok(TileProvider::GoogleStreet),
            _ => Err(VisualizationError::PlottingError(format!(
                "unknown tile provider: {}",
                s
            ))),
        }
    }
}

/// Map corner used by controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Density layer; each point is `[lat, lon, weight]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatLayer {
    pub points: Vec<[f64; 3]>,
    pub radius: f64,
    pub blur: f64,
    pub min_opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<BTreeMap<String, String>>,
}

impl HeatLayer {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            radius: 15.0,
            blur: 10.0,
            min_opacity: 0.4,
            gradient: None,
        }
    }

    /// Gradient from `(position, css color)` stops.
    pub fn with_gradient(mut self, stops: &[(f64, String)]) -> Self {
        self.gradient = Some(
            stops
                .iter()
                .map(|(pos, color)| (format!("{}", pos), color.clone()))
                .collect(),
        );
        self
    }
}

/// Animated dashed polyline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AntPath {
    pub points: Vec<[f64; 2]>,
    pub color: String,
    pub pulse_color: String,
    pub weight: u32,
    /// Animation period in milliseconds; smaller is faster.
    pub delay: u32,
    pub dash_array: [u32; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

/// Fixed-pixel-radius circle with an optional popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleMarker {
    pub location: [f64; 2],
    pub radius: f64,
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub opacity: f64,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<String>,
    pub popup_max_width: u32,
}

/// Content of an overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayerContent {
    Heatmap(HeatLayer),
    AntPaths { paths: Vec<AntPath> },
    CircleMarkers { markers: Vec<CircleMarker> },
}

/// Named overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub name: String,
    /// Visible when the page opens.
    pub show: bool,
    /// Listed in the layer toggle control.
    pub control: bool,
    pub layer: LayerContent,
}

impl Overlay {
    pub fn new(name: impl Into<String>, layer: LayerContent) -> Self {
        Self {
            name: name.into(),
            show: true,
            control: true,
            layer,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.show = false;
        self
    }

    /// Keep the layer out of the layer toggle control.
    pub fn fixed(mut self) -> Self {
        self.control = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendTheme {
    Light,
    Dark,
}

/// Legend overlay: a title, colored bullets and an optional footnote.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub position: Corner,
    pub title: String,
    pub entries: Vec<(String, String)>,
    pub note: Option<String>,
    pub theme: LegendTheme,
}

impl Legend {
    fn to_html(&self) -> String {
        let (background, foreground, border) = match self.theme {
            LegendTheme::Light => ("white", "#222", "#CACFD2"),
            LegendTheme::Dark => ("rgba(44, 62, 80, 0.8)", "white", "#566573"),
        };
        let mut html = String::new();
        let _ = write!(
            html,
            "<div style=\"background:{};color:{};border:1px solid {};padding:10px 12px;\
             border-radius:6px;min-width:180px;font-size:12px;\
             font-family:'Helvetica Neue',Helvetica,Arial,sans-serif;\
             box-shadow:0 0 10px rgba(0,0,0,0.1);\">",
            background, foreground, border
        );
        let _ = write!(html, "<b style=\"font-size:13px;\">{}</b>", escape_html(&self.title));
        html.push_str("<div style=\"margin-top:8px;\">");
        for (color, label) in &self.entries {
            let _ = write!(
                html,
                "<span style=\"color:{}\">&#9679;</span> {}<br>",
                escape_html(color),
                escape_html(label)
            );
        }
        html.push_str("</div>");
        if let Some(note) = &self.note {
            let _ = write!(
                html,
                "<hr style=\"margin:8px 0;border:0;border-top:1px solid {};\"><small>{}</small>",
                border,
                escape_html(note)
            );
        }
        html.push_str("</div>");
        html
    }
}

/// Layer toggle control settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerControl {
    pub position: Corner,
    pub collapsed: bool,
}

/// Interactive map document.
#[derive(Debug, Clone, PartialEq)]
pub struct WebMap {
    pub title: String,
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub control_scale: bool,
    pub fullscreen: bool,
    /// The first base layer is shown on load.
    pub base_layers: Vec<TileLayer>,
    pub overlays: Vec<Overlay>,
    pub layer_control: Option<LayerControl>,
    pub legend: Option<Legend>,
}

/// JSON shape consumed by the page script.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapSpec<'a> {
    center: [f64; 2],
    zoom: u8,
    control_scale: bool,
    fullscreen: bool,
    base_layers: &'a [TileLayer],
    overlays: &'a [Overlay],
    layer_control: Option<LayerControl>,
    legend: Option<LegendSpec>,
}

#[derive(Serialize)]
struct LegendSpec {
    position: Corner,
    html: String,
}

const PAGE_SCRIPT: &str = r#"(function () {
  var spec = window.MAP_SPEC;
  var map = L.map('map', { center: spec.center, zoom: spec.zoom });
  if (spec.controlScale) { L.control.scale().addTo(map); }

  var bases = {};
  spec.baseLayers.forEach(function (b, i) {
    var tiles = L.tileLayer(b.url, { attribution: b.attribution, maxZoom: b.maxZoom });
    bases[b.name] = tiles;
    if (i === 0) { tiles.addTo(map); }
  });

  var overlays = {};
  spec.overlays.forEach(function (o) {
    var group = L.layerGroup();
    var layer = o.layer;
    if (layer.kind === 'heatmap') {
      var opts = { radius: layer.radius, blur: layer.blur, minOpacity: layer.minOpacity };
      if (layer.gradient !== undefined) { opts.gradient = layer.gradient; }
      group.addLayer(L.heatLayer(layer.points, opts));
    } else if (layer.kind === 'antPaths') {
      layer.paths.forEach(function (p) {
        var path = L.polyline.antPath(p.points, {
          color: p.color, pulseColor: p.pulseColor, weight: p.weight,
          delay: p.delay, dashArray: p.dashArray
        });
        if (p.tooltip !== undefined) { path.bindTooltip(p.tooltip); }
        group.addLayer(path);
      });
    } else if (layer.kind === 'circleMarkers') {
      layer.markers.forEach(function (m) {
        var marker = L.circleMarker(m.location, {
          radius: m.radius, color: m.color, weight: m.weight, opacity: m.opacity,
          fill: true, fillColor: m.fillColor, fillOpacity: m.fillOpacity
        });
        if (m.popup !== undefined) { marker.bindPopup(m.popup, { maxWidth: m.popupMaxWidth }); }
        group.addLayer(marker);
      });
    }
    if (o.show) { group.addTo(map); }
    if (o.control) { overlays[o.name] = group; }
  });

  if (spec.fullscreen && L.control.fullscreen) { L.control.fullscreen().addTo(map); }
  if (spec.layerControl) {
    L.control.layers(bases, overlays, {
      position: spec.layerControl.position, collapsed: spec.layerControl.collapsed
    }).addTo(map);
  }
  if (spec.legend) {
    var legend = L.control({ position: spec.legend.position });
    legend.onAdd = function () {
      var div = L.DomUtil.create('div', 'map-legend');
      div.innerHTML = spec.legend.html;
      return div;
    };
    legend.addTo(map);
  }
})();"#;

impl WebMap {
    pub fn new(title: impl Into<String>, center: [f64; 2], zoom: u8) -> Self {
        Self {
            title: title.into(),
            center,
            zoom,
            control_scale: true,
            fullscreen: false,
            base_layers: Vec::new(),
            overlays: Vec::new(),
            layer_control: None,
            legend: None,
        }
    }

    pub fn with_tiles(mut self, provider: TileProvider) -> Self {
        self.base_layers.push(provider.layer());
        self
    }

    pub fn add_overlay(&mut self, overlay: Overlay) {
        self.overlays.push(overlay);
    }

    /// Render the standalone HTML page.
    ///
    /// # Errors
    ///
    /// Returns an error if the map has no base layer or the layer data
    /// cannot be serialized.
    pub fn render_html(&self) -> Result<String> {
        if self.base_layers.is_empty() {
            return Err(VisualizationError::PlottingError(
                "web map needs at least one tile layer".to_string(),
            ));
        }

        let spec = MapSpec {
            center: self.center,
            zoom: self.zoom,
            control_scale: self.control_scale,
            fullscreen: self.fullscreen,
            base_layers: &self.base_layers,
            overlays: &self.overlays,
            layer_control: self.layer_control,
            legend: self.legend.as_ref().map(|l| LegendSpec {
                position: l.position,
                html: l.to_html(),
            }),
        };
        let json = serde_json::to_string(&spec)
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?
            .replace("</", "<\\/");

        let mut html = String::with_capacity(json.len() + PAGE_SCRIPT.len() + 2048);
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        let _ = writeln!(html, "<title>{}</title>", escape_html(&self.title));
        let _ = writeln!(
            html,
            "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@{v}/dist/leaflet.css\">\n\
             <link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet.fullscreen@3.0.2/Control.FullScreen.css\">\n\
             <style>html, body, #map {{ height: 100%; margin: 0; }}</style>\n\
             <script src=\"https://unpkg.com/leaflet@{v}/dist/leaflet.js\"></script>\n\
             <script src=\"https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js\"></script>\n\
             <script src=\"https://unpkg.com/leaflet-ant-path@1.3.0/dist/leaflet-ant-path.js\"></script>\n\
             <script src=\"https://unpkg.com/leaflet.fullscreen@3.0.2/Control.FullScreen.js\"></script>",
            v = LEAFLET_VERSION
        );
        html.push_str("</head>\n<body>\n<div id=\"map\"></div>\n<script>\nwindow.MAP_SPEC = ");
        html.push_str(&json);
        html.push_str(";\n</script>\n<script>\n");
        html.push_str(PAGE_SCRIPT);
        html.push_str("\n</script>\n</body>\n</html>\n");

        Ok(html)
    }
}

/// Escape text for inclusion in HTML markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> WebMap {
        let mut map = WebMap::new("Test map", [30.5, 114.3], 15).with_tiles(TileProvider::OpenStreetMap);
        map.add_overlay(Overlay::new(
            "PM2.5 Heatmap",
            LayerContent::Heatmap(HeatLayer::new(vec![[30.5, 114.3, 12.0]])),
        ));
        map
    }

    #[test]
    fn test_render_html_embeds_layers() {
        let html = sample_map().render_html().unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Test map</title>"));
        assert!(html.contains("\"kind\":\"heatmap\""));
        assert!(html.contains("\"name\":\"PM2.5 Heatmap\""));
        assert!(html.contains("\"points\":[[30.5,114.3,12.0]]"));
        assert!(html.contains("tile.openstreetmap.org"));
        assert!(html.contains("L.heatLayer"));
    }

    #[test]
    fn test_render_html_needs_tiles() {
        let map = WebMap::new("No tiles", [0.0, 0.0], 3);
        assert!(map.render_html().is_err());
    }

    #[test]
    fn test_script_breakout_is_escaped() {
        let mut map = sample_map();
        map.add_overlay(Overlay::new(
            "Points",
            LayerContent::CircleMarkers {
                markers: vec![CircleMarker {
                    location: [30.5, 114.3],
                    radius: 2.0,
                    color: "white".into(),
                    fill_color: "blue".into(),
                    fill_opacity: 0.6,
                    opacity: 1.0,
                    weight: 1.0,
                    popup: Some("</script><b>x</b>".into()),
                    popup_max_width: 200,
                }],
            },
        ));

        let html = map.render_html().unwrap();

        // four library includes plus the data and bootstrap blocks
        assert_eq!(html.matches("</script>").count(), 6);
        assert!(html.contains("<\\/script>"));
    }

    #[test]
    fn test_legend_and_controls() {
        let mut map = sample_map();
        map.fullscreen = true;
        map.layer_control = Some(LayerControl {
            position: Corner::TopRight,
            collapsed: false,
        });
        map.legend = Some(Legend {
            position: Corner::BottomLeft,
            title: "Vibration <SVM>".into(),
            entries: vec![("#943126".into(), "Extreme".into())],
            note: Some("Top 5%".into()),
            theme: LegendTheme::Light,
        });

        let html = map.render_html().unwrap();

        assert!(html.contains("\"layerControl\":{\"position\":\"topright\",\"collapsed\":false}"));
        assert!(html.contains("\"position\":\"bottomleft\""));
        assert!(html.contains("Vibration &lt;SVM&gt;"));
        assert!(html.contains("\"fullscreen\":true"));
    }

    #[test]
    fn test_overlay_flags() {
        let overlay = Overlay::new("VOC", LayerContent::AntPaths { paths: vec![] })
            .hidden()
            .fixed();
        assert!(!overlay.show);
        assert!(!overlay.control);
    }

    #[test]
    fn test_tile_provider_from_str() {
        assert_eq!("CartoDB dark_matter".parse::<TileProvider>().unwrap(), TileProvider::CartoDarkMatter);
        assert_eq!("cartodb positron".parse::<TileProvider>().unwrap(), TileProvider::CartoPositron);
        assert_eq!("OSM".parse::<TileProvider>().unwrap(), TileProvider::OpenStreetMap);
        assert!("bing".parse::<TileProvider>().is_err());
    }

    #[test]
    fn test_heat_gradient_keys() {
        let layer = HeatLayer::new(vec![]).with_gradient(&[(0.2, "blue".into()), (1.0, "red".into())]);
        let gradient = layer.gradient.unwrap();
        assert_eq!(gradient.get("0.2").map(String::as_str), Some("blue"));
        assert_eq!(gradient.get("1").map(String::as_str), Some("red"));
    }
}
