use crate::colormap::{self, ColorScale};
use crate::config::{MapConfig, MAX_MARKER_RADIUS};
use crate::types::{BaseMap, CityPoint};
use anyhow::{Context, Result};
use font8x8::{
    UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, GREEK_FONTS, HIRAGANA_FONTS, LATIN_FONTS,
    MISC_FONTS,
};
use geo::{BoundingRect, Coord, LineString, Rect};
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const TITLE_BAND: u32 = 60;
const LEGEND_BAND: u32 = 150;
const MARGIN: u32 = 20;
const GLYPH: i32 = 8;
const COLOR_BAR_WIDTH: i32 = 24;
const LEGEND_TICKS: usize = 5;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LAND_FILL: Rgba<u8> = Rgba([0xf5, 0xf5, 0xf5, 255]); // whitesmoke
const LAND_EDGE: Rgba<u8> = Rgba([0x80, 0x80, 0x80, 255]); // gray
const INK: Rgba<u8> = Rgba([0x22, 0x22, 0x22, 255]);

/// Hollow box drawn for characters no bitmap font covers.
const MISSING_GLYPH: [u8; 8] = [0x7e, 0x42, 0x42, 0x42, 0x42, 0x42, 0x7e, 0x00];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPlacement {
    pub city: String,
    pub pm25: f64,
    pub x: i32,
    pub y: i32,
    pub color: String,
    pub scale_position: f64,
}

/// Everything data-driven about a rendered map. Reproducible for a fixed
/// dataset, base map and config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayout {
    pub width: u32,
    pub height: u32,
    pub base_map: PathBuf,
    /// (min_lon, min_lat, max_lon, max_lat) of the drawn extent
    pub extent: (f64, f64, f64, f64),
    pub scale_min: Option<f64>,
    pub scale_max: Option<f64>,
    pub markers: Vec<MarkerPlacement>,
}

#[derive(Debug, Clone)]
pub struct RenderedMap {
    pub image: RgbaImage,
    pub layout: MapLayout,
}

#[derive(Debug, Clone)]
pub enum MapRender {
    Rendered(RenderedMap),
    Skipped,
}

/// Draws the base polygons with the city markers on top, or skips when
/// there is no base map.
pub fn render_composite_map(base: Option<&BaseMap>, points: &[CityPoint], config: &MapConfig) -> MapRender {
    let Some(base) = base else {
        tracing::debug!("No base map, skipping map render");
        return MapRender::Skipped;
    };

    let width = config.width.max(LEGEND_BAND + 2 * MARGIN + 1);
    let height = config.height.max(TITLE_BAND + 2 * MARGIN + 1);
    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let plot = PlotArea {
        x: MARGIN as f64,
        y: TITLE_BAND as f64,
        w: (width - LEGEND_BAND - 2 * MARGIN) as f64,
        h: (height - TITLE_BAND - MARGIN) as f64,
    };
    tracing::debug!("Rendering {} regions from {:?}", base.regions.len(), base.source);
    let extent = data_extent(base, points);
    let projection = Projection::fit(extent, &plot);

    // 1. Base polygons
    for region in &base.regions {
        for polygon in &region.0 {
            let rings: Vec<Vec<(f64, f64)>> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors().iter())
                .map(|ring| projection.project_ring(ring))
                .collect();
            fill_polygon(&mut img, &rings, LAND_FILL);
            for ring in &rings {
                draw_ring(&mut img, ring, LAND_EDGE);
            }
        }
    }

    // 2. Markers, coloured on the observed range
    let scale = ColorScale::from_values(points.iter().map(|p| p.pm25));
    let radius = config.marker_radius.min(MAX_MARKER_RADIUS) as i32;
    let mut markers = Vec::with_capacity(points.len());

    for city in points {
        let (px, py) = projection.project(Coord { x: city.point.x(), y: city.point.y() });
        let (x, y) = (px.round() as i32, py.round() as i32);
        let position = scale.map(|s| s.position(city.pm25)).unwrap_or(0.0);
        let color = colormap::color_at(position);

        fill_circle(&mut img, x, y, radius, Rgba([color[0], color[1], color[2], 255]));
        markers.push(MarkerPlacement {
            city: city.city.clone(),
            pm25: city.pm25,
            x,
            y,
            color: colormap::to_hex(color),
            scale_position: position,
        });
    }

    // 3. Labels, right-aligned against the marker
    for marker in &markers {
        if marker.city.chars().any(|c| glyph_for(c).is_none()) {
            tracing::warn!("No bitmap glyph for some characters of {:?}, drawing placeholders", marker.city);
        }
        let text_w = text_width(&marker.city, 2);
        draw_text(&mut img, &marker.city, marker.x - radius - 4 - text_w, marker.y - GLYPH, 2, INK);
    }

    if let Some(scale) = scale {
        draw_color_bar(&mut img, &plot, &scale, config);
    }

    let title_scale = if text_width(&config.title, 2) <= width as i32 { 2 } else { 1 };
    let title_x = (width as i32 - text_width(&config.title, title_scale)) / 2;
    draw_text(&mut img, &config.title, title_x, (TITLE_BAND as i32 - GLYPH * title_scale) / 2, title_scale, INK);

    MapRender::Rendered(RenderedMap {
        image: img,
        layout: MapLayout {
            width,
            height,
            base_map: base.source.clone(),
            extent: (extent.min().x, extent.min().y, extent.max().x, extent.max().y),
            scale_min: scale.map(|s| s.min),
            scale_max: scale.map(|s| s.max),
            markers,
        },
    })
}

/// Writes the map as PNG, replacing any previous render.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    image.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to save map image: {:?}", path))?;
    Ok(())
}

struct PlotArea {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// Union of base map bounds and city points, padded.
fn data_extent(base: &BaseMap, points: &[CityPoint]) -> Rect<f64> {
    let mut min = Coord { x: f64::INFINITY, y: f64::INFINITY };
    let mut max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };

    let rects = base.regions.iter().filter_map(|r| r.bounding_rect());
    let point_rects = points.iter().map(|p| Rect::new(p.point.0, p.point.0));
    for rect in rects.chain(point_rects) {
        min.x = min.x.min(rect.min().x);
        min.y = min.y.min(rect.min().y);
        max.x = max.x.max(rect.max().x);
        max.y = max.y.max(rect.max().y);
    }

    if !min.x.is_finite() || !max.x.is_finite() {
        return Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 });
    }

    let pad_x = ((max.x - min.x) * 0.02).max(0.5);
    let pad_y = ((max.y - min.y) * 0.02).max(0.5);
    Rect::new(
        Coord { x: min.x - pad_x, y: min.y - pad_y },
        Coord { x: max.x + pad_x, y: max.y + pad_y },
    )
}

/// Plate carree fitted into the plot area, with the vertical axis stretched
/// by 1/cos(mid latitude) so shapes keep their geographic aspect.
struct Projection {
    origin: Coord<f64>,
    sx: f64,
    sy: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Projection {
    fn fit(extent: Rect<f64>, plot: &PlotArea) -> Self {
        let mid_lat = (extent.min().y + extent.max().y) / 2.0;
        let aspect = 1.0 / mid_lat.to_radians().cos().max(0.1);
        let lon_span = extent.width().max(f64::EPSILON);
        let lat_span = extent.height().max(f64::EPSILON);

        let s = (plot.w / lon_span).min(plot.h / (lat_span * aspect));
        let (sx, sy) = (s, s * aspect);

        Self {
            origin: Coord { x: extent.min().x, y: extent.max().y },
            sx,
            sy,
            offset_x: plot.x + (plot.w - lon_span * sx) / 2.0,
            offset_y: plot.y + (plot.h - lat_span * sy) / 2.0,
        }
    }

    fn project(&self, c: Coord<f64>) -> (f64, f64) {
        (
            self.offset_x + (c.x - self.origin.x) * self.sx,
            self.offset_y + (self.origin.y - c.y) * self.sy,
        )
    }

    fn project_ring(&self, ring: &LineString<f64>) -> Vec<(f64, f64)> {
        ring.coords().map(|c| self.project(*c)).collect()
    }
}

fn put(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Even-odd scanline fill over all rings, so interiors become holes.
fn fill_polygon(img: &mut RgbaImage, rings: &[Vec<(f64, f64)>], color: Rgba<u8>) {
    let ys = rings.iter().flatten().map(|p| p.1);
    let (min_y, max_y) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !min_y.is_finite() {
        return;
    }

    let row_start = (min_y.floor() as i32).max(0);
    let row_end = (max_y.ceil() as i32).min(img.height() as i32 - 1);
    let mut crossings = Vec::new();

    for row in row_start..=row_end {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for edge in ring.windows(2) {
                let (a, b) = (edge[0], edge[1]);
                if (a.1 <= yc) != (b.1 <= yc) {
                    crossings.push(a.0 + (yc - a.1) * (b.0 - a.0) / (b.1 - a.1));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = (span[0] - 0.5).ceil() as i32;
            let end = (span[1] - 0.5).floor() as i32;
            for x in start..=end {
                put(img, x, row, color);
            }
        }
    }
}

fn draw_ring(img: &mut RgbaImage, ring: &[(f64, f64)], color: Rgba<u8>) {
    for edge in ring.windows(2) {
        draw_line(
            img,
            (edge[0].0.round() as i32, edge[0].1.round() as i32),
            (edge[1].0.round() as i32, edge[1].1.round() as i32),
            color,
        );
    }
}

// Bresenham
fn draw_line(img: &mut RgbaImage, from: (i32, i32), to: (i32, i32), color: Rgba<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let step_x = if x < to.0 { 1 } else { -1 };
    let step_y = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += step_x;
        }
        if e2 <= dx {
            err += dx;
            y += step_y;
        }
    }
}

fn fill_circle(img: &mut RgbaImage, cx: i32, cy: i32, r: i32, color: Rgba<u8>) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH * scale
}

/// Looks `ch` up in every font8x8 set, Latin first.
fn glyph_for(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| BOX_FONTS.get(ch))
        .or_else(|| BLOCK_FONTS.get(ch))
        .or_else(|| HIRAGANA_FONTS.get(ch))
        .or_else(|| MISC_FONTS.get(ch))
}

fn glyph_or_placeholder(ch: char) -> [u8; 8] {
    if ch.is_whitespace() {
        return [0; 8];
    }
    glyph_for(ch).unwrap_or(MISSING_GLYPH)
}

/// Draws `text` with its top-left corner at (x, y) using the 8x8 bitmap font.
fn draw_text(img: &mut RgbaImage, text: &str, x: i32, y: i32, scale: i32, color: Rgba<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let glyph = glyph_or_placeholder(ch);
        let gx0 = x + i as i32 * GLYPH * scale;
        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1u8 << col) != 0 {
                    for sy in 0..scale {
                        for sx in 0..scale {
                            put(img, gx0 + col * scale + sx, y + row as i32 * scale + sy, color);
                        }
                    }
                }
            }
        }
    }
}

/// Text rotated a quarter turn counter-clockwise, reading bottom to top,
/// starting at the bottom-left corner (x, y).
fn draw_text_vertical(img: &mut RgbaImage, text: &str, x: i32, y: i32, color: Rgba<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let glyph = glyph_or_placeholder(ch);
        let base_y = y - i as i32 * GLYPH;
        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1u8 << col) != 0 {
                    put(img, x + row as i32, base_y - col, color);
                }
            }
        }
    }
}

fn draw_color_bar(img: &mut RgbaImage, plot: &PlotArea, scale: &ColorScale, config: &MapConfig) {
    let bar_h = ((plot.h * config.legend_shrink.clamp(0.05, 1.0)) as i32).max(2);
    let bar_x = img.width() as i32 - LEGEND_BAND as i32 + MARGIN as i32;
    let bar_y = (plot.y + (plot.h - bar_h as f64) / 2.0) as i32;

    for r in 0..bar_h {
        let t = 1.0 - r as f64 / (bar_h - 1) as f64;
        let c = colormap::color_at(t);
        for dx in 0..COLOR_BAR_WIDTH {
            put(img, bar_x + dx, bar_y + r, Rgba([c[0], c[1], c[2], 255]));
        }
    }
    let right = bar_x + COLOR_BAR_WIDTH - 1;
    let bottom = bar_y + bar_h - 1;
    draw_line(img, (bar_x, bar_y), (right, bar_y), INK);
    draw_line(img, (bar_x, bottom), (right, bottom), INK);
    draw_line(img, (bar_x, bar_y), (bar_x, bottom), INK);
    draw_line(img, (right, bar_y), (right, bottom), INK);

    let ticks = if scale.max > scale.min { LEGEND_TICKS } else { 1 };
    let mut widest = 0;
    for i in 0..ticks {
        let frac = if ticks == 1 { 0.0 } else { i as f64 / (ticks - 1) as f64 };
        let value = scale.min + (scale.max - scale.min) * frac;
        let ty = bottom - (frac * (bar_h - 1) as f64).round() as i32;
        let label = format!("{:.0}", value);

        draw_line(img, (right + 1, ty), (right + 4, ty), INK);
        draw_text(img, &label, right + 7, ty - GLYPH / 2, 1, INK);
        widest = widest.max(text_width(&label, 1));
    }

    let label_x = right + 7 + widest + 6;
    let label_y = bar_y + (bar_h + text_width(&config.legend_label, 1)) / 2;
    draw_text_vertical(img, &config.legend_label, label_x, label_y, INK);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample_records;
    use crate::processing::build_point_layer;
    use crate::types::PollutionRecord;
    use geo::{polygon, MultiPolygon};
    use proptest::prelude::*;

    fn india_box() -> BaseMap {
        let outline = polygon![
            (x: 68.0, y: 8.0),
            (x: 97.0, y: 8.0),
            (x: 97.0, y: 35.0),
            (x: 68.0, y: 35.0),
            (x: 68.0, y: 8.0),
        ];
        BaseMap {
            source: PathBuf::from("india.geojson"),
            regions: vec![MultiPolygon::new(vec![outline])],
        }
    }

    fn rendered(render: MapRender) -> RenderedMap {
        match render {
            MapRender::Rendered(map) => map,
            MapRender::Skipped => panic!("map was skipped"),
        }
    }

    #[test]
    fn skipped_without_base_map() {
        let points = build_point_layer(&sample_records());
        assert!(matches!(render_composite_map(None, &points, &MapConfig::default()), MapRender::Skipped));
    }

    #[test]
    fn markers_coloured_by_value() {
        let points = build_point_layer(&sample_records());
        let config = MapConfig::default();
        let map = rendered(render_composite_map(Some(&india_box()), &points, &config));

        let markers = &map.layout.markers;
        assert_eq!(markers.len(), 4);
        let delhi = &markers[0];
        let chennai = &markers[1];
        assert_eq!(delhi.city, "Delhi");
        assert_eq!(delhi.color, "#a50026");
        assert_eq!(chennai.color, "#006837");
        assert!(markers.iter().all(|m| m.scale_position <= delhi.scale_position));
        assert!(markers.iter().all(|m| m.scale_position >= chennai.scale_position));

        // Delhi is north of Chennai, Kolkata east of Mumbai
        assert!(delhi.y < chennai.y);
        assert!(markers[3].x > markers[2].x);

        let centre = map.image.get_pixel(delhi.x as u32, delhi.y as u32);
        assert_eq!(*centre, Rgba([0xa5, 0x00, 0x26, 255]));
        assert_eq!(map.layout.scale_min, Some(45.0));
        assert_eq!(map.layout.scale_max, Some(310.0));
    }

    #[test]
    fn markers_land_inside_plot_area() {
        let points = build_point_layer(&sample_records());
        let config = MapConfig::default();
        let map = rendered(render_composite_map(Some(&india_box()), &points, &config));

        for m in &map.layout.markers {
            assert!(m.x >= MARGIN as i32 && m.x < (config.width - LEGEND_BAND) as i32, "{:?}", m);
            assert!(m.y >= TITLE_BAND as i32 && m.y < config.height as i32, "{:?}", m);
        }
        // Land interior away from markers and labels
        let inside = map.image.get_pixel(MARGIN + 30, config.height - MARGIN - 300);
        assert_eq!(*inside, LAND_FILL);
    }

    #[test]
    fn render_is_reproducible() {
        let points = build_point_layer(&sample_records());
        let config = MapConfig::default();
        let a = rendered(render_composite_map(Some(&india_box()), &points, &config));
        let b = rendered(render_composite_map(Some(&india_box()), &points, &config));

        assert_eq!(a.layout, b.layout);
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn base_map_without_points_still_renders() {
        let map = rendered(render_composite_map(Some(&india_box()), &[], &MapConfig::default()));
        assert!(map.layout.markers.is_empty());
        assert_eq!(map.layout.scale_min, None);
    }

    #[test]
    fn saves_png_overwriting_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("pollution_map.png");
        let points = build_point_layer(&sample_records());
        let config = MapConfig { width: 400, height: 480, ..MapConfig::default() };
        let map = rendered(render_composite_map(Some(&india_box()), &points, &config));

        save_png(&map.image, &path).unwrap();
        save_png(&map.image, &path).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.dimensions(), (400, 480));
        assert_eq!(reloaded.as_raw(), map.image.as_raw());
    }

    fn label_ink(map: &RenderedMap, city: &str, radius: i32) -> usize {
        let marker = map.layout.markers.iter().find(|m| m.city == city).unwrap();
        let right = marker.x - radius - 4;
        let left = right - text_width(city, 2);
        (left..right)
            .flat_map(|x| (marker.y - GLYPH..marker.y + GLYPH).map(move |y| (x, y)))
            .filter(|&(x, y)| *map.image.get_pixel(x as u32, y as u32) == INK)
            .count()
    }

    #[test]
    fn every_label_gets_ink() {
        let records = vec![
            PollutionRecord::new("Pondichéry", 60.0, 11.94, 79.81),
            PollutionRecord::new("दिल्ली", 310.0, 28.61, 77.20),
            PollutionRecord::new("Mumbai", 98.0, 19.07, 72.87),
        ];
        let config = MapConfig::default();
        let map = rendered(render_composite_map(Some(&india_box()), &build_point_layer(&records), &config));
        let radius = config.marker_radius as i32;

        assert!(glyph_for('é').is_some());
        assert!(glyph_for('द').is_none());
        assert!(label_ink(&map, "दिल्ली", radius) > 0);
        // The accented letter adds ink over the plain spelling's letters.
        let plain = build_point_layer(&[PollutionRecord::new("Pondichery", 60.0, 11.94, 79.81)]);
        let plain_map = rendered(render_composite_map(Some(&india_box()), &plain, &config));
        assert!(label_ink(&map, "Pondichéry", radius) > label_ink(&plain_map, "Pondichery", radius));
    }

    #[test]
    fn huge_marker_radius_is_clamped() {
        let points = build_point_layer(&sample_records());
        let config = MapConfig { width: 300, height: 360, marker_radius: 50_000, ..MapConfig::default() };
        let map = rendered(render_composite_map(Some(&india_box()), &points, &config));
        assert_eq!(map.layout.markers.len(), 4);
    }

    #[test]
    fn layout_names_its_base_map() {
        let points = build_point_layer(&sample_records());
        let map = rendered(render_composite_map(Some(&india_box()), &points, &MapConfig::default()));
        assert_eq!(map.layout.base_map, PathBuf::from("india.geojson"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn marker_colours_follow_pm25(values in prop::collection::vec(0.0f64..500.0, 1..8)) {
            let records: Vec<_> = values.iter().enumerate()
                .map(|(i, v)| PollutionRecord::new(&format!("c{}", i), *v, 10.0 + i as f64 * 3.0, 70.0 + i as f64 * 2.0))
                .collect();
            let config = MapConfig { width: 300, height: 360, ..MapConfig::default() };
            let map = rendered(render_composite_map(Some(&india_box()), &build_point_layer(&records), &config));

            for a in &map.layout.markers {
                for b in &map.layout.markers {
                    if b.pm25 - a.pm25 > 1e-6 {
                        prop_assert!(a.scale_position < b.scale_position);
                    }
                }
            }
        }
    }

    #[test]
    fn fill_respects_holes() {
        let mut img: RgbaImage = ImageBuffer::from_pixel(20, 20, BACKGROUND);
        let outer = vec![(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0), (0.0, 0.0)];
        let hole = vec![(5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0), (5.0, 5.0)];
        fill_polygon(&mut img, &[outer, hole], LAND_FILL);

        assert_eq!(*img.get_pixel(2, 2), LAND_FILL);
        assert_eq!(*img.get_pixel(10, 10), BACKGROUND);
        assert_eq!(*img.get_pixel(17, 10), LAND_FILL);
    }
}
