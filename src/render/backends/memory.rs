//! Headless reference engine.
//!
//! `InMemoryBackend` implements the engine interface in plain Rust so the
//! binding can be exercised without the native library. It reads a small
//! subset of the stylesheet dialect (see [`stylesheet`]), paints every styled
//! layer extent as a filled rectangle on the map background and encodes with
//! the `png`/`image` codecs. Everything it was asked to register or render is
//! recorded and can be inspected afterwards.

mod codec;
mod stylesheet;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::render::backend::{
    AssetRejected, Coord, MapBackend, NativeFailure, NativeImage, NativeMap, NativeProjection, NativeResult,
    Severity,
};
use crate::render::viewport::BoundingBox;
use codec::Codec;
pub use stylesheet::{Layer, Stylesheet};

/// SRS of a freshly created map.
pub const DEFAULT_SRS: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

const WEB_MERCATOR: &str = "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

/// One call to `render_to_image` or `render_to_file`, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRecord {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub scale_factor: f64,
}

struct SharedState {
    fonts: Vec<PathBuf>,
    plugins: Vec<String>,
    severity: Severity,
    renders: Vec<RenderRecord>,
}

type Shared = Arc<Mutex<SharedState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SharedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InMemoryBackend {
    state: Shared,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState {
                fonts: Vec::new(),
                plugins: Vec::new(),
                severity: Severity::Warn,
                renders: Vec::new(),
            })),
        }
    }

    /// Fonts accepted so far, in registration order.
    pub fn registered_fonts(&self) -> Vec<PathBuf> {
        lock(&self.state).fonts.clone()
    }

    /// Names of the datasource plugins accepted so far.
    pub fn registered_plugins(&self) -> Vec<String> {
        lock(&self.state).plugins.clone()
    }

    pub fn severity(&self) -> Severity {
        lock(&self.state).severity
    }

    /// Renders performed by maps created from this backend.
    pub fn render_log(&self) -> Vec<RenderRecord> {
        lock(&self.state).renders.clone()
    }

    /// A second handle onto the same engine state.
    ///
    /// Useful to keep inspecting the engine after handing it to
    /// [`MapnikEngine`](crate::MapnikEngine).
    pub fn handle(&self) -> InMemoryBackend {
        Self { state: self.state.clone() }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MapBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "InMemoryBackend"
    }

    fn version(&self) -> String {
        format!("{} (in-memory)", env!("CARGO_PKG_VERSION"))
    }

    fn set_log_severity(&self, severity: Severity) {
        lock(&self.state).severity = severity;
    }

    fn register_font(&self, path: &Path) -> Result<(), AssetRejected> {
        let meta = fs::metadata(path)
            .map_err(|e| AssetRejected::new(format!("could not open font file {}: {e}", path.display())))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(AssetRejected::new(format!("font file {} is empty", path.display())));
        }

        let mut state = lock(&self.state);
        if !state.fonts.iter().any(|p| p == path) {
            state.fonts.push(path.to_path_buf());
        }
        Ok(())
    }

    fn register_datasource(&self, path: &Path) -> Result<(), AssetRejected> {
        // Anything that is not a plugin is skipped, like the plugin cache does.
        if path.extension().and_then(|e| e.to_str()) != Some("input") {
            return Ok(());
        }

        let meta = fs::metadata(path).map_err(|e| AssetRejected::new(format!("could not open plugin {}: {e}", path.display())))?;
        if meta.len() == 0 {
            return Err(AssetRejected::new(format!("could not load plugin {}: empty file", path.display())));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let mut state = lock(&self.state);
        if !state.plugins.contains(&name) {
            state.plugins.push(name);
        }
        Ok(())
    }

    fn create_map(&self, width: u32, height: u32) -> Box<dyn NativeMap + Send> {
        Box::new(InMemoryMap::new(width, height, self.state.clone()))
    }
}

pub struct InMemoryMap {
    width: u32,
    height: u32,
    srs: String,
    extent: BoundingBox,
    buffer_size: i32,
    stylesheet: Option<Stylesheet>,
    last_error: Option<String>,
    state: Shared,
}

impl InMemoryMap {
    fn new(width: u32, height: u32, state: Shared) -> Self {
        Self {
            width,
            height,
            srs: DEFAULT_SRS.to_string(),
            extent: BoundingBox::default(),
            buffer_size: 0,
            stylesheet: None,
            last_error: None,
            state,
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> NativeFailure {
        self.last_error = Some(format!("{err:#}"));
        NativeFailure
    }

    fn apply(&mut self, xml: &str) -> NativeResult {
        self.last_error = None;
        match Stylesheet::parse(xml) {
            Ok(sheet) => {
                if let Some(srs) = &sheet.srs {
                    self.srs = srs.clone();
                }
                self.stylesheet = Some(sheet);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn record(&self, scale: f64, scale_factor: f64) {
        lock(&self.state).renders.push(RenderRecord {
            width: self.width,
            height: self.height,
            scale,
            scale_factor,
        });
    }

    /// Extent grown by the buffer margin, used to decide which layers to paint.
    fn buffered_extent(&self) -> BoundingBox {
        if self.width == 0 || self.height == 0 {
            return self.extent;
        }
        let dx = self.extent.width() / self.width as f64 * self.buffer_size as f64;
        let dy = self.extent.height() / self.height as f64 * self.buffer_size as f64;
        BoundingBox::new(
            self.extent.min_x - dx,
            self.extent.min_y - dy,
            self.extent.max_x + dx,
            self.extent.max_y + dy,
        )
    }

    fn paint(&self) -> Result<Vec<u8>> {
        let sheet = self
            .stylesheet
            .as_ref()
            .ok_or_else(|| anyhow!("map has no stylesheet loaded"))?;
        if !self.extent.has_area() {
            bail!("map extent is not valid: call zoom_all or zoom_to_box before rendering");
        }
        if self.width == 0 || self.height == 0 {
            bail!("cannot render a {}x{} image", self.width, self.height);
        }

        let mut canvas = Canvas::new(self.width, self.height, sheet.background.unwrap_or([0, 0, 0, 0]));
        let visible = self.buffered_extent();
        for layer in &sheet.layers {
            let (Some(fill), Some(extent)) = (layer.fill, layer.extent()) else {
                continue;
            };
            if extent.intersects(&visible) {
                canvas.fill(&self.extent, &extent, fill);
            }
        }
        Ok(canvas.pixels)
    }

    fn write_file(&self, path: &Path) -> Result<()> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let codec = Codec::from_extension(ext).ok_or_else(|| anyhow!("unknown file type for {}", path.display()))?;
        let pixels = self.paint()?;
        let bytes = codec.encode(&pixels, self.width, self.height)?;
        fs::write(path, bytes).with_context(|| format!("could not write file to {}", path.display()))
    }
}

impl NativeMap for InMemoryMap {
    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn load(&mut self, stylesheet: &Path) -> NativeResult {
        self.last_error = None;
        match fs::read_to_string(stylesheet) {
            Ok(xml) => self.apply(&xml),
            Err(e) => Err(self.fail(anyhow!("failed to load map file {}: {e}", stylesheet.display()))),
        }
    }

    fn load_string(&mut self, stylesheet: &str) -> NativeResult {
        self.apply(stylesheet)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.extent = fit_aspect(self.extent, width, height);
    }

    fn srs(&self) -> String {
        self.srs.clone()
    }

    fn set_srs(&mut self, srs: &str) {
        self.srs = srs.to_string();
    }

    fn zoom_all(&mut self) -> NativeResult {
        self.last_error = None;
        let combined = self
            .stylesheet
            .as_ref()
            .and_then(|sheet| sheet.layers.iter().filter_map(Layer::extent).reduce(|a, b| a.union(&b)));

        match combined {
            Some(bbox) if bbox.has_area() => {
                self.zoom_to_box(bbox);
                Ok(())
            }
            Some(bbox) => Err(self.fail(anyhow!("could not zoom to combined layer extents: {bbox:?} is degenerate"))),
            None => Err(self.fail(anyhow!("could not zoom to combined layer extents: no layer has a valid extent"))),
        }
    }

    fn zoom_to_box(&mut self, bbox: BoundingBox) {
        self.extent = fit_aspect(bbox, self.width, self.height);
    }

    fn current_extent(&self) -> Option<BoundingBox> {
        Some(self.extent)
    }

    fn set_buffer_size(&mut self, pixels: i32) {
        self.buffer_size = pixels;
    }

    fn buffer_size(&self) -> Option<i32> {
        Some(self.buffer_size)
    }

    fn set_max_connections(&mut self, count: i32) {
        if let Some(sheet) = self.stylesheet.as_mut() {
            for layer in &mut sheet.layers {
                layer
                    .parameters
                    .entry("max_size".to_string())
                    .or_insert_with(|| (count + 2).to_string());
            }
        }
    }

    fn layer_parameter(&self, layer: &str, key: &str) -> Option<String> {
        self.stylesheet
            .as_ref()?
            .layers
            .iter()
            .find(|l| l.name == layer)?
            .parameters
            .get(key)
            .cloned()
    }

    fn render_to_file(&mut self, path: &Path) -> NativeResult {
        self.last_error = None;
        match self.write_file(path) {
            Ok(()) => {
                self.record(0.0, 1.0);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn render_to_image(&mut self, scale: f64, scale_factor: f64) -> NativeResult<Box<dyn NativeImage>> {
        self.last_error = None;
        match self.paint() {
            Ok(pixels) => {
                self.record(scale, scale_factor);
                Ok(Box::new(InMemoryImage {
                    width: self.width,
                    height: self.height,
                    pixels,
                    last_error: None,
                }))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn projection(&self) -> Box<dyn NativeProjection + Send> {
        Box::new(InMemoryProjection::new(&self.srs))
    }
}

/// Grows `bbox` so that it has the same aspect ratio as the canvas.
fn fit_aspect(bbox: BoundingBox, width: u32, height: u32) -> BoundingBox {
    if width == 0 || height == 0 || !bbox.has_area() {
        return bbox;
    }
    let canvas_ratio = width as f64 / height as f64;
    let box_ratio = bbox.width() / bbox.height();
    let cx = (bbox.min_x + bbox.max_x) / 2.0;
    let cy = (bbox.min_y + bbox.max_y) / 2.0;

    if box_ratio > canvas_ratio {
        let half = bbox.width() / canvas_ratio / 2.0;
        BoundingBox::new(bbox.min_x, cy - half, bbox.max_x, cy + half)
    } else if box_ratio < canvas_ratio {
        let half = bbox.height() * canvas_ratio / 2.0;
        BoundingBox::new(cx - half, bbox.min_y, cx + half, bbox.max_y)
    } else {
        bbox
    }
}

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32, background: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: background.repeat(width as usize * height as usize),
        }
    }

    /// Paints the part of `area` visible through `view`.
    fn fill(&mut self, view: &BoundingBox, area: &BoundingBox, color: [u8; 4]) {
        let sx = self.width as f64 / view.width();
        let sy = self.height as f64 / view.height();
        let clamp_x = |v: f64| v.round().clamp(0.0, self.width as f64) as usize;
        let clamp_y = |v: f64| v.round().clamp(0.0, self.height as f64) as usize;

        let x0 = clamp_x((area.min_x - view.min_x) * sx);
        let x1 = clamp_x((area.max_x - view.min_x) * sx);
        let y0 = clamp_y((view.max_y - area.max_y) * sy);
        let y1 = clamp_y((view.max_y - area.min_y) * sy);

        let stride = self.width as usize * 4;
        for y in y0..y1 {
            let row = &mut self.pixels[y * stride..(y + 1) * stride];
            for px in row[x0 * 4..x1 * 4].chunks_exact_mut(4) {
                blend(px, color);
            }
        }
    }
}

/// Source-over compositing of straight-alpha colours.
fn blend(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as u32;
    if sa == 255 {
        dst.copy_from_slice(&src);
        return;
    }
    if sa == 0 {
        return;
    }

    let da = dst[3] as u32 * (255 - sa) / 255;
    let out_a = sa + da;
    for i in 0..3 {
        dst[i] = ((src[i] as u32 * sa + dst[i] as u32 * da) / out_a) as u8;
    }
    dst[3] = out_a as u8;
}

pub struct InMemoryImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    last_error: Option<String>,
}

impl NativeImage for InMemoryImage {
    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn to_raw(&self) -> &[u8] {
        &self.pixels
    }

    fn to_blob(&mut self, format: &str) -> NativeResult<Vec<u8>> {
        self.last_error = None;
        let encoded = Codec::from_name(format).and_then(|codec| codec.encode(&self.pixels, self.width, self.height));
        encoded.map_err(|e| {
            self.last_error = Some(format!("{e:#}"));
            NativeFailure
        })
    }
}

/// Forward projection from geographic coordinates into a map SRS.
///
/// SRS strings the projection library cannot parse leave coordinates untouched.
pub struct InMemoryProjection {
    definition: String,
}

impl InMemoryProjection {
    pub fn new(srs: &str) -> Self {
        Self {
            definition: proj_definition(srs),
        }
    }

    fn try_forward(&self, coord: Coord) -> Result<Coord> {
        if is_geographic(&self.definition) {
            return Ok(coord);
        }

        let source = Proj::from_proj_string(DEFAULT_SRS).map_err(|e| anyhow!("invalid source projection: {e:?}"))?;
        let target = Proj::from_proj_string(&self.definition)
            .map_err(|e| anyhow!("invalid projection {}: {e:?}", self.definition))?;

        // Geographic input is expected in radians.
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&source, &target, &mut point).map_err(|e| anyhow!("transform failed: {e:?}"))?;
        Ok(Coord { x: point.0, y: point.1 })
    }
}

impl NativeProjection for InMemoryProjection {
    fn forward(&self, coord: Coord) -> Coord {
        self.try_forward(coord).unwrap_or_else(|e| {
            log::debug!("projection left coordinate untouched: {e:#}");
            coord
        })
    }
}

/// Expands the `epsg:` shorthands the projection library does not know about.
fn proj_definition(srs: &str) -> String {
    let lower = srs.trim().to_ascii_lowercase();
    let code = lower.strip_prefix("+init=").unwrap_or(&lower);
    match code {
        "epsg:4326" => DEFAULT_SRS.to_string(),
        "epsg:3857" | "epsg:900913" => WEB_MERCATOR.to_string(),
        _ => srs.trim().to_string(),
    }
}

fn is_geographic(definition: &str) -> bool {
    definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = r##"
        <Map background-color="#ffffff">
          <Style name="land"><Rule><PolygonSymbolizer fill="#ff0000"/></Rule></Style>
          <Layer name="world">
            <StyleName>land</StyleName>
            <Datasource>
              <Parameter name="type">shape</Parameter>
              <Parameter name="extent">-180,-90,180,90</Parameter>
            </Datasource>
          </Layer>
          <Layer name="box">
            <StyleName>land</StyleName>
            <Datasource>
              <Parameter name="extent">0,0,10,10</Parameter>
              <Parameter name="max_size">4</Parameter>
            </Datasource>
          </Layer>
        </Map>"##;

    fn loaded(width: u32, height: u32) -> InMemoryMap {
        let backend = InMemoryBackend::new();
        let mut map = InMemoryMap::new(width, height, backend.state.clone());
        map.load_string(WORLD).unwrap();
        map
    }

    #[test]
    fn zoom_all_covers_every_layer_with_canvas_aspect() {
        let mut map = loaded(200, 100);
        map.zoom_all().unwrap();
        assert_eq!(map.current_extent(), Some(BoundingBox::new(-180.0, -90.0, 180.0, 90.0)));

        map.resize(100, 100);
        let extent = map.current_extent().unwrap();
        assert_eq!(extent.width(), extent.height());
    }

    #[test]
    fn zoom_all_without_layers_fails_with_diagnostic() {
        let backend = InMemoryBackend::new();
        let mut map = InMemoryMap::new(10, 10, backend.state.clone());
        assert_eq!(map.zoom_all(), Err(NativeFailure));
        assert!(map.last_error().unwrap().contains("no layer has a valid extent"));
    }

    #[test]
    fn successful_call_clears_last_error() {
        let mut map = loaded(10, 10);
        assert!(map.load_string("<NotAMap/>").is_err());
        assert!(map.last_error().is_some());
        map.load_string(WORLD).unwrap();
        assert_eq!(map.last_error(), None);
    }

    #[test]
    fn render_requires_stylesheet_and_extent() {
        let backend = InMemoryBackend::new();
        let mut map = InMemoryMap::new(10, 10, backend.state.clone());
        assert!(map.render_to_image(0.0, 1.0).is_err());
        assert!(map.last_error().unwrap().contains("no stylesheet"));

        map.load_string(WORLD).unwrap();
        assert!(map.render_to_image(0.0, 1.0).is_err());
        assert!(map.last_error().unwrap().contains("zoom_all"));
    }

    #[test]
    fn paints_layers_over_background() {
        let mut map = loaded(20, 20);
        map.zoom_to_box(BoundingBox::new(20.0, 20.0, 40.0, 40.0));
        // Only the world layer covers this view.
        let image = map.render_to_image(0.0, 1.0).unwrap();
        assert_eq!(&image.to_raw()[..4], &[255, 0, 0, 255]);

        map.zoom_to_box(BoundingBox::new(200.0, 200.0, 220.0, 220.0));
        let image = map.render_to_image(0.0, 1.0).unwrap();
        assert!(image.to_raw().chunks_exact(4).all(|px| px == [255, 255, 255, 255]));
    }

    #[test]
    fn image_reports_codec_errors() {
        let mut map = loaded(4, 4);
        map.zoom_all().unwrap();
        let mut image = map.render_to_image(0.0, 1.0).unwrap();
        assert_eq!(image.to_raw().len(), 4 * 4 * 4);
        assert!(image.to_blob("gif").is_err());
        assert_eq!(image.last_error().as_deref(), Some("unknown file type: gif"));
        assert!(image.to_blob("png256").is_ok());
        assert_eq!(image.last_error(), None);
    }

    #[test]
    fn max_connections_respects_existing_pool_size() {
        let mut map = loaded(4, 4);
        map.set_max_connections(50);
        assert_eq!(map.layer_parameter("world", "max_size").as_deref(), Some("52"));
        assert_eq!(map.layer_parameter("box", "max_size").as_deref(), Some("4"));
        assert_eq!(map.layer_parameter("missing", "max_size"), None);
    }

    #[test]
    fn render_log_records_scale_factor() {
        let backend = InMemoryBackend::new();
        let mut map = backend.create_map(8, 8);
        map.load_string(WORLD).unwrap();
        map.zoom_all().unwrap();
        map.render_to_image(5000.0, 2.0).unwrap();

        assert_eq!(
            backend.render_log(),
            vec![RenderRecord { width: 8, height: 8, scale: 5000.0, scale_factor: 2.0 }]
        );
    }

    #[test]
    fn registers_fonts_and_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("a.ttf");
        let empty = dir.path().join("b.ttf");
        let plugin = dir.path().join("shape.input");
        let other = dir.path().join("README");
        fs::write(&font, b"font").unwrap();
        fs::write(&empty, b"").unwrap();
        fs::write(&plugin, b"plugin").unwrap();
        fs::write(&other, b"text").unwrap();

        let backend = InMemoryBackend::new();
        backend.register_font(&font).unwrap();
        backend.register_font(&font).unwrap();
        assert!(backend.register_font(&empty).unwrap_err().message.unwrap().contains("empty"));
        backend.register_datasource(&plugin).unwrap();
        backend.register_datasource(&other).unwrap();

        assert_eq!(backend.registered_fonts(), vec![font]);
        assert_eq!(backend.registered_plugins(), vec!["shape".to_string()]);
    }

    #[test]
    fn web_mercator_projection() {
        let proj = InMemoryProjection::new("+init=epsg:3857");
        let c = proj.forward(Coord { x: 180.0, y: 0.0 });
        assert!((c.x - 20_037_508.342_789_244).abs() < 1.0, "x = {}", c.x);
        assert!(c.y.abs() < 1e-6);
    }

    #[test]
    fn geographic_and_unparsable_projections_are_identity() {
        let c = Coord { x: 12.0, y: 48.0 };
        assert_eq!(InMemoryProjection::new(DEFAULT_SRS).forward(c), c);
        assert_eq!(InMemoryProjection::new("not a projection").forward(c), c);
    }

    #[test]
    fn render_to_file_picks_codec_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = loaded(16, 8);
        map.zoom_all().unwrap();

        let out = dir.path().join("map.png");
        map.render_to_file(&out).unwrap();
        let img = image::open(&out).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));

        assert!(map.render_to_file(&dir.path().join("map.bmp")).is_err());
        assert!(map.last_error().unwrap().contains("unknown file type"));
    }

    #[test]
    fn blending_half_transparent_over_opaque() {
        let mut px = [0u8, 0, 0, 255];
        blend(&mut px, [255, 255, 255, 128]);
        assert_eq!(px[3], 255);
        assert!(px[0] > 120 && px[0] < 135);
    }
}
