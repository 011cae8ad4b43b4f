//! Rendering session.
//!
//! A [`Map`] owns one native rendering context. It is created by
//! [`MapnikEngine::new_map`](crate::MapnikEngine::new_map), configured by
//! loading a stylesheet and setting a viewport, and rendered any number of
//! times. The context is released exactly once: either explicitly with
//! [`Map::free`] or implicitly when the value is dropped.
//!
//! # Examples
//!
//! ```
//! use mapnik::render::backends::memory::InMemoryBackend;
//! use mapnik::{ImageFormat, MapnikEngine, RenderOptions};
//!
//! let engine = MapnikEngine::new(None, Box::new(InMemoryBackend::new()));
//! let mut map = engine.new_map(256, 256);
//! map.load_string(r##"
//!     <Map background-color="#ffffff">
//!       <Layer name="world">
//!         <Datasource><Parameter name="extent">-180,-90,180,90</Parameter></Datasource>
//!       </Layer>
//!     </Map>"##)?;
//! map.zoom_all()?;
//!
//! let png = map.render(RenderOptions::with_format(ImageFormat::PNG256))?;
//! assert!(!png.is_empty());
//! map.free();
//! # Ok::<(), mapnik::RenderError>(())
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::projection::Projection;
use crate::errors::RenderError;
use crate::render::backend::NativeMap;
use crate::render::{BoundingBox, ImageFormat, RenderOptions};

/// Identifier of a map, used to tell sessions apart in logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapId(Uuid);

impl MapId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MapId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rendering session over one native map context.
///
/// `Map` is `Send` but not `Sync`: it can move between threads, but a single
/// context must not be driven from two threads at once. Render concurrently by
/// giving each thread its own map.
pub struct Map {
    id: MapId,
    native: Box<dyn NativeMap + Send>,
    /// Values of `set_max_connections` at or below this are ignored.
    max_connections_floor: i32,
    max_connections: Option<i32>,
    default_format: ImageFormat,
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("width", &self.native.width())
            .field("height", &self.native.height())
            .field("native", &"Box<dyn NativeMap>")
            .finish()
    }
}

impl Map {
    pub(crate) fn new(
        native: Box<dyn NativeMap + Send>,
        max_connections_floor: i32,
        default_format: ImageFormat,
    ) -> Self {
        let map = Self {
            id: MapId::new(),
            native,
            max_connections_floor,
            max_connections: None,
            default_format,
        };
        log::debug!("map {}: created {}x{}", map.id, map.width(), map.height());
        map
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    /// Builds an error from the engine's diagnostic for this map.
    fn last_error(&self, fallback: &str) -> String {
        self.native
            .last_error()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Loads the stylesheet file at `path`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        self.native
            .load(path)
            .map_err(|_| RenderError::Load(self.last_error("error while loading stylesheet")))?;
        log::debug!("map {}: loaded stylesheet {}", self.id, path.display());
        Ok(())
    }

    /// Loads a stylesheet given as text instead of a file.
    pub fn load_string(&mut self, stylesheet: &str) -> Result<(), RenderError> {
        self.native
            .load_string(stylesheet)
            .map_err(|_| RenderError::Load(self.last_error("error while loading stylesheet")))?;
        log::debug!("map {}: loaded stylesheet from string ({} bytes)", self.id, stylesheet.len());
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.native.width()
    }

    pub fn height(&self) -> u32 {
        self.native.height()
    }

    /// Changes the size of future renders.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.native.resize(width, height);
    }

    pub fn srs(&self) -> String {
        self.native.srs()
    }

    /// Sets the spatial reference system. The string is not validated here; a
    /// bad SRS only shows up when rendering or projecting.
    pub fn set_srs(&mut self, srs: &str) {
        self.native.set_srs(srs);
    }

    /// Fits the viewport around all layers.
    pub fn zoom_all(&mut self) -> Result<(), RenderError> {
        self.native
            .zoom_all()
            .map_err(|_| RenderError::ZoomAll(self.last_error("error while zooming to layer extents")))
    }

    pub fn zoom_to_box(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        self.zoom_to(BoundingBox::new(min_x, min_y, max_x, max_y));
    }

    pub fn zoom_to(&mut self, bbox: BoundingBox) {
        self.native.zoom_to_box(bbox);
    }

    /// Current viewport, if the engine reports it.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.native.current_extent()
    }

    /// Extra margin, in pixels, rendered around the map so features crossing
    /// the edge are drawn consistently between neighbouring tiles.
    pub fn set_buffer_size(&mut self, pixels: i32) {
        self.native.set_buffer_size(pixels);
    }

    pub fn buffer_size(&self) -> Option<i32> {
        self.native.buffer_size()
    }

    /// Sizes the datasource connection pools.
    ///
    /// Counts at or below the configured floor
    /// ([`DEFAULT_MAX_CONNECTIONS_FLOOR`](crate::config::DEFAULT_MAX_CONNECTIONS_FLOOR)
    /// unless overridden) are ignored.
    pub fn set_max_connections(&mut self, count: i32) {
        if count <= self.max_connections_floor {
            log::debug!(
                "map {}: ignoring max connections {count} (floor is {})",
                self.id,
                self.max_connections_floor
            );
            return;
        }
        self.native.set_max_connections(count);
        self.max_connections = Some(count);
    }

    /// Last connection count handed to the engine.
    pub fn max_connections(&self) -> Option<i32> {
        self.max_connections
    }

    /// Datasource parameter of a layer, as the engine currently holds it.
    pub fn layer_parameter(&self, layer: &str, key: &str) -> Option<String> {
        self.native.layer_parameter(layer, key)
    }

    /// Renders straight to `path`. The engine picks the format from the extension.
    pub fn render_to_file(&mut self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        self.native
            .render_to_file(path)
            .map_err(|_| RenderError::RenderToFile(self.last_error("error while rendering to file")))?;
        log::debug!("map {}: rendered to {}", self.id, path.display());
        Ok(())
    }

    /// Renders the map and returns the encoded image.
    ///
    /// With [`ImageFormat::RAW`] the engine's RGBA8 pixel buffer is returned
    /// as is (`width * height * 4` bytes). Any other format goes through the
    /// engine's codecs; when none (or an empty name) is given the configured
    /// default is used.
    pub fn render(&mut self, options: RenderOptions) -> Result<Vec<u8>, RenderError> {
        let scale_factor = options.effective_scale_factor();
        let mut image = self
            .native
            .render_to_image(options.scale, scale_factor)
            .map_err(|_| RenderError::Render(self.last_error("error while rendering")))?;

        let format = options
            .format
            .filter(|f| !f.as_str().is_empty())
            .unwrap_or_else(|| self.default_format.clone());
        if format.is_raw() {
            return Ok(image.to_raw().to_vec());
        }

        let bytes = image.to_blob(format.as_str()).map_err(|_| RenderError::Encode {
            message: image
                .last_error()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("error while encoding image as {format}")),
            format: format.to_string(),
        })?;
        log::debug!("map {}: rendered {} bytes as {format}", self.id, bytes.len());
        Ok(bytes)
    }

    /// Projection from geographic coordinates into the map's current SRS.
    ///
    /// The projection borrows the map, so the map cannot be freed or changed
    /// while it is in use.
    pub fn projection(&self) -> Projection<'_> {
        Projection::new(self.native.projection())
    }

    /// Releases the native context.
    ///
    /// Consumes the map, so it cannot be used afterwards:
    ///
    /// ```compile_fail
    /// use mapnik::render::backends::null::NullBackend;
    /// use mapnik::MapnikEngine;
    ///
    /// let engine = MapnikEngine::new(None, Box::new(NullBackend::new()));
    /// let mut map = engine.new_map(256, 256);
    /// map.free();
    /// map.resize(512, 512);
    /// ```
    pub fn free(self) {
        drop(self);
    }
}

impl Drop for Map {
    fn drop(&mut self) {
        log::debug!("map {}: released", self.id);
    }
}
