//! Capability interface of the wrapped rendering engine.
//!
//! The traits in this module mirror the engine's C surface: calls report only
//! whether they failed ([`NativeFailure`]) and the diagnostic is fetched
//! separately through `last_error`. Turning that pair into a typed error is the
//! job of [`Map`](crate::Map), not of the backend.

use std::path::Path;

use crate::render::viewport::BoundingBox;

/// Failure status of a native call. The message lives in the object's `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFailure;

pub type NativeResult<T = ()> = Result<T, NativeFailure>;

/// Rejection of a font or datasource plugin, with the engine's message if it gave one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRejected {
    pub message: Option<String>,
}

impl AssetRejected {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()) }
    }

    pub fn silent() -> Self {
        Self { message: None }
    }
}

/// Severity levels understood by the engine's logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warn,
    Error,
    None,
}

/// A pair of coordinates going through a projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

/// Process-wide engine interface. Calls may come from any thread.
pub trait MapBackend {
    fn name(&self) -> &str;

    /// Engine version string, without the `Mapnik` prefix.
    fn version(&self) -> String;

    fn set_log_severity(&self, severity: Severity);

    /// Registers a single font file with the font engine.
    fn register_font(&self, path: &Path) -> Result<(), AssetRejected>;

    /// Hands one directory entry to the datasource plugin cache.
    fn register_datasource(&self, path: &Path) -> Result<(), AssetRejected>;

    /// Allocates a new rendering context. Allocation failure is not recoverable.
    fn create_map(&self, width: u32, height: u32) -> Box<dyn NativeMap + Send>;
}

/// One native rendering context. Released when dropped.
pub trait NativeMap {
    /// Diagnostic left behind by the last failing call, if any.
    fn last_error(&self) -> Option<String>;

    fn load(&mut self, stylesheet: &Path) -> NativeResult;
    fn load_string(&mut self, stylesheet: &str) -> NativeResult;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn resize(&mut self, width: u32, height: u32);

    fn srs(&self) -> String;
    fn set_srs(&mut self, srs: &str);

    fn zoom_all(&mut self) -> NativeResult;
    fn zoom_to_box(&mut self, bbox: BoundingBox);

    /// Current extent, when the engine exposes it.
    fn current_extent(&self) -> Option<BoundingBox> {
        None
    }

    fn set_buffer_size(&mut self, pixels: i32);

    fn buffer_size(&self) -> Option<i32> {
        None
    }

    /// Sizes the datasource connection pool of every layer.
    fn set_max_connections(&mut self, count: i32);

    /// Datasource parameter of a layer, when the engine can be queried for it.
    fn layer_parameter(&self, _layer: &str, _key: &str) -> Option<String> {
        None
    }

    fn render_to_file(&mut self, path: &Path) -> NativeResult;

    /// Renders into a new native image. `scale <= 0` lets the engine pick the scale.
    fn render_to_image(&mut self, scale: f64, scale_factor: f64) -> NativeResult<Box<dyn NativeImage>>;

    /// Projection context for the map's current SRS.
    fn projection(&self) -> Box<dyn NativeProjection + Send>;
}

/// Rendered image owned by the engine. Released when dropped.
pub trait NativeImage {
    fn last_error(&self) -> Option<String>;

    /// The uncompressed RGBA8 pixels, exactly as the engine holds them.
    fn to_raw(&self) -> &[u8];

    /// Encodes the image with the named codec.
    fn to_blob(&mut self, format: &str) -> NativeResult<Vec<u8>>;
}

pub trait NativeProjection {
    fn forward(&self, coord: Coord) -> Coord;
}
