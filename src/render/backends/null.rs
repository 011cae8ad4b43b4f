use std::path::Path;

use crate::render::backend::{
    AssetRejected, Coord, MapBackend, NativeImage, NativeMap, NativeProjection, NativeResult, Severity,
};
use crate::render::viewport::BoundingBox;

/// Null backend for builds without a rendering engine.
///
/// Every call succeeds and does nothing. Renders produce empty buffers and
/// projections leave coordinates untouched.
pub struct NullBackend;

impl NullBackend {
    /// Creates a new instance of the null backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MapBackend for NullBackend {
    fn name(&self) -> &str {
        "NullBackend"
    }

    fn version(&self) -> String {
        "disabled".to_string()
    }

    fn set_log_severity(&self, _severity: Severity) {}

    fn register_font(&self, _path: &Path) -> Result<(), AssetRejected> {
        Ok(())
    }

    fn register_datasource(&self, _path: &Path) -> Result<(), AssetRejected> {
        Ok(())
    }

    fn create_map(&self, width: u32, height: u32) -> Box<dyn NativeMap + Send> {
        Box::new(NullMap { width, height })
    }
}

pub struct NullMap {
    width: u32,
    height: u32,
}

impl NativeMap for NullMap {
    fn last_error(&self) -> Option<String> {
        None
    }

    fn load(&mut self, _stylesheet: &Path) -> NativeResult {
        Ok(())
    }

    fn load_string(&mut self, _stylesheet: &str) -> NativeResult {
        Ok(())
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
    }

    fn srs(&self) -> String {
        String::new()
    }

    fn set_srs(&mut self, _srs: &str) {}

    fn zoom_all(&mut self) -> NativeResult {
        Ok(())
    }

    fn zoom_to_box(&mut self, _bbox: BoundingBox) {}

    fn set_buffer_size(&mut self, _pixels: i32) {}

    fn set_max_connections(&mut self, _count: i32) {}

    fn render_to_file(&mut self, _path: &Path) -> NativeResult {
        Ok(())
    }

    fn render_to_image(&mut self, _scale: f64, _scale_factor: f64) -> NativeResult<Box<dyn NativeImage>> {
        Ok(Box::new(NullImage))
    }

    fn projection(&self) -> Box<dyn NativeProjection + Send> {
        Box::new(NullProjection)
    }
}

pub struct NullImage;

impl NativeImage for NullImage {
    fn last_error(&self) -> Option<String> {
        None
    }

    fn to_raw(&self) -> &[u8] {
        &[]
    }

    fn to_blob(&mut self, _format: &str) -> NativeResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub struct NullProjection;

impl NativeProjection for NullProjection {
    fn forward(&self, coord: Coord) -> Coord {
        coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_map_accepts_everything() {
        let backend = NullBackend::new();
        let mut map = backend.create_map(256, 128);

        assert!(map.load_string("<Map/>").is_ok());
        assert!(map.zoom_all().is_ok());
        assert_eq!((map.width(), map.height()), (256, 128));

        let mut image = map.render_to_image(0.0, 1.0).unwrap();
        assert!(image.to_raw().is_empty());
        assert!(image.to_blob("whatever").unwrap().is_empty());
    }

    #[test]
    fn null_projection_is_identity() {
        let backend = NullBackend::new();
        let map = backend.create_map(1, 1);
        let c = map.projection().forward(Coord { x: 12.5, y: -3.0 });
        assert_eq!(c, Coord { x: 12.5, y: -3.0 });
    }
}
