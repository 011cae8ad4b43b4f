use std::fmt;
use std::marker::PhantomData;

use crate::engine::map::Map;
use crate::render::backend::{Coord, NativeProjection};

/// Forward projection derived from a [`Map`]'s SRS.
///
/// Borrows the map it came from, so it can never outlive it:
///
/// ```compile_fail
/// use mapnik::render::backends::null::NullBackend;
/// use mapnik::MapnikEngine;
///
/// let engine = MapnikEngine::new(None, Box::new(NullBackend::new()));
/// let map = engine.new_map(256, 256);
/// let projection = map.projection();
/// map.free();
/// projection.forward(0.0, 0.0);
/// ```
pub struct Projection<'map> {
    native: Box<dyn NativeProjection + Send>,
    _map: PhantomData<&'map Map>,
}

impl fmt::Debug for Projection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection").finish_non_exhaustive()
    }
}

impl<'map> Projection<'map> {
    pub(crate) fn new(native: Box<dyn NativeProjection + Send>) -> Self {
        Self {
            native,
            _map: PhantomData,
        }
    }

    /// Projects a longitude/latitude pair into the map's SRS.
    ///
    /// The engine reports no failures here: a coordinate it cannot project
    /// comes back unchanged.
    pub fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        let c = self.native.forward(Coord { x, y });
        (c.x, c.y)
    }

    /// Releases the native projection. Dropping it does the same.
    pub fn free(self) {
        drop(self);
    }
}
