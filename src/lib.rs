//! Safe bindings over the Mapnik map-rendering engine.
//!
//! The engine sits behind the [`render::backend::MapBackend`] trait. Pick one
//! of the backends in [`render::backends`], hand it to a [`MapnikEngine`] and
//! create [`Map`]s from there.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod errors;
#[cfg(feature = "backend_native")]
pub mod ffi;
pub mod logging;
pub mod render;

pub use config::{ConfigError, MapnikConfig, MapnikConfigBuilder, DEFAULT_MAX_CONNECTIONS_FLOOR};
pub use discovery::{config_fonts, config_plugins, ConfigDiscovery, MapnikConfigTool};
pub use engine::*;
pub use errors::{AssetKind, MapnikError, RegistrationError, RenderError};
pub use logging::LogLevel;
pub use render::{BoundingBox, ImageFormat, RenderOptions};
