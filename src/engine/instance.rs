use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MapnikConfig;
use crate::discovery::{ConfigDiscovery, MapnikConfigTool};
use crate::engine::map::Map;
use crate::engine::registrar;
use crate::errors::{MapnikError, RegistrationError};
use crate::logging::LogLevel;
use crate::render::backend::MapBackend;

/// Process-level entry point: the rendering engine plus its configuration.
///
/// Fonts and datasource plugins are registered process-wide, so every [`Map`]
/// created afterwards sees them.
pub struct MapnikEngine {
    /// Engine implementation shared by all maps.
    backend: Arc<dyn MapBackend + Send + Sync>,
    config: Arc<MapnikConfig>,
}

impl MapnikEngine {
    /// Create a new engine.
    ///
    /// If `config` is `None`, [`MapnikConfig::default`] is used.
    ///
    /// ```
    /// # use mapnik::render::backends::null::NullBackend;
    /// let engine = mapnik::MapnikEngine::new(None, Box::new(NullBackend::new()));
    /// assert_eq!(engine.version(), "Mapnik disabled");
    /// ```
    pub fn new(config: Option<MapnikConfig>, backend: Box<dyn MapBackend + Send + Sync>) -> Self {
        let config = config.unwrap_or_default();
        log::debug!("[mapnik] engine created with {} backend", backend.name());

        Self {
            backend: Arc::from(backend),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MapnikConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn version(&self) -> String {
        format!("Mapnik {}", self.backend.version())
    }

    /// Sets the engine's log severity and the crate's own `log` verbosity.
    pub fn set_log_level(&self, level: LogLevel) {
        self.backend.set_log_severity(level.severity());
        log::set_max_level(level.level_filter());
    }

    /// See [`registrar::register_fonts`].
    pub fn register_fonts(&self, dir: impl AsRef<Path>) -> Result<usize, RegistrationError> {
        let dir = dir.as_ref();
        let count = registrar::register_fonts(self.backend.as_ref(), dir)?;
        log::info!("[mapnik] registered {count} fonts from {}", dir.display());
        Ok(count)
    }

    /// See [`registrar::register_datasources`].
    pub fn register_datasources(&self, dir: impl AsRef<Path>) -> Result<usize, RegistrationError> {
        let dir = dir.as_ref();
        let count = registrar::register_datasources(self.backend.as_ref(), dir)?;
        log::info!("[mapnik] registered {count} datasources from {}", dir.display());
        Ok(count)
    }

    /// Config tool named by the configuration.
    pub fn config_tool(&self) -> MapnikConfigTool {
        MapnikConfigTool::new(self.config.config_tool.clone())
    }

    /// Applies the configured log level, then registers datasource plugins and
    /// fonts.
    ///
    /// Directories come from the configuration, or from `discovery` when the
    /// configuration leaves them unset. A directory nobody knows is skipped.
    pub fn bootstrap(&self, discovery: &dyn ConfigDiscovery) -> Result<(), MapnikError> {
        self.set_log_level(self.config.log_level);

        let plugins = resolve(self.config.plugin_dir.as_ref(), || discovery.plugin_path());
        match plugins {
            Some(dir) => {
                self.register_datasources(&dir)?;
            }
            None => log::warn!("[mapnik] no datasource plugin directory known, skipping"),
        }

        let fonts = resolve(self.config.font_dir.as_ref(), || discovery.font_path());
        match fonts {
            Some(dir) => {
                self.register_fonts(&dir)?;
            }
            None => log::warn!("[mapnik] no font directory known, skipping"),
        }

        Ok(())
    }

    /// Allocates a new map context of the given size.
    ///
    /// # Panics
    /// When the native engine cannot allocate the context.
    pub fn new_map(&self, width: u32, height: u32) -> Map {
        Map::new(
            self.backend.create_map(width, height),
            self.config.max_connections_floor,
            self.config.default_format.clone(),
        )
    }
}

fn resolve(configured: Option<&PathBuf>, discover: impl FnOnce() -> String) -> Option<PathBuf> {
    match configured {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir.clone()),
        _ => {
            let found = discover();
            (!found.is_empty()).then(|| PathBuf::from(found))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::render::backend::Severity;
    use crate::render::backends::memory::InMemoryBackend;
    use crate::render::backends::null::NullBackend;
    use crate::render::ImageFormat;

    struct FixedDiscovery {
        fonts: String,
        plugins: String,
    }

    impl ConfigDiscovery for FixedDiscovery {
        fn font_path(&self) -> String {
            self.fonts.clone()
        }

        fn plugin_path(&self) -> String {
            self.plugins.clone()
        }
    }

    fn unknown() -> FixedDiscovery {
        FixedDiscovery {
            fonts: String::new(),
            plugins: String::new(),
        }
    }

    fn asset_dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let fonts = root.path().join("fonts");
        let plugins = root.path().join("input");
        fs::create_dir_all(fonts.join("truetype")).unwrap();
        fs::create_dir_all(&plugins).unwrap();
        fs::write(fonts.join("truetype/DejaVuSans.ttf"), b"font").unwrap();
        fs::write(fonts.join("README"), b"text").unwrap();
        fs::write(plugins.join("shape.input"), b"plugin").unwrap();
        (root, fonts, plugins)
    }

    #[test]
    fn version_is_prefixed() {
        let engine = MapnikEngine::new(None, Box::new(InMemoryBackend::new()));
        assert!(engine.version().starts_with("Mapnik "));
        assert_eq!(engine.backend_name(), "InMemoryBackend");
    }

    #[test]
    fn log_level_reaches_the_engine() {
        let backend = InMemoryBackend::new();
        let engine = MapnikEngine::new(None, Box::new(backend.handle()));

        engine.set_log_level(LogLevel::Error);
        assert_eq!(backend.severity(), Severity::Error);
        engine.set_log_level(LogLevel::from_raw(42));
        assert_eq!(backend.severity(), Severity::Warn);
    }

    #[test]
    fn bootstrap_uses_discovered_directories() {
        let (_root, fonts, plugins) = asset_dirs();
        let backend = InMemoryBackend::new();
        let config = MapnikConfig::builder().log_level(LogLevel::Debug).build().unwrap();
        let engine = MapnikEngine::new(Some(config), Box::new(backend.handle()));

        let discovery = FixedDiscovery {
            fonts: fonts.display().to_string(),
            plugins: plugins.display().to_string(),
        };
        engine.bootstrap(&discovery).unwrap();

        assert_eq!(backend.severity(), Severity::Debug);

        assert_eq!(backend.registered_fonts(), vec![fonts.join("truetype/DejaVuSans.ttf")]);
        assert_eq!(backend.registered_plugins(), vec!["shape".to_string()]);
    }

    #[test]
    fn configured_directories_win_over_discovery() {
        let (_root, fonts, plugins) = asset_dirs();
        let backend = InMemoryBackend::new();
        let config = MapnikConfig::builder()
            .font_dir(&fonts)
            .plugin_dir(&plugins)
            .build()
            .unwrap();
        let engine = MapnikEngine::new(Some(config), Box::new(backend.handle()));

        let discovery = FixedDiscovery {
            fonts: "/does/not/exist".into(),
            plugins: "/does/not/exist".into(),
        };
        engine.bootstrap(&discovery).unwrap();
        assert_eq!(backend.registered_fonts().len(), 1);
    }

    #[test]
    fn unknown_directories_are_skipped() {
        let backend = InMemoryBackend::new();
        let engine = MapnikEngine::new(None, Box::new(backend.handle()));

        engine.bootstrap(&unknown()).unwrap();
        assert!(backend.registered_fonts().is_empty());
        assert!(backend.registered_plugins().is_empty());
    }

    #[test]
    fn bootstrap_surfaces_registration_failures() {
        let (_root, fonts, plugins) = asset_dirs();
        fs::write(fonts.join("truetype/Broken.ttf"), b"").unwrap();

        let backend = InMemoryBackend::new();
        let config = MapnikConfig::builder()
            .font_dir(&fonts)
            .plugin_dir(&plugins)
            .build()
            .unwrap();
        let engine = MapnikEngine::new(Some(config), Box::new(backend.handle()));

        let err = engine.bootstrap(&unknown()).unwrap_err();
        match err {
            MapnikError::Registration(RegistrationError::Rejected { path, .. }) => {
                assert_eq!(path, fonts.join("truetype/Broken.ttf"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Plugins are registered before fonts.
        assert_eq!(backend.registered_plugins().len(), 1);
    }

    #[test]
    fn maps_inherit_configuration() {
        let config = MapnikConfig::builder()
            .default_format(ImageFormat::JPEG80)
            .max_connections_floor(2)
            .build()
            .unwrap();
        let engine = MapnikEngine::new(Some(config), Box::new(NullBackend::new()));

        let mut map = engine.new_map(64, 32);
        assert_eq!((map.width(), map.height()), (64, 32));
        map.set_max_connections(3);
        assert_eq!(map.max_connections(), Some(3));
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        let engine = Arc::new(MapnikEngine::new(None, Box::new(InMemoryBackend::new())));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.new_map(16 + i, 16).width())
            })
            .collect();
        let widths: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(widths, vec![16, 17, 18, 19]);
    }
}
