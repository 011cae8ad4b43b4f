use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_CONFIG_TOOL;
use crate::logging::LogLevel;
use crate::render::ImageFormat;

/// Connection counts at or below this value are ignored by
/// [`Map::set_max_connections`](crate::Map::set_max_connections).
pub const DEFAULT_MAX_CONNECTIONS_FLOOR: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config tool must not be empty")]
    EmptyConfigTool,

    #[error("max connections floor must not be negative (got {0})")]
    NegativeFloor(i32),

    #[error("'raw' cannot be used as the default image format")]
    RawDefaultFormat,

    #[error("reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine-wide configuration.
///
/// Every field is optional in JSON; missing ones take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapnikConfig {
    /// Font directory used by `bootstrap`. `None` asks the config tool.
    pub font_dir: Option<PathBuf>,
    /// Datasource plugin directory used by `bootstrap`. `None` asks the config tool.
    pub plugin_dir: Option<PathBuf>,
    /// Program queried for default directories.
    pub config_tool: String,
    pub log_level: LogLevel,
    /// See [`DEFAULT_MAX_CONNECTIONS_FLOOR`].
    pub max_connections_floor: i32,
    /// Format used when a render call does not name one.
    pub default_format: ImageFormat,
}

impl Default for MapnikConfig {
    fn default() -> Self {
        Self {
            font_dir: None,
            plugin_dir: None,
            config_tool: DEFAULT_CONFIG_TOOL.to_string(),
            log_level: LogLevel::default(),
            max_connections_floor: DEFAULT_MAX_CONNECTIONS_FLOOR,
            default_format: ImageFormat::PNG256,
        }
    }
}

impl MapnikConfig {
    pub fn builder() -> MapnikConfigBuilder {
        MapnikConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_tool.trim().is_empty() {
            return Err(ConfigError::EmptyConfigTool);
        }
        if self.max_connections_floor < 0 {
            return Err(ConfigError::NegativeFloor(self.max_connections_floor));
        }
        if self.default_format.is_raw() {
            return Err(ConfigError::RawDefaultFormat);
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MapnikConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// Fluent builder for [`MapnikConfig`].
///
/// ```
/// use mapnik::{ImageFormat, LogLevel, MapnikConfig};
///
/// let config = MapnikConfig::builder()
///     .font_dir("/usr/share/fonts")
///     .log_level(LogLevel::Error)
///     .default_format(ImageFormat::JPEG80)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_connections_floor, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapnikConfigBuilder {
    config: MapnikConfig,
}

impl MapnikConfigBuilder {
    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dir = Some(dir.into());
        self
    }

    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.plugin_dir = Some(dir.into());
        self
    }

    pub fn config_tool(mut self, program: impl Into<String>) -> Self {
        self.config.config_tool = program.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn max_connections_floor(mut self, floor: i32) -> Self {
        self.config.max_connections_floor = floor;
        self
    }

    pub fn default_format(mut self, format: impl Into<ImageFormat>) -> Self {
        self.config.default_format = format.into();
        self
    }

    pub fn build(self) -> Result<MapnikConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let config = MapnikConfig::default();
        assert_eq!(config.config_tool, "mapnik-config");
        assert_eq!(config.max_connections_floor, 10);
        assert_eq!(config.default_format, ImageFormat::PNG256);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_validates() {
        assert!(matches!(
            MapnikConfig::builder().config_tool("  ").build(),
            Err(ConfigError::EmptyConfigTool)
        ));
        assert!(matches!(
            MapnikConfig::builder().max_connections_floor(-1).build(),
            Err(ConfigError::NegativeFloor(-1))
        ));
        assert!(matches!(
            MapnikConfig::builder().default_format(ImageFormat::RAW).build(),
            Err(ConfigError::RawDefaultFormat)
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = MapnikConfig::from_json_str(r#"{"font_dir": "/fonts", "log_level": "debug"}"#).unwrap();
        assert_eq!(config.font_dir.as_deref(), Some(Path::new("/fonts")));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.plugin_dir, None);
        assert_eq!(config.default_format, ImageFormat::PNG256);
    }

    #[test]
    fn json_is_validated() {
        let err = MapnikConfig::from_json_str(r#"{"default_format": "raw"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::RawDefaultFormat));

        let err = MapnikConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_connections_floor": 4, "default_format": "jpeg80"}}"#).unwrap();

        let config = MapnikConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_connections_floor, 4);
        assert_eq!(config.default_format, ImageFormat::JPEG80);

        let err = MapnikConfig::from_json_file("/no/such/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
