//! Log levels and logger setup.
//!
//! Two loggers are in play: the engine's own logger, whose verbosity is set
//! with [`MapnikEngine::set_log_level`](crate::MapnikEngine::set_log_level),
//! and the `log` facade used by this crate. [`init`] installs `env_logger`
//! for hosts that do not bring their own.

use serde::{Deserialize, Serialize};

use crate::render::backend::Severity;

/// Verbosity of the engine's logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Debug,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Maps the raw integer levels (0 = none, 1 = debug, 2 = warn, 3 = error).
    /// Anything else is treated as [`LogLevel::Warn`].
    pub fn from_raw(level: i32) -> Self {
        match level {
            0 => LogLevel::None,
            1 => LogLevel::Debug,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            LogLevel::None => Severity::None,
            LogLevel::Debug => Severity::Debug,
            LogLevel::Warn => Severity::Warn,
            LogLevel::Error => Severity::Error,
        }
    }

    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::None => log::LevelFilter::Off,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl From<i32> for LogLevel {
    fn from(level: i32) -> Self {
        Self::from_raw(level)
    }
}

/// Installs `env_logger` with `level` as default filter. `RUST_LOG` still wins.
///
/// Calling this more than once is harmless; only the first call installs a logger.
pub fn init(level: LogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.level_filter())
        .parse_default_env()
        .try_init();
}
