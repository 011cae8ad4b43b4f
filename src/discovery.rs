//! Discovery of the engine's default font and plugin directories.

use std::process::Command;

/// Program queried when nothing else is configured.
pub const DEFAULT_CONFIG_TOOL: &str = "mapnik-config";

/// Source of default asset directories.
///
/// An empty string means the location is unknown.
pub trait ConfigDiscovery {
    fn font_path(&self) -> String;
    fn plugin_path(&self) -> String;
}

/// Asks the engine's `mapnik-config` helper for its install locations.
#[derive(Debug, Clone)]
pub struct MapnikConfigTool {
    program: String,
}

impl Default for MapnikConfigTool {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_TOOL)
    }
}

impl MapnikConfigTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn query(&self, flag: &str) -> String {
        let output = match Command::new(&self.program).arg(flag).output() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("[mapnik] could not run {} {flag}: {e}", self.program);
                return String::new();
            }
        };

        if !output.status.success() {
            log::warn!("[mapnik] {} {flag} exited with {}", self.program, output.status);
            return String::new();
        }

        match String::from_utf8(output.stdout) {
            Ok(s) => s.trim().to_string(),
            Err(_) => {
                log::warn!("[mapnik] {} {flag} printed non UTF-8 output", self.program);
                String::new()
            }
        }
    }
}

impl ConfigDiscovery for MapnikConfigTool {
    fn font_path(&self) -> String {
        self.query("--fonts")
    }

    fn plugin_path(&self) -> String {
        self.query("--input-plugins")
    }
}

/// Font directory reported by `mapnik-config --fonts`, or `""`.
pub fn config_fonts() -> String {
    MapnikConfigTool::default().font_path()
}

/// Plugin directory reported by `mapnik-config --input-plugins`, or `""`.
pub fn config_plugins() -> String {
    MapnikConfigTool::default().plugin_path()
}
