use std::fmt;
use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors reported by a [`Map`](crate::Map) session.
///
/// Every variant carries the engine's last diagnostic for the map (or, for
/// [`RenderError::Encode`], for the rendered image). When the engine did not
/// leave a diagnostic behind a generic message is used instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("mapnik: {0}")]
    Load(String),

    #[error("mapnik: {0}")]
    ZoomAll(String),

    #[error("mapnik: {0}")]
    Render(String),

    #[error("mapnik: {0}")]
    RenderToFile(String),

    /// The map rendered, but the image could not be encoded as `format`.
    #[error("mapnik: {message}")]
    Encode { format: String, message: String },
}

impl RenderError {
    /// The diagnostic text without the `mapnik:` prefix.
    pub fn message(&self) -> &str {
        match self {
            RenderError::Load(m)
            | RenderError::ZoomAll(m)
            | RenderError::Render(m)
            | RenderError::RenderToFile(m) => m,
            RenderError::Encode { message, .. } => message,
        }
    }
}

/// Kind of side-loaded asset handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Font,
    Datasource,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Font => write!(f, "fonts"),
            AssetKind::Datasource => write!(f, "datasources"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The engine refused a single asset. The scan stops here.
    #[error("registering {kind}: {}: {message}", path.display())]
    Rejected {
        kind: AssetKind,
        path: PathBuf,
        message: String,
    },

    /// Listing or walking the directory failed.
    #[error("scanning {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistrationError {
    /// Path of the entry that stopped the scan.
    pub fn path(&self) -> &std::path::Path {
        match self {
            RegistrationError::Rejected { path, .. } | RegistrationError::Io { path, .. } => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapnikError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
