use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output format of a render call.
///
/// Any name is accepted and handed to the engine's codec registry, except
/// [`ImageFormat::RAW`], which asks for the uncompressed RGBA pixels instead.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ImageFormat(Cow<'static, str>);

impl ImageFormat {
    /// Indexed (palette) PNG with up to 256 colours.
    pub const PNG256: ImageFormat = ImageFormat(Cow::Borrowed("png256"));
    pub const JPEG80: ImageFormat = ImageFormat(Cow::Borrowed("jpeg80"));
    pub const JPEG100: ImageFormat = ImageFormat(Cow::Borrowed("jpeg100"));
    /// Uncompressed RGBA8 pixels, never passed to a codec.
    pub const RAW: ImageFormat = ImageFormat(Cow::Borrowed("raw"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_raw(&self) -> bool {
        self.0 == "raw"
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::PNG256
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageFormat({})", self.0)
    }
}

impl From<&str> for ImageFormat {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ImageFormat {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl From<ImageFormat> for String {
    fn from(format: ImageFormat) -> Self {
        format.0.into_owned()
    }
}

impl FromStr for ImageFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Per-call render settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    /// Scale denominator. `0.0` lets the engine derive it from the extent.
    pub scale: f64,
    /// Symbol scale factor. `0.0` means `1.0`.
    pub scale_factor: f64,
    /// Output format. `None` or an empty name uses the configured default (`png256`).
    pub format: Option<ImageFormat>,
}

impl RenderOptions {
    pub fn with_format(format: impl Into<ImageFormat>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::default()
        }
    }

    /// Scale factor handed to the engine.
    pub fn effective_scale_factor(&self) -> f64 {
        if self.scale_factor == 0.0 {
            1.0
        } else {
            self.scale_factor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scale_factor_means_one() {
        assert_eq!(RenderOptions::default().effective_scale_factor(), 1.0);
        let opts = RenderOptions { scale_factor: 2.0, ..Default::default() };
        assert_eq!(opts.effective_scale_factor(), 2.0);
    }

    #[test]
    fn raw_sentinel_is_recognised() {
        assert!(ImageFormat::RAW.is_raw());
        assert!(ImageFormat::from("raw").is_raw());
        assert!(!ImageFormat::PNG256.is_raw());
        assert_eq!(ImageFormat::default(), ImageFormat::PNG256);
    }

    #[test]
    fn owned_and_borrowed_names_compare_equal() {
        assert_eq!(ImageFormat::new("jpeg80"), ImageFormat::JPEG80);
        assert_eq!("jpeg100".parse::<ImageFormat>().unwrap(), ImageFormat::JPEG100);
        assert_eq!(ImageFormat::JPEG80.to_string(), "jpeg80");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ImageFormat::PNG256).unwrap();
        assert_eq!(json, "\"png256\"");
        let back: ImageFormat = serde_json::from_str("\"jpeg80\"").unwrap();
        assert_eq!(back, ImageFormat::JPEG80);
    }
}
