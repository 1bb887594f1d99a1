/// Image format utilities and type-safe format handling
///
/// Compression profiles name their output encoding with [`TargetFormat`]
/// rather than free-form strings.
use crate::error::CompressionError;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Encodings a compressed capture can be uploaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Lossy, honours the profile quality factor
    Jpeg,
    /// Lossless, quality selects the oxipng deflater effort
    Png,
    /// Lossless WebP
    WebP,
}

impl TargetFormat {
    /// Returns the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::WebP => "image/webp",
        }
    }

    /// Convert to the image crate's ImageFormat
    pub fn to_image_format(&self) -> ImageFormat {
        match self {
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::WebP => ImageFormat::WebP,
        }
    }

    /// Guess the format from a filename extension, if it is one we encode.
    pub fn from_path(path: &Path) -> Option<TargetFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| TargetFormat::from_str(ext).ok())
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetFormat::Jpeg => "JPEG",
            TargetFormat::Png => "PNG",
            TargetFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TargetFormat {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "webp" => Ok(TargetFormat::WebP),
            _ => Err(CompressionError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// MIME type for an upload filename, `application/octet-stream` when unknown.
pub fn content_type_for(filename: &str) -> &'static str {
    TargetFormat::from_path(Path::new(filename))
        .map(|format| format.mime_type())
        .unwrap_or("application/octet-stream")
}
