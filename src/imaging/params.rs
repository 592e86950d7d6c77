//! Parameter types for image engine operations.
//!
//! These types describe *what* the engine works with, not *how*. They sit
//! between the request layer (which decides what to produce) and the
//! [`backend`](super::backend) (which does the pixel work), so the engine can
//! be swapped for a recording mock in tests.
//!
//! ## Types
//!
//! - [`ImageType`]: Known container formats. `Unknown` means "inherit from source".
//! - [`ImageData`]: Raw source bytes plus their sniffed [`ImageType`].
//! - [`MetadataKind`]: The embedded metadata blobs an image handle can carry.
//! - [`Rgb`]: An 8-bit background colour.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Unknown,
    Jpeg,
    Png,
    Webp,
    Gif,
    Ico,
    Svg,
    Heic,
    Avif,
    Bmp,
    Tiff,
}

impl ImageType {
    /// Resolve a format name or file extension (`jpg`, `png`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            "ico" => Self::Ico,
            "svg" => Self::Svg,
            "heic" => Self::Heic,
            "avif" => Self::Avif,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            _ => return None,
        };
        Some(t)
    }

    /// Sniff the format from leading magic bytes.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(b"<svg") || data.starts_with(b"<?xml") {
            return Self::Svg;
        }
        if data.len() >= 12 && &data[4..8] == b"ftyp" {
            return match &data[8..12] {
                b"avif" | b"avis" => Self::Avif,
                b"heic" | b"heix" | b"mif1" => Self::Heic,
                _ => Self::Unknown,
            };
        }
        match image::guess_format(data) {
            Ok(image::ImageFormat::Jpeg) => Self::Jpeg,
            Ok(image::ImageFormat::Png) => Self::Png,
            Ok(image::ImageFormat::WebP) => Self::Webp,
            Ok(image::ImageFormat::Gif) => Self::Gif,
            Ok(image::ImageFormat::Ico) => Self::Ico,
            Ok(image::ImageFormat::Bmp) => Self::Bmp,
            Ok(image::ImageFormat::Tiff) => Self::Tiff,
            Ok(image::ImageFormat::Avif) => Self::Avif,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Ico => "ico",
            Self::Svg => "svg",
            Self::Heic => "heic",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Unknown => "application/octet-stream",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Ico => "image/x-icon",
            Self::Svg => "image/svg+xml",
            Self::Heic => "image/heif",
            Self::Avif => "image/avif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp | Self::Unknown)
    }

    pub fn supports_animation(self) -> bool {
        matches!(self, Self::Gif | Self::Webp)
    }

    /// Formats whose encoder takes a quality setting.
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg | Self::Webp | Self::Avif | Self::Heic)
    }

    /// Formats whose decoders can shrink while decoding.
    pub fn supports_shrink_on_load(self) -> bool {
        matches!(self, Self::Jpeg | Self::Webp | Self::Svg | Self::Heic | Self::Avif)
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, still-encoded image bytes plus their detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub kind: ImageType,
}

impl ImageData {
    pub fn new(data: Vec<u8>) -> Self {
        let kind = ImageType::sniff(&data);
        Self { data, kind }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Embedded metadata blobs an image handle can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    Exif,
    Icc,
    /// Photoshop APP13 payload holding IPTC-IIM datasets.
    Iptc,
    Xmp,
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_from_name_accepts_aliases() {
        assert_eq!(ImageType::from_name("jpg"), Some(ImageType::Jpeg));
        assert_eq!(ImageType::from_name("JPEG"), Some(ImageType::Jpeg));
        assert_eq!(ImageType::from_name("tif"), Some(ImageType::Tiff));
        assert_eq!(ImageType::from_name("webp"), Some(ImageType::Webp));
        assert_eq!(ImageType::from_name("jpx"), None);
    }

    #[test]
    fn sniff_png_signature() {
        let data = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(ImageType::sniff(&data), ImageType::Png);
    }

    #[test]
    fn sniff_avif_brand() {
        let mut data = vec![0, 0, 0, 0x1C];
        data.extend_from_slice(b"ftypavif");
        data.extend_from_slice(&[0; 8]);
        assert_eq!(ImageType::sniff(&data), ImageType::Avif);
    }

    #[test]
    fn sniff_garbage_is_unknown() {
        assert_eq!(ImageType::sniff(b"not an image"), ImageType::Unknown);
    }

    #[test]
    fn lossy_formats() {
        assert!(ImageType::Jpeg.is_lossy());
        assert!(!ImageType::Png.is_lossy());
        assert!(!ImageType::Gif.is_lossy());
    }
}
