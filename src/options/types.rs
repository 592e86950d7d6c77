//! Typed values the options DSL produces.

use serde::Serialize;
use std::fmt;

/// How the image is fitted into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeType {
    /// Keep aspect ratio, fit inside the box.
    #[default]
    Fit,
    /// Keep aspect ratio, cover the box, crop the overflow.
    Fill,
    /// No scaling; cut the box out of the image.
    Crop,
    /// Ignore aspect ratio.
    Force,
    /// `Fill` when source and box share orientation, `Fit` otherwise.
    Auto,
}

impl ResizeType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fit" => Some(Self::Fit),
            "fill" => Some(Self::Fill),
            "crop" => Some(Self::Crop),
            "force" => Some(Self::Force),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Compass anchor for placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Center,
    North,
    East,
    South,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Anchor {
    pub fn is_north(self) -> bool {
        matches!(self, Self::North | Self::NorthEast | Self::NorthWest)
    }

    pub fn is_south(self) -> bool {
        matches!(self, Self::South | Self::SouthEast | Self::SouthWest)
    }

    pub fn is_east(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }

    pub fn is_west(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }
}

/// Where to anchor crops, canvas extension, and watermarks.
///
/// Anchored offsets are pixels measured inward from the anchor; focus-point
/// coordinates are fractions of the image size in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GravitySpec {
    Anchored { anchor: Anchor, x: f64, y: f64 },
    FocusPoint { x: f64, y: f64 },
    Smart,
}

impl Default for GravitySpec {
    fn default() -> Self {
        Self::Anchored {
            anchor: Anchor::Center,
            x: 0.0,
            y: 0.0,
        }
    }
}

impl GravitySpec {
    pub fn anchored(anchor: Anchor) -> Self {
        Self::Anchored {
            anchor,
            x: 0.0,
            y: 0.0,
        }
    }

    /// The (x, y) offsets regardless of variant; zero for smart.
    pub fn offsets(&self) -> (f64, f64) {
        match *self {
            Self::Anchored { x, y, .. } | Self::FocusPoint { x, y } => (x, y),
            Self::Smart => (0.0, 0.0),
        }
    }
}

impl fmt::Display for GravitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anchored { anchor, x, y } => write!(f, "{anchor:?}({x}, {y})"),
            Self::FocusPoint { x, y } => write!(f, "fp({x}, {y})"),
            Self::Smart => f.write_str("smart"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ExtendOptions {
    pub enabled: bool,
    pub gravity: GravitySpec,
}

/// Canvas insets in CSS order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PaddingOptions {
    pub enabled: bool,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Pre-resize crop. Sizes below 1 are fractions of the source size; 0
/// means the full source dimension. `gravity` falls back to the main
/// gravity when unset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CropOptions {
    pub width: f64,
    pub height: f64,
    pub gravity: Option<GravitySpec>,
}

impl CropOptions {
    pub fn is_set(&self) -> bool {
        self.width > 0.0 || self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WatermarkOptions {
    pub enabled: bool,
    pub opacity: f64,
    pub gravity: GravitySpec,
    /// Fraction of the image size; 0 keeps the watermark's own size.
    pub scale: f64,
    /// Tile across the whole image instead of a single placement.
    pub replicate: bool,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 1.0,
            gravity: GravitySpec::default(),
            scale: 0.0,
            replicate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlipOptions {
    pub horizontal: bool,
    pub vertical: bool,
}
