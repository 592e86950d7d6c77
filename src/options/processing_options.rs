//! The per-request instruction set.

use super::types::{
    CropOptions, ExtendOptions, FlipOptions, GravitySpec, PaddingOptions, ResizeType,
    WatermarkOptions,
};
use crate::config::ProxyConfig;
use crate::imaging::{ImageType, Rgb};
use serde::Serialize;

/// Everything the pipeline needs to know about one request.
///
/// Built from [`ProxyConfig`] defaults, mutated by the option handlers,
/// then read-only for the rest of the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOptions {
    pub resizing_type: ResizeType,
    /// Target width in CSS pixels; 0 means unconstrained.
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub zoom_width: f64,
    pub zoom_height: f64,
    pub dpr: f64,
    pub gravity: GravitySpec,
    pub enlarge: bool,
    pub extend: ExtendOptions,
    pub crop: CropOptions,
    pub padding: PaddingOptions,
    pub rotate: u16,
    pub flip: FlipOptions,
    pub auto_rotate: bool,

    /// `Unknown` means pick one at encode time.
    pub format: ImageType,
    pub quality: u8,
    pub max_bytes: usize,

    pub flatten: bool,
    pub background: Rgb,
    pub blur: f32,
    pub sharpen: f32,
    pub pixelate: u32,

    pub strip_metadata: bool,
    pub keep_copyright: bool,
    pub strip_color_profile: bool,

    pub watermark: WatermarkOptions,

    pub prefer_webp: bool,
    pub enforce_webp: bool,
    pub prefer_avif: bool,
    pub enforce_avif: bool,

    pub cache_buster: String,
    pub filename: String,
    pub used_presets: Vec<String>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

impl ProcessingOptions {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let p = &config.processing;
        Self {
            resizing_type: ResizeType::Fit,
            width: 0,
            height: 0,
            min_width: 0,
            min_height: 0,
            zoom_width: 1.0,
            zoom_height: 1.0,
            dpr: 1.0,
            gravity: GravitySpec::default(),
            enlarge: false,
            extend: ExtendOptions::default(),
            crop: CropOptions::default(),
            padding: PaddingOptions::default(),
            rotate: 0,
            flip: FlipOptions::default(),
            auto_rotate: p.auto_rotate,
            format: ImageType::Unknown,
            quality: p.quality.min(100) as u8,
            max_bytes: 0,
            flatten: false,
            background: Rgb::WHITE,
            blur: 0.0,
            sharpen: 0.0,
            pixelate: 0,
            strip_metadata: p.strip_metadata,
            keep_copyright: p.keep_copyright,
            strip_color_profile: p.strip_color_profile,
            watermark: WatermarkOptions::default(),
            prefer_webp: false,
            enforce_webp: false,
            prefer_avif: false,
            enforce_avif: false,
            cache_buster: String::new(),
            filename: String::new(),
            used_presets: Vec::new(),
        }
    }
}
