//! Image engine: the pixel work behind the pipeline.
//!
//! | Concern | Where |
//! |---|---|
//! | **Engine seam** | [`ImageBackend`] / [`ImageHandle`] traits |
//! | **Pure-Rust engine** | [`RustBackend`]: `image` codecs, `img-parts` metadata, `rayon` compositing |
//! | **IPTC** | custom IIM parser/writer (Photoshop APP13) |
//! | **XMP** | copyright filter over `roxmltree` |
//! | **EXIF** | orientation and copyright-subset reader |
//! | **Geometry** | pure placement/scale math |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing images and formats
//! - **Backend**: the engine traits plus a recording mock for tests
//! - **Metadata codecs**: IPTC, XMP, EXIF

pub mod backend;
pub mod calculations;
pub mod exif;
pub mod iptc_parser;
mod params;
pub mod rust_backend;
pub mod xmp;

pub use backend::{BackendError, ImageBackend, ImageHandle};
pub use params::{ImageData, ImageType, MetadataKind, Rgb};
pub use rust_backend::RustBackend;
