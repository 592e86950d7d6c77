//! Image engine trait and shared types.
//!
//! The engine is split in two traits:
//!
//! - [`ImageBackend`]: loads encoded bytes into a handle and reports which
//!   formats it can write.
//! - [`ImageHandle`]: the decoded image. Every pixel primitive the pipeline
//!   needs lives here: geometry (resize, crop, embed, replicate), colour
//!   (colourspace, flatten), filters, metadata blobs, compositing, and
//!   encoding.
//!
//! Animated images are a single canvas of `frames()` pages stacked
//! vertically, so `height()` is the full canvas and [`ImageHandle::page_height`]
//! is one frame. Geometric primitives apply per frame.
//!
//! A handle owns its native resources and releases them on drop, so every
//! exit path of a pipeline run frees the image.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{ImageData, ImageType, MetadataKind, Rgb};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported image format: {0}")]
    Unsupported(ImageType),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// A decoded image owned by exactly one request.
pub trait ImageHandle: Send {
    fn width(&self) -> u32;

    /// Full canvas height, all frames included.
    fn height(&self) -> u32;

    fn frames(&self) -> u32;

    /// Height of a single frame.
    fn page_height(&self) -> u32 {
        self.height() / self.frames().max(1)
    }

    fn has_alpha(&self) -> bool;

    /// Raw embedded metadata blob, if present.
    fn blob(&self, kind: MetadataKind) -> Option<Vec<u8>>;

    fn set_blob(&mut self, kind: MetadataKind, data: Vec<u8>);

    fn remove_blob(&mut self, kind: MetadataKind);

    /// Drop embedded metadata. The colour profile always survives; with
    /// `keep_copyright` the EXIF block is reduced to its Artist/Copyright tags.
    fn strip(&mut self, keep_copyright: bool) -> Result<(), BackendError>;

    /// Convert pixels to 8-bit sRGB with alpha.
    fn rgb_colourspace(&mut self) -> Result<(), BackendError>;

    /// Bring pixels into the working colour space using the embedded profile.
    fn import_color_profile(&mut self) -> Result<(), BackendError>;

    /// Scale every frame by independent horizontal/vertical factors.
    fn resize(&mut self, wscale: f64, hscale: f64) -> Result<(), BackendError>;

    fn crop(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<(), BackendError>;

    /// Place every frame at (`left`, `top`) on a `width` x `height` canvas.
    /// Offsets may be negative; `None` background means transparent.
    fn embed(
        &mut self,
        width: u32,
        height: u32,
        left: i64,
        top: i64,
        background: Option<Rgb>,
    ) -> Result<(), BackendError>;

    /// Tile the whole canvas to fill `width` x `height`. The result is a
    /// single frame.
    fn replicate(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    /// Rotate clockwise by a multiple of 90 degrees.
    fn rotate(&mut self, angle: u16) -> Result<(), BackendError>;

    fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<(), BackendError>;

    fn flatten(&mut self, background: Rgb) -> Result<(), BackendError>;

    fn blur(&mut self, sigma: f32) -> Result<(), BackendError>;

    fn sharpen(&mut self, sigma: f32) -> Result<(), BackendError>;

    fn pixelate(&mut self, size: u32) -> Result<(), BackendError>;

    /// Materialize pixels into random-access memory.
    fn copy_memory(&mut self) -> Result<(), BackendError>;

    /// Alpha-composite `watermark` (same canvas size) at `opacity`.
    fn apply_watermark(&mut self, watermark: &Self, opacity: f64) -> Result<(), BackendError>
    where
        Self: Sized;

    fn save(&self, format: ImageType, quality: u8) -> Result<Vec<u8>, BackendError>;
}

/// Trait for image engines.
///
/// `shrink` is a power-of-two decode-time reduction (1 = full size) and
/// `pages` the maximum number of animation frames to decode.
pub trait ImageBackend: Sync {
    type Image: ImageHandle;

    fn load(&self, data: &ImageData, shrink: u32, pages: u32)
    -> Result<Self::Image, BackendError>;

    fn can_save(&self, format: ImageType) -> bool;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Mock engine that records operations instead of touching pixels.
    ///
    /// Images handed out by [`MockBackend::load`] are taken from the front of
    /// the queued specs and share the backend's operation log, so ops on the
    /// primary and the watermark image interleave in call order.
    #[derive(Default)]
    pub struct MockBackend {
        pub images: Mutex<VecDeque<MockSpec>>,
        pub operations: Arc<Mutex<Vec<RecordedOp>>>,
        pub fail_on: Option<&'static str>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MockSpec {
        pub width: u32,
        pub height: u32,
        pub frames: u32,
        pub alpha: bool,
        pub blobs: BTreeMap<MetadataKind, Vec<u8>>,
    }

    impl MockSpec {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                frames: 1,
                ..Self::default()
            }
        }

        pub fn animated(mut self, frames: u32) -> Self {
            self.frames = frames;
            self
        }

        pub fn with_blob(mut self, kind: MetadataKind, data: Vec<u8>) -> Self {
            self.blobs.insert(kind, data);
            self
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Load { kind: ImageType, shrink: u32 },
        Strip { keep_copyright: bool },
        SetBlob(MetadataKind),
        RemoveBlob(MetadataKind),
        RgbColourspace,
        ImportColorProfile,
        Resize { wscale: f64, hscale: f64 },
        Crop { left: u32, top: u32, width: u32, height: u32 },
        Embed { width: u32, height: u32, left: i64, top: i64 },
        Replicate { width: u32, height: u32 },
        Rotate(u16),
        Flip { horizontal: bool, vertical: bool },
        Flatten(Rgb),
        Blur(f32),
        Sharpen(f32),
        Pixelate(u32),
        CopyMemory,
        ApplyWatermark { width: u32, height: u32, opacity: f64 },
        Save { format: ImageType, quality: u8 },
        Drop { width: u32, height: u32 },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_images(specs: Vec<MockSpec>) -> Self {
            Self {
                images: Mutex::new(specs.into()),
                ..Self::default()
            }
        }

        /// Make the named operation fail with a processing error.
        pub fn failing_on(mut self, op: &'static str) -> Self {
            self.fail_on = Some(op);
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    pub struct MockImage {
        width: u32,
        height: u32,
        frames: u32,
        alpha: bool,
        blobs: BTreeMap<MetadataKind, Vec<u8>>,
        log: Arc<Mutex<Vec<RecordedOp>>>,
        fail_on: Option<&'static str>,
    }

    impl MockImage {
        fn record(&self, name: &'static str, op: RecordedOp) -> Result<(), BackendError> {
            self.log.lock().unwrap().push(op);
            if self.fail_on == Some(name) {
                return Err(BackendError::ProcessingFailed(format!("mock {name} failed")));
            }
            Ok(())
        }
    }

    impl Drop for MockImage {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(RecordedOp::Drop {
                width: self.width,
                height: self.height,
            });
        }
    }

    impl ImageHandle for MockImage {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn frames(&self) -> u32 {
            self.frames
        }

        fn has_alpha(&self) -> bool {
            self.alpha
        }

        fn blob(&self, kind: MetadataKind) -> Option<Vec<u8>> {
            self.blobs.get(&kind).cloned()
        }

        fn set_blob(&mut self, kind: MetadataKind, data: Vec<u8>) {
            self.log.lock().unwrap().push(RecordedOp::SetBlob(kind));
            self.blobs.insert(kind, data);
        }

        fn remove_blob(&mut self, kind: MetadataKind) {
            self.log.lock().unwrap().push(RecordedOp::RemoveBlob(kind));
            self.blobs.remove(&kind);
        }

        fn strip(&mut self, keep_copyright: bool) -> Result<(), BackendError> {
            self.record("strip", RecordedOp::Strip { keep_copyright })?;
            self.blobs.retain(|kind, _| *kind == MetadataKind::Icc);
            Ok(())
        }

        fn rgb_colourspace(&mut self) -> Result<(), BackendError> {
            self.record("rgb_colourspace", RecordedOp::RgbColourspace)?;
            self.alpha = true;
            Ok(())
        }

        fn import_color_profile(&mut self) -> Result<(), BackendError> {
            self.record("import_color_profile", RecordedOp::ImportColorProfile)
        }

        fn resize(&mut self, wscale: f64, hscale: f64) -> Result<(), BackendError> {
            self.record("resize", RecordedOp::Resize { wscale, hscale })?;
            let page = self.page_height();
            self.width = ((self.width as f64 * wscale).round() as u32).max(1);
            self.height = ((page as f64 * hscale).round() as u32).max(1) * self.frames;
            Ok(())
        }

        fn crop(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<(), BackendError> {
            self.record(
                "crop",
                RecordedOp::Crop {
                    left,
                    top,
                    width,
                    height,
                },
            )?;
            self.width = width;
            self.height = height * self.frames;
            Ok(())
        }

        fn embed(
            &mut self,
            width: u32,
            height: u32,
            left: i64,
            top: i64,
            background: Option<Rgb>,
        ) -> Result<(), BackendError> {
            self.record(
                "embed",
                RecordedOp::Embed {
                    width,
                    height,
                    left,
                    top,
                },
            )?;
            self.width = width;
            self.height = height * self.frames;
            if background.is_none() {
                self.alpha = true;
            }
            Ok(())
        }

        fn replicate(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
            self.record("replicate", RecordedOp::Replicate { width, height })?;
            self.width = width;
            self.height = height;
            self.frames = 1;
            Ok(())
        }

        fn rotate(&mut self, angle: u16) -> Result<(), BackendError> {
            self.record("rotate", RecordedOp::Rotate(angle))?;
            if angle % 180 == 90 {
                let page = self.page_height();
                self.height = self.width * self.frames;
                self.width = page;
            }
            Ok(())
        }

        fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<(), BackendError> {
            self.record(
                "flip",
                RecordedOp::Flip {
                    horizontal,
                    vertical,
                },
            )
        }

        fn flatten(&mut self, background: Rgb) -> Result<(), BackendError> {
            self.record("flatten", RecordedOp::Flatten(background))?;
            self.alpha = false;
            Ok(())
        }

        fn blur(&mut self, sigma: f32) -> Result<(), BackendError> {
            self.record("blur", RecordedOp::Blur(sigma))
        }

        fn sharpen(&mut self, sigma: f32) -> Result<(), BackendError> {
            self.record("sharpen", RecordedOp::Sharpen(sigma))
        }

        fn pixelate(&mut self, size: u32) -> Result<(), BackendError> {
            self.record("pixelate", RecordedOp::Pixelate(size))
        }

        fn copy_memory(&mut self) -> Result<(), BackendError> {
            self.record("copy_memory", RecordedOp::CopyMemory)
        }

        fn apply_watermark(&mut self, watermark: &Self, opacity: f64) -> Result<(), BackendError> {
            self.record(
                "apply_watermark",
                RecordedOp::ApplyWatermark {
                    width: watermark.width,
                    height: watermark.height,
                    opacity,
                },
            )
        }

        fn save(&self, format: ImageType, quality: u8) -> Result<Vec<u8>, BackendError> {
            self.record("save", RecordedOp::Save { format, quality })?;
            Ok(format!("mock:{}:{}x{}", format, self.width, self.height).into_bytes())
        }
    }

    impl ImageBackend for MockBackend {
        type Image = MockImage;

        fn load(
            &self,
            data: &ImageData,
            shrink: u32,
            pages: u32,
        ) -> Result<MockImage, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Load {
                kind: data.kind,
                shrink,
            });
            if self.fail_on == Some("load") {
                return Err(BackendError::ProcessingFailed("mock load failed".into()));
            }
            let spec = self
                .images
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock image".to_string()))?;
            let frames = spec.frames.clamp(1, pages.max(1));
            let page = spec.height / spec.frames.max(1);
            let shrink = shrink.max(1);
            Ok(MockImage {
                width: (spec.width / shrink).max(1),
                height: (page / shrink).max(1) * frames,
                frames,
                alpha: spec.alpha,
                blobs: spec.blobs,
                log: Arc::clone(&self.operations),
                fail_on: self.fail_on,
            })
        }

        fn can_save(&self, format: ImageType) -> bool {
            !matches!(format, ImageType::Unknown | ImageType::Svg | ImageType::Heic)
        }
    }

    fn png_data() -> ImageData {
        ImageData {
            data: vec![1, 2, 3],
            kind: ImageType::Png,
        }
    }

    #[test]
    fn mock_records_load_and_resize() {
        let backend = MockBackend::with_images(vec![MockSpec::new(800, 600)]);

        let mut img = backend.load(&png_data(), 1, 1).unwrap();
        img.resize(0.5, 0.5).unwrap();
        assert_eq!((img.width(), img.height()), (400, 300));

        let ops = backend.get_operations();
        assert_eq!(ops[0], RecordedOp::Load { kind: ImageType::Png, shrink: 1 });
        assert_eq!(ops[1], RecordedOp::Resize { wscale: 0.5, hscale: 0.5 });
    }

    #[test]
    fn mock_records_drop() {
        let backend = MockBackend::with_images(vec![MockSpec::new(10, 20)]);
        drop(backend.load(&png_data(), 1, 1).unwrap());

        let ops = backend.get_operations();
        assert_eq!(ops.last(), Some(&RecordedOp::Drop { width: 10, height: 20 }));
    }

    #[test]
    fn mock_animated_resize_keeps_frames() {
        let backend = MockBackend::with_images(vec![MockSpec::new(100, 300).animated(3)]);
        let mut img = backend.load(&png_data(), 1, 10).unwrap();
        assert_eq!(img.page_height(), 100);

        img.resize(0.5, 0.5).unwrap();
        assert_eq!((img.width(), img.height(), img.page_height()), (50, 150, 50));
    }

    #[test]
    fn mock_failing_op_reports_error() {
        let backend =
            MockBackend::with_images(vec![MockSpec::new(10, 10)]).failing_on("crop");
        let mut img = backend.load(&png_data(), 1, 1).unwrap();
        assert!(img.crop(0, 0, 5, 5).is_err());
    }

    #[test]
    fn mock_load_without_specs_errors() {
        let backend = MockBackend::new();
        assert!(backend.load(&png_data(), 1, 1).is_err());
    }
}
