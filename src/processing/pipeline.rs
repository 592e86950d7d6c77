//! Pipeline executor.
//!
//! A pipeline is a fixed, ordered list of named stage functions sharing one
//! signature. [`run`] walks the list, checks the request's cancellation token
//! before each stage, and stops at the first failure, wrapping it in
//! [`ProxyError::Stage`] so the boundary can tell which stage broke.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::imaging::{ImageBackend, ImageData, ImageHandle, ImageType};
use crate::options::{GravitySpec, ProcessingOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One pipeline step over (context, image, options, source bytes).
pub type Stage<B> = fn(
    &mut PipelineContext<'_, B>,
    &mut <B as ImageBackend>::Image,
    &ProcessingOptions,
    &ImageData,
) -> Result<(), ProxyError>;

pub type NamedStage<B> = (&'static str, Stage<B>);

/// Encoded result of the main pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub data: Vec<u8>,
    pub format: ImageType,
    pub width: u32,
    pub height: u32,
}

/// Per-run state shared between stages.
///
/// The collaborators are borrowed for the run; the remaining fields are
/// derived by `prepare` and consumed by later stages.
pub struct PipelineContext<'a, B: ImageBackend> {
    pub backend: &'a B,
    pub config: &'a ProxyConfig,
    pub cancel: &'a CancellationToken,
    /// Watermark source for this request, if any.
    pub watermark: Option<&'a ImageData>,

    /// Output format after negotiation.
    pub format: ImageType,
    /// Rotation and horizontal flip implied by EXIF orientation.
    pub angle: u16,
    pub flip: bool,
    pub wscale: f64,
    pub hscale: f64,
    pub crop_width: u32,
    pub crop_height: u32,
    pub crop_gravity: GravitySpec,
    /// Requested result box in device pixels; 0 leaves a side unconstrained.
    pub result_width: u32,
    pub result_height: u32,

    pub output: Option<ProcessOutput>,
}

impl<'a, B: ImageBackend> PipelineContext<'a, B> {
    pub fn new(
        backend: &'a B,
        config: &'a ProxyConfig,
        cancel: &'a CancellationToken,
        watermark: Option<&'a ImageData>,
    ) -> Self {
        Self {
            backend,
            config,
            cancel,
            watermark,
            format: ImageType::Unknown,
            angle: 0,
            flip: false,
            wscale: 1.0,
            hscale: 1.0,
            crop_width: 0,
            crop_height: 0,
            crop_gravity: GravitySpec::default(),
            result_width: 0,
            result_height: 0,
            output: None,
        }
    }

    /// A fresh context for a nested run sharing this one's collaborators.
    pub fn nested(&self) -> PipelineContext<'a, B> {
        PipelineContext::new(self.backend, self.config, self.cancel, None)
    }
}

/// Run `stages` in order, stopping at the first error.
pub fn run<B: ImageBackend>(
    stages: &[NamedStage<B>],
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    data: &ImageData,
) -> Result<(), ProxyError> {
    for &(name, stage) in stages {
        if ctx.cancel.is_cancelled() {
            debug!(stage = name, "request cancelled before stage");
            return Err(ProxyError::Cancelled);
        }

        if let Err(e) = stage(ctx, img, po, data) {
            warn!(stage = name, error = %e, "pipeline stage failed");
            return Err(ProxyError::Stage {
                stage: name,
                source: Box::new(e),
            });
        }

        debug!(
            stage = name,
            width = img.width(),
            height = img.height(),
            frames = img.frames(),
            "stage done"
        );
    }
    Ok(())
}
