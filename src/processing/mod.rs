//! Image processing pipeline.
//!
//! [`process_image`] decodes the source, runs the main pipeline over it,
//! and returns the encoded result:
//!
//! ```text
//! prepare → scale_on_load → import_color_profile → crop → scale
//!   → rotate_and_flip → crop_to_result → apply_filters → extend → padding
//!   → flatten → watermark → export_color_profile → strip_metadata → encode
//! ```
//!
//! | Module | Role |
//! |---|---|
//! | [`pipeline`] | Stage signature, per-run context, the executor |
//! | [`stages`] | Geometry, filters, format negotiation, encoding |
//! | [`watermark`] | Watermark preparation pipeline and compositing |
//! | [`strip_metadata`] | Metadata removal with copyright allowlist |

pub mod pipeline;
pub mod stages;
pub mod strip_metadata;
pub mod watermark;

pub use pipeline::{NamedStage, PipelineContext, ProcessOutput, Stage};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::imaging::{BackendError, ImageBackend, ImageData};
use crate::options::ProcessingOptions;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The main pipeline, in execution order.
pub fn main_pipeline<B: ImageBackend>() -> [NamedStage<B>; 15] {
    [
        ("prepare", stages::prepare::<B>),
        ("scale_on_load", stages::scale_on_load::<B>),
        ("import_color_profile", stages::import_color_profile::<B>),
        ("crop", stages::crop::<B>),
        ("scale", stages::scale::<B>),
        ("rotate_and_flip", stages::rotate_and_flip::<B>),
        ("crop_to_result", stages::crop_to_result::<B>),
        ("apply_filters", stages::apply_filters::<B>),
        ("extend", stages::extend::<B>),
        ("padding", stages::padding::<B>),
        ("flatten", stages::flatten::<B>),
        ("watermark", watermark::watermark::<B>),
        ("export_color_profile", stages::export_color_profile::<B>),
        ("strip_metadata", strip_metadata::strip_metadata::<B>),
        ("encode", stages::encode::<B>),
    ]
}

/// Decode `source`, transform it per `po`, and encode the result.
///
/// The decoded image and any watermark layer are dropped before this
/// returns, whatever the outcome.
pub fn process_image<B: ImageBackend>(
    backend: &B,
    config: &ProxyConfig,
    po: &ProcessingOptions,
    source: &ImageData,
    watermark: Option<&ImageData>,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProxyError> {
    if cancel.is_cancelled() {
        return Err(ProxyError::Cancelled);
    }

    let mut img = backend
        .load(source, 1, config.max_animation_frames)
        .map_err(|e| ProxyError::Stage {
            stage: "load",
            source: Box::new(e.into()),
        })?;

    let mut ctx = PipelineContext::new(backend, config, cancel, watermark);
    pipeline::run(&main_pipeline::<B>(), &mut ctx, &mut img, po, source)?;

    let output = ctx.output.take().ok_or_else(|| {
        ProxyError::from(BackendError::ProcessingFailed(
            "pipeline finished without output".into(),
        ))
    })?;
    debug!(
        format = %output.format,
        width = output.width,
        height = output.height,
        bytes = output.data.len(),
        "image processed"
    );
    Ok(output)
}
