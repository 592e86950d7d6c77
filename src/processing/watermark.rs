//! Watermark compositor.
//!
//! The watermark source runs through its own short pipeline (the same
//! geometric stages the main image uses), is turned into a layer exactly
//! the size of the primary canvas, and is alpha-composited over it.
//!
//! ```text
//! watermark bytes ─► prepare ─► scale_on_load ─► import_color_profile
//!                    ─► scale ─► rotate_and_flip ─► padding
//!                    ─► replicate | embed at gravity ─► replicate per frame
//!                    ─► apply_watermark(opacity × configured opacity)
//! ```

use super::pipeline::{NamedStage, PipelineContext, run};
use super::stages;
use crate::error::ProxyError;
use crate::imaging::calculations::calc_position;
use crate::imaging::{ImageBackend, ImageData, ImageHandle};
use crate::options::{ProcessingOptions, ResizeType, WatermarkOptions};
use tracing::debug;

/// Stages applied to the watermark source.
pub fn watermark_pipeline<B: ImageBackend>() -> [NamedStage<B>; 6] {
    [
        ("prepare", stages::prepare::<B>),
        ("scale_on_load", stages::scale_on_load::<B>),
        ("import_color_profile", stages::import_color_profile::<B>),
        ("scale", stages::scale::<B>),
        ("rotate_and_flip", stages::rotate_and_flip::<B>),
        ("padding", stages::padding::<B>),
    ]
}

/// Options the watermark source is processed with.
fn watermark_processing_options(
    base: &ProcessingOptions,
    wm_data: &ImageData,
    opts: &WatermarkOptions,
    img_width: u32,
    img_height: u32,
    offset_scale: f64,
) -> ProcessingOptions {
    let mut po = base.clone();
    po.resizing_type = ResizeType::Fit;
    po.dpr = 1.0;
    po.enlarge = true;
    po.format = wm_data.kind;

    if opts.scale > 0.0 {
        let scaled = |v: u32| ((v as f64 * opts.scale).round() as u32).max(1);
        po.width = scaled(img_width);
        po.height = scaled(img_height);
    }

    if opts.replicate {
        let (x, y) = opts.gravity.offsets();
        let gap = |v: f64| (v * offset_scale).round().max(0.0) as u32;
        let (x, y) = (gap(x), gap(y));
        po.padding.enabled = true;
        po.padding.left = x / 2;
        po.padding.right = x - po.padding.left;
        po.padding.top = y / 2;
        po.padding.bottom = y - po.padding.top;
    }

    po
}

/// Load and shape the watermark into a layer covering the whole
/// `img_width` x (`img_height` x `frames`) canvas.
///
/// `img_height` is a single frame. Offsets in `opts.gravity` are scaled by
/// `offset_scale`, both as placement offsets and as replicate spacing.
pub fn prepare_watermark<B: ImageBackend>(
    ctx: &PipelineContext<'_, B>,
    wm_data: &ImageData,
    opts: &WatermarkOptions,
    img_width: u32,
    img_height: u32,
    frames: u32,
    offset_scale: f64,
) -> Result<B::Image, ProxyError> {
    let mut wm = ctx.backend.load(wm_data, 1, 1)?;

    let base = ProcessingOptions::from_config(ctx.config);
    let po = watermark_processing_options(
        &base,
        wm_data,
        opts,
        img_width,
        img_height,
        offset_scale,
    );
    let mut wm_ctx = ctx.nested();
    run(&watermark_pipeline::<B>(), &mut wm_ctx, &mut wm, &po, wm_data)?;

    if opts.replicate || frames > 1 {
        wm.copy_memory()?;
    }

    if opts.replicate {
        wm.replicate(img_width, img_height)?;
    } else {
        let (left, top) = calc_position(
            img_width,
            img_height,
            wm.width(),
            wm.page_height(),
            &opts.gravity,
            offset_scale,
            true,
        );
        debug!(left, top, "watermark position");
        wm.embed(img_width, img_height, left, top, None)?;
    }

    if frames > 1 {
        wm.replicate(img_width, img_height * frames)?;
    }

    Ok(wm)
}

/// Composite the watermark onto every frame of `img`.
pub fn apply_watermark<B: ImageBackend>(
    ctx: &PipelineContext<'_, B>,
    img: &mut B::Image,
    wm_data: &ImageData,
    opts: &WatermarkOptions,
    offset_scale: f64,
) -> Result<(), ProxyError> {
    img.rgb_colourspace()?;

    let frames = img.frames();
    let wm = prepare_watermark(
        ctx,
        wm_data,
        opts,
        img.width(),
        img.page_height(),
        frames,
        offset_scale,
    )?;

    let opacity = (opts.opacity * ctx.config.watermark.opacity).clamp(0.0, 1.0);
    img.apply_watermark(&wm, opacity)?;
    Ok(())
}

/// Pipeline stage; a no-op without an enabled watermark and a source.
pub fn watermark<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if !po.watermark.enabled {
        return Ok(());
    }
    let Some(wm_data) = ctx.watermark.filter(|d| !d.is_empty()) else {
        debug!("watermark requested but none configured");
        return Ok(());
    };
    apply_watermark(ctx, img, wm_data, &po.watermark, po.dpr)
}
