//! Main pipeline stages.
//!
//! Every stage has the [`Stage`](super::pipeline::Stage) signature and is a
//! no-op when its condition is already satisfied, so the geometric stages
//! can be reused on a watermark source.

use super::pipeline::{PipelineContext, ProcessOutput};
use crate::error::ProxyError;
use crate::imaging::calculations::{
    ScaleRequest, calc_position, calc_scale, calc_shrink_on_load, crop_size, scale_dim,
};
use crate::imaging::{ImageBackend, ImageData, ImageHandle, ImageType, MetadataKind, exif};
use crate::options::{ProcessingOptions, ResizeType};
use tracing::debug;

/// Rotation (clockwise) and horizontal flip for an EXIF orientation value.
fn orientation_transform(orientation: u16) -> (u16, bool) {
    match orientation {
        2 => (0, true),
        3 => (180, false),
        4 => (180, true),
        5 => (90, true),
        6 => (90, false),
        7 => (270, true),
        8 => (270, false),
        _ => (0, false),
    }
}

/// Explicit format, then negotiated AVIF/WebP, then the source type when
/// the engine can write it, then JPEG.
pub fn resolve_format<B: ImageBackend>(
    backend: &B,
    po: &ProcessingOptions,
    source: ImageType,
) -> ImageType {
    if po.format != ImageType::Unknown {
        return po.format;
    }
    if (po.enforce_avif || po.prefer_avif) && backend.can_save(ImageType::Avif) {
        ImageType::Avif
    } else if (po.enforce_webp || po.prefer_webp) && backend.can_save(ImageType::Webp) {
        ImageType::Webp
    } else if backend.can_save(source) {
        source
    } else {
        ImageType::Jpeg
    }
}

/// Derive orientation, crop box, scale factors and output format.
pub fn prepare<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    data: &ImageData,
) -> Result<(), ProxyError> {
    ctx.format = resolve_format(ctx.backend, po, data.kind);

    (ctx.angle, ctx.flip) = if po.auto_rotate {
        img.blob(MetadataKind::Exif)
            .and_then(|blob| exif::orientation(&blob))
            .map(orientation_transform)
            .unwrap_or((0, false))
    } else {
        (0, false)
    };

    let (width, height) = (img.width(), img.page_height());
    ctx.crop_width = crop_size(width, po.crop.width);
    ctx.crop_height = crop_size(height, po.crop.height);
    ctx.crop_gravity = po.crop.gravity.unwrap_or(po.gravity);

    // Scale is computed in display orientation but applied before rotating.
    let swapped = (ctx.angle + po.rotate) % 180 == 90;
    let oriented = if swapped {
        (ctx.crop_height, ctx.crop_width)
    } else {
        (ctx.crop_width, ctx.crop_height)
    };
    let (wscale, hscale) = calc_scale(
        oriented,
        &ScaleRequest {
            width: po.width,
            height: po.height,
            min_width: po.min_width,
            min_height: po.min_height,
            resizing_type: po.resizing_type,
            enlarge: po.enlarge,
            zoom_width: po.zoom_width,
            zoom_height: po.zoom_height,
            dpr: po.dpr,
        },
    );
    (ctx.wscale, ctx.hscale) = if swapped {
        (hscale, wscale)
    } else {
        (wscale, hscale)
    };

    let box_dim = |value: u32, zoom: f64| {
        if value == 0 {
            0
        } else {
            scale_dim(value, po.dpr * zoom)
        }
    };
    ctx.result_width = box_dim(po.width, po.zoom_width);
    ctx.result_height = box_dim(po.height, po.zoom_height);

    debug!(
        format = %ctx.format,
        angle = ctx.angle,
        wscale = ctx.wscale,
        hscale = ctx.hscale,
        "prepared"
    );
    Ok(())
}

/// Re-decode at a power-of-two reduction when the image will be shrunk by
/// at least half, then correct the remaining scale.
pub fn scale_on_load<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    _po: &ProcessingOptions,
    data: &ImageData,
) -> Result<(), ProxyError> {
    if !data.kind.supports_shrink_on_load() || img.frames() > 1 {
        return Ok(());
    }
    let shrink = calc_shrink_on_load(ctx.wscale.max(ctx.hscale));
    if shrink <= 1 {
        return Ok(());
    }

    let (prev_w, prev_h) = (img.width(), img.page_height());
    *img = ctx
        .backend
        .load(data, shrink, ctx.config.max_animation_frames)?;
    let (new_w, new_h) = (img.width(), img.page_height());

    let (rw, rh) = (new_w as f64 / prev_w as f64, new_h as f64 / prev_h as f64);
    ctx.wscale /= rw;
    ctx.hscale /= rh;
    ctx.crop_width = scale_dim(ctx.crop_width, rw).min(new_w);
    ctx.crop_height = scale_dim(ctx.crop_height, rh).min(new_h);

    debug!(shrink, width = new_w, height = new_h, "reloaded with shrink");
    Ok(())
}

pub fn import_color_profile<B: ImageBackend>(
    _ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    _po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if img.blob(MetadataKind::Icc).is_some() {
        img.import_color_profile()?;
    }
    Ok(())
}

/// Pre-resize crop from `crop=width:height[:gravity]`.
pub fn crop<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    _po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    let (width, height) = (img.width(), img.page_height());
    let (cw, ch) = (ctx.crop_width.min(width), ctx.crop_height.min(height));
    if (cw, ch) == (width, height) || cw == 0 || ch == 0 {
        return Ok(());
    }
    let (left, top) = calc_position(width, height, cw, ch, &ctx.crop_gravity, 1.0, false);
    img.crop(left as u32, top as u32, cw, ch)?;
    Ok(())
}

pub fn scale<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    _po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    let unchanged = |s: f64| (s - 1.0).abs() < 1e-9;
    if unchanged(ctx.wscale) && unchanged(ctx.hscale) {
        return Ok(());
    }
    img.resize(ctx.wscale, ctx.hscale)?;
    Ok(())
}

/// EXIF orientation first, then the requested rotation and flip.
pub fn rotate_and_flip<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if ctx.angle != 0 {
        img.rotate(ctx.angle)?;
    }
    if ctx.flip {
        img.flip(true, false)?;
    }
    if (ctx.angle != 0 || ctx.flip) && !po.strip_metadata {
        // Pixels are upright now; a kept orientation tag would turn them
        // again. Stripping drops the tag anyway.
        img.remove_blob(MetadataKind::Exif);
    }
    if po.rotate != 0 {
        img.rotate(po.rotate)?;
    }
    if po.flip.horizontal || po.flip.vertical {
        img.flip(po.flip.horizontal, po.flip.vertical)?;
    }
    Ok(())
}

/// Cut the requested box out of an image that overflows it.
pub fn crop_to_result<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if po.resizing_type == ResizeType::Force {
        return Ok(());
    }
    let (width, height) = (img.width(), img.page_height());
    let target = |requested: u32, current: u32| {
        if requested == 0 {
            current
        } else {
            requested.min(current)
        }
    };
    let (tw, th) = (
        target(ctx.result_width, width),
        target(ctx.result_height, height),
    );
    if (tw, th) == (width, height) {
        return Ok(());
    }
    let (left, top) = calc_position(width, height, tw, th, &po.gravity, po.dpr, false);
    img.crop(left as u32, top as u32, tw, th)?;
    Ok(())
}

pub fn apply_filters<B: ImageBackend>(
    _ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if po.blur > 0.0 {
        img.blur(po.blur * po.dpr as f32)?;
    }
    if po.sharpen > 0.0 {
        img.sharpen(po.sharpen * po.dpr as f32)?;
    }
    if po.pixelate > 1 {
        img.pixelate(scale_dim(po.pixelate, po.dpr))?;
    }
    Ok(())
}

/// Grow the canvas to the requested box, placing the image by the extend
/// gravity.
pub fn extend<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if !po.extend.enabled {
        return Ok(());
    }
    let (width, height) = (img.width(), img.page_height());
    let (tw, th) = (ctx.result_width.max(width), ctx.result_height.max(height));
    if (tw, th) == (width, height) {
        return Ok(());
    }
    let (left, top) = calc_position(tw, th, width, height, &po.extend.gravity, po.dpr, false);
    img.embed(tw, th, left, top, None)?;
    Ok(())
}

/// Transparent insets around the image, scaled by DPR.
pub fn padding<B: ImageBackend>(
    _ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    let p = &po.padding;
    if !p.enabled {
        return Ok(());
    }
    let inset = |v: u32| (v as f64 * po.dpr).round() as u32;
    let (top, right, bottom, left) = (inset(p.top), inset(p.right), inset(p.bottom), inset(p.left));
    if top == 0 && right == 0 && bottom == 0 && left == 0 {
        return Ok(());
    }
    let grow = |size: u32, a: u32, b: u32| size.checked_add(a).and_then(|v| v.checked_add(b));
    let (Some(width), Some(height)) = (
        grow(img.width(), left, right),
        grow(img.page_height(), top, bottom),
    ) else {
        return Err(ProxyError::invalid(
            "padding",
            format!("{top}:{right}:{bottom}:{left} overflows the canvas size"),
        ));
    };
    img.embed(width, height, left as i64, top as i64, None)?;
    Ok(())
}

/// Fill transparency with the background when asked to, or when the output
/// format can't carry alpha.
pub fn flatten<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if !img.has_alpha() || (!po.flatten && ctx.format.supports_alpha()) {
        return Ok(());
    }
    img.flatten(po.background)?;
    Ok(())
}

pub fn export_color_profile<B: ImageBackend>(
    _ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if po.strip_color_profile && img.blob(MetadataKind::Icc).is_some() {
        img.remove_blob(MetadataKind::Icc);
    }
    Ok(())
}

/// Encode to the negotiated format. With `max_bytes`, lossy formats are
/// re-encoded at lower quality until they fit or quality bottoms out.
pub fn encode<B: ImageBackend>(
    ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    let format = ctx.format;
    let mut quality = if po.quality == 0 {
        ctx.config.processing.quality.min(100) as u8
    } else {
        po.quality
    };

    let mut data = img.save(format, quality)?;
    if po.max_bytes > 0 && format.is_lossy() {
        while data.len() > po.max_bytes && quality > 10 {
            let overshoot = data.len() as f64 / po.max_bytes as f64;
            let factor = if overshoot > 3.0 {
                0.25
            } else if overshoot > 1.5 {
                0.5
            } else {
                0.75
            };
            quality = (quality as f64 * factor) as u8;
            debug!(bytes = data.len(), max_bytes = po.max_bytes, quality, "re-encoding to fit");
            data = img.save(format, quality)?;
        }
    }

    ctx.output = Some(ProcessOutput {
        data,
        format,
        width: img.width(),
        height: img.page_height(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::imaging::backend::tests::{MockBackend, MockSpec, RecordedOp};
    use crate::options::{Anchor, GravitySpec};
    use tokio_util::sync::CancellationToken;

    fn jpeg() -> ImageData {
        ImageData {
            data: vec![0xFF, 0xD8, 0xFF],
            kind: ImageType::Jpeg,
        }
    }

    fn png() -> ImageData {
        ImageData {
            data: vec![0x89, b'P', b'N', b'G'],
            kind: ImageType::Png,
        }
    }

    #[test]
    fn orientation_table() {
        assert_eq!(orientation_transform(1), (0, false));
        assert_eq!(orientation_transform(6), (90, false));
        assert_eq!(orientation_transform(5), (90, true));
        assert_eq!(orientation_transform(8), (270, false));
    }

    #[test]
    fn format_resolution_order() {
        let backend = MockBackend::new();
        let mut po = ProcessingOptions::default();
        assert_eq!(resolve_format(&backend, &po, ImageType::Png), ImageType::Png);
        assert_eq!(resolve_format(&backend, &po, ImageType::Svg), ImageType::Jpeg);

        po.prefer_webp = true;
        assert_eq!(resolve_format(&backend, &po, ImageType::Png), ImageType::Webp);
        po.prefer_avif = true;
        assert_eq!(resolve_format(&backend, &po, ImageType::Png), ImageType::Avif);

        po.format = ImageType::Gif;
        assert_eq!(resolve_format(&backend, &po, ImageType::Png), ImageType::Gif);
    }

    #[test]
    fn prepare_then_scale_fits_box() {
        let backend = MockBackend::with_images(vec![MockSpec::new(800, 400)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        let po = ProcessingOptions {
            width: 200,
            height: 200,
            ..ProcessingOptions::default()
        };
        prepare(&mut ctx, &mut img, &po, &png()).unwrap();
        scale(&mut ctx, &mut img, &po, &png()).unwrap();

        assert_eq!((img.width(), img.height()), (200, 100));
    }

    #[test]
    fn scale_on_load_reloads_and_corrects() {
        let backend =
            MockBackend::with_images(vec![MockSpec::new(800, 800), MockSpec::new(800, 800)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&jpeg(), 1, 1).unwrap();

        let po = ProcessingOptions {
            width: 100,
            ..ProcessingOptions::default()
        };
        prepare(&mut ctx, &mut img, &po, &jpeg()).unwrap();
        scale_on_load(&mut ctx, &mut img, &po, &jpeg()).unwrap();
        assert!(
            backend
                .get_operations()
                .contains(&RecordedOp::Load {
                    kind: ImageType::Jpeg,
                    shrink: 8
                })
        );
        assert_eq!(ctx.wscale, 1.0);

        scale(&mut ctx, &mut img, &po, &jpeg()).unwrap();
        assert_eq!(img.width(), 100);
    }

    #[test]
    fn fill_crops_to_box_at_gravity() {
        let backend = MockBackend::with_images(vec![MockSpec::new(800, 400)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        let po = ProcessingOptions {
            width: 200,
            height: 200,
            resizing_type: ResizeType::Fill,
            gravity: GravitySpec::anchored(Anchor::East),
            ..ProcessingOptions::default()
        };
        prepare(&mut ctx, &mut img, &po, &png()).unwrap();
        scale(&mut ctx, &mut img, &po, &png()).unwrap();
        crop_to_result(&mut ctx, &mut img, &po, &png()).unwrap();

        assert!(backend.get_operations().contains(&RecordedOp::Crop {
            left: 200,
            top: 0,
            width: 200,
            height: 200
        }));
        assert_eq!((img.width(), img.height()), (200, 200));
    }

    #[test]
    fn padding_scales_with_dpr() {
        let backend = MockBackend::with_images(vec![MockSpec::new(100, 100)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        let mut po = ProcessingOptions {
            dpr: 2.0,
            ..ProcessingOptions::default()
        };
        po.padding.enabled = true;
        po.padding.top = 5;
        po.padding.left = 10;
        padding(&mut ctx, &mut img, &po, &png()).unwrap();

        assert!(backend.get_operations().contains(&RecordedOp::Embed {
            width: 120,
            height: 110,
            left: 20,
            top: 10
        }));
    }

    #[test]
    fn padding_rejects_canvas_overflow() {
        let backend = MockBackend::with_images(vec![MockSpec::new(100, 100)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        let mut po = ProcessingOptions::default();
        po.padding.enabled = true;
        po.padding.top = u32::MAX;
        po.padding.right = u32::MAX;
        po.padding.bottom = u32::MAX;
        po.padding.left = u32::MAX;
        let err = padding(&mut ctx, &mut img, &po, &png()).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidOption);
        assert!(
            !backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Embed { .. }))
        );
    }

    #[test]
    fn extend_embeds_into_larger_box() {
        let backend = MockBackend::with_images(vec![MockSpec::new(100, 50)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        let mut po = ProcessingOptions {
            width: 200,
            height: 200,
            ..ProcessingOptions::default()
        };
        po.extend.enabled = true;
        prepare(&mut ctx, &mut img, &po, &png()).unwrap();
        extend(&mut ctx, &mut img, &po, &png()).unwrap();

        assert!(backend.get_operations().contains(&RecordedOp::Embed {
            width: 200,
            height: 200,
            left: 50,
            top: 75
        }));
    }

    #[test]
    fn flatten_only_when_needed() {
        let backend = MockBackend::with_images(vec![MockSpec {
            alpha: true,
            ..MockSpec::new(10, 10)
        }]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();
        let po = ProcessingOptions::default();

        ctx.format = ImageType::Png;
        flatten(&mut ctx, &mut img, &po, &png()).unwrap();
        assert!(img.has_alpha());

        ctx.format = ImageType::Jpeg;
        flatten(&mut ctx, &mut img, &po, &png()).unwrap();
        assert!(!img.has_alpha());
    }

    #[test]
    fn encode_reduces_quality_for_max_bytes() {
        let backend = MockBackend::with_images(vec![MockSpec::new(10, 10)]);
        let config = ProxyConfig::default();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(&backend, &config, &cancel, None);
        let mut img = backend.load(&png(), 1, 1).unwrap();

        ctx.format = ImageType::Jpeg;
        let po = ProcessingOptions {
            quality: 80,
            max_bytes: 4,
            ..ProcessingOptions::default()
        };
        encode(&mut ctx, &mut img, &po, &png()).unwrap();

        let qualities: Vec<u8> = backend
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Save { quality, .. } => Some(quality),
                _ => None,
            })
            .collect();
        // "mock:jpeg:10x10" is 15 bytes, more than 3x over: quarter the quality.
        assert_eq!(qualities, vec![80, 20, 5]);
        assert_eq!(ctx.output.unwrap().format, ImageType::Jpeg);
    }
}
