//! Pure geometry for the pipeline: placement, scale factors, crop sizes.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::options::{GravitySpec, ResizeType};

/// Where an `inner` box lands inside an outer `width` x `height` canvas.
///
/// Anchored offsets are pixels pointing inward from the anchor, multiplied
/// by `dpr`. A focus point centres the box on that fraction of the canvas.
/// Smart gravity places like center.
///
/// With `allow_overflow` the box may hang off any edge as long as one pixel
/// still overlaps the canvas; otherwise it is kept fully inside (or pinned
/// to the top-left when it can't fit).
pub fn calc_position(
    width: u32,
    height: u32,
    inner_width: u32,
    inner_height: u32,
    gravity: &GravitySpec,
    dpr: f64,
    allow_overflow: bool,
) -> (i64, i64) {
    let (w, h) = (width as i64, height as i64);
    let (iw, ih) = (inner_width as i64, inner_height as i64);

    let (left, top) = match *gravity {
        GravitySpec::FocusPoint { x, y } => {
            let px = (w as f64 * x).round_ties_even() as i64;
            let py = (h as f64 * y).round_ties_even() as i64;
            (px - iw / 2, py - ih / 2)
        }
        GravitySpec::Anchored { anchor, x, y } => {
            let off_x = (x * dpr).round_ties_even() as i64;
            let off_y = (y * dpr).round_ties_even() as i64;
            let mut left = (w - iw + 1) / 2 + off_x;
            let mut top = (h - ih + 1) / 2 + off_y;
            if anchor.is_north() {
                top = off_y;
            }
            if anchor.is_east() {
                left = w - iw - off_x;
            }
            if anchor.is_south() {
                top = h - ih - off_y;
            }
            if anchor.is_west() {
                left = off_x;
            }
            (left, top)
        }
        GravitySpec::Smart => ((w - iw + 1) / 2, (h - ih + 1) / 2),
    };

    let (min_x, max_x, min_y, max_y) = if allow_overflow {
        (-iw + 1, w - 1, -ih + 1, h - 1)
    } else {
        (0, w - iw, 0, h - ih)
    };

    (left.min(max_x).max(min_x), top.min(max_y).max(min_y))
}

/// Parameters that decide the resize factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRequest {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub resizing_type: ResizeType,
    pub enlarge: bool,
    pub zoom_width: f64,
    pub zoom_height: f64,
    pub dpr: f64,
}

/// Horizontal and vertical scale factors taking `source` to the requested
/// box. Only `Force` yields different factors for the two axes.
pub fn calc_scale(source: (u32, u32), req: &ScaleRequest) -> (f64, f64) {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    if src_w == 0.0 || src_h == 0.0 {
        return (1.0, 1.0);
    }

    let dst_w = if req.width == 0 { src_w } else { req.width as f64 };
    let dst_h = if req.height == 0 { src_h } else { req.height as f64 };

    let mut wshrink = if dst_w == src_w { 1.0 } else { src_w / dst_w };
    let mut hshrink = if dst_h == src_h { 1.0 } else { src_h / dst_h };

    if wshrink != 1.0 || hshrink != 1.0 {
        let rt = match req.resizing_type {
            ResizeType::Auto => {
                let same_orientation = (src_w >= src_h) == (dst_w >= dst_h);
                if same_orientation {
                    ResizeType::Fill
                } else {
                    ResizeType::Fit
                }
            }
            rt => rt,
        };

        match rt {
            ResizeType::Crop => (wshrink, hshrink) = (1.0, 1.0),
            ResizeType::Force => {}
            _ if req.width == 0 => wshrink = hshrink,
            _ if req.height == 0 => hshrink = wshrink,
            ResizeType::Fit => {
                wshrink = wshrink.max(hshrink);
                hshrink = wshrink;
            }
            _ => {
                wshrink = wshrink.min(hshrink);
                hshrink = wshrink;
            }
        }
    }

    if req.min_width > 0 {
        let min_shrink = src_w / req.min_width as f64;
        if min_shrink < wshrink {
            hshrink /= wshrink / min_shrink;
            wshrink = min_shrink;
        }
    }
    if req.min_height > 0 {
        let min_shrink = src_h / req.min_height as f64;
        if min_shrink < hshrink {
            wshrink /= hshrink / min_shrink;
            hshrink = min_shrink;
        }
    }

    wshrink /= req.zoom_width * req.dpr;
    hshrink /= req.zoom_height * req.dpr;

    if !req.enlarge {
        let min_shrink = wshrink.min(hshrink);
        if min_shrink < 1.0 {
            wshrink /= min_shrink;
            hshrink /= min_shrink;
        }
    }

    // Never shrink below one pixel.
    wshrink = wshrink.min(src_w);
    hshrink = hshrink.min(src_h);

    (1.0 / wshrink, 1.0 / hshrink)
}

/// `value * scale`, rounded, at least 1.
pub fn scale_dim(value: u32, scale: f64) -> u32 {
    ((value as f64 * scale).round() as u32).max(1)
}

/// Power-of-two decode reduction that keeps the image at or above the
/// final `scale`. Returns 1 when no pre-shrink applies.
pub fn calc_shrink_on_load(scale: f64) -> u32 {
    if scale <= 0.0 || scale > 0.5 {
        return 1;
    }
    let mut shrink = 1;
    while shrink < 8 && (shrink * 2) as f64 * scale <= 1.0 {
        shrink *= 2;
    }
    shrink
}

/// Resolve a requested crop dimension against the source size. 0 means the
/// whole dimension, values below 1 are fractions, larger values are pixels.
pub fn crop_size(source: u32, requested: f64) -> u32 {
    if requested <= 0.0 {
        source
    } else if requested < 1.0 {
        ((source as f64 * requested).round() as u32).clamp(1, source.max(1))
    } else {
        (requested.round() as u32).min(source)
    }
}
