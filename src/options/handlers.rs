//! Option handler table.
//!
//! Each option is a descriptor: its accepted names (full name first, then
//! short aliases), the argument count it accepts, and a plain function that
//! parses the arguments into [`ProcessingOptions`]. The interpreter checks
//! arity before calling `apply`, and applies on a staged copy so a failing
//! option never leaves half its fields written.
//!
//! `preset` is not in this table; it needs the preset table and is expanded
//! by the interpreter.

use super::processing_options::ProcessingOptions;
use super::types::{GravitySpec, PaddingOptions, WatermarkOptions};
use super::values::{
    GravityToken, ValueError, ValueResult, gravity_token, parse_bool, parse_float, parse_format,
    parse_gravity, parse_hex_color, parse_int, parse_non_negative, parse_positive,
    parse_resize_type,
};
use crate::imaging::Rgb;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

pub type ApplyFn = fn(&mut ProcessingOptions, &[String]) -> ValueResult<()>;

pub struct OptionHandler {
    pub names: &'static [&'static str],
    pub min_args: usize,
    pub max_args: usize,
    pub apply: ApplyFn,
}

impl OptionHandler {
    pub fn name(&self) -> &'static str {
        self.names[0]
    }
}

const fn handler(
    names: &'static [&'static str],
    min_args: usize,
    max_args: usize,
    apply: ApplyFn,
) -> OptionHandler {
    OptionHandler {
        names,
        min_args,
        max_args,
        apply,
    }
}

pub static HANDLERS: &[OptionHandler] = &[
    handler(&["resize", "rs"], 1, 8, apply_resize),
    handler(&["size", "s"], 1, 7, apply_size),
    handler(&["resizing_type", "rt"], 1, 1, apply_resizing_type),
    handler(&["width", "w"], 1, 1, apply_width),
    handler(&["height", "h"], 1, 1, apply_height),
    handler(&["min_width", "mw"], 1, 1, apply_min_width),
    handler(&["min_height", "mh"], 1, 1, apply_min_height),
    handler(&["zoom", "z"], 1, 2, apply_zoom),
    handler(&["dpr"], 1, 1, apply_dpr),
    handler(&["enlarge", "el"], 1, 1, apply_enlarge),
    handler(&["extend", "ex"], 1, 4, apply_extend),
    handler(&["gravity", "g"], 1, 3, apply_gravity),
    handler(&["crop", "c"], 2, 5, apply_crop),
    handler(&["padding", "pd"], 1, 4, apply_padding),
    handler(&["auto_rotate", "ar"], 1, 1, apply_auto_rotate),
    handler(&["rotate", "rot"], 1, 1, apply_rotate),
    handler(&["flip", "fl"], 1, 2, apply_flip),
    handler(&["quality", "q"], 1, 1, apply_quality),
    handler(&["max_bytes", "mb"], 1, 1, apply_max_bytes),
    handler(&["background", "bg"], 1, 3, apply_background),
    handler(&["blur", "bl"], 1, 1, apply_blur),
    handler(&["sharpen", "sh"], 1, 1, apply_sharpen),
    handler(&["pixelate", "pix"], 1, 1, apply_pixelate),
    handler(&["watermark", "wm"], 1, 5, apply_watermark),
    handler(&["strip_metadata", "sm"], 1, 1, apply_strip_metadata),
    handler(&["keep_copyright", "kcr"], 1, 1, apply_keep_copyright),
    handler(&["strip_color_profile", "scp"], 1, 1, apply_strip_color_profile),
    handler(&["format", "f", "ext"], 1, 1, apply_format),
    handler(&["cache_buster", "cb"], 1, 1, apply_cache_buster),
    handler(&["filename", "fn"], 1, 2, apply_filename),
];

/// Find the handler registered under `name` or one of its aliases.
pub fn lookup(name: &str) -> Option<&'static OptionHandler> {
    HANDLERS.iter().find(|h| h.names.contains(&name))
}

fn apply_width(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.width = parse_int("width", &args[0])?;
    Ok(())
}

fn apply_height(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.height = parse_int("height", &args[0])?;
    Ok(())
}

fn apply_min_width(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.min_width = parse_int("min width", &args[0])?;
    Ok(())
}

fn apply_min_height(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.min_height = parse_int("min height", &args[0])?;
    Ok(())
}

fn apply_enlarge(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.enlarge = parse_bool(&args[0]);
    Ok(())
}

/// `enabled[:gravity...]`. Smart gravity can't anchor an extension.
fn apply_extend(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.extend.enabled = parse_bool(&args[0]);
    if args.len() > 1 {
        let gravity = parse_gravity(&args[1..])?;
        if gravity == GravitySpec::Smart {
            return Err(ValueError("extend doesn't support smart gravity".into()));
        }
        po.extend.gravity = gravity;
    }
    Ok(())
}

/// `width:height:enlarge:extend...`; empty tokens leave the field alone.
fn apply_size(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    if let Some(w) = args.first().filter(|a| !a.is_empty()) {
        po.width = parse_int("width", w)?;
    }
    if let Some(h) = args.get(1).filter(|a| !a.is_empty()) {
        po.height = parse_int("height", h)?;
    }
    if let Some(e) = args.get(2).filter(|a| !a.is_empty()) {
        po.enlarge = parse_bool(e);
    }
    if args.get(3).is_some_and(|a| !a.is_empty()) {
        apply_extend(po, &args[3..])?;
    }
    Ok(())
}

fn apply_resizing_type(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.resizing_type = parse_resize_type(&args[0])?;
    Ok(())
}

/// `type:width:height:enlarge:extend...`.
fn apply_resize(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    if !args[0].is_empty() {
        po.resizing_type = parse_resize_type(&args[0])?;
    }
    if args.len() > 1 {
        apply_size(po, &args[1..])?;
    }
    Ok(())
}

fn apply_zoom(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let zw = parse_positive("zoom", &args[0])?;
    let zh = match args.get(1) {
        Some(a) => parse_positive("zoom", a)?,
        None => zw,
    };
    po.zoom_width = zw;
    po.zoom_height = zh;
    Ok(())
}

fn apply_dpr(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.dpr = parse_positive("dpr", &args[0])?;
    Ok(())
}

fn apply_gravity(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.gravity = parse_gravity(args)?;
    Ok(())
}

/// `width:height[:gravity...]`.
fn apply_crop(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.crop.width = parse_non_negative("crop width", &args[0])?;
    po.crop.height = parse_non_negative("crop height", &args[1])?;
    po.crop.gravity = if args.len() > 2 {
        Some(parse_gravity(&args[2..])?)
    } else {
        None
    };
    Ok(())
}

/// CSS-style `top[:right[:bottom[:left]]]`.
fn apply_padding(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let mut p = PaddingOptions {
        enabled: true,
        ..po.padding
    };
    if let Some(all) = args.first().filter(|a| !a.is_empty()) {
        let v = parse_int("padding top (+all)", all)?;
        (p.top, p.right, p.bottom, p.left) = (v, v, v, v);
    }
    if let Some(h) = args.get(1).filter(|a| !a.is_empty()) {
        let v = parse_int("padding right (+left)", h)?;
        (p.right, p.left) = (v, v);
    }
    if let Some(b) = args.get(2).filter(|a| !a.is_empty()) {
        p.bottom = parse_int("padding bottom", b)?;
    }
    if let Some(l) = args.get(3).filter(|a| !a.is_empty()) {
        p.left = parse_int("padding left", l)?;
    }
    if p.top == 0 && p.right == 0 && p.bottom == 0 && p.left == 0 {
        p.enabled = false;
    }
    po.padding = p;
    Ok(())
}

fn apply_auto_rotate(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.auto_rotate = parse_bool(&args[0]);
    Ok(())
}

fn apply_rotate(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let angle: i32 = parse_int("rotation angle", &args[0])?;
    if angle % 90 != 0 {
        return Err(ValueError(format!(
            "Rotation angle must be a multiple of 90: {angle}"
        )));
    }
    po.rotate = angle.rem_euclid(360) as u16;
    Ok(())
}

fn apply_flip(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.flip.horizontal = parse_bool(&args[0]);
    po.flip.vertical = args.get(1).is_some_and(|a| parse_bool(a));
    Ok(())
}

fn apply_quality(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let q: u32 = parse_int("quality", &args[0])?;
    if q > 100 {
        return Err(ValueError(format!("Quality should be in range 0..100: {q}")));
    }
    po.quality = q as u8;
    Ok(())
}

fn apply_max_bytes(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.max_bytes = parse_int("max bytes", &args[0])?;
    Ok(())
}

/// `rrggbb`, `rgb`, `r:g:b`, or empty to disable flattening.
fn apply_background(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    match args {
        [hex] if hex.is_empty() => po.flatten = false,
        [hex] => {
            po.background = parse_hex_color(hex)?;
            po.flatten = true;
        }
        [r, g, b] => {
            po.background = Rgb::new(
                parse_int("background red channel", r)?,
                parse_int("background green channel", g)?,
                parse_int("background blue channel", b)?,
            );
            po.flatten = true;
        }
        _ => {
            return Err(ValueError(format!(
                "Invalid background arguments: {}",
                args.join(":")
            )));
        }
    }
    Ok(())
}

fn apply_blur(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.blur = parse_non_negative("blur", &args[0])? as f32;
    Ok(())
}

fn apply_sharpen(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.sharpen = parse_non_negative("sharpen", &args[0])? as f32;
    Ok(())
}

fn apply_pixelate(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.pixelate = parse_int("pixelate", &args[0])?;
    Ok(())
}

/// `opacity[:position[:x[:y[:scale]]]]` where position is a compass token
/// or `re` to tile.
fn apply_watermark(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let opacity = parse_float("watermark opacity", &args[0])?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ValueError(format!("Invalid watermark opacity: {}", args[0])));
    }

    let mut wm = WatermarkOptions {
        enabled: opacity > 0.0,
        opacity,
        ..po.watermark
    };

    if let Some(pos) = args.get(1).filter(|a| !a.is_empty()) {
        if pos == "re" {
            wm.replicate = true;
        } else {
            match gravity_token(pos) {
                Some(GravityToken::Anchor(anchor)) => {
                    let (x, y) = wm.gravity.offsets();
                    wm.gravity = GravitySpec::Anchored { anchor, x, y };
                    wm.replicate = false;
                }
                _ => return Err(ValueError(format!("Invalid watermark position: {pos}"))),
            }
        }
    }

    let (mut x, mut y) = wm.gravity.offsets();
    if let Some(t) = args.get(2).filter(|a| !a.is_empty()) {
        x = parse_int::<i32>("watermark X offset", t)? as f64;
    }
    if let Some(t) = args.get(3).filter(|a| !a.is_empty()) {
        y = parse_int::<i32>("watermark Y offset", t)? as f64;
    }
    if let GravitySpec::Anchored { anchor, .. } = wm.gravity {
        wm.gravity = GravitySpec::Anchored { anchor, x, y };
    }

    if let Some(t) = args.get(4).filter(|a| !a.is_empty()) {
        wm.scale = parse_non_negative("watermark scale", t)?;
    }

    po.watermark = wm;
    Ok(())
}

fn apply_strip_metadata(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.strip_metadata = parse_bool(&args[0]);
    Ok(())
}

fn apply_keep_copyright(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.keep_copyright = parse_bool(&args[0]);
    Ok(())
}

fn apply_strip_color_profile(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.strip_color_profile = parse_bool(&args[0]);
    Ok(())
}

fn apply_format(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.format = parse_format(&args[0])?;
    Ok(())
}

fn apply_cache_buster(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    po.cache_buster = args[0].clone();
    Ok(())
}

/// `name[:encoded]`; an encoded name is URL-safe base64.
fn apply_filename(po: &mut ProcessingOptions, args: &[String]) -> ValueResult<()> {
    let encoded = args.get(1).is_some_and(|a| parse_bool(a));
    po.filename = if encoded {
        let bytes = URL_SAFE_NO_PAD
            .decode(args[0].trim_end_matches('='))
            .map_err(|_| ValueError(format!("Invalid filename encoding: {}", args[0])))?;
        String::from_utf8(bytes)
            .map_err(|_| ValueError(format!("Invalid filename encoding: {}", args[0])))?
    } else {
        args[0].clone()
    };
    Ok(())
}
