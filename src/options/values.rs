//! Option Value Parser: raw colon-split tokens to typed values.
//!
//! Every parser returns a [`ValueError`] naming the offending token; the
//! interpreter attaches the option name.

use super::types::{Anchor, GravitySpec, ResizeType};
use crate::imaging::{ImageType, Rgb};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub String);

pub type ValueResult<T> = Result<T, ValueError>;

macro_rules! bail {
    ($($arg:tt)*) => {
        return Err(ValueError(format!($($arg)*)))
    };
}

/// Compass / special gravity tokens.
pub const GRAVITY_TOKENS: &[(&str, GravityToken)] = &[
    ("ce", GravityToken::Anchor(Anchor::Center)),
    ("no", GravityToken::Anchor(Anchor::North)),
    ("ea", GravityToken::Anchor(Anchor::East)),
    ("so", GravityToken::Anchor(Anchor::South)),
    ("we", GravityToken::Anchor(Anchor::West)),
    ("noea", GravityToken::Anchor(Anchor::NorthEast)),
    ("nowe", GravityToken::Anchor(Anchor::NorthWest)),
    ("soea", GravityToken::Anchor(Anchor::SouthEast)),
    ("sowe", GravityToken::Anchor(Anchor::SouthWest)),
    ("sm", GravityToken::Smart),
    ("fp", GravityToken::FocusPoint),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GravityToken {
    Anchor(Anchor),
    Smart,
    FocusPoint,
}

pub fn gravity_token(token: &str) -> Option<GravityToken> {
    GRAVITY_TOKENS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, t)| *t)
}

pub fn parse_int<T: FromStr>(what: &str, token: &str) -> ValueResult<T> {
    match token.parse() {
        Ok(v) => Ok(v),
        Err(_) => bail!("Invalid {what}: {token}"),
    }
}

pub fn parse_float(what: &str, token: &str) -> ValueResult<f64> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => bail!("Invalid {what}: {token}"),
    }
}

/// A finite float `>= 0`.
pub fn parse_non_negative(what: &str, token: &str) -> ValueResult<f64> {
    let v = parse_float(what, token)?;
    if v < 0.0 {
        bail!("Invalid {what}: {token}");
    }
    Ok(v)
}

/// A finite float `> 0`.
pub fn parse_positive(what: &str, token: &str) -> ValueResult<f64> {
    let v = parse_float(what, token)?;
    if v <= 0.0 {
        bail!("Invalid {what}: {token}");
    }
    Ok(v)
}

/// Truthy / falsy token. Anything unrecognised is `false` and logged.
pub fn parse_bool(token: &str) -> bool {
    match token {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        other => {
            warn!(token = other, "`{other}` is not a valid boolean value, treated as false");
            false
        }
    }
}

pub fn parse_resize_type(token: &str) -> ValueResult<ResizeType> {
    match ResizeType::from_name(token) {
        Some(t) => Ok(t),
        None => bail!("Invalid resize type: {token}"),
    }
}

pub fn parse_format(token: &str) -> ValueResult<ImageType> {
    match ImageType::from_name(token) {
        Some(t) => Ok(t),
        None => bail!("Invalid image format: {token}"),
    }
}

/// `type[:x:y]`.
///
/// `sm` takes no offsets; `fp` requires both coordinates in `[0, 1]`;
/// compass anchors take up to two pixel offsets, omitted ones are zero.
pub fn parse_gravity(args: &[String]) -> ValueResult<GravitySpec> {
    let Some(first) = args.first() else {
        bail!("Missing gravity");
    };
    let Some(token) = gravity_token(first) else {
        bail!("Invalid gravity: {first}");
    };

    match token {
        GravityToken::Smart => {
            if args.len() > 1 {
                bail!("Invalid gravity arguments: {}", args.join(":"));
            }
            Ok(GravitySpec::Smart)
        }
        GravityToken::FocusPoint => {
            if args.len() != 3 {
                bail!("Invalid gravity arguments: {}", args.join(":"));
            }
            let x = parse_float("gravity X", &args[1])?;
            let y = parse_float("gravity Y", &args[2])?;
            if !(0.0..=1.0).contains(&x) {
                bail!("Invalid gravity X: {}", args[1]);
            }
            if !(0.0..=1.0).contains(&y) {
                bail!("Invalid gravity Y: {}", args[2]);
            }
            Ok(GravitySpec::FocusPoint { x, y })
        }
        GravityToken::Anchor(anchor) => {
            if args.len() > 3 {
                bail!("Invalid gravity arguments: {}", args.join(":"));
            }
            let x = match args.get(1) {
                Some(t) => parse_float("gravity X", t)?,
                None => 0.0,
            };
            let y = match args.get(2) {
                Some(t) => parse_float("gravity Y", t)?,
                None => 0.0,
            };
            Ok(GravitySpec::Anchored { anchor, x, y })
        }
    }
}

/// `rgb` or `rrggbb` hex.
pub fn parse_hex_color(token: &str) -> ValueResult<Rgb> {
    if !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("Invalid color: {token}");
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| ValueError(format!("Invalid color: {token}")));
    match token.len() {
        3 => {
            let digit = |i: usize| channel(&token[i..i + 1]).map(|v| v * 17);
            Ok(Rgb::new(digit(0)?, digit(1)?, digit(2)?))
        }
        6 => Ok(Rgb::new(
            channel(&token[0..2])?,
            channel(&token[2..4])?,
            channel(&token[4..6])?,
        )),
        _ => bail!("Invalid color: {token}"),
    }
}
