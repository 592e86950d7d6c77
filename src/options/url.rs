//! Source URL decoding.
//!
//! Two path shapes carry the source image locator:
//!
//! | Shape | Example | Extension separator |
//! |---|---|---|
//! | plain | `/plain/http://host/a.jpg@png` | last `@` |
//! | base64 | `/aHR0cDovL2hvc3QvYS5qcGc.png` | `.` |
//!
//! Relative results are prefixed with the configured base URL; locators that
//! already carry a scheme are kept as they are.

use crate::error::ProxyError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::percent_decode_str;
use url::Url;

/// A decoded source locator plus the raw trailing extension (empty if none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUrl {
    pub url: String,
    pub extension: String,
}

/// Decode the path segments that follow the option segments.
pub fn decode_url(parts: &[&str], base_url: &str) -> Result<DecodedUrl, ProxyError> {
    match parts.split_first() {
        Some((&"plain", rest)) if !rest.is_empty() => decode_plain(rest, base_url),
        Some(_) => decode_base64(parts, base_url),
        None => Err(ProxyError::not_found("Image URL is empty")),
    }
}

fn decode_plain(parts: &[&str], base_url: &str) -> Result<DecodedUrl, ProxyError> {
    let joined = parts.join("/");
    let (raw, extension) = match joined.rsplit_once('@') {
        Some((raw, ext)) => (raw, ext),
        None => (joined.as_str(), ""),
    };

    let url = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ProxyError::not_found(format!("Invalid url encoding: {raw}")))?;
    if url.is_empty() {
        return Err(ProxyError::not_found("Image URL is empty"));
    }

    Ok(DecodedUrl {
        url: with_base_url(&url, base_url),
        extension: extension.to_string(),
    })
}

fn decode_base64(parts: &[&str], base_url: &str) -> Result<DecodedUrl, ProxyError> {
    let joined = parts.concat();
    let pieces: Vec<&str> = joined.split('.').collect();

    if pieces[0].is_empty() {
        return Err(ProxyError::not_found("Image URL is empty"));
    }
    if pieces.len() > 2 {
        return Err(ProxyError::not_found(format!(
            "Multiple formats are specified: {joined}"
        )));
    }

    let encoded = pieces[0].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| ProxyError::not_found(format!("Invalid url encoding: {encoded}")))?;
    let url = String::from_utf8(bytes)
        .map_err(|_| ProxyError::not_found(format!("Invalid url encoding: {encoded}")))?;

    Ok(DecodedUrl {
        url: with_base_url(&url, base_url),
        extension: pieces.get(1).copied().unwrap_or_default().to_string(),
    })
}

/// Plain concatenation, no URL-join normalization. Absolute URLs (anything
/// with a scheme) are left alone.
fn with_base_url(url: &str, base_url: &str) -> String {
    if base_url.is_empty() || url.starts_with(base_url) || Url::parse(url).is_ok() {
        url.to_string()
    } else {
        format!("{base_url}{url}")
    }
}
