//! Options DSL interpreter.
//!
//! ```text
//! /plain/http://host/a.jpg@png?resize=fill:300:200&q=70&preset=thumb
//!  └──── source locator ─────┘ └────────── urlOptions ─────────────┘
//! ```
//!
//! Order of application, later wins:
//!
//! 1. config defaults
//! 2. header-derived defaults (`Accept`, client hints) and the `default` preset
//! 3. query options, one entry per distinct key, last value of that key
//! 4. the path extension as `format`

use super::handlers::{self, OptionHandler};
use super::presets::PresetTable;
use super::processing_options::ProcessingOptions;
use super::url::decode_url;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use http::HeaderMap;
use http::header::ACCEPT;
use http::uri::PathAndQuery;
use serde::Serialize;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Presets may nest at most this deep.
pub const MAX_PRESET_DEPTH: usize = 8;

const DEFAULT_PRESET: &str = "default";

/// A named option with its raw colon-split arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlOption {
    pub name: String,
    pub args: Vec<String>,
}

impl UrlOption {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `name:arg:arg` as it appears in a path segment or preset body.
    pub fn from_segment(segment: &str) -> Self {
        let mut tokens = segment.split(':');
        let name = tokens.next().unwrap_or_default().to_string();
        Self {
            name,
            args: tokens.map(String::from).collect(),
        }
    }
}

/// Parse a request path with its query string.
///
/// Returns the processing options and the resolved source URL.
pub fn parse_query(
    path: &str,
    headers: &HeaderMap,
    config: &ProxyConfig,
    presets: &PresetTable,
) -> Result<(ProcessingOptions, String), ProxyError> {
    if path.is_empty() || path == "/" {
        return Err(ProxyError::not_found(format!("Invalid path: {path}")));
    }
    if path.parse::<PathAndQuery>().is_err() {
        return Err(ProxyError::not_found(format!("Invalid query: {path}")));
    }

    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let parts: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();

    let mut po = default_processing_options(headers, config, presets)?;

    let options = query_to_url_options(query);
    apply_url_options(&mut po, &options, presets, config.strict_options)?;

    let decoded = decode_url(&parts, &config.base_url)?;
    if !decoded.extension.is_empty() {
        let extension = UrlOption::new("format", &[decoded.extension.as_str()]);
        apply_url_options(&mut po, &[extension], presets, true)?;
    }

    debug!(
        url = %decoded.url,
        format = %po.format,
        presets = ?po.used_presets,
        "parsed processing options"
    );
    Ok((po, decoded.url))
}

/// Config defaults adjusted by what the client says it supports.
pub fn default_processing_options(
    headers: &HeaderMap,
    config: &ProxyConfig,
    presets: &PresetTable,
) -> Result<ProcessingOptions, ProxyError> {
    let mut po = ProcessingOptions::from_config(config);
    let formats = &config.format;

    let accept = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if (formats.enable_webp_detection || formats.enforce_webp) && accept.contains("image/webp") {
        po.prefer_webp = true;
        po.enforce_webp = formats.enforce_webp;
    }
    if (formats.enable_avif_detection || formats.enforce_avif) && accept.contains("image/avif") {
        po.prefer_avif = true;
        po.enforce_avif = formats.enforce_avif;
    }

    if formats.enable_client_hints {
        if let Some(dpr) = header_f64(headers, &["sec-ch-dpr", "dpr"])
            && dpr > 0.0
            && dpr <= 8.0
        {
            po.dpr = dpr;
        }
        if let Some(width) = header_f64(headers, &["sec-ch-width", "width"])
            && width > 0.0
        {
            po.width = (width / po.dpr).round() as u32;
        }
    }

    if presets.contains(DEFAULT_PRESET) {
        let default = UrlOption::new("preset", &[DEFAULT_PRESET]);
        apply_url_options(&mut po, &[default], presets, config.strict_options)?;
    }

    Ok(po)
}

fn header_f64(headers: &HeaderMap, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// One entry per distinct key in first-appearance order, holding the key's
/// last value.
pub fn query_to_url_options(query: &str) -> Vec<UrlOption> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value.into_owned(),
            None => pairs.push((key.into_owned(), value.into_owned())),
        }
    }

    pairs
        .into_iter()
        .map(|(name, value)| UrlOption {
            name,
            args: value.split(':').map(String::from).collect(),
        })
        .collect()
}

/// Apply options in order, expanding presets in place.
pub fn apply_url_options(
    po: &mut ProcessingOptions,
    options: &[UrlOption],
    presets: &PresetTable,
    strict: bool,
) -> Result<(), ProxyError> {
    let mut chain = Vec::new();
    apply_nested(po, options, presets, strict, &mut chain)
}

fn apply_nested(
    po: &mut ProcessingOptions,
    options: &[UrlOption],
    presets: &PresetTable,
    strict: bool,
    chain: &mut Vec<String>,
) -> Result<(), ProxyError> {
    for option in options {
        if option.name == "preset" || option.name == "pr" {
            apply_presets(po, &option.args, presets, strict, chain)?;
            continue;
        }

        match handlers::lookup(&option.name) {
            Some(handler) => apply_handler(po, handler, &option.args)?,
            None if strict => {
                debug!(option = %option.name, "rejecting unknown option");
                return Err(ProxyError::UnknownOption(option.name.clone()));
            }
            None => warn!(option = %option.name, "ignoring unknown option"),
        }
    }
    Ok(())
}

fn apply_presets(
    po: &mut ProcessingOptions,
    names: &[String],
    presets: &PresetTable,
    strict: bool,
    chain: &mut Vec<String>,
) -> Result<(), ProxyError> {
    for name in names {
        if chain.contains(name) {
            return Err(ProxyError::invalid(
                "preset",
                format!("Recursive preset usage: {} -> {name}", chain.join(" -> ")),
            ));
        }
        if chain.len() >= MAX_PRESET_DEPTH {
            return Err(ProxyError::invalid(
                "preset",
                format!("Presets nested deeper than {MAX_PRESET_DEPTH}: {name}"),
            ));
        }
        let Some(options) = presets.get(name) else {
            debug!(preset = %name, "unknown preset");
            return Err(ProxyError::invalid("preset", format!("Unknown preset: {name}")));
        };

        po.used_presets.push(name.clone());
        chain.push(name.clone());
        let result = apply_nested(po, options, presets, strict, chain);
        chain.pop();
        result?;
    }
    Ok(())
}

/// Check arity, then apply on a copy so a failing option leaves `po` as it
/// was.
fn apply_handler(
    po: &mut ProcessingOptions,
    handler: &OptionHandler,
    args: &[String],
) -> Result<(), ProxyError> {
    if args.len() < handler.min_args || args.len() > handler.max_args {
        let detail = format!(
            "expected {}..={} arguments, got {}",
            handler.min_args,
            handler.max_args,
            args.len()
        );
        debug!(option = handler.name(), args = %args.join(":"), "{detail}");
        return Err(ProxyError::invalid(handler.name(), detail));
    }

    let mut staged = po.clone();
    match (handler.apply)(&mut staged, args) {
        Ok(()) => {
            *po = staged;
            Ok(())
        }
        Err(e) => {
            debug!(option = handler.name(), args = %args.join(":"), error = %e, "invalid option");
            Err(ProxyError::invalid(handler.name(), e.to_string()))
        }
    }
}
