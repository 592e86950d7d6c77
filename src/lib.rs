//! # imgpipe
//!
//! The request-processing core of an image proxy. A request path such as
//!
//! ```text
//! /aHR0cDovL2V4YW1wbGUuY29tL2NhdC5qcGc.webp?rs=fill:300:200&q=70&wm=0.5:soea
//! ```
//!
//! is parsed into a validated [`options::ProcessingOptions`] record plus the
//! source URL, and the fetched source bytes are then run through a fixed
//! pipeline of image stages that ends in an encoded output.
//!
//! # Architecture
//!
//! ```text
//! 1. Parse     path + headers + presets  →  ProcessingOptions + source URL
//! 2. Process   source bytes + options    →  encoded image
//! ```
//!
//! Parsing never touches pixels, and processing never sees URL text. The two
//! halves meet only at `ProcessingOptions`, which serializes to JSON so the
//! `parse` subcommand can show exactly what a URL asks for.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`options`] | Option DSL: value parsers, handler table, presets, URL decoding |
//! | [`processing`] | Pipeline executor, stages, watermark compositor, metadata sanitizer |
//! | [`imaging`] | Image engine seam and the pure-Rust engine; IPTC/XMP/EXIF codecs; geometry |
//! | [`config`] | `config.toml` loading, validation, stock defaults |
//! | [`error`] | Request error taxonomy with status codes and public messages |
//!
//! # Design Decisions
//!
//! ## One Engine Trait
//!
//! Stages only talk to [`imaging::ImageBackend`] and [`imaging::ImageHandle`].
//! The shipped engine decodes with the `image` crate; tests swap in a
//! recording mock so geometry and ordering can be checked without decoding
//! anything.
//!
//! ## Errors Carry Two Messages
//!
//! [`error::ProxyError`]'s `Display` names the offending option and token for
//! logs. What a client sees is [`error::ProxyError::public_message`], which
//! never echoes request text.

pub mod config;
pub mod error;
pub mod imaging;
pub mod options;
pub mod processing;

pub use error::{ErrorKind, ProxyError};
