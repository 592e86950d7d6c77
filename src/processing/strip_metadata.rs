//! Metadata sanitizer.
//!
//! Stripping removes every embedded blob except the colour profile. With
//! `keep_copyright`, attribution survives: IPTC creator/credit/copyright
//! datasets, XMP rights properties, and the EXIF Artist/Copyright tags (the
//! last handled by the engine's `strip`).
//!
//! Unreadable IPTC or XMP never fails the request; it just means there is
//! no attribution to keep.

use super::pipeline::PipelineContext;
use crate::error::ProxyError;
use crate::imaging::{ImageBackend, ImageData, ImageHandle, MetadataKind, iptc_parser, xmp};
use crate::options::ProcessingOptions;
use tracing::debug;

/// Reduce a Photoshop/IPTC blob to its copyright datasets.
pub fn filter_iptc(blob: &[u8]) -> Option<Vec<u8>> {
    match iptc_parser::parse_ps3(blob) {
        Ok(map) => {
            let kept = map.filter_copyright();
            (!kept.is_empty()).then(|| kept.dump())
        }
        Err(e) => {
            debug!(error = %e, "ignoring unreadable IPTC block");
            None
        }
    }
}

/// Reduce an XMP packet to its rights properties.
pub fn filter_xmp(blob: &[u8]) -> Option<Vec<u8>> {
    match xmp::filter_copyright(blob) {
        Ok(kept) => kept,
        Err(e) => {
            debug!(error = %e, "ignoring unreadable XMP packet");
            None
        }
    }
}

pub fn strip_metadata<B: ImageBackend>(
    _ctx: &mut PipelineContext<'_, B>,
    img: &mut B::Image,
    po: &ProcessingOptions,
    _data: &ImageData,
) -> Result<(), ProxyError> {
    if !po.strip_metadata {
        return Ok(());
    }

    let (iptc, xmp) = if po.keep_copyright {
        (
            img.blob(MetadataKind::Iptc).and_then(|b| filter_iptc(&b)),
            img.blob(MetadataKind::Xmp).and_then(|b| filter_xmp(&b)),
        )
    } else {
        (None, None)
    };

    img.strip(po.keep_copyright)?;

    if let Some(iptc) = iptc {
        img.set_blob(MetadataKind::Iptc, iptc);
    }
    if let Some(xmp) = xmp {
        img.set_blob(MetadataKind::Xmp, xmp);
    }
    Ok(())
}
