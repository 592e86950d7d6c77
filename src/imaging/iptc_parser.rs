//! Minimal IPTC-IIM codec for Photoshop image-resource blocks.
//!
//! Embedded IPTC travels inside a Photoshop "PS3" payload (JPEG APP13):
//! an optional `Photoshop 3.0\0` header followed by `8BIM` resource
//! blocks. Resource 0x0404 holds the raw IIM datasets.
//!
//! IIM dataset format:
//!   Byte 0:    0x1C (tag marker)
//!   Byte 1:    Record number
//!   Byte 2:    Dataset (tag) number
//!   Bytes 3-4: Data length (big-endian u16); if the high bit is set, the
//!              low bits give the byte count of an extended length field
//!   Bytes 5+:  Data
//!
//! Only the parse -> filter -> dump round trip used by the metadata
//! sanitizer lives here.

use std::collections::BTreeMap;
use thiserror::Error;

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;

/// Application Record datasets that carry attribution.
pub const APPLICATION_RECORD: u8 = 2;
pub const COPYRIGHT_TAGS: [u8; 3] = [80, 110, 116];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IptcError {
    #[error("no IPTC resource in Photoshop block")]
    NoIptc,
    #[error("invalid dataset marker at offset {0}")]
    BadMarker(usize),
    #[error("truncated IPTC data at offset {0}")]
    Truncated(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IptcKey {
    pub record: u8,
    pub tag: u8,
}

/// Parsed datasets keyed by (record, tag). Repeatable datasets keep every
/// value in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcMap(BTreeMap<IptcKey, Vec<Vec<u8>>>);

impl IptcMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = IptcKey> + '_ {
        self.0.keys().copied()
    }

    pub fn get(&self, record: u8, tag: u8) -> Option<&[Vec<u8>]> {
        self.0.get(&IptcKey { record, tag }).map(Vec::as_slice)
    }

    pub fn insert(&mut self, record: u8, tag: u8, value: Vec<u8>) {
        self.0
            .entry(IptcKey { record, tag })
            .or_default()
            .push(value);
    }

    /// Keep only Application Record creator, credit and copyright notice
    /// datasets. Every other record is dropped.
    pub fn filter_copyright(mut self) -> Self {
        self.0
            .retain(|k, _| k.record == APPLICATION_RECORD && COPYRIGHT_TAGS.contains(&k.tag));
        self
    }

    /// Serialize back into a PS3 payload (header + one 8BIM 0x0404 block).
    pub fn dump(&self) -> Vec<u8> {
        let mut iim = Vec::new();
        for (key, values) in &self.0 {
            for value in values {
                iim.push(TAG_MARKER);
                iim.push(key.record);
                iim.push(key.tag);
                if value.len() < 0x8000 {
                    iim.extend_from_slice(&(value.len() as u16).to_be_bytes());
                } else {
                    // Extended dataset: 4-byte length follows.
                    iim.extend_from_slice(&0x8004u16.to_be_bytes());
                    iim.extend_from_slice(&(value.len() as u32).to_be_bytes());
                }
                iim.extend_from_slice(value);
            }
        }

        let mut out = Vec::with_capacity(PHOTOSHOP_HEADER.len() + 12 + iim.len() + 1);
        out.extend_from_slice(PHOTOSHOP_HEADER);
        out.extend_from_slice(BIM_MARKER);
        out.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
        // Empty pascal name, padded to even length
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(iim.len() as u32).to_be_bytes());
        out.extend_from_slice(&iim);
        if iim.len() % 2 == 1 {
            out.push(0);
        }
        out
    }
}

/// Parse a Photoshop image-resource payload, with or without the
/// `Photoshop 3.0` header, and decode its IPTC datasets.
pub fn parse_ps3(segment: &[u8]) -> Result<IptcMap, IptcError> {
    let iim = extract_iptc_from_8bim(segment).ok_or(IptcError::NoIptc)?;
    parse_iim(iim)
}

/// Decode raw IIM datasets.
pub fn parse_iim(data: &[u8]) -> Result<IptcMap, IptcError> {
    let mut map = IptcMap::default();
    let mut pos = 0;

    while pos < data.len() {
        // Trailing padding after the last dataset
        if data[pos..].iter().all(|&b| b == 0) {
            break;
        }
        if data[pos] != TAG_MARKER {
            return Err(IptcError::BadMarker(pos));
        }
        if pos + 5 > data.len() {
            return Err(IptcError::Truncated(pos));
        }

        let record = data[pos + 1];
        let tag = data[pos + 2];
        let mut length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;

        if length & 0x8000 != 0 {
            let field_len = length & 0x7FFF;
            if field_len == 0 || field_len > 4 || pos + field_len > data.len() {
                return Err(IptcError::Truncated(pos));
            }
            length = data[pos..pos + field_len]
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | b as usize);
            pos += field_len;
        }

        if pos + length > data.len() {
            return Err(IptcError::Truncated(pos));
        }

        map.insert(record, tag, data[pos..pos + length].to_vec());
        pos += length;
    }

    Ok(map)
}

/// Find resource 0x0404 inside a Photoshop 8BIM resource block.
fn extract_iptc_from_8bim(segment: &[u8]) -> Option<&[u8]> {
    let data = segment.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(segment);

    let mut pos = 0;
    while pos + 12 <= data.len() {
        // Each resource: "8BIM" (4) + resource_id (2) + pascal_string + data_len (4) + data
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        pos += 4;

        let resource_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        // Pascal string: 1 byte length + string, padded to even total
        let pascal_len = data[pos] as usize;
        pos += 1 + pascal_len + ((1 + pascal_len) % 2);

        if pos + 4 > data.len() {
            break;
        }
        let res_len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + res_len > data.len() {
            break;
        }

        if resource_id == IPTC_RESOURCE_ID {
            return Some(&data[pos..pos + res_len]);
        }

        pos += res_len + (res_len % 2);
    }

    None
}
