//! Just enough TIFF/EXIF to read orientation and to rebuild a block that
//! carries only attribution.
//!
//! Blobs may or may not start with the `Exif\0\0` APP1 marker; both forms
//! are accepted and the marker is preserved on output.

const EXIF_HEADER: &[u8] = b"Exif\0\0";

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_ARTIST: u16 = 0x013B;
const TAG_COPYRIGHT: u16 = 0x8298;

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

struct Entry<'a> {
    tag: u16,
    typ: u16,
    count: u32,
    /// The value bytes, wherever they live.
    value: &'a [u8],
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Self { data, big_endian };
        (tiff.u16_at(2)? == 42).then_some(tiff)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    /// Entries of IFD0. Entries whose value points outside the block are
    /// skipped.
    fn ifd0(&self) -> Vec<Entry<'a>> {
        let Some(ifd) = self.u32_at(4).map(|o| o as usize) else {
            return Vec::new();
        };
        let Some(count) = self.u16_at(ifd) else {
            return Vec::new();
        };

        (0..count as usize)
            .filter_map(|i| {
                let at = ifd + 2 + i * 12;
                let tag = self.u16_at(at)?;
                let typ = self.u16_at(at + 2)?;
                let count = self.u32_at(at + 4)?;
                let byte_len = (count as usize).checked_mul(type_size(typ))?;
                let value = if byte_len <= 4 {
                    self.data.get(at + 8..at + 8 + byte_len)?
                } else {
                    let offset = self.u32_at(at + 8)? as usize;
                    self.data.get(offset..offset.checked_add(byte_len)?)?
                };
                Some(Entry {
                    tag,
                    typ,
                    count,
                    value,
                })
            })
            .collect()
    }
}

fn type_size(typ: u16) -> usize {
    match typ {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 => 4,    // LONG, SLONG, FLOAT
        5 | 10 | 12 => 8,   // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

fn split_header(blob: &[u8]) -> (bool, &[u8]) {
    match blob.strip_prefix(EXIF_HEADER) {
        Some(rest) => (true, rest),
        None => (false, blob),
    }
}

/// EXIF orientation (1-8), if present.
pub fn orientation(blob: &[u8]) -> Option<u16> {
    let (_, data) = split_header(blob);
    let tiff = Tiff::new(data)?;
    let entry = tiff
        .ifd0()
        .into_iter()
        .find(|e| e.tag == TAG_ORIENTATION && e.typ == 3)?;
    let b: [u8; 2] = entry.value.get(0..2)?.try_into().ok()?;
    let value = if tiff.big_endian {
        u16::from_be_bytes(b)
    } else {
        u16::from_le_bytes(b)
    };
    (1..=8).contains(&value).then_some(value)
}

/// Rebuild the block with only IFD0 Artist and Copyright, in the source
/// byte order. `None` if neither tag is present.
pub fn copyright_subset(blob: &[u8]) -> Option<Vec<u8>> {
    let (had_header, data) = split_header(blob);
    let tiff = Tiff::new(data)?;
    let kept: Vec<Entry<'_>> = tiff
        .ifd0()
        .into_iter()
        .filter(|e| e.tag == TAG_ARTIST || e.tag == TAG_COPYRIGHT)
        .collect();
    if kept.is_empty() {
        return None;
    }

    let u16b = |v: u16| {
        if tiff.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };
    let u32b = |v: u32| {
        if tiff.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut out = Vec::new();
    if had_header {
        out.extend_from_slice(EXIF_HEADER);
    }
    let base = out.len();
    out.extend_from_slice(&data[0..2]);
    out.extend_from_slice(&u16b(42));
    out.extend_from_slice(&u32b(8));
    out.extend_from_slice(&u16b(kept.len() as u16));

    // Out-of-line values go after the entry table and the next-IFD pointer.
    let mut data_offset = 8 + 2 + kept.len() * 12 + 4;
    let mut heap = Vec::new();
    for entry in &kept {
        out.extend_from_slice(&u16b(entry.tag));
        out.extend_from_slice(&u16b(entry.typ));
        out.extend_from_slice(&u32b(entry.count));
        if entry.value.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.value.len()].copy_from_slice(entry.value);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&u32b(data_offset as u32));
            heap.extend_from_slice(entry.value);
            data_offset += entry.value.len();
            if entry.value.len() % 2 == 1 {
                heap.push(0);
                data_offset += 1;
            }
        }
    }
    out.extend_from_slice(&u32b(0));
    out.extend_from_slice(&heap);
    debug_assert_eq!(out.len() - base, data_offset);
    Some(out)
}
