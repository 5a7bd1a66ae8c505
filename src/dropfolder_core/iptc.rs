//! Reader for IPTC-IIM application records.
//!
//! JPEG files keep the IIM stream inside an APP13 segment holding Photoshop
//! image resource blocks (resource `0x0404`). TIFF files keep it in IFD0 tag
//! 33723, which the EXIF reader hands over as raw bytes.

use crate::dropfolder_core::metadata::IptcFields;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_APP13: u8 = 0xED;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const RESOURCE_IPTC: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;

/// One IIM dataset: record number, dataset number, raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset<'a> {
    pub record: u8,
    pub number: u8,
    pub value: &'a [u8],
}

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Collect the IIM stream from the APP13 segments of a JPEG file.
/// Returns `None` when the data is not a JPEG or carries no IPTC resource.
pub fn iim_from_jpeg(bytes: &[u8]) -> Option<Vec<u8>> {
    if !bytes.starts_with(&JPEG_SOI) {
        return None;
    }

    let mut iim = Vec::new();
    let mut pos = 2;
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            break;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        pos += 2;

        match marker {
            0x01 | 0xD0..=0xD8 => continue,
            MARKER_SOS | MARKER_EOI => break,
            _ => {}
        }

        let Some(length) = be_u16(bytes, pos).map(usize::from) else {
            break;
        };
        if length < 2 || pos + length > bytes.len() {
            break;
        }
        let segment = &bytes[pos + 2..pos + length];
        if marker == MARKER_APP13 {
            if let Some(irb) = segment.strip_prefix(PHOTOSHOP_SIGNATURE) {
                if let Some(data) = photoshop_resource(irb, RESOURCE_IPTC) {
                    iim.extend_from_slice(data);
                }
            }
        }
        pos += length;
    }

    (!iim.is_empty()).then_some(iim)
}

/// Find a resource by id in a sequence of Photoshop image resource blocks.
pub fn photoshop_resource(data: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut pos = 0;
    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != RESOURCE_SIGNATURE {
            return None;
        }
        let id = be_u16(data, pos + 4)?;

        // Pascal string name, padded to an even length including its length byte.
        let name_len = usize::from(*data.get(pos + 6)?);
        let mut name_total = 1 + name_len;
        if name_total % 2 == 1 {
            name_total += 1;
        }

        let size_pos = pos + 6 + name_total;
        let size = be_u32(data, size_pos)? as usize;
        let start = size_pos + 4;
        let end = start.checked_add(size)?;
        if end > data.len() {
            return None;
        }
        if id == wanted {
            return Some(&data[start..end]);
        }
        pos = end + (size % 2);
    }
    None
}

/// Split an IIM stream into datasets. Stops at the first malformed entry.
pub fn parse_datasets(data: &[u8]) -> Vec<Dataset<'_>> {
    let mut datasets = Vec::new();
    let mut pos = 0;
    while pos + 5 <= data.len() {
        if data[pos] != TAG_MARKER {
            break;
        }
        let record = data[pos + 1];
        let number = data[pos + 2];
        let Some(length_field) = be_u16(data, pos + 3) else {
            break;
        };
        pos += 5;

        let size = if length_field & 0x8000 != 0 {
            // extended dataset: the low bits give the width of the real length
            let width = usize::from(length_field & 0x7FFF);
            if width == 0 || width > 4 || pos + width > data.len() {
                break;
            }
            let size = data[pos..pos + width]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            pos += width;
            size
        } else {
            usize::from(length_field)
        };

        if pos + size > data.len() {
            break;
        }
        datasets.push(Dataset {
            record,
            number,
            value: &data[pos..pos + size],
        });
        pos += size;
    }
    datasets
}

/// Decode an IIM text value. Values that are not UTF-8 are read as Latin-1.
fn decode_text(value: &[u8]) -> String {
    let text = match std::str::from_utf8(value) {
        Ok(s) => s.to_string(),
        Err(_) => value.iter().map(|&b| char::from(b)).collect(),
    };
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

impl IptcFields {
    /// Build the editorial fields from an IIM stream.
    pub fn from_iim(data: &[u8]) -> Self {
        let mut fields = IptcFields::default();
        for dataset in parse_datasets(data) {
            if dataset.record != APPLICATION_RECORD {
                continue;
            }
            let text = decode_text(dataset.value);
            let slot = match dataset.number {
                5 => &mut fields.title,
                10 => &mut fields.urgency,
                15 => &mut fields.category,
                20 => {
                    fields.supplemental_categories.push(text);
                    continue;
                }
                25 => {
                    if !text.is_empty() {
                        fields.keywords.push(text);
                    }
                    continue;
                }
                40 => &mut fields.special_instructions,
                55 => &mut fields.creation_date,
                80 => &mut fields.byline,
                85 => &mut fields.byline_title,
                90 => &mut fields.city,
                95 => &mut fields.state,
                101 => &mut fields.country,
                103 => &mut fields.transmission_reference,
                105 => &mut fields.headline,
                110 => &mut fields.credit,
                115 => &mut fields.source,
                120 => &mut fields.caption,
                _ => continue,
            };
            // repeated single-valued datasets keep their first value
            if slot.is_empty() {
                *slot = text;
            }
        }
        fields
    }
}
