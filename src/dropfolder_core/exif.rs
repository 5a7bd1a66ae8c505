use crate::dropfolder_core::error::{DropfolderError, Result};
use crate::dropfolder_core::iptc::iim_from_jpeg;
use crate::dropfolder_core::media::carries_iptc;
use crate::dropfolder_core::metadata::{Extraction, GpsCoordinates, IptcFields, MetadataRecord};
use exif::{Context, Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use time::PrimitiveDateTime;

/// Date format used in EXIF data.
const EXIF_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

/// IFD0 tag under which TIFF files keep their IPTC-IIM stream.
const TIFF_IPTC_TAG: Tag = Tag(Context::Tiff, 33723);

/// JPEG metadata segments precede the image data; this much is enough to find them.
const JPEG_METADATA_PREFIX: u64 = 1024 * 1024;

/// Quotient of an EXIF rational, 0 when the denominator is 0.
pub fn rational_quotient(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    f64::from(numerator) / f64::from(denominator)
}

/// Convert degrees/minutes/seconds to decimal degrees.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + ((minutes * 60.0) + seconds) / 3600.0
}

/// Decimal degrees from a DMS rational triple, negated when `reference`
/// starts with `negative` (`'S'` for latitude, `'W'` for longitude).
pub fn gps_decimal(triple: [(u32, u32); 3], reference: Option<&str>, negative: char) -> f64 {
    let [deg, min, sec] = triple.map(|(n, d)| rational_quotient(n, d));
    let decimal = dms_to_decimal(deg, min, sec);
    match reference {
        Some(r) if r.trim_start().starts_with(negative) => -decimal,
        _ => decimal,
    }
}

/// Read the embedded metadata of an image file.
///
/// Missing or malformed metadata blocks are not errors: a file with neither
/// an EXIF nor an IPTC block yields [`Extraction::NoMetadata`].
pub fn extract_metadata(path: &Path, mime_type: &str) -> Result<Extraction> {
    let exif = read_exif(path)?;

    let iim = if !carries_iptc(mime_type) {
        None
    } else if mime_type == "image/tiff" {
        exif.as_ref().and_then(tiff_iim)
    } else {
        read_jpeg_iim(path)?
    };

    if exif.is_none() && iim.is_none() {
        return Ok(Extraction::NoMetadata);
    }

    let mut record = MetadataRecord {
        iptc: iim.as_deref().map(IptcFields::from_iim).unwrap_or_default(),
        ..Default::default()
    };

    if let Some(exif) = &exif {
        record.capture_timestamp =
            ascii_field(exif, Tag::DateTimeOriginal).and_then(|s| parse_exif_date(&s));
        record.modified_timestamp =
            ascii_field(exif, Tag::DateTime).and_then(|s| parse_exif_date(&s));
        record.camera_make = ascii_field(exif, Tag::Make);
        record.camera_model = ascii_field(exif, Tag::Model);
        record.gps = GpsCoordinates::from_parts(
            gps_field(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S'),
            gps_field(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W'),
        );
    }

    Ok(Extraction::Record(record))
}

fn extraction_error(path: &Path, e: impl ToString) -> DropfolderError {
    DropfolderError::MetadataExtraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Parse the EXIF block, if there is a usable one.
fn read_exif(path: &Path) -> Result<Option<Exif>> {
    let file = File::open(path).map_err(|e| extraction_error(path, e))?;
    let mut reader = BufReader::new(file);
    match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(exif::Error::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => {
            Err(extraction_error(path, e))
        }
        Err(e) => {
            log::debug!("No usable EXIF in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

fn read_jpeg_iim(path: &Path) -> Result<Option<Vec<u8>>> {
    let file = File::open(path).map_err(|e| extraction_error(path, e))?;
    let mut prefix = Vec::new();
    file.take(JPEG_METADATA_PREFIX)
        .read_to_end(&mut prefix)
        .map_err(|e| extraction_error(path, e))?;
    Ok(iim_from_jpeg(&prefix))
}

fn tiff_iim(exif: &Exif) -> Option<Vec<u8>> {
    let field = exif.get_field(TIFF_IPTC_TAG, In::PRIMARY)?;
    match &field.value {
        Value::Undefined(bytes, _) | Value::Byte(bytes) => Some(bytes.clone()),
        // Some writers declare the stream as LONGs; undo the file's byte order.
        Value::Long(words) => Some(
            words
                .iter()
                .flat_map(|w| {
                    if exif.little_endian() {
                        w.to_le_bytes()
                    } else {
                        w.to_be_bytes()
                    }
                })
                .collect(),
        ),
        _ => None,
    }
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// One coordinate from its DMS rationals and reference tag.
/// Fewer than three rationals means the coordinate is absent.
fn gps_field(exif: &Exif, coord_tag: Tag, ref_tag: Tag, negative: char) -> Option<f64> {
    let field = exif.get_field(coord_tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }
    let triple = [
        (parts[0].num, parts[0].denom),
        (parts[1].num, parts[1].denom),
        (parts[2].num, parts[2].denom),
    ];
    let reference = ascii_field(exif, ref_tag);
    Some(gps_decimal(triple, reference.as_deref(), negative))
}

/// Parse an EXIF date string such as `2024:05:21 12:30:00`.
fn parse_exif_date(date_str: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(date_str.trim(), EXIF_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exif_date() {
        let dt = parse_exif_date("2024:05:21 12:30:00").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month() as u8, 5);
        assert_eq!(dt.day(), 21);
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_parse_invalid_dates() {
        assert!(parse_exif_date("").is_none());
        assert!(parse_exif_date("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_date("2024-05-21T12:30:00").is_none());
    }

    #[test]
    fn test_dms_to_decimal() {
        let lat = gps_decimal([(57, 1), (31, 1), (21334, 521)], Some("N"), 'S');
        assert!((lat - 57.52804).abs() < 0.0001);
        let lon = gps_decimal([(4, 1), (16, 1), (27387, 1352)], Some("W"), 'W');
        assert!((lon - (-4.27229)).abs() < 0.0001);
    }

    #[test]
    fn test_south_and_west_are_negative() {
        for (d, m, s1, s2) in [(0, 0, 1, 1), (10, 0, 0, 1), (45, 30, 1691, 100), (179, 59, 59, 1)] {
            let triple = [(d, 1), (m, 1), (s1, s2)];
            assert!(gps_decimal(triple, Some("S"), 'S') < 0.0);
            assert!(gps_decimal(triple, Some("W"), 'W') < 0.0);
            assert!(gps_decimal(triple, Some("N"), 'S') >= 0.0);
            assert!(gps_decimal(triple, Some("E"), 'W') >= 0.0);
        }
    }

    #[test]
    fn test_zero_denominator_is_zero() {
        assert_eq!(rational_quotient(5, 0), 0.0);
        assert_eq!(gps_decimal([(10, 0), (30, 0), (15, 0)], Some("N"), 'S'), 0.0);
        assert_eq!(gps_decimal([(10, 1), (30, 0), (0, 0)], None, 'S'), 10.0);
    }

    #[test]
    fn test_missing_reference_is_positive() {
        assert_eq!(gps_decimal([(20, 1), (0, 1), (0, 1)], None, 'W'), 20.0);
    }

    #[test]
    fn test_not_an_image_has_no_metadata() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"plain text, not a jpeg").unwrap();
        assert_eq!(extract_metadata(&path, "image/jpeg").unwrap(), Extraction::NoMetadata);
    }

    /// A TIFF whose IFD0 holds only the IPTC tag, stored with `kind`
    /// (4 = LONG, 7 = UNDEFINED).
    fn tiff_with_iptc(big_endian: bool, kind: u16, iim: &[u8]) -> Vec<u8> {
        let u16_bytes = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let u32_bytes = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

        let mut data = iim.to_vec();
        data.resize(data.len().div_ceil(4) * 4, 0);
        let count = if kind == 4 { data.len() / 4 } else { data.len() };

        let mut tiff = if big_endian { b"MM".to_vec() } else { b"II".to_vec() };
        tiff.extend_from_slice(&u16_bytes(42));
        tiff.extend_from_slice(&u32_bytes(8));
        tiff.extend_from_slice(&u16_bytes(1));
        tiff.extend_from_slice(&u16_bytes(33723));
        tiff.extend_from_slice(&u16_bytes(kind));
        tiff.extend_from_slice(&u32_bytes(count as u32));
        tiff.extend_from_slice(&u32_bytes(8 + 2 + 12 + 4));
        tiff.extend_from_slice(&u32_bytes(0));
        tiff.extend_from_slice(&data);
        tiff
    }

    fn harbour_iim() -> Vec<u8> {
        let mut iim = vec![0x1C, 2, 5, 0, 4];
        iim.extend_from_slice(b"Quay");
        iim.extend_from_slice(&[0x1C, 2, 25, 0, 7]);
        iim.extend_from_slice(b"harbour");
        iim
    }

    #[test]
    fn test_tiff_iptc_stream() {
        let dir = assert_fs::TempDir::new().unwrap();
        for (name, big_endian, kind) in [
            ("long_le.tif", false, 4),
            ("long_be.tif", true, 4),
            ("undefined.tif", false, 7),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, tiff_with_iptc(big_endian, kind, &harbour_iim())).unwrap();

            let extraction = extract_metadata(&path, "image/tiff").unwrap();
            let record = extraction.record().unwrap();
            assert_eq!(record.title(), "Quay", "{}", name);
            assert_eq!(record.keywords(), ["harbour".to_string()], "{}", name);
            assert_eq!(record.capture_timestamp, None);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = extract_metadata(Path::new("/nonexistent/x.jpg"), "image/jpeg");
        assert!(matches!(result, Err(DropfolderError::MetadataExtraction { .. })));
    }
}
