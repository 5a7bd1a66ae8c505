// Builders for synthetic JPEG fixtures carrying EXIF and IPTC metadata.
#![allow(dead_code)]

use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use std::path::Path;

const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;

#[derive(Debug, Clone)]
enum Value {
    Ascii(String),
    Long(u32),
    Rational(Vec<(u32, u32)>),
}

impl Value {
    fn type_and_count(&self) -> (u16, u32) {
        match self {
            Value::Ascii(s) => (TYPE_ASCII, s.len() as u32 + 1),
            Value::Long(_) => (TYPE_LONG, 1),
            Value::Rational(parts) => (TYPE_RATIONAL, parts.len() as u32),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Value::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            Value::Long(v) => v.to_le_bytes().to_vec(),
            Value::Rational(parts) => parts
                .iter()
                .flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes()))
                .collect(),
        }
    }
}

fn padded_len(len: usize) -> usize {
    len + (len % 2)
}

/// Bytes an IFD plus its out-of-line values occupy.
fn block_len(entries: &[(u16, Value)]) -> usize {
    let data: usize = entries
        .iter()
        .map(|(_, v)| v.bytes().len())
        .filter(|len| *len > 4)
        .map(padded_len)
        .sum();
    2 + 12 * entries.len() + 4 + data
}

/// Serialize an IFD that starts at `start` within the TIFF stream.
fn write_block(entries: &[(u16, Value)], start: usize) -> Vec<u8> {
    let mut ifd = Vec::new();
    let mut data = Vec::new();
    let data_start = start + 2 + 12 * entries.len() + 4;

    ifd.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, value) in entries {
        let (kind, count) = value.type_and_count();
        ifd.extend_from_slice(&tag.to_le_bytes());
        ifd.extend_from_slice(&kind.to_le_bytes());
        ifd.extend_from_slice(&count.to_le_bytes());

        let bytes = value.bytes();
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            ifd.extend_from_slice(&inline);
        } else {
            let offset = (data_start + data.len()) as u32;
            ifd.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&bytes);
            if bytes.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    ifd.extend_from_slice(&0u32.to_le_bytes());
    ifd.extend_from_slice(&data);
    ifd
}

/// A GPS position as EXIF stores it: references plus DMS rational triples.
#[derive(Debug, Clone)]
pub struct Gps {
    pub latitude_ref: &'static str,
    pub latitude: [(u32, u32); 3],
    pub longitude_ref: &'static str,
    pub longitude: [(u32, u32); 3],
}

impl Gps {
    /// Whole degrees only.
    pub fn degrees(latitude_ref: &'static str, lat: u32, longitude_ref: &'static str, lon: u32) -> Self {
        Self {
            latitude_ref,
            latitude: [(lat, 1), (0, 1), (0, 1)],
            longitude_ref,
            longitude: [(lon, 1), (0, 1), (0, 1)],
        }
    }
}

/// A JPEG fixture. Only metadata segments are meaningful; there is no image data.
#[derive(Debug, Clone, Default)]
pub struct Photo {
    date_time_original: Option<String>,
    date_time: Option<String>,
    make: Option<String>,
    model: Option<String>,
    gps: Option<Gps>,
    title: Option<String>,
    caption: Option<String>,
    keywords: Vec<String>,
    padding: usize,
}

impl Photo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture timestamp, `YYYY:MM:DD HH:MM:SS`.
    pub fn taken(mut self, date: &str) -> Self {
        self.date_time_original = Some(date.to_string());
        self
    }

    /// Modification timestamp, `YYYY:MM:DD HH:MM:SS`.
    pub fn modified(mut self, date: &str) -> Self {
        self.date_time = Some(date.to_string());
        self
    }

    pub fn camera(mut self, make: &str, model: &str) -> Self {
        self.make = Some(make.to_string());
        self.model = Some(model.to_string());
        self
    }

    pub fn gps(mut self, gps: Gps) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    pub fn keyword(mut self, keyword: &str) -> Self {
        self.keywords.push(keyword.to_string());
        self
    }

    /// Trailing bytes after the end-of-image marker, to control file size.
    pub fn padding(mut self, bytes: usize) -> Self {
        self.padding = bytes;
        self
    }

    fn has_exif(&self) -> bool {
        self.date_time_original.is_some()
            || self.date_time.is_some()
            || self.make.is_some()
            || self.model.is_some()
            || self.gps.is_some()
    }

    fn tiff(&self) -> Vec<u8> {
        let mut ifd0 = Vec::new();
        if let Some(make) = &self.make {
            ifd0.push((TAG_MAKE, Value::Ascii(make.clone())));
        }
        if let Some(model) = &self.model {
            ifd0.push((TAG_MODEL, Value::Ascii(model.clone())));
        }
        if let Some(date) = &self.date_time {
            ifd0.push((TAG_DATE_TIME, Value::Ascii(date.clone())));
        }

        let mut exif = Vec::new();
        if let Some(date) = &self.date_time_original {
            exif.push((TAG_DATE_TIME_ORIGINAL, Value::Ascii(date.clone())));
        }

        let mut gps = Vec::new();
        if let Some(g) = &self.gps {
            gps.push((1, Value::Ascii(g.latitude_ref.to_string())));
            gps.push((2, Value::Rational(g.latitude.to_vec())));
            gps.push((3, Value::Ascii(g.longitude_ref.to_string())));
            gps.push((4, Value::Rational(g.longitude.to_vec())));
        }

        // pointer values are fixed up once the IFD0 size is known
        if !exif.is_empty() {
            ifd0.push((TAG_EXIF_IFD, Value::Long(0)));
        }
        if !gps.is_empty() {
            ifd0.push((TAG_GPS_IFD, Value::Long(0)));
        }

        let exif_start = 8 + block_len(&ifd0);
        let gps_start = exif_start + if exif.is_empty() { 0 } else { block_len(&exif) };
        for (tag, value) in ifd0.iter_mut() {
            match *tag {
                TAG_EXIF_IFD => *value = Value::Long(exif_start as u32),
                TAG_GPS_IFD => *value = Value::Long(gps_start as u32),
                _ => {}
            }
        }

        let mut tiff = b"II".to_vec();
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend(write_block(&ifd0, 8));
        if !exif.is_empty() {
            tiff.extend(write_block(&exif, exif_start));
        }
        if !gps.is_empty() {
            tiff.extend(write_block(&gps, gps_start));
        }
        tiff
    }

    fn iim(&self) -> Vec<u8> {
        let mut iim = Vec::new();
        let mut dataset = |number: u8, value: &str| {
            iim.extend_from_slice(&[0x1C, 2, number]);
            iim.extend_from_slice(&(value.len() as u16).to_be_bytes());
            iim.extend_from_slice(value.as_bytes());
        };
        if let Some(title) = &self.title {
            dataset(5, title);
        }
        for keyword in &self.keywords {
            dataset(25, keyword);
        }
        if let Some(caption) = &self.caption {
            dataset(120, caption);
        }
        iim
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];

        if self.has_exif() {
            let tiff = self.tiff();
            jpeg.extend_from_slice(&[0xFF, 0xE1]);
            jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
            jpeg.extend_from_slice(b"Exif\0\0");
            jpeg.extend(tiff);
        }

        let iim = self.iim();
        if !iim.is_empty() {
            let mut irb = b"Photoshop 3.0\0".to_vec();
            irb.extend_from_slice(b"8BIM");
            irb.extend_from_slice(&0x0404u16.to_be_bytes());
            irb.extend_from_slice(&[0, 0]);
            irb.extend_from_slice(&(iim.len() as u32).to_be_bytes());
            irb.extend_from_slice(&iim);
            if iim.len() % 2 == 1 {
                irb.push(0);
            }
            jpeg.extend_from_slice(&[0xFF, 0xED]);
            jpeg.extend_from_slice(&((irb.len() + 2) as u16).to_be_bytes());
            jpeg.extend(irb);
        }

        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg.resize(jpeg.len() + self.padding, 0);
        jpeg
    }

    pub fn write_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.bytes()).unwrap();
    }
}

/// An uploads root with an empty `ftp` source folder.
pub fn setup_uploads(temp_dir: &TempDir) -> ChildPath {
    let root = temp_dir.child("uploads");
    root.child("ftp").create_dir_all().unwrap();
    root
}

/// Drop a photo into the source folder of `root`.
pub fn drop_photo(root: &ChildPath, name: &str, photo: &Photo) -> ChildPath {
    let file = root.child("ftp").child(name);
    photo.write_to(file.path());
    file
}
