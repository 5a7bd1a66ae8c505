use std::fmt;
use time::PrimitiveDateTime;

/// Signed decimal degrees. South latitudes and West longitudes are negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    /// Both halves are required; a lone latitude or longitude is discarded.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self {
            latitude: latitude?,
            longitude: longitude?,
        })
    }

    /// The combined `"lat,lon"` form.
    pub fn location_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GpsCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Editorial fields from the IPTC application record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IptcFields {
    pub title: String,
    pub urgency: String,
    pub category: String,
    pub supplemental_categories: Vec<String>,
    pub keywords: Vec<String>,
    pub special_instructions: String,
    pub creation_date: String,
    pub byline: String,
    pub byline_title: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub transmission_reference: String,
    pub headline: String,
    pub credit: String,
    pub source: String,
    pub caption: String,
}

/// Normalized metadata of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    /// EXIF `DateTimeOriginal`.
    pub capture_timestamp: Option<PrimitiveDateTime>,
    /// EXIF `DateTime`.
    pub modified_timestamp: Option<PrimitiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps: Option<GpsCoordinates>,
    pub iptc: IptcFields,
}

impl MetadataRecord {
    pub fn title(&self) -> &str {
        &self.iptc.title
    }

    pub fn caption(&self) -> &str {
        &self.iptc.caption
    }

    pub fn keywords(&self) -> &[String] {
        &self.iptc.keywords
    }

    /// Camera make and model joined by a space, if either is known.
    pub fn camera(&self) -> Option<String> {
        let parts: Vec<&str> = [self.camera_make.as_deref(), self.camera_model.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Result of reading a file's embedded metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Record(MetadataRecord),
    /// Neither an EXIF nor an IPTC block could be read.
    NoMetadata,
}

impl Extraction {
    pub fn record(&self) -> Option<&MetadataRecord> {
        match self {
            Extraction::Record(record) => Some(record),
            Extraction::NoMetadata => None,
        }
    }
}
