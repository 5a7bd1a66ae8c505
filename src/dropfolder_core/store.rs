use crate::dropfolder_core::error::Result;
use serde::Serialize;
use std::path::Path;

pub type RecordId = i64;

/// Attribute holding a record's accessibility text.
pub const ALT_TEXT_ATTRIBUTE: &str = "alt_text";
pub const GEO_LATITUDE_ATTRIBUTE: &str = "geo_latitude";
pub const GEO_LONGITUDE_ATTRIBUTE: &str = "geo_longitude";
pub const LOCATION_ATTRIBUTE: &str = "location";

/// Status given to every record this crate creates.
pub const RECORD_STATUS: &str = "inherit";

/// Title, description and tags derived from a file's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordFields {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
}

/// Everything needed to create a record for a newly ingested file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub author_id: i64,
    pub mime_type: String,
    pub slug: String,
    pub status: String,
    /// File reference relative to the uploads root.
    pub file: String,
    pub fields: RecordFields,
}

/// File facts recorded when derivatives are refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    /// File reference relative to the uploads root.
    pub file: String,
    pub size_bytes: u64,
}

/// A record as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub mime_type: String,
    pub slug: String,
    pub status: String,
    pub file: String,
    pub file_size: Option<u64>,
    pub refreshed_at: Option<String>,
    /// Set when size variants were requested and not yet registered.
    pub variants_pending: bool,
    pub tags: Vec<String>,
    /// File names of the record's size variants.
    pub variants: Vec<String>,
}

impl StoredRecord {
    /// Base name of the stored file reference.
    pub fn file_name(&self) -> &str {
        Path::new(&self.file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file)
    }
}

/// The persistence collaborator of the record reconciler.
///
/// The pipeline never owns storage; everything it persists goes through
/// this trait.
pub trait RecordStore {
    /// Records whose file reference or a variant name contains `filename`.
    /// This is a loose lookup; callers decide what actually matches.
    fn find_by_filename(&self, filename: &str) -> Result<Vec<StoredRecord>>;

    fn create_record(&mut self, record: &NewRecord) -> Result<RecordId>;

    /// Point an existing record at `file`, replacing its title, content,
    /// excerpt and tags only when `fields` is given.
    fn update_record(&mut self, id: RecordId, file: &str, fields: Option<&RecordFields>) -> Result<()>;

    fn attribute(&self, id: RecordId, key: &str) -> Result<Option<String>>;

    fn set_attribute(&mut self, id: RecordId, key: &str, value: &str) -> Result<()>;

    /// Refresh the stored file metadata of a record and queue its size
    /// variants for regeneration.
    fn refresh_derivatives(&mut self, id: RecordId, metadata: &FileMetadata) -> Result<()>;

    fn record(&self, id: RecordId) -> Result<Option<StoredRecord>>;
}
