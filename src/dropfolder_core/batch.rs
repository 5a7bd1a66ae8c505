use crate::dropfolder_core::events::IngestEvent;
use crate::dropfolder_core::metadata::{Extraction, MetadataRecord};
use crate::dropfolder_core::scan::Candidate;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;

/// A candidate that passed the eligibility gate.
///
/// Holding one proves the file has a capture timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleEntry {
    pub candidate: Candidate,
    pub metadata: MetadataRecord,
    pub captured_at: PrimitiveDateTime,
    /// EXIF `DateTime`, or the capture timestamp when the file has none.
    pub sort_key: PrimitiveDateTime,
    pub file_size: u64,
}

/// Why a candidate was kept out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoFileDate { has_metadata: bool },
    TooBig { size_bytes: u64, limit_bytes: u64 },
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NoFileDate { .. } => "no file date",
            Rejection::TooBig { .. } => "too big",
        }
    }

    pub fn into_event(self, path: PathBuf) -> IngestEvent {
        match self {
            Rejection::NoFileDate { has_metadata } => IngestEvent::NoFileDate { path, has_metadata },
            Rejection::TooBig {
                size_bytes,
                limit_bytes,
            } => IngestEvent::TooBig {
                path,
                size_bytes,
                limit_bytes,
            },
        }
    }
}

/// Size half of the eligibility gate: strictly greater than `max_file_size`
/// is rejected. Runs before any metadata is read.
pub fn check_size(file_size: u64, max_file_size: u64) -> Result<(), Rejection> {
    if file_size > max_file_size {
        return Err(Rejection::TooBig {
            size_bytes: file_size,
            limit_bytes: max_file_size,
        });
    }
    Ok(())
}

/// Decide whether a candidate may enter the batch.
///
/// The size limit is checked first, then the capture timestamp.
pub fn assess(
    candidate: Candidate,
    extraction: Extraction,
    file_size: u64,
    max_file_size: u64,
) -> Result<EligibleEntry, Rejection> {
    check_size(file_size, max_file_size)?;
    let metadata = match extraction {
        Extraction::Record(record) => record,
        Extraction::NoMetadata => return Err(Rejection::NoFileDate { has_metadata: false }),
    };
    let Some(captured_at) = metadata.capture_timestamp else {
        return Err(Rejection::NoFileDate { has_metadata: true });
    };

    Ok(EligibleEntry {
        sort_key: metadata.modified_timestamp.unwrap_or(captured_at),
        candidate,
        metadata,
        captured_at,
        file_size,
    })
}

/// Order entries oldest first and keep at most `files_per_batch` of them.
/// Entries with equal timestamps keep their discovery order.
pub fn plan_batch(mut entries: Vec<EligibleEntry>, files_per_batch: usize) -> Vec<EligibleEntry> {
    entries.sort_by_key(|e| e.sort_key);
    entries.truncate(files_per_batch);
    entries
}

/// `<uploads_root>/<YYYY>/<MM>` for a capture timestamp.
pub fn target_folder(uploads_root: &Path, captured_at: PrimitiveDateTime) -> PathBuf {
    uploads_root
        .join(format!("{:04}", captured_at.year()))
        .join(format!("{:02}", u8::from(captured_at.month())))
}

/// A planned entry together with where its file will live.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub entry: EligibleEntry,
    pub target_folder: PathBuf,
    pub target_path: PathBuf,
}

impl BatchEntry {
    pub fn new(entry: EligibleEntry, uploads_root: &Path) -> Self {
        let target_folder = target_folder(uploads_root, entry.captured_at);
        let target_path = target_folder.join(&entry.candidate.filename);
        Self {
            entry,
            target_folder,
            target_path,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.entry.candidate.path
    }
}
