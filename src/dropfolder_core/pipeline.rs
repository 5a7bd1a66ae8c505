use crate::dropfolder_core::batch::{
    BatchEntry, EligibleEntry, Rejection, assess, check_size, plan_batch,
};
use crate::dropfolder_core::config::{IngestConfig, Settings};
use crate::dropfolder_core::error::{DropfolderError, Result};
use crate::dropfolder_core::events::{EventSink, IngestEvent, MemorySink};
use crate::dropfolder_core::exif::extract_metadata;
use crate::dropfolder_core::metadata::Extraction;
use crate::dropfolder_core::reconcile::RecordReconciler;
use crate::dropfolder_core::relocate::{FileRelocator, ensure_folder};
use crate::dropfolder_core::sanitize::normalize_candidate;
use crate::dropfolder_core::scan::{Candidate, FolderScanner};
use crate::dropfolder_core::store::{RecordId, RecordStore};
use std::fs;
use std::path::PathBuf;
use time::PrimitiveDateTime;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The configuration did not allow a run.
    Disabled { reason: String },
    /// The source folder held no acceptable files.
    NoFiles,
    /// Files were found but none passed the eligibility gate.
    NoValidEntries,
    Finished,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub candidates: usize,
    pub eligible: usize,
    pub planned: usize,
    pub moved: usize,
    pub processed: usize,
    /// Files kept out of the batch and why.
    pub rejected: Vec<(PathBuf, &'static str)>,
    pub records: Vec<RecordId>,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            candidates: 0,
            eligible: 0,
            planned: 0,
            moved: 0,
            processed: 0,
            rejected: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// A file waiting in the source folder, as shown by the pending listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub camera: Option<String>,
    pub captured_at: Option<PrimitiveDateTime>,
    pub size_bytes: u64,
    /// Why the next run would skip this file, if it would.
    pub rejection: Option<&'static str>,
}

/// One sequential ingestion run over the source folder.
pub struct IngestPipeline {
    config: IngestConfig,
    scanner: FolderScanner,
    relocator: FileRelocator,
    reconciler: RecordReconciler,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            scanner: FolderScanner::new(&config.source_folder, &config.allowed_mime_types),
            relocator: FileRelocator::new(),
            reconciler: RecordReconciler::new(&config),
            config,
        }
    }

    /// Scan, plan, move and reconcile one batch.
    ///
    /// Per-file problems are reported to `sink` and never abort the run.
    /// An `Err` means the source folder itself was unusable.
    pub fn run(&self, store: &mut dyn RecordStore, sink: &mut dyn EventSink) -> Result<RunReport> {
        let folder = &self.config.source_folder;
        if !folder.is_dir() {
            if let Err(e) = ensure_folder(folder) {
                sink.emit(IngestEvent::SourceFolderMissing {
                    folder: folder.clone(),
                    error: e.to_string(),
                });
                return Err(DropfolderError::SourceFolder {
                    path: folder.clone(),
                    source: e,
                });
            }
            log::info!("Created source folder {}", folder.display());
            sink.emit(IngestEvent::SourceFolderCreated {
                folder: folder.clone(),
            });
        }

        let candidates: Vec<Candidate> = self.scanner.scan(&mut *sink).collect();
        if candidates.is_empty() {
            sink.emit(IngestEvent::NoFiles {
                folder: folder.clone(),
            });
            return Ok(RunReport::new(RunOutcome::NoFiles));
        }

        let mut report = RunReport::new(RunOutcome::Finished);
        report.candidates = candidates.len();
        log::info!("Found {} candidate files in {}", candidates.len(), folder.display());

        let mut seen = Vec::with_capacity(candidates.len());
        let mut eligible = Vec::new();
        for candidate in candidates {
            let candidate = normalize_candidate(candidate, &mut *sink);
            seen.push(candidate.path.clone());
            let path = candidate.path.clone();
            match self.gate(candidate) {
                Ok(entry) => eligible.push(entry),
                Err(rejection) => {
                    report.rejected.push((path.clone(), rejection.reason()));
                    sink.emit(rejection.into_event(path));
                }
            }
        }

        report.eligible = eligible.len();
        if eligible.is_empty() {
            sink.emit(IngestEvent::NoValidEntries {
                folder: folder.clone(),
                candidates: seen,
            });
            report.outcome = RunOutcome::NoValidEntries;
            return Ok(report);
        }

        let batch = plan_batch(eligible, self.config.files_per_batch);
        report.planned = batch.len();

        for entry in batch {
            let batch_entry = BatchEntry::new(entry, &self.config.uploads_root);
            let Ok(target) = self.relocator.relocate(&batch_entry, &mut *sink) else {
                continue;
            };
            report.moved += 1;

            match self
                .reconciler
                .reconcile(store, &batch_entry.entry, &target, &mut *sink)
            {
                Ok(id) => {
                    report.processed += 1;
                    report.records.push(id);
                }
                Err(e) => {
                    log::error!("Failed to reconcile {}: {}", target.display(), e);
                    sink.emit(IngestEvent::RecordFailed {
                        path: target,
                        error: e.to_string(),
                    });
                }
            }
        }

        sink.emit(IngestEvent::Finished {
            planned: report.planned,
            processed: report.processed,
        });
        Ok(report)
    }

    /// Put a candidate through the eligibility gate. Oversized files are
    /// rejected before their metadata is read.
    fn gate(&self, candidate: Candidate) -> std::result::Result<EligibleEntry, Rejection> {
        let size = file_size(&candidate);
        check_size(size, self.config.max_file_size)?;
        let extraction = self.extract(&candidate);
        assess(candidate, extraction, size, self.config.max_file_size)
    }

    /// Unreadable files count as having no metadata.
    fn extract(&self, candidate: &Candidate) -> Extraction {
        extract_metadata(&candidate.path, &candidate.mime_type).unwrap_or_else(|e| {
            log::warn!("{}", e);
            Extraction::NoMetadata
        })
    }

    /// Files currently waiting in the source folder, in scan order.
    /// Nothing is renamed or moved.
    pub fn pending(&self) -> Vec<PendingFile> {
        let mut ignored = MemorySink::new();
        let candidates: Vec<Candidate> = self.scanner.scan(&mut ignored).collect();

        candidates
            .into_iter()
            .map(|candidate| {
                let size_bytes = file_size(&candidate);
                let extraction = match check_size(size_bytes, self.config.max_file_size) {
                    Ok(()) => self.extract(&candidate),
                    Err(_) => Extraction::NoMetadata,
                };
                let record = extraction.record().cloned().unwrap_or_default();
                let rejection = assess(
                    candidate.clone(),
                    extraction,
                    size_bytes,
                    self.config.max_file_size,
                )
                .err()
                .map(|r| r.reason());

                PendingFile {
                    path: candidate.path,
                    mime_type: candidate.mime_type,
                    title: record.title().to_string(),
                    keywords: record.keywords().to_vec(),
                    location: record.gps.map(|gps| gps.location_string()),
                    camera: record.camera(),
                    captured_at: record.capture_timestamp,
                    size_bytes,
                    rejection,
                }
            })
            .collect()
    }
}

fn file_size(candidate: &Candidate) -> u64 {
    fs::metadata(&candidate.path).map(|m| m.len()).unwrap_or(0)
}

/// Validate `settings` and run once. Invalid settings are reported as a
/// `ConfigurationInvalid` event and a disabled run rather than an error.
pub fn run_once(
    settings: &Settings,
    store: &mut dyn RecordStore,
    sink: &mut dyn EventSink,
) -> Result<RunReport> {
    match settings.resolve() {
        Ok(config) => IngestPipeline::new(config).run(store, sink),
        Err(DropfolderError::Config(reason)) => {
            log::warn!("Ingestion disabled: {}", reason);
            sink.emit(IngestEvent::ConfigurationInvalid {
                reason: reason.clone(),
            });
            Ok(RunReport::new(RunOutcome::Disabled { reason }))
        }
        Err(e) => Err(e),
    }
}
