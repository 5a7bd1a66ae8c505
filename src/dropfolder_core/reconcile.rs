use crate::dropfolder_core::batch::EligibleEntry;
use crate::dropfolder_core::config::IngestConfig;
use crate::dropfolder_core::error::Result;
use crate::dropfolder_core::events::{EventSink, IngestEvent};
use crate::dropfolder_core::media::mime_from_extension;
use crate::dropfolder_core::scan::file_name_of;
use crate::dropfolder_core::store::{
    ALT_TEXT_ATTRIBUTE, FileMetadata, GEO_LATITUDE_ATTRIBUTE, GEO_LONGITUDE_ATTRIBUTE,
    LOCATION_ATTRIBUTE, NewRecord, RECORD_STATUS, RecordFields, RecordId, RecordStore,
    StoredRecord,
};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Finds the stored record, if any, that already represents a file.
pub trait RecordMatcher {
    fn find_match(&self, store: &dyn RecordStore, filename: &str) -> Result<Option<StoredRecord>>;
}

/// Matches on file name equality with a record's original file or any of
/// its size variants. Two different images sharing a name are
/// indistinguishable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameMatcher;

impl FilenameMatcher {
    pub fn matches(record: &StoredRecord, filename: &str) -> bool {
        record.file_name() == filename || record.variants.iter().any(|v| v == filename)
    }
}

impl RecordMatcher for FilenameMatcher {
    fn find_match(&self, store: &dyn RecordStore, filename: &str) -> Result<Option<StoredRecord>> {
        Ok(store
            .find_by_filename(filename)?
            .into_iter()
            .find(|record| Self::matches(record, filename)))
    }
}

/// What to do with the store for one relocated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordInstruction {
    Create(NewRecord),
    /// `fields` is `None` when title and description must be left alone.
    Update {
        id: RecordId,
        file: String,
        fields: Option<RecordFields>,
    },
}

/// The full set of store changes for one relocated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub target_path: PathBuf,
    pub instruction: RecordInstruction,
    /// Derivatives are regenerated on every create and update.
    pub derivatives: FileMetadata,
    /// Written only when the record has no alt text yet.
    pub alt_text: String,
    pub attributes: Vec<(String, String)>,
}

/// Turns relocated files into record instructions and applies them.
pub struct RecordReconciler<M = FilenameMatcher> {
    uploads_root: PathBuf,
    author_id: i64,
    no_overwrite_title_description: bool,
    matcher: M,
}

impl RecordReconciler<FilenameMatcher> {
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_matcher(config, FilenameMatcher)
    }
}

impl<M: RecordMatcher> RecordReconciler<M> {
    pub fn with_matcher(config: &IngestConfig, matcher: M) -> Self {
        Self {
            uploads_root: config.uploads_root.clone(),
            author_id: config.author_id,
            no_overwrite_title_description: config.no_overwrite_title_description,
            matcher,
        }
    }

    /// Decide between creating and updating a record for `target`.
    pub fn plan(&self, store: &dyn RecordStore, entry: &EligibleEntry, target: &Path) -> Result<ReconcilePlan> {
        let filename = file_name_of(target);
        let file = relative_reference(&self.uploads_root, target);
        let metadata = &entry.metadata;

        let fields = RecordFields {
            title: metadata.title().to_string(),
            content: metadata.caption().to_string(),
            excerpt: metadata.caption().to_string(),
            tags: metadata.keywords().to_vec(),
        };

        let instruction = match self.matcher.find_match(store, &filename)? {
            Some(existing) => RecordInstruction::Update {
                id: existing.id,
                file: file.clone(),
                fields: (!self.no_overwrite_title_description).then(|| fields.clone()),
            },
            None => RecordInstruction::Create(NewRecord {
                author_id: self.author_id,
                mime_type: mime_from_extension(target)
                    .unwrap_or(entry.candidate.mime_type.as_str())
                    .to_string(),
                slug: slug_for(target),
                status: RECORD_STATUS.to_string(),
                file: file.clone(),
                fields: fields.clone(),
            }),
        };

        let attributes = match metadata.gps {
            Some(gps) => vec![
                (GEO_LATITUDE_ATTRIBUTE.to_string(), gps.latitude.to_string()),
                (GEO_LONGITUDE_ATTRIBUTE.to_string(), gps.longitude.to_string()),
                (LOCATION_ATTRIBUTE.to_string(), gps.location_string()),
            ],
            None => Vec::new(),
        };

        Ok(ReconcilePlan {
            target_path: target.to_path_buf(),
            instruction,
            derivatives: FileMetadata {
                file,
                size_bytes: entry.file_size,
            },
            alt_text: fields.title,
            attributes,
        })
    }

    /// Carry out a plan against the store and report what changed.
    pub fn apply(
        &self,
        store: &mut dyn RecordStore,
        plan: &ReconcilePlan,
        sink: &mut dyn EventSink,
    ) -> Result<RecordId> {
        let path = plan.target_path.clone();
        let id = match &plan.instruction {
            RecordInstruction::Create(record) => {
                let id = store.create_record(record)?;
                store.refresh_derivatives(id, &plan.derivatives)?;
                sink.emit(IngestEvent::RecordCreated {
                    record_id: id,
                    path,
                });
                id
            }
            RecordInstruction::Update { id, file, fields } => {
                store.update_record(*id, file, fields.as_ref())?;
                if let Some(fields) = fields {
                    sink.emit(IngestEvent::TitleDescriptionOverwritten {
                        record_id: *id,
                        title: fields.title.clone(),
                    });
                }
                store.refresh_derivatives(*id, &plan.derivatives)?;
                sink.emit(IngestEvent::RecordUpdated {
                    record_id: *id,
                    path,
                });
                *id
            }
        };

        let has_alt_text = store
            .attribute(id, ALT_TEXT_ATTRIBUTE)?
            .is_some_and(|alt| !alt.is_empty());
        if !has_alt_text && !plan.alt_text.is_empty() {
            store.set_attribute(id, ALT_TEXT_ATTRIBUTE, &plan.alt_text)?;
        }

        for (key, value) in &plan.attributes {
            store.set_attribute(id, key, value)?;
        }
        if !plan.attributes.is_empty() {
            sink.emit(IngestEvent::MetadataUpdated {
                record_id: id,
                path: plan.target_path.clone(),
            });
        }

        Ok(id)
    }

    /// Plan and apply in one step.
    pub fn reconcile(
        &self,
        store: &mut dyn RecordStore,
        entry: &EligibleEntry,
        target: &Path,
        sink: &mut dyn EventSink,
    ) -> Result<RecordId> {
        let plan = self.plan(&*store, entry, target)?;
        log::debug!("Reconcile plan for {}: {:?}", target.display(), plan.instruction);
        self.apply(store, &plan, sink)
    }
}

/// Path of `target` relative to the uploads root, `/`-separated.
/// Files outside the root keep their full path.
fn relative_reference(uploads_root: &Path, target: &Path) -> String {
    match target.strip_prefix(uploads_root) {
        Ok(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => target.to_string_lossy().to_string(),
    }
}

/// File name without its extension.
fn slug_for(target: &Path) -> String {
    target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
