use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Something that happened during an ingestion run.
///
/// Every variant carries enough payload to reconstruct what happened to the
/// file without running the pipeline again.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    ConfigurationInvalid {
        reason: String,
    },
    SourceFolderCreated {
        folder: PathBuf,
    },
    /// The source folder was absent and could not be created.
    SourceFolderMissing {
        folder: PathBuf,
        error: String,
    },
    NoFiles {
        folder: PathBuf,
    },
    FileRenamed {
        from: PathBuf,
        to: PathBuf,
    },
    RenameFailed {
        path: PathBuf,
        error: String,
    },
    FiletypeNotAllowed {
        path: PathBuf,
        mime_type: Option<String>,
        allowed: Vec<String>,
    },
    NoFileDate {
        path: PathBuf,
        has_metadata: bool,
    },
    TooBig {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },
    NoValidEntries {
        folder: PathBuf,
        candidates: Vec<PathBuf>,
    },
    TargetFolderMissing {
        folder: PathBuf,
        error: String,
    },
    FileMoved {
        from: PathBuf,
        to: PathBuf,
    },
    FileNotMoved {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
    /// A file already sat at the target path and was replaced.
    TargetOverwritten {
        path: PathBuf,
    },
    RecordCreated {
        record_id: i64,
        path: PathBuf,
    },
    RecordUpdated {
        record_id: i64,
        path: PathBuf,
    },
    TitleDescriptionOverwritten {
        record_id: i64,
        title: String,
    },
    MetadataUpdated {
        record_id: i64,
        path: PathBuf,
    },
    RecordFailed {
        path: PathBuf,
        error: String,
    },
    Finished {
        planned: usize,
        processed: usize,
    },
}

impl IngestEvent {
    /// Stable name of the event, as used in the journal.
    pub fn name(&self) -> &'static str {
        match self {
            IngestEvent::ConfigurationInvalid { .. } => "configuration_invalid",
            IngestEvent::SourceFolderCreated { .. } => "source_folder_created",
            IngestEvent::SourceFolderMissing { .. } => "source_folder_missing",
            IngestEvent::NoFiles { .. } => "no_files",
            IngestEvent::FileRenamed { .. } => "file_renamed",
            IngestEvent::RenameFailed { .. } => "rename_failed",
            IngestEvent::FiletypeNotAllowed { .. } => "filetype_not_allowed",
            IngestEvent::NoFileDate { .. } => "no_file_date",
            IngestEvent::TooBig { .. } => "too_big",
            IngestEvent::NoValidEntries { .. } => "no_valid_entries",
            IngestEvent::TargetFolderMissing { .. } => "target_folder_missing",
            IngestEvent::FileMoved { .. } => "file_moved",
            IngestEvent::FileNotMoved { .. } => "file_not_moved",
            IngestEvent::TargetOverwritten { .. } => "target_overwritten",
            IngestEvent::RecordCreated { .. } => "record_created",
            IngestEvent::RecordUpdated { .. } => "record_updated",
            IngestEvent::TitleDescriptionOverwritten { .. } => "title_description_overwritten",
            IngestEvent::MetadataUpdated { .. } => "metadata_updated",
            IngestEvent::RecordFailed { .. } => "record_failed",
            IngestEvent::Finished { .. } => "finished",
        }
    }

    /// Whether the event reports a skipped file or a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            IngestEvent::ConfigurationInvalid { .. }
                | IngestEvent::SourceFolderMissing { .. }
                | IngestEvent::RenameFailed { .. }
                | IngestEvent::FiletypeNotAllowed { .. }
                | IngestEvent::NoFileDate { .. }
                | IngestEvent::TooBig { .. }
                | IngestEvent::NoValidEntries { .. }
                | IngestEvent::TargetFolderMissing { .. }
                | IngestEvent::FileNotMoved { .. }
                | IngestEvent::RecordFailed { .. }
        )
    }
}

/// Append-only destination for [`IngestEvent`]s.
pub trait EventSink {
    fn emit(&mut self, event: IngestEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: IngestEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: IngestEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
        if event.is_error() {
            log::warn!("{}\t{}", event.name(), payload);
        } else {
            log::info!("{}\t{}", event.name(), payload);
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<IngestEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all collected events, in emission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(IngestEvent::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name() == name)
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: IngestEvent) {
        self.events.push(event);
    }
}

/// Appends one JSON object per event to a journal file.
pub struct JournalSink {
    file: File,
}

impl JournalSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl EventSink for JournalSink {
    fn emit(&mut self, event: IngestEvent) {
        let written = journal_line(&event)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(self.file, "{}", line));
        if let Err(e) = written {
            log::error!("Failed to write {} to journal: {}", event.name(), e);
        }
    }
}

/// Serialize an event as a journal line: the event object plus `at` and `error`.
fn journal_line(event: &IngestEvent) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let serde_json::Value::Object(map) = &mut value {
        let at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        map.insert("at".to_string(), at.into());
        map.insert("error".to_string(), event.is_error().into());
    }
    serde_json::to_string(&value)
}

/// Forwards every event to each of its sinks.
#[derive(Default)]
pub struct FanoutSink<'a> {
    sinks: Vec<Box<dyn EventSink + 'a>>,
}

impl<'a> FanoutSink<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: impl EventSink + 'a) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanoutSink<'_> {
    fn emit(&mut self, event: IngestEvent) {
        for sink in &mut self.sinks {
            sink.emit(event.clone());
        }
    }
}
