use crate::dropfolder_core::batch::BatchEntry;
use crate::dropfolder_core::error::{DropfolderError, Result};
use crate::dropfolder_core::events::{EventSink, IngestEvent};
use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Path, PathBuf};

/// Moves planned files from the source folder into their dated target folders.
#[derive(Debug, Default)]
pub struct FileRelocator;

impl FileRelocator {
    pub fn new() -> Self {
        Self
    }

    /// Move one entry to its target path and return that path.
    ///
    /// Any failure is reported to `sink` before being returned; the caller
    /// skips the entry and carries on.
    pub fn relocate(&self, batch: &BatchEntry, sink: &mut dyn EventSink) -> Result<PathBuf> {
        if let Err(e) = ensure_folder(&batch.target_folder) {
            sink.emit(IngestEvent::TargetFolderMissing {
                folder: batch.target_folder.clone(),
                error: e.to_string(),
            });
            return Err(DropfolderError::TargetFolder {
                path: batch.target_folder.clone(),
                source: e,
            });
        }

        let from = batch.source_path();
        let to = &batch.target_path;

        if !from.is_file() {
            sink.emit(IngestEvent::FileNotMoved {
                from: from.to_path_buf(),
                to: to.clone(),
                error: "source file is missing".to_string(),
            });
            return Err(DropfolderError::SourceMissing(from.to_path_buf()));
        }

        let overwriting = to.exists() && from != to.as_path();
        match move_file(from, to) {
            Ok(()) => {
                if overwriting {
                    sink.emit(IngestEvent::TargetOverwritten { path: to.clone() });
                }
                log::debug!("Moved {} -> {}", from.display(), to.display());
                sink.emit(IngestEvent::FileMoved {
                    from: from.to_path_buf(),
                    to: to.clone(),
                });
                Ok(to.clone())
            }
            Err(e) => {
                sink.emit(IngestEvent::FileNotMoved {
                    from: from.to_path_buf(),
                    to: to.clone(),
                    error: e.to_string(),
                });
                Err(DropfolderError::MoveFailed {
                    from: from.to_path_buf(),
                    to: to.clone(),
                    source: e,
                })
            }
        }
    }
}

/// Create a folder and its parents, world-readable on Unix.
pub fn ensure_folder(folder: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(folder)
}

/// Rename, falling back to copy and delete when source and target sit on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        other => other,
    }
}
