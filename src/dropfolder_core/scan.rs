use crate::dropfolder_core::events::{EventSink, IngestEvent};
use crate::dropfolder_core::media::{detect_mime_type, is_os_artifact};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found in the source folder that may be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
}

impl Candidate {
    pub fn new(path: PathBuf, mime_type: impl Into<String>) -> Self {
        let filename = file_name_of(&path);
        Self {
            path,
            filename,
            mime_type: mime_type.into(),
        }
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Walks a source folder and yields the files whose type is allowed.
pub struct FolderScanner {
    root: PathBuf,
    allowed_mime_types: Vec<String>,
}

impl FolderScanner {
    pub fn new(root: &Path, allowed_mime_types: &[String]) -> Self {
        Self {
            root: root.to_path_buf(),
            allowed_mime_types: allowed_mime_types.to_vec(),
        }
    }

    /// Start a scan. Disallowed files are reported to `sink` as they are passed.
    ///
    /// Entries are visited depth-first with a directory's contents before the
    /// directory itself, and siblings in file name order. A missing root
    /// yields nothing.
    pub fn scan<'a>(&self, sink: &'a mut dyn EventSink) -> Scan<'a> {
        let walker = self.root.is_dir().then(|| {
            WalkDir::new(&self.root)
                .contents_first(true)
                .sort_by_file_name()
                .into_iter()
        });
        Scan {
            walker,
            allowed_mime_types: self.allowed_mime_types.clone(),
            sink,
        }
    }
}

/// Lazy iterator over the [`Candidate`]s of one scan.
pub struct Scan<'a> {
    walker: Option<walkdir::IntoIter>,
    allowed_mime_types: Vec<String>,
    sink: &'a mut dyn EventSink,
}

impl Iterator for Scan<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let walker = self.walker.as_mut()?;
        loop {
            let entry = match walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if is_os_artifact(&entry.file_name().to_string_lossy()) {
                log::debug!("Skipping OS artifact {}", entry.path().display());
                continue;
            }

            let path = entry.into_path();
            let mime_type = detect_mime_type(&path);
            match mime_type {
                Some(mime) if self.allowed_mime_types.iter().any(|a| a == mime) => {
                    return Some(Candidate::new(path, mime));
                }
                _ => self.sink.emit(IngestEvent::FiletypeNotAllowed {
                    path,
                    mime_type: mime_type.map(str::to_string),
                    allowed: self.allowed_mime_types.clone(),
                }),
            }
        }
    }
}
