use crate::dropfolder_core::events::{EventSink, IngestEvent};
use crate::dropfolder_core::scan::Candidate;
use std::fs;

/// Replace every whitespace character in a file name with `_`.
pub fn sanitized_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Rename a candidate in place so its file name carries no whitespace.
///
/// The rename cannot be undone. When it fails the candidate is returned
/// unchanged and the failure is reported.
pub fn normalize_candidate(candidate: Candidate, sink: &mut dyn EventSink) -> Candidate {
    let clean = sanitized_file_name(&candidate.filename);
    if clean == candidate.filename {
        return candidate;
    }

    let renamed = candidate.path.with_file_name(&clean);
    // never replace another upload that already has the clean name
    if fs::symlink_metadata(&renamed).is_ok() {
        sink.emit(IngestEvent::RenameFailed {
            path: candidate.path.clone(),
            error: format!("{} already exists", renamed.display()),
        });
        return candidate;
    }
    match fs::rename(&candidate.path, &renamed) {
        Ok(()) => {
            sink.emit(IngestEvent::FileRenamed {
                from: candidate.path,
                to: renamed.clone(),
            });
            Candidate::new(renamed, candidate.mime_type)
        }
        Err(e) => {
            sink.emit(IngestEvent::RenameFailed {
                path: candidate.path.clone(),
                error: e.to_string(),
            });
            candidate
        }
    }
}
