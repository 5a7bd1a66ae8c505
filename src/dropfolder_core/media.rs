use std::fs::File;
use std::io::Read;
use std::path::Path;

/// MIME types accepted when the config does not name its own list.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/gif",
    "image/png",
    "image/bmp",
    "image/tiff",
];

/// Extension (lowercase) to MIME type.
const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("zip", "application/zip"),
];

/// Leading bytes of the image formats we can sniff.
const SIGNATURES: &[(&[u8], &str)] = &[
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (&[b'I', b'I', 0x2A, 0x00], "image/tiff"),
    (&[b'M', b'M', 0x00, 0x2A], "image/tiff"),
];

/// Look up the MIME type for a file name by its extension.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Look up the MIME type from the first bytes of a file's content.
pub fn mime_from_content(header: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(sig, _)| header.starts_with(sig))
        .map(|(_, mime)| *mime)
}

/// Detect the MIME type of a file.
/// A known extension wins; otherwise the file's first bytes are sniffed.
pub fn detect_mime_type(path: &Path) -> Option<&'static str> {
    if let Some(mime) = mime_from_extension(path) {
        return Some(mime);
    }

    let mut header = [0u8; 8];
    let read = File::open(path).and_then(|mut f| f.read(&mut header)).ok()?;
    mime_from_content(&header[..read])
}

/// Whether metadata in this MIME type may carry an IPTC block we can read.
pub fn carries_iptc(mime_type: &str) -> bool {
    matches!(mime_type, "image/jpeg" | "image/tiff")
}

/// Files the operating system leaves behind that are never media.
pub fn is_os_artifact(file_name: &str) -> bool {
    file_name == ".DS_Store"
        || file_name == "Thumbs.db"
        || file_name == "desktop.ini"
        || file_name.starts_with("._")
}
