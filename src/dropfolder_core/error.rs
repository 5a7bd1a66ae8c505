use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropfolderError {
    // Store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Record {0} not found")]
    RecordNotFound(i64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Filesystem errors
    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Source folder {path} could not be created: {source}")]
    SourceFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Target folder {path} could not be created: {source}")]
    TargetFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    // Metadata errors
    #[error("Failed to extract metadata from {path}: {reason}")]
    MetadataExtraction { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for dropfolder operations.
pub type Result<T> = std::result::Result<T, DropfolderError>;
