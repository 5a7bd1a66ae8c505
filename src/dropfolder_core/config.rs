use crate::dropfolder_core::error::{DropfolderError, Result};
use crate::dropfolder_core::media::DEFAULT_ALLOWED_MIME_TYPES;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Files strictly larger than this are rejected as "too big".
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_FILES_PER_BATCH: usize = 10;

/// Folder below the uploads root holding the default record database.
const STATE_FOLDER: &str = ".dropfolder";
const DEFAULT_DB_FILE_NAME: &str = "records.db";

/// Settings as written in the TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub uploads_root: Option<PathBuf>,
    pub source_folder: Option<String>,
    pub author_id: Option<i64>,
    pub files_per_batch: Option<usize>,
    pub no_overwrite_title_description: bool,
    pub allowed_mime_types: Option<Vec<String>>,
    pub database: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

/// Validated configuration for one pipeline run. Built once and passed down;
/// no component reads settings from anywhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub uploads_root: PathBuf,
    pub source_folder: PathBuf,
    pub author_id: i64,
    pub files_per_batch: usize,
    pub no_overwrite_title_description: bool,
    pub allowed_mime_types: Vec<String>,
    pub max_file_size: u64,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DropfolderError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| DropfolderError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate into an [`IngestConfig`].
    pub fn resolve(&self) -> Result<IngestConfig> {
        let uploads_root = self
            .uploads_root
            .clone()
            .ok_or_else(|| DropfolderError::Config("uploads_root is not set".to_string()))?;

        let source_folder = self
            .source_folder
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DropfolderError::Config("source_folder is not set".to_string()))?;
        let relative = Path::new(source_folder);
        let components: Vec<Component> = relative.components().collect();
        // at least one named folder, or the source would be the uploads root itself
        if !components
            .iter()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            || !components.iter().any(|c| matches!(c, Component::Normal(_)))
        {
            return Err(DropfolderError::Config(format!(
                "source_folder '{}' must be a subpath of the uploads root",
                source_folder
            )));
        }

        let author_id = match self.author_id {
            Some(id) if id > 0 => id,
            _ => {
                return Err(DropfolderError::Config(
                    "author_id is not set; no author to attribute records to".to_string(),
                ));
            }
        };

        let allowed_mime_types = self.allowed_mime_types.clone().unwrap_or_else(|| {
            DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        Ok(IngestConfig {
            source_folder: uploads_root.join(relative),
            uploads_root,
            author_id,
            files_per_batch: self.files_per_batch.unwrap_or(DEFAULT_FILES_PER_BATCH),
            no_overwrite_title_description: self.no_overwrite_title_description,
            allowed_mime_types,
            max_file_size: MAX_FILE_SIZE,
        })
    }

    /// Where the record database lives.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.clone().or_else(|| {
            self.uploads_root
                .as_ref()
                .map(|root| root.join(STATE_FOLDER).join(DEFAULT_DB_FILE_NAME))
        })
    }
}
