use crate::dropfolder_core::config::Settings;
use crate::dropfolder_core::error::Result;
use clap::{Args, Parser, Subcommand};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ingest images dropped into an upload folder into a record store")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable file logging to dropfolder.log
    #[arg(long = "log", global = true)]
    pub log: bool,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one batch from the source folder
    Run {
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Ingest a batch on a fixed interval until stopped.
    ///
    /// Runs never overlap: the next one starts only after the previous
    /// one has finished and the interval has passed.
    Watch {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Seconds to wait between runs
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Stop after this many runs
        #[arg(long)]
        runs: Option<usize>,
    },

    /// List files waiting in the source folder without touching them
    Pending {
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// List records in the record store
    Records {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

/// Config file location plus per-key overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Root folder that dated target folders are created under
    #[arg(long)]
    pub uploads_root: Option<PathBuf>,

    /// Source folder, relative to the uploads root
    #[arg(long)]
    pub source_folder: Option<String>,

    /// Author that new records are attributed to
    #[arg(long)]
    pub author_id: Option<i64>,

    /// Maximum number of files moved per run
    #[arg(long)]
    pub files_per_batch: Option<usize>,

    /// Keep the title and description of records that already exist
    #[arg(long)]
    pub no_overwrite_title_description: bool,

    /// Record database (defaults to <uploads_root>/.dropfolder/records.db)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Append every event as a JSON line to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

impl SettingsArgs {
    /// Load the config file, if any, and apply the command line overrides.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(root) = &self.uploads_root {
            settings.uploads_root = Some(root.clone());
        }
        if let Some(folder) = &self.source_folder {
            settings.source_folder = Some(folder.clone());
        }
        if let Some(author) = self.author_id {
            settings.author_id = Some(author);
        }
        if let Some(n) = self.files_per_batch {
            settings.files_per_batch = Some(n);
        }
        if self.no_overwrite_title_description {
            settings.no_overwrite_title_description = true;
        }
        if let Some(db) = &self.database {
            settings.database = Some(db.clone());
        }
        if let Some(journal) = &self.journal {
            settings.journal = Some(journal.clone());
        }
        Ok(settings)
    }
}
