pub mod batch;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod exif;
pub mod iptc;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod reconcile;
pub mod relocate;
pub mod sanitize;
pub mod scan;
pub mod store;

pub use cli::{Cli, Commands};
pub use config::{IngestConfig, Settings};
pub use database::SqliteStore;
pub use error::{DropfolderError, Result};
pub use events::{EventSink, FanoutSink, IngestEvent, JournalSink, LogSink, MemorySink};
pub use pipeline::{IngestPipeline, PendingFile, RunOutcome, RunReport, run_once};
pub use store::RecordStore;
