use anyhow::Result;
use clap::Parser;
use dropfolder::dropfolder_core::{
    Cli, Commands, FanoutSink, IngestPipeline, JournalSink, LogSink, RunOutcome, RunReport,
    Settings, SqliteStore, run_once,
};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize loggers
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if cli.log {
        loggers.push(WriteLogger::new(
            cli.log_level,
            Config::default(),
            File::create("dropfolder.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;

    match cli.command {
        Commands::Run { settings } => {
            let settings = settings.settings()?;
            let mut store = open_store(&settings)?;
            let report = ingest(&settings, &mut store)?;
            print_report(&report);
        }

        Commands::Watch {
            settings,
            interval,
            runs,
        } => {
            let settings = settings.settings()?;
            let mut store = open_store(&settings)?;
            let mut completed = 0;
            loop {
                let report = ingest(&settings, &mut store)?;
                print_report(&report);
                completed += 1;
                if runs.is_some_and(|limit| completed >= limit) {
                    break;
                }
                std::thread::sleep(Duration::from_secs(interval));
            }
        }

        Commands::Pending { settings } => {
            let config = settings.settings()?.resolve()?;
            let folder = config.source_folder.clone();
            let pending = IngestPipeline::new(config).pending();

            if pending.is_empty() {
                println!("No files waiting in {}", folder.display());
            }
            for file in &pending {
                println!("{}", file.path.display());
                let title = if file.title.is_empty() {
                    "No image title"
                } else {
                    file.title.as_str()
                };
                println!("  Title:    {}", title);
                if let Some(taken) = file.captured_at {
                    println!("  Taken:    {}", taken);
                }
                if !file.keywords.is_empty() {
                    println!("  Keywords: {}", file.keywords.join(", "));
                }
                println!(
                    "  Location: {}",
                    file.location.as_deref().unwrap_or("No location data")
                );
                if let Some(camera) = &file.camera {
                    println!("  Camera:   {}", camera);
                }
                println!("  Size:     {:.1} MB", file.size_bytes as f64 / 1_048_576.0);
                if let Some(reason) = file.rejection {
                    println!("  Skipped:  {}", reason);
                }
            }
        }

        Commands::Records { settings } => {
            let settings = settings.settings()?;
            let store = open_store(&settings)?;
            let records = store.list_records()?;

            if records.is_empty() {
                println!("No records");
            }
            for record in &records {
                println!("{:>6}  {}  {}", record.id, record.file, record.title);
                if !record.tags.is_empty() {
                    println!("        tags: {}", record.tags.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    let store = match settings.database_path() {
        Some(path) => SqliteStore::open(&path)?,
        // no uploads root: the run will be disabled and touches nothing
        None => SqliteStore::open_in_memory()?,
    };
    Ok(store)
}

fn ingest(settings: &Settings, store: &mut SqliteStore) -> Result<RunReport> {
    let mut sink = FanoutSink::new().with(LogSink);
    if let Some(journal) = &settings.journal {
        sink = sink.with(JournalSink::open(journal)?);
    }
    Ok(run_once(settings, store, &mut sink)?)
}

fn print_report(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Disabled { reason } => println!("Ingestion disabled: {}", reason),
        RunOutcome::NoFiles => println!("No files to ingest"),
        RunOutcome::NoValidEntries => {
            println!("No valid entries among {} files", report.candidates);
            for (path, reason) in &report.rejected {
                println!("  {}: {}", path.display(), reason);
            }
        }
        RunOutcome::Finished => {
            println!("\nIngest complete!");
            println!("  {} files moved", report.moved);
            println!("  {} records processed", report.processed);
            if !report.rejected.is_empty() {
                println!("  {} files skipped", report.rejected.len());
            }
            let deferred = report.eligible.saturating_sub(report.planned);
            if deferred > 0 {
                println!("  {} files left for the next run", deferred);
            }
        }
    }
}
