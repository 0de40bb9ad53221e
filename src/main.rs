// ABOUTME: Entry point for the fanlog binary.
// ABOUTME: Parses CLI arguments, loads env configuration, initializes tracing, and runs one command.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fanlog_core::LogRecord;
use fanlog_dispatch::{CsvTimingSink, Destination, ErrorLogWriter, FanOutDispatcher, JsonlWriter};
use fanlog_store::{ErrorLog, SqliteTable};

use crate::config::FanlogConfig;

#[derive(Parser)]
#[command(name = "fanlog")]
#[command(about = "Fan-out record dispatcher and paginated error log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a record straight to the error log
    Append(RecordArgs),

    /// Send a record to every destination in parallel and print its timing line
    Dispatch(RecordArgs),

    /// Show one entry by id
    Get {
        /// Entry id (decimal log position)
        id: String,
    },

    /// List entries newest first
    Page {
        /// Page index, 0 is the newest page
        #[arg(short, long, default_value = "0")]
        page: u64,

        /// Entries per page
        #[arg(short, long, default_value = "20")]
        size: u64,
    },

    /// Print the number of entries in the log
    Count,
}

#[derive(Args)]
struct RecordArgs {
    /// Record kind, e.g. an error type name
    #[arg(short, long)]
    kind: String,

    /// Record message
    #[arg(short, long)]
    message: String,

    /// Reporting application
    #[arg(short, long, default_value = "fanlog")]
    application: String,

    /// HTTP-style status code
    #[arg(long, default_value = "500")]
    status: u16,

    /// Long free-text detail, such as a stack trace
    #[arg(short, long)]
    detail: Option<String>,

    /// Reporting user
    #[arg(short, long)]
    user: Option<String>,
}

impl RecordArgs {
    fn into_record(self) -> LogRecord {
        let mut record = LogRecord::new(self.kind, self.application, self.message);
        record.status_code = self.status;
        record.detail = self.detail;
        record.user = self.user;
        record
    }
}

fn open_log(config: &FanlogConfig) -> Result<Arc<ErrorLog>> {
    let store_path = config.store_path();
    let table = SqliteTable::open(&store_path, &config.table)
        .with_context(|| format!("failed to open table store at {}", store_path.display()))?;
    Ok(Arc::new(ErrorLog::new(Arc::new(table), config.log_options())))
}

fn build_dispatcher(config: &FanlogConfig, log: Arc<ErrorLog>) -> Result<FanOutDispatcher> {
    let records_path = config.records_path();
    let jsonl = JsonlWriter::open("jsonl", &records_path)
        .with_context(|| format!("failed to open {}", records_path.display()))?;
    let sink = CsvTimingSink::open(&config.timing_file).with_context(|| {
        format!("failed to open timing file {}", config.timing_file.display())
    })?;

    let destinations = vec![
        Destination::primary(Arc::new(ErrorLogWriter::new("table", log))),
        Destination::secondary(Arc::new(jsonl)),
    ];
    Ok(FanOutDispatcher::new(destinations, Arc::new(sink))?)
}

fn print_record(id: &str, record: &LogRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("failed to render record")?;
    println!("#{} {}", id, json);
    Ok(())
}

async fn run(cli: Cli, config: FanlogConfig) -> Result<()> {
    let log = open_log(&config)?;

    match cli.command {
        Commands::Append(args) => {
            let id = log
                .log(&args.into_record())
                .await
                .context("failed to append record")?;
            println!("{}", id);
        }
        Commands::Dispatch(args) => {
            let dispatcher = build_dispatcher(&config, Arc::clone(&log))?;
            let timing = dispatcher
                .submit_all(&args.into_record())
                .await
                .context("dispatch failed")?;
            println!("{}", timing.to_line());
        }
        Commands::Get { id } => {
            let entry = log
                .get_error(&id)
                .await
                .with_context(|| format!("failed to read entry {}", id))?;
            print_record(&entry.id, &entry.record)?;
        }
        Commands::Page { page, size } => {
            let (entries, total) = log
                .get_errors(page, size)
                .await
                .context("failed to read page")?;
            println!("page {} ({} per page), {} entries total", page, size, total);
            for entry in &entries {
                println!(
                    "{:>8}  {}  {:<24} {:>3}  {}",
                    entry.id,
                    entry.record.time.format("%Y-%m-%d %H:%M:%S"),
                    entry.record.kind,
                    entry.record.status_code,
                    entry.record.message,
                );
            }
        }
        Commands::Count => {
            let count = log.count().await.context("failed to count entries")?;
            println!("{}", count);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fanlog=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FanlogConfig::from_env().context("invalid configuration")?;
    tracing::debug!(
        "fanlog home {}, table {}",
        config.home.display(),
        config.table
    );

    run(cli, config).await
}
