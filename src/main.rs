//! ncm-downloader - entry point
//!
//! Reads the config document, asks for whatever the flags leave open, runs
//! one batch and prints a summary.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::LogLevel;
use clap::Parser;
use core_download::{BatchOptions, BatchReport, FileFailureLog, Orchestrator};
use core_metadata::LoftyTagInjector;
use core_runtime::config::{ConfigFile, DownloaderConfig, DEFAULT_FAILURE_LOG};
use core_runtime::events::{DownloadEvent, EventBus, EventStream, JobStatus};
use core_runtime::logging::{init_logging, LoggingConfig};
use provider_ncm::NcmCatalogClient;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info};

mod cli;

use cli::{Args, Prompter};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = LoggingConfig::default()
        .with_format(args.log_format.unwrap_or_default())
        .with_level(match args.verbose {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        });
    if let Err(e) = init_logging(logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    print_banner();

    let mut file = ConfigFile::load(&args.config)
        .with_context(|| format!("Failed to read {}", args.config.display()))?;

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    if prompter.complete_config(&mut file)? {
        file.save(&args.config)
            .with_context(|| format!("Failed to save {}", args.config.display()))?;
        info!(path = %args.config.display(), "Config saved");
    }
    let choices = prompter.choices(&args, &file)?;
    drop(prompter);

    let output_dir = args
        .output
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| ".".into());
    let failure_log_path = file
        .failure_log
        .clone()
        .unwrap_or_else(|| DEFAULT_FAILURE_LOG.into());

    let config = DownloaderConfig::builder()
        .api_base_url(file.ncmapi.clone().unwrap_or_default())
        .credential(file.cookie.clone().unwrap_or_default())
        .output_dir(output_dir)
        .failure_log_path(failure_log_path.clone())
        .build()
        .context("Invalid configuration")?;
    info!(config = ?config, "Configuration loaded");

    let http_client = Arc::new(ReqwestHttpClient::new().context("Failed to build HTTP client")?);
    let catalog = Arc::new(NcmCatalogClient::from_config(http_client.clone(), &config));
    let failure_log = Arc::new(FileFailureLog::new(failure_log_path.clone()));
    let events = EventBus::default();
    let printer = spawn_progress_printer(&events);

    let orchestrator = Orchestrator::new(
        config,
        catalog,
        http_client,
        Arc::new(LoftyTagInjector::new()),
        failure_log,
    )
    .with_event_bus(events);

    let options = BatchOptions::default()
        .with_quality(choices.quality)
        .with_lyric_mode(choices.lyric_mode)
        .with_concurrency(choices.concurrency);

    let report = match orchestrator.run(&choices.request, &options).await {
        Ok(report) => report,
        Err(e) => {
            printer.abort();
            return Err(e).context("Batch failed");
        }
    };
    printer.await.ok();

    print_summary(&report, &failure_log_path.display().to_string());
    Ok(())
}

fn print_banner() {
    println!("==============================================");
    println!(" ncm-downloader {}", env!("CARGO_PKG_VERSION"));
    println!("==============================================");
}

/// Print one line per job state change until the batch completes.
fn spawn_progress_printer(events: &EventBus) -> JoinHandle<()> {
    let mut stream = EventStream::new(events.subscribe()).filter(|event| {
        matches!(event, DownloadEvent::BatchCompleted { .. }) || progress_line(event).is_some()
    });

    tokio::spawn(async move {
        loop {
            match stream.recv().await {
                Ok(DownloadEvent::BatchCompleted { .. }) => break,
                Ok(event) => {
                    if let Some(line) = progress_line(&event) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn progress_line(event: &DownloadEvent) -> Option<String> {
    match event {
        DownloadEvent::BatchStarted { total, .. } => Some(format!("Queued {} song(s)", total)),
        DownloadEvent::FileStarted { file_name, .. } => Some(format!("Downloading: {}", file_name)),
        DownloadEvent::Progress {
            song_id,
            bytes_written,
            total_bytes,
        } => match (event.percent(), total_bytes) {
            // Whole tens only, the job reports every percent.
            (Some(pct), Some(_)) if pct % 10 == 0 => Some(format!("  {}: {}%", song_id, pct)),
            (_, None) => Some(format!("  {}: {} KiB", song_id, bytes_written / 1024)),
            _ => None,
        },
        DownloadEvent::JobRetrying {
            song_id,
            attempt,
            reason,
        } => Some(format!("  {}: retrying after attempt {} ({})", song_id, attempt, reason)),
        DownloadEvent::JobFinished {
            song_id,
            status,
            detail,
        } => Some(match status {
            JobStatus::Succeeded => format!("Done: {}", song_id),
            JobStatus::SkippedNoRights => format!("Skipped {}: no playable stream", song_id),
            JobStatus::Failed => format!(
                "Failed {}: {}",
                song_id,
                detail.as_deref().unwrap_or("unknown error")
            ),
        }),
        DownloadEvent::GroupSkipped { name, reason } => {
            Some(format!("Skipped {}: {}", name, reason))
        }
        _ => None,
    }
}

fn print_summary(report: &BatchReport, failure_log: &str) {
    println!();
    println!("{} succeeded, {} failed", report.succeeded, report.failed());
    if !report.failed_ids.is_empty() {
        println!("Failed ids: {}", report.failed_ids.join(", "));
    }
    if report.failed() > 0 || !report.skipped_groups.is_empty() {
        println!("Details: {}", failure_log);
    }
}
