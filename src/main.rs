/*!
 * Ferry CLI - chunked S3 downloads and uploads
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use ferry::config::{DownloadMode, LogLevel, TransferConfig};
use ferry::error::{TransferError, EXIT_FATAL, EXIT_SUCCESS};
use ferry::logging;
use ferry::protocol::s3::{RegionCache, S3Client};
use ferry::protocol::{parse_s3_uri, UploadOptions};
use ferry::transfer::progress::{throughput_mibps, ProgressEvent, ProgressReporter};
use ferry::transfer::{Downloader, TransferRequest, Uploader};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about = "Concurrent chunked transfers to and from S3-compatible storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// AWS region (discovered per bucket when omitted)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Custom endpoint URL (MinIO, LocalStack)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Use path-style addressing
    #[arg(long = "path-style", global = true)]
    path_style: bool,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of the terminal
    #[arg(long = "log-file", value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Hide the progress bar
    #[arg(long = "no-progress", global = true)]
    no_progress: bool,

    /// Print the transfer report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an object to a local file
    Download {
        /// Source object, s3://bucket/key[?versionId=...]
        source: String,

        /// Destination file
        destination: PathBuf,

        /// Download mode: auto, single_request or get_range
        #[arg(long)]
        mode: Option<String>,

        /// Concurrent requests per batch
        #[arg(short = 't', long)]
        threads: Option<usize>,

        /// Fixed chunk size in bytes (required for get_range)
        #[arg(long = "chunk-size")]
        chunk_size: Option<u64>,
    },

    /// Upload a local file to an object
    Upload {
        /// Source file
        source: PathBuf,

        /// Destination object, s3://bucket/key
        destination: String,

        /// Files at or above this many bytes use multipart upload
        #[arg(long)]
        threshold: Option<u64>,

        /// Multipart part size in bytes
        #[arg(long = "part-size")]
        part_size: Option<u64>,

        /// Concurrent part uploads
        #[arg(short = 't', long)]
        threads: Option<usize>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<TransferError>()
                .map_or(EXIT_FATAL, TransferError::exit_code)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(execute(cli, config))
}

/// Merge the config file with command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<TransferConfig> {
    let mut config = match &cli.config {
        Some(path) => TransferConfig::from_file(path)?,
        None => TransferConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    config.verbose |= cli.verbose;

    if cli.region.is_some() {
        config.s3.region = cli.region.clone();
    }
    if cli.endpoint.is_some() {
        config.s3.endpoint = cli.endpoint.clone();
        config.s3.force_path_style = true;
    }
    config.s3.force_path_style |= cli.path_style;

    match &cli.command {
        Commands::Download {
            mode,
            threads,
            chunk_size,
            ..
        } => {
            if let Some(mode) = mode {
                config.mode = mode.parse::<DownloadMode>()?;
            }
            if let Some(threads) = threads {
                config.thread_count = *threads;
            }
            if chunk_size.is_some() {
                config.chunk_size = *chunk_size;
            }
        }
        Commands::Upload {
            threshold,
            part_size,
            threads,
            ..
        } => {
            if let Some(threshold) = threshold {
                config.multipart_threshold = *threshold;
            }
            if part_size.is_some() {
                config.multipart_part_size = *part_size;
            }
            if let Some(threads) = threads {
                config.thread_count = *threads;
            }
        }
    }

    config.validate()?;
    Ok(config)
}

async fn execute(cli: Cli, config: TransferConfig) -> anyhow::Result<()> {
    let regions = Arc::new(RegionCache::new());
    regions.subscribe(|bucket, region| {
        tracing::debug!(bucket, region, "region cached");
    });

    let (reporter, receiver) = ProgressReporter::new();
    let renderer = tokio::spawn(render_progress(receiver, !cli.no_progress));

    let outcome = match cli.command {
        Commands::Download {
            source,
            destination,
            ..
        } => {
            let location = parse_s3_uri(&source)?;
            let client = S3Client::for_bucket(config.s3.clone(), &location.bucket, regions)
                .await
                .map_err(|e| TransferError::remote(format!("connect to {}", location.bucket), e))?;

            let request = TransferRequest::new(location, destination)
                .with_mode(config.mode)
                .with_thread_count(config.thread_count)
                .with_chunk_size(config.chunk_size);
            let downloader = Downloader::new(Arc::new(client)).with_progress(reporter);

            downloader.download(&request).await.map(|report| {
                print_report(cli.json, &report, || {
                    format!(
                        "Downloaded {} bytes to {} ({}, {} chunks in {} batches, {:.2} MiB/s)",
                        report.bytes_written,
                        request.destination.display(),
                        report.strategy,
                        report.chunks,
                        report.batches,
                        throughput_mibps(report.bytes_written, report.duration)
                    )
                })
            })
        }
        Commands::Upload {
            source,
            destination,
            ..
        } => {
            let location = parse_s3_uri(&destination)?;
            let client = Arc::new(
                S3Client::for_bucket(config.s3.clone(), &location.bucket, regions)
                    .await
                    .map_err(|e| {
                        TransferError::remote(format!("connect to {}", location.bucket), e)
                    })?,
            );

            let uploader = Uploader::new(client.clone(), client)
                .with_threshold(config.multipart_threshold)
                .with_options(UploadOptions {
                    part_size: config.multipart_part_size,
                    concurrency: config.thread_count,
                })
                .with_progress(reporter);

            uploader.upload(&source, &location).await.map(|report| {
                print_report(cli.json, &report, || {
                    format!(
                        "Uploaded {} bytes to {} ({}, {:.2} MiB/s)",
                        report.bytes,
                        location,
                        report.route,
                        throughput_mibps(report.bytes, report.duration)
                    )
                })
            })
        }
    };

    // Reporter dropped with the transfer; the renderer drains and exits
    let _ = renderer.await;
    outcome?;
    Ok(())
}

fn print_report<T: serde::Serialize>(json: bool, report: &T, summary: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Warning: Failed to serialize report: {}", e),
        }
    } else {
        println!("{}", summary());
    }
}

/// Drive a byte progress bar from transfer events
async fn render_progress(mut receiver: UnboundedReceiver<ProgressEvent>, visible: bool) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = receiver.recv().await {
        if !visible {
            continue;
        }
        match event {
            ProgressEvent::TransferStarted {
                key, total_bytes, ..
            } => {
                let pb = match total_bytes {
                    Some(total) => ProgressBar::new(total),
                    None => ProgressBar::new_spinner(),
                };
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg}\n{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb.set_message(key);
                bar = Some(pb);
            }
            ProgressEvent::ChunkCompleted { chunk_bytes, .. } => {
                if let Some(pb) = &bar {
                    pb.inc(chunk_bytes);
                }
            }
            ProgressEvent::BatchCompleted { batch, .. } => {
                if let Some(pb) = &bar {
                    pb.set_prefix(format!("batch {}", batch));
                }
            }
            ProgressEvent::TransferCompleted { total_bytes, .. } => {
                if let Some(pb) = bar.take() {
                    pb.set_position(total_bytes);
                    pb.finish_and_clear();
                }
            }
            ProgressEvent::TransferFailed { .. } => {
                if let Some(pb) = bar.take() {
                    pb.abandon();
                }
            }
        }
    }
}
