mod cli;
mod config;
mod listener;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use vidfetch_engine::extractor::MediaInfo;
use vidfetch_engine::{DownloadEngine, DownloadError, DownloadTask};

use crate::cli::Args;
use crate::config::AppConfig;
use crate::listener::{LogListener, format_bytes};

/// How a single url ended when it did not fail.
enum Outcome {
    Completed,
    Paused,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every url was handled.
async fn run(args: Args) -> Result<bool> {
    let file_config = AppConfig::load(args.config.as_deref())?;
    let config = file_config.into_downloader_config(&args)?;
    let ignore_errors = config.ignore_errors;
    let engine = DownloadEngine::from_config(config).context("Failed to set up the downloader")?;

    if args.list_formats {
        for url in &args.urls {
            let info = engine
                .extract(url)
                .await
                .with_context(|| format!("Failed to extract {url}"))?;
            print_formats(&info);
        }
        return Ok(true);
    }

    let mut failed = 0usize;
    for url in &args.urls {
        match download(&engine, url).await {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Paused) => {
                warn!("Stopped. Run the same command again to resume");
                return Ok(false);
            }
            Err(e) if ignore_errors => {
                error!(url = %url, "{e}");
                failed += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to download {url}")),
        }
    }

    if failed > 0 {
        warn!("{failed} of {} urls failed", args.urls.len());
    }
    Ok(true)
}

async fn download(engine: &DownloadEngine, url: &str) -> Result<Outcome, DownloadError> {
    let mut task = engine.submit(url)?;
    let result = drive(engine, &mut task).await;
    engine.release(url);
    result
}

async fn drive(
    engine: &DownloadEngine,
    task: &mut DownloadTask,
) -> Result<Outcome, DownloadError> {
    engine.prepare(task).await?;
    info!(
        title = task.title(),
        format = task.format().map(|f| f.format_id()).unwrap_or_default(),
        "Downloading"
    );

    // Ctrl-C pauses the transfer so HLS fragments survive for a later run.
    let control = task.control().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping download");
            control.pause();
        }
    });

    let listener = Arc::new(LogListener::new(task.title()));
    let result = engine.download(task, listener).await;
    interrupt.abort();

    if result? {
        Ok(Outcome::Completed)
    } else {
        Ok(Outcome::Paused)
    }
}

fn print_formats(info: &MediaInfo) {
    println!("{} [{}]", info.title, info.id);
    println!(
        "{:<12} {:<6} {:<8} {:<12} {:>10}  {}",
        "ID", "EXT", "PROTO", "RESOLUTION", "SIZE", "CODECS"
    );
    for format in &info.formats {
        println!(
            "{:<12} {:<6} {:<8} {:<12} {:>10}  {}/{}",
            format.format_id(),
            format.ext(),
            format.protocol().as_str(),
            format.resolution().unwrap_or("unknown"),
            format.filesize().map(format_bytes).unwrap_or_default(),
            format.vcodec(),
            format.acodec()
        );
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
