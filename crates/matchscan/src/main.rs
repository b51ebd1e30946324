use std::process::ExitCode;
use std::time::Instant;

use matchscan::app::{AppError, ScanOutcome, execute};
use matchscan::cli::parse_cli;
use matchscan::progress::{PROGRESS_CHANNEL_CAPACITY, drive_progress, sweep_bar};
use matchscan::report::JsonReporter;
use matchscan::settings::{EffectiveSettings, resolve_settings};
use matchscan_decoder::{Backend, Configuration};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchscan=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (cli, sources) = parse_cli();
    if cli.list_backends {
        print_available_backends();
        return ExitCode::SUCCESS;
    }

    let settings = match resolve_settings(&cli, &sources) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = settings.config_path.as_ref() {
        info!(config = %path.display(), "loaded configuration");
    }

    match run(settings).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the sweep covered the whole video.
async fn run(settings: EffectiveSettings) -> Result<bool, AppError> {
    let progress = sweep_bar(!settings.display);
    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let progress_task = tokio::spawn(drive_progress(progress.clone(), progress_rx, Instant::now()));

    let json = settings.json.clone();
    let scan = tokio::task::spawn_blocking(move || execute(&settings, Some(progress_tx)));
    let result = match scan.await {
        Ok(result) => result,
        Err(err) => {
            progress.abandon_with_message("scan task panicked");
            error!(error = %err, "scan task failed to complete");
            return Ok(false);
        }
    };
    let summary = progress_task.await.unwrap_or_default();

    let ScanOutcome { report, labels } = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            progress.abandon_with_message(format!("failed after {} samples", summary.samples));
            return Err(err);
        }
    };

    if let Some(json) = json {
        JsonReporter::new(&json.dir, json.pretty)
            .write(&report, &labels)
            .await?;
        info!(dir = %json.dir.display(), "wrote JSON reports");
    }

    if let Some(failure) = report.sweep_failure.as_ref() {
        progress.abandon_with_message(format!("decode failed after {} samples", summary.samples));
        error!(error = %failure, samples = report.history.len(), "sweep aborted; results are partial");
        return Ok(false);
    }
    progress.finish_with_message(format!(
        "{} samples, {} detected, {} segments",
        summary.samples,
        summary.detected,
        report.refined.len()
    ));
    Ok(report.is_complete())
}

fn print_available_backends() {
    let names: Vec<&'static str> = Configuration::available_backends()
        .iter()
        .map(Backend::as_str)
        .collect();
    println!("available backends: {}", names.join(", "));
}
