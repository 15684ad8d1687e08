//! User-facing output.

use std::io::Write as _;

use emrflow::events::Event;
use eyre::Context as _;
use eyre::Result;
use indicatif::ProgressBar;
use indicatif::ProgressStyle;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// The template of the upload progress bar.
const PROGRESS_TEMPLATE: &str =
    "{spinner:.cyan} Uploading... [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Prints a value as pretty JSON to stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize the response")?;
    println!("{json}");
    Ok(())
}

/// Creates the bar that shows the progress of artifact uploads.
pub fn upload_progress() -> Result<ProgressBar> {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .context("invalid progress template")?
        .progress_chars("=> ");

    Ok(ProgressBar::new(0).with_style(style))
}

/// Writes the content of a log stream to stdout as-is.
pub fn print_log(content: &[u8]) {
    let mut stdout = std::io::stdout().lock();

    if let Err(e) = stdout.write_all(content).and_then(|_| stdout.flush()) {
        warn!("failed to write log output: {e}");
    }
}

/// Prints events until every sender has been dropped.
pub async fn print_events(mut events: broadcast::Receiver<Event>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("{skipped} event(s) were dropped before they could be printed");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            Event::JobSubmitted { id, name } => {
                eprintln!("Job `{name}` submitted to EMR Serverless (job run id: {id})")
            }
            Event::JobStateChanged { state, .. } => eprintln!("Job state is now: {state}"),
            Event::DashboardAvailable { id, url } => eprintln!("Dashboard for `{id}`: {url}"),
            Event::LogOutput { content, .. } => print_log(&content),
            Event::LogReadFailed { stream, message, .. } => {
                eprintln!("Unable to read the {stream} log: {message}")
            }
            Event::JobFinished { id, state } => eprintln!("Job run `{id}` finished: {state}"),
        }
    }
}
