//! Runs one upload and renders its events.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blobup_http::{HttpSigningService, HttpTransport};
use blobup_transfer::ThroughputMeter;
use blobup_uploader::{FileSource, ProgressSnapshot, UploadEvent, UploadOutcome, UploadSession};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

use crate::Cli;
use crate::config::Config;

const EVENT_BUFFER: usize = 1024;

pub async fn run(config: Config, cli: &Cli) -> anyhow::Result<UploadOutcome> {
    let path = cli.file.as_deref().context("no file given")?;

    let signer = HttpSigningService::new(&config.signer).context("signing endpoint")?;
    let transport = HttpTransport::new()?;
    let session = UploadSession::new(config.uploader, Arc::new(signer), Arc::new(transport))?;

    let source = open_source(path, cli.content_type.as_deref()).await?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    session.events().forward_to(tx);
    let reporter = tokio::spawn(render(rx, cli.json));

    let abort = session.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, aborting upload");
            abort.abort();
        }
    });

    let result = session.start(Arc::new(source)).await;

    interrupt.abort();
    // Dropping the handlers closes the channel and ends the reporter.
    session.events().clear();
    let _ = reporter.await;

    Ok(result?)
}

async fn open_source(path: &Path, content_type: Option<&str>) -> anyhow::Result<FileSource> {
    let source = FileSource::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(match content_type {
        Some(mime) => source.with_mime_type(mime),
        None => source,
    })
}

async fn render(mut rx: mpsc::Receiver<UploadEvent>, as_json: bool) {
    let mut meter = ThroughputMeter::default();

    while let Some(event) = rx.recv().await {
        if as_json {
            println!("{}", event_json(&event));
            continue;
        }

        let mut err = std::io::stderr();
        match event {
            UploadEvent::ProgressStats(snapshot) => {
                meter.record(snapshot.uploaded);
                let _ = write!(err, "\r{}", progress_line(&snapshot, &meter));
                let _ = err.flush();
            }
            UploadEvent::Finishing => {
                let _ = writeln!(err, "\nfinishing upload");
            }
            UploadEvent::Complete(result) => println!("{result}"),
            UploadEvent::Error(report) => {
                let _ = writeln!(err, "\nerror: {} ({})", report.error, report.result);
            }
            UploadEvent::Cancel(report) => {
                let _ = writeln!(err, "\n{}", report.result.message);
            }
            UploadEvent::BeforeUpload | UploadEvent::StartUpload | UploadEvent::Progress(_) => {}
        }
    }
}

fn event_json(event: &UploadEvent) -> serde_json::Value {
    let data = match event {
        UploadEvent::BeforeUpload | UploadEvent::StartUpload | UploadEvent::Finishing => {
            serde_json::Value::Null
        }
        UploadEvent::Progress(percent) => json!(percent),
        UploadEvent::ProgressStats(snapshot) => json!(snapshot),
        UploadEvent::Complete(result) => result.clone(),
        UploadEvent::Error(report) => json!(report),
        UploadEvent::Cancel(report) => json!(report),
    };
    json!({ "event": event.kind().as_str(), "data": data })
}

fn progress_line(snapshot: &ProgressSnapshot, meter: &ThroughputMeter) -> String {
    let remaining = snapshot.total.saturating_sub(snapshot.uploaded);
    let eta = meter
        .eta(remaining)
        .map(format_duration)
        .unwrap_or_else(|| "--".into());
    format!(
        "{:5.1}% {}/{} parts {}/{} {}/s eta {}",
        snapshot.percent * 100.0,
        format_bytes(snapshot.uploaded),
        format_bytes(snapshot.total),
        snapshot.parts_completed,
        snapshot.parts,
        format_bytes(meter.bytes_per_second() as u64),
        eta,
    )
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
