//! Vayu Sync - Command Line Host
//!
//! ```text
//! vayu-sync [ingest] [--device ID]   read sensor lines from stdin until EOF or Ctrl-C
//! vayu-sync report [START] [END]     print the bucket table (YYYY-MM-DD, default today)
//! vayu-sync stats                    print local store statistics
//! vayu-sync clear                    delete all locally stored buckets
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vayu_sync::config::{AppConfig, token_from_env};
use vayu_sync::helpers::is_development;
use vayu_sync::services::{
    DeviceHandle, DeviceId, FileKvStore, HttpRemoteClient, LineSource, LocalStore, Pipeline,
    RemoteSync, ReportService, ServiceEvent, Session, SessionOptions, StaticToken,
    TransportKind,
};

enum Command {
    Ingest { device: Option<String> },
    Report { start: Option<String>, end: Option<String> },
    Stats,
    Clear,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let Some(cmd) = args.next() else {
        return Ok(Command::Ingest { device: None });
    };
    match cmd.as_str() {
        "ingest" | "--device" => {
            let mut device = None;
            if cmd == "--device" {
                device = args.next();
            }
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--device" => device = args.next(),
                    other => bail!("unexpected argument '{other}'"),
                }
            }
            Ok(Command::Ingest { device })
        }
        "report" => Ok(Command::Report {
            start: args.next(),
            end: args.next(),
        }),
        "stats" => Ok(Command::Stats),
        "clear" => Ok(Command::Clear),
        other => bail!("unknown command '{other}' (expected ingest, report, stats or clear)"),
    }
}

fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let level = if is_development() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let file_appender = tracing_appender::rolling::daily(log_dir, "vayu-sync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let command = parse_args(std::env::args().skip(1))?;
    let config = AppConfig::load().context("failed to load configuration")?;
    let data_dir = config.data_dir().context("failed to prepare data directory")?;
    let _log_guard = init_tracing(&data_dir);

    tracing::info!(data_dir = ?data_dir, "Starting Vayu Sync...");

    let store = Arc::new(
        LocalStore::new(Arc::new(FileKvStore::new(&data_dir)))
            .with_retention_days(config.storage.retention_days),
    );

    match command {
        Command::Stats => {
            let stats = store.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clear => {
            store.clear().await?;
            println!("Local store cleared");
        }
        Command::Report { start, end } => {
            let remote = build_remote(&config)?;
            let device_id = reporting_device(&config, None);
            let report = ReportService::new(store, remote, device_id)
                .with_history_limit(config.remote.history_limit)
                .with_retention_days(config.storage.retention_days)
                .query(start.as_deref(), end.as_deref())
                .await?;
            print!("{}", report.render_table(&Local));
        }
        Command::Ingest { device } => {
            run_ingest(&config, store, device).await?;
        }
    }
    Ok(())
}

fn build_remote(config: &AppConfig) -> anyhow::Result<Arc<HttpRemoteClient>> {
    let client = HttpRemoteClient::with_timeout(
        &config.remote.base_url,
        Arc::new(StaticToken(token_from_env())),
        config.request_timeout(),
    )?
    .with_bucket_interval(config.bucket_interval());
    Ok(Arc::new(client))
}

fn reporting_device(config: &AppConfig, connected: Option<&DeviceId>) -> DeviceId {
    match (&config.remote.device_id, connected) {
        (Some(id), _) => DeviceId::from(id.as_str()),
        (None, Some(id)) => id.clone(),
        (None, None) => DeviceId::from("stdin"),
    }
}

async fn run_ingest(
    config: &AppConfig,
    store: Arc<LocalStore>,
    device: Option<String>,
) -> anyhow::Result<()> {
    let handle = DeviceHandle::new(
        device.unwrap_or_else(|| "stdin".to_string()),
        "stdin",
        TransportKind::Classic,
    );
    let device_id = reporting_device(config, Some(&handle.id));
    let client = build_remote(config)?;

    let registrar = client.clone();
    let mac_id = handle.id.to_string();
    tokio::spawn(async move {
        if let Err(e) = registrar.register_device(&mac_id).await {
            tracing::warn!(error = %e, "Device registration failed");
        }
    });

    let (tx, rx) = crossbeam_channel::unbounded();
    let remote: Arc<dyn RemoteSync> = client;
    let pipeline = Pipeline::new(device_id.clone(), store.clone(), remote.clone(), tx.clone())
        .with_interval_ms(config.bucketing.interval_ms)
        .with_live_capacity(config.bucketing.live_capacity);

    let reports = Arc::new(
        ReportService::new(store, remote, device_id)
            .with_history_limit(config.remote.history_limit)
            .with_retention_days(config.storage.retention_days),
    );
    let refresh_cancel = CancellationToken::new();
    let refresher = reports.clone().spawn_auto_refresh(
        None,
        None,
        config.report_refresh(),
        refresh_cancel.clone(),
        tx.clone(),
    );

    let session = Session::start(
        handle,
        Box::new(LineSource::new(BufReader::new(tokio::io::stdin()))),
        pipeline,
        SessionOptions::from_config(config),
        tx,
    );

    let printer = std::thread::spawn(move || {
        for event in rx {
            match event {
                ServiceEvent::Reading { reading, .. } => {
                    println!(
                        "{}  PM2.5 {:.1} ug/m3",
                        reading.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                        reading.value
                    );
                }
                ServiceEvent::BucketClosed { bucket, .. } => {
                    println!(
                        "bucket {}  avg {:.2}  min {:.1}  max {:.1}  n={}",
                        bucket.bucket_start.with_timezone(&Local).format("%H:%M"),
                        bucket.avg_value,
                        bucket.min_value,
                        bucket.max_value,
                        bucket.count
                    );
                }
                ServiceEvent::DataStale { silent_secs, .. } => {
                    eprintln!("no data from sensor for {silent_secs}s");
                }
                ServiceEvent::ReportRefreshed {
                    bucket_count,
                    source,
                } => {
                    eprintln!("today: {bucket_count} buckets ({source:?})");
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = session.closed() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted");
        }
    }
    refresh_cancel.cancel();
    let mut pipeline = session.disconnect().await?;
    pipeline.settle().await;
    drop(pipeline);
    if refresher.await.is_err() {
        tracing::warn!("Report refresh task panicked");
    }
    if printer.join().is_err() {
        tracing::warn!("Event printer thread panicked");
    }

    let report = reports.query(None, None).await?;
    print!("{}", report.render_table(&Local));
    Ok(())
}
