use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use floorwatch::filter::parse_duration_arg;
use floorwatch::{report, EventSource, FileSource, FilterArgs, StreamSource};
use floorwatch_engine::{Engine, EngineConfig, Ingestor};
use floorwatch_types::StateFilter;
use tokio::net::TcpStream;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "floorwatch")]
#[command(about = "Resolve live status and health for factory equipment from raw telemetry")]
struct Args {
    /// Engine configuration file (TOML); FLOORWATCH_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Newline-delimited JSON file of raw events
    #[arg(short, long, default_value = "events.ndjson", conflicts_with_all = ["connect"])]
    file: PathBuf,

    /// Keep reading the file as it grows
    #[arg(long, conflicts_with_all = ["connect"])]
    follow: bool,

    /// Read raw events from a TCP endpoint (host:port)
    #[arg(short, long, conflicts_with_all = ["file"])]
    connect: Option<String>,

    /// Ingest the file, write a fleet report to this path and exit
    #[arg(short, long, conflicts_with_all = ["connect", "follow"])]
    export: Option<PathBuf>,

    /// How often to poll the event source (e.g., "250ms", "1s")
    #[arg(long, default_value = "250ms", value_parser = parse_duration_arg)]
    poll_interval: Duration,

    #[command(flatten)]
    filter: FilterArgs,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floorwatch=info".into()),
        )
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = EngineConfig::load(args.config.as_deref()).context("loading engine configuration")?;
    let filter = args.filter.to_filter()?;
    let engine = Engine::builder().config(config).build()?;

    // Handle export mode (non-interactive)
    if let Some(ref export_path) = args.export {
        return export_to_file(engine, &args.file, export_path, &filter, &args.filter).await;
    }

    let source: Box<dyn EventSource> = match args.connect {
        Some(ref addr) => {
            info!(addr = %addr, "connecting");
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            Box::new(StreamSource::spawn(stream, addr))
        }
        None => Box::new(FileSource::new(&args.file)),
    };

    // A TCP stream ends when the peer closes it; a file only with --follow unset
    let follow = args.follow || args.connect.is_some();
    run_watch(engine, source, filter, follow, args.poll_interval, &args.filter).await
}

/// Feed everything the source has to the engine.
async fn drain(source: &mut dyn EventSource, ingestor: &Ingestor) -> Result<usize> {
    let events = source.poll();
    let count = events.len();
    for event in events {
        ingestor.submit(event).await?;
    }
    Ok(count)
}

/// Print record updates for matching machines until the source is done.
async fn run_watch(
    engine: Engine,
    mut source: Box<dyn EventSource>,
    filter: StateFilter,
    follow: bool,
    poll_interval: Duration,
    filter_args: &FilterArgs,
) -> Result<()> {
    let mut updates = engine.subscribe(filter);
    let running = engine.start();
    let ingestor = running.ingestor();
    info!(source = source.description(), follow, "watching");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(poll_interval);
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            Some(record) = updates.recv() => {
                println!("{}", report::status_line(&record));
            }
            _ = ticker.tick() => {
                drain(source.as_mut(), &ingestor).await?;
                if source.error() != last_error.as_deref() {
                    if let Some(err) = source.error() {
                        warn!(source = source.description(), error = err, "event source error");
                    }
                    last_error = source.error().map(str::to_owned);
                }
                if !follow || source.is_closed() {
                    break;
                }
            }
        }
    }

    let engine = running.shutdown().await;
    while let Some(record) = updates.try_recv() {
        println!("{}", report::status_line(&record));
    }
    if updates.dropped() > 0 {
        warn!(dropped = updates.dropped(), "terminal fell behind; intermediate updates were coalesced");
    }

    let summary = engine.collect().summary(filter_args.stale_after_ms());
    info!(
        machines = summary.total,
        running = summary.running,
        fault = summary.fault,
        under_maintenance = summary.under_maintenance,
        critical = summary.critical,
        stale = summary.stale,
        "fleet summary"
    );
    Ok(())
}

/// Ingest the whole file, then export the fleet report.
async fn export_to_file(
    engine: Engine,
    events_path: &Path,
    export_path: &Path,
    filter: &StateFilter,
    filter_args: &FilterArgs,
) -> Result<()> {
    let mut source = FileSource::new(events_path);
    let running = engine.start();
    let submitted = drain(&mut source, &running.ingestor()).await?;
    let engine = running.shutdown().await;

    if let Some(err) = source.error() {
        if source.lines_read() == 0 {
            bail!("{}: {}", source.description(), err);
        }
        warn!(source = source.description(), error = err, "some events were skipped");
    }

    let report = report::build(
        &engine.collect(),
        filter,
        filter_args.stale_after_ms(),
        &engine.stats(),
    );
    report::write(&report, export_path)?;

    info!(submitted, stats = ?engine.stats(), "ingestion finished");
    println!("Exported fleet report to: {}", export_path.display());
    Ok(())
}
