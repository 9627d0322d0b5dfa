//! logship binary
//!
//! Reads newline-delimited JSON records from stdin and ships them.

use clap::Parser;
use logship::config::ShipperConfig;
use logship::sink::{LevelFilter, Sink};
use std::future::Future;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "logship")]
#[command(about = "Ship newline-delimited JSON logs from stdin in signed batches")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/logship.toml")]
    config: PathBuf,

    /// Ingestion endpoint host
    #[arg(long)]
    endpoint: Option<String>,

    /// Project name
    #[arg(long)]
    project: Option<String>,

    /// Log store name
    #[arg(long)]
    store: Option<String>,

    /// Log group topic
    #[arg(long)]
    topic: Option<String>,

    /// Only ship records at INFO or above
    #[arg(long)]
    info_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if args.verbose {
            "logship=debug,info"
        } else {
            "logship=info,warn,error"
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting logship v{}", env!("CARGO_PKG_VERSION"));

    let path = args.config.exists().then_some(args.config.as_path());
    if path.is_none() {
        info!("Config file not found, using environment only");
    }
    let mut config = match ShipperConfig::load(path) {
        Ok(config) => config,
        Err(e) if has_overrides(&args) => {
            warn!("{}, applying command line overrides", e);
            ShipperConfig::load_unvalidated(path)?
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(project) = args.project {
        config.project = project;
    }
    if let Some(store) = args.store {
        config.store = store;
    }
    if let Some(topic) = args.topic {
        config.topic = topic;
    }
    config.verbose |= args.verbose;

    let mut builder = Sink::builder(config).on_error(|e| error!("Delivery failed: {}", e));
    if args.info_only {
        builder = builder.filter(LevelFilter::info());
    }
    let sink = builder.build()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    let written = pump(BufReader::new(tokio::io::stdin()), &sink, shutdown).await;

    info!("Flushing {} queued records", sink.worker().queued());
    sink.close().await;

    info!("logship stopped after {} records", written);
    Ok(())
}

/// Write every line of `input` into `sink` until EOF or `shutdown` resolves.
/// A write waiting on a full queue is abandoned when `shutdown` fires.
async fn pump<R, F>(input: R, sink: &Sink, shutdown: F) -> u64
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut written = 0u64;
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => break,
        };
        let line = match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };

        let result = tokio::select! {
            result = sink.write(line.as_bytes()) => result,
            _ = &mut shutdown => break,
        };
        match result {
            Ok(_) => written += 1,
            Err(e) if e.is_closed() => break,
            Err(e) => warn!("Skipping record: {}", e),
        }
    }

    written
}

fn has_overrides(args: &Args) -> bool {
    args.endpoint.is_some() || args.project.is_some() || args.store.is_some() || args.topic.is_some()
}
