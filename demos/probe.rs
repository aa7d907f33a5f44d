//! Probe a pfod device: send commands, print the frames, keep a cache.
//!
//! ```text
//! cargo run --example probe -- --http 192.168.1.20 "{.}"
//! cargo run --example probe -- --serial tcp://10.0.0.9:4000 --baud 115200 "{.}" "{A}"
//! cargo run --example probe --features serial -- --serial /dev/ttyUSB0 "{.}"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pfod_link::{
    ConnectionConfig, ConnectionManager, CsvCollector, MessageCollector, PfodMessage,
    RawDataCollector, ResponseCache,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "probe", about = "Send pfod commands to a device")]
struct Args {
    /// Device address for HTTP (`host[:port]`)
    #[arg(long, conflicts_with_all = ["serial", "config"])]
    http: Option<String>,
    /// Serial port path or tcp://host:port bridge
    #[arg(long, conflicts_with = "config")]
    serial: Option<String>,
    #[arg(long, default_value_t = 9600)]
    baud: u32,
    /// JSON connection config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Response timeout in seconds (0 = never)
    #[arg(long)]
    timeout: Option<u32>,
    /// Response cache snapshot to load and update
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Print each frame as {"cmd":[...]} JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Dump the message log as CSV when done
    #[arg(long, default_value_t = false)]
    log_csv: bool,
    /// Commands to send, in order
    #[arg(default_value = "{.}")]
    commands: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &Args) -> pfod_link::Result<ConnectionConfig> {
    let mut config = if let Some(path) = &args.config {
        ConnectionConfig::from_json(&std::fs::read_to_string(path)?)?
    } else if let Some(port) = &args.serial {
        ConnectionConfig::serial(port.clone(), args.baud)
    } else {
        ConnectionConfig::http(args.http.clone().unwrap_or_else(|| "127.0.0.1".into()))
    };
    if let Some(secs) = args.timeout {
        config.response_timeout_secs = secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> pfod_link::Result<()> {
    init_logging();
    let args = Args::parse();
    let config = load_config(&args)?;

    let cache = match &args.cache {
        Some(path) if path.exists() => ResponseCache::load_json(path)?,
        _ => ResponseCache::new(),
    };
    let collector = Arc::new(MessageCollector::new());
    let raw = Arc::new(RawDataCollector::new());
    let csv = Arc::new(CsvCollector::new());

    let manager = ConnectionManager::builder(config)
        .collector(collector.clone())
        .observer(raw.clone())
        .observer(csv.clone())
        .build()?;
    let identity = manager.connection_identity();

    for command in &args.commands {
        match manager.send_with_retries(command).await {
            Ok(frame) => {
                if args.json {
                    println!("{}", PfodMessage::parse(&frame).to_json()?);
                } else {
                    println!("{}", frame);
                }
                cache.cache(&frame, command, &identity);
            }
            Err(e) => {
                tracing::error!(%command, error = %e, "Command failed");
            }
        }
    }
    manager.disconnect().await?;

    let raw_stats = raw.stats();
    if raw_stats.total_bytes > 0 {
        tracing::info!(
            bytes = raw_stats.total_bytes,
            lines = raw_stats.line_count,
            csv_lines = csv.total_stats().total_lines,
            "Device printed data outside frames"
        );
        eprint!("{}", raw.take());
    }

    if let Some(path) = &args.cache {
        cache.save_json(path)?;
    }
    if args.log_csv {
        println!("{}", collector.export_csv());
    }
    Ok(())
}
