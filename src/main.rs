//! Server binary: load config, init logging, run until SIGINT.

use std::path::PathBuf;

use clap::Parser;

use sluice::config::Config;
use sluice::server::RtmpServer;

#[derive(Parser, Debug)]
#[command(name = "sluice", about = "Live RTMP ingest and fan-out server")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "configs/default.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> sluice::Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        eprintln!(
            "config file {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };

    sluice::logging::init(&config.logging);
    tracing::info!(config = ?args.config, port = config.rtmp.port, "starting");

    let server = RtmpServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
