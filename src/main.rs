use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Deserialize;

use tftpd::server::DEFAULT_ADDR;
use tftpd::{Config, DirHandler, Server};

/// Read-only TFTP file server
#[derive(Parser)]
#[command(name = "tftpd", version, about)]
struct Cli {
    /// Address to listen on (host:port)
    #[arg(short, long)]
    addr: Option<String>,

    /// Directory to serve files from
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Seconds to wait for each peer ACK before giving up on a transfer
    #[arg(short, long)]
    timeout: Option<u64>,

    /// TOML configuration file; command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// On-disk configuration, all fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    addr: Option<String>,
    dir: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    timeout: Option<Duration>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<FileConfig>(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    let addr = cli
        .addr
        .or(file.addr)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let dir = cli.dir.or(file.dir).unwrap_or_else(|| PathBuf::from("."));
    let timeout = cli.timeout.map(Duration::from_secs).or(file.timeout);

    anyhow::ensure!(dir.is_dir(), "directory does not exist: {}", dir.display());

    info!("Starting TFTP server on {addr}");
    info!("Root directory: {}", dir.display());
    match timeout {
        Some(t) => info!("Ack timeout: {t:?}"),
        None => info!("Ack timeout: none (waits indefinitely)"),
    }

    let mut config = Config::new().with_addr(addr);
    if let Some(t) = timeout {
        config = config.with_timeout(t);
    }

    let handler = Arc::new(DirHandler::new(dir));
    Server::bind(&config, handler)?.serve()
}
