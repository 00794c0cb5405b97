//! CLI argument parsing for yacd

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// YAC consensus node
#[derive(Parser, Debug, Clone)]
#[command(name = "yacd")]
#[command(about = "YAC consensus node")]
#[command(version)]
pub struct Cli {
    /// Cluster configuration file (TOML)
    #[arg(long, short, default_value = "yac.toml")]
    pub config: PathBuf,

    /// Listen address, overrides `node.listen_addr`
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Private key (hex), overrides `node.private_key`
    #[arg(long)]
    pub key: Option<String>,

    /// Log level (trace, debug, info, warn, error), overrides `node.log_level`
    #[arg(long)]
    pub log_level: Option<String>,

    /// Vote retransmission delay in milliseconds, overrides `consensus.delay_ms`
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Round length in milliseconds, overrides `consensus.round_interval_ms`
    #[arg(long)]
    pub round_interval_ms: Option<u64>,

    /// Stop after this many rounds
    #[arg(long)]
    pub rounds: Option<u64>,

    /// Print a fresh key pair and exit
    #[arg(long)]
    pub keygen: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
