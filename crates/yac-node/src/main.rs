//! YAC consensus node binary
//!
//! Runs one cluster member: TCP transport, YAC engine and a round driver.

mod cli;
mod config;
mod driver;

use anyhow::{Context, Result};
use cli::Cli;
use config::{load_config_file, NodeConfig};
use driver::RoundDriver;
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yac_consensus::{ClusterOrdering, Secp256k1CryptoProvider, TokioTimer, Yac};
use yac_crypto::{encode_private_key, encode_public_key, public_key_to_address, PrivateKey};
use yac_network::{NetworkConfig, NetworkService};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    if cli.keygen {
        print_keypair();
        return Ok(());
    }

    let file = load_config_file(&cli.config)?;
    let config = NodeConfig::resolve(file, &cli)?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!(
        peer = %config.me.id,
        listen = %config.listen_addr,
        peers = config.peers.len(),
        "YAC node starting"
    );

    run(config, cli.rounds).await?;

    tracing::info!("YAC node stopped");
    Ok(())
}

/// Wire transport, engine and driver, and run until shutdown
async fn run(config: NodeConfig, rounds: Option<u64>) -> Result<()> {
    let order = ClusterOrdering::new(config.peers.clone()).context("cluster ordering")?;
    tracing::info!(
        fault_tolerance = order.fault_tolerance(),
        supermajority = order.supermajority(),
        "Cluster ordering"
    );

    let network = NetworkService::new(
        NetworkConfig {
            listen_addr: config.listen_addr,
            peer_id: config.me.id,
            ..Default::default()
        },
        config.peers.clone(),
    );
    let crypto = Arc::new(Secp256k1CryptoProvider::new(
        config.key.clone(),
        config.me.address.clone(),
    ));

    let (handle, engine) = Yac::spawn(
        Arc::new(network.clone()),
        crypto,
        Arc::new(TokioTimer::new()),
        order.clone(),
        config.yac.clone(),
    );
    network.set_handler(Arc::new(handle.clone()));
    network.start().await.context("starting network")?;

    // Handle Ctrl+C for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let driver = RoundDriver::new(
        Arc::new(handle.clone()),
        order,
        config.round_interval,
        rounds,
    );
    let stats = driver.run(shutdown_rx).await;
    tracing::info!(rounds = stats.rounds, committed = stats.committed, "Summary");

    network.stop();
    handle.shutdown();
    engine.await.context("engine task")?;
    Ok(())
}

/// Print a fresh key pair with its derived peer identifier
fn print_keypair() {
    let key = PrivateKey::random(&mut OsRng);
    let public = key.verifying_key();
    println!("private_key = \"0x{}\"", hex::encode(encode_private_key(&key)));
    println!("public_key  = \"{}\"", hex::encode(encode_public_key(public)));
    println!("peer_id     = \"{}\"", public_key_to_address(public));
}
