//! Configuration types for yacd

use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use yac_consensus::{Peer, YacConfig};
use yac_crypto::{decode_private_key, decode_public_key, PrivateKey};

/// Cluster configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// This node
    pub node: NodeSection,
    /// Consensus timing
    #[serde(default)]
    pub consensus: ConsensusSection,
    /// Cluster members, in ordering order. Every node must list the same
    /// members in the same order.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

/// `[node]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Private key (hex)
    pub private_key: String,
    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

/// `[consensus]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    /// Vote retransmission delay
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Peers contacted per retransmission
    #[serde(default = "default_retry_fanout")]
    pub retry_fanout: usize,
    /// Round length
    #[serde(default = "default_round_interval_ms")]
    pub round_interval_ms: u64,
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_retry_fanout() -> usize {
    1
}

fn default_round_interval_ms() -> u64 {
    2000
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            retry_fanout: default_retry_fanout(),
            round_interval_ms: default_round_interval_ms(),
        }
    }
}

/// `[[peers]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Network address, `host:port`
    pub address: String,
    /// SEC1 public key (hex)
    pub public_key: String,
}

impl PeerEntry {
    /// Convert to a cluster member; the identifier is derived from the key
    pub fn to_peer(&self) -> Result<Peer> {
        let bytes = decode_hex(&self.public_key)
            .with_context(|| format!("public key of peer {}", self.address))?;
        let key = decode_public_key(&bytes)
            .with_context(|| format!("public key of peer {}", self.address))?;
        Ok(Peer::from_public_key(self.address.clone(), &key))
    }
}

/// Resolved node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Signing key
    pub key: PrivateKey,
    /// This node as a cluster member
    pub me: Peer,
    /// Cluster members, this node included
    pub peers: Vec<Peer>,
    /// Engine configuration
    pub yac: YacConfig,
    /// Round length
    pub round_interval: Duration,
    /// Log level
    pub log_level: String,
}

impl NodeConfig {
    /// Merge file values with CLI overrides and validate the result
    pub fn resolve(file: FileConfig, cli: &Cli) -> Result<Self> {
        let key_hex = cli.key.as_deref().unwrap_or(&file.node.private_key);
        let key = decode_private_key(&decode_hex(key_hex).context("private key")?)
            .context("private key")?;

        let peers = file
            .peers
            .iter()
            .map(PeerEntry::to_peer)
            .collect::<Result<Vec<_>>>()?;
        if peers.is_empty() {
            bail!("no peers configured");
        }

        let own = Peer::from_public_key(String::new(), key.verifying_key());
        let Some(me) = peers.iter().find(|p| p.id == own.id).cloned() else {
            bail!("own key {} is not among the configured peers", own.id);
        };

        let delay_ms = cli.delay_ms.unwrap_or(file.consensus.delay_ms);
        let round_interval_ms = cli
            .round_interval_ms
            .unwrap_or(file.consensus.round_interval_ms);
        if round_interval_ms == 0 {
            bail!("round interval must be positive");
        }

        Ok(Self {
            listen_addr: cli.listen.unwrap_or(file.node.listen_addr),
            key,
            me,
            peers,
            yac: YacConfig {
                delay: Duration::from_millis(delay_ms),
                retry_fanout: file.consensus.retry_fanout,
                ..Default::default()
            }
            .normalized(),
            round_interval: Duration::from_millis(round_interval_ms),
            log_level: cli
                .log_level
                .clone()
                .or(file.node.log_level)
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Load a TOML configuration file
pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rand::rngs::OsRng;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use yac_crypto::{encode_private_key, encode_public_key};

    fn keys(n: usize) -> Vec<PrivateKey> {
        (0..n).map(|_| PrivateKey::random(&mut OsRng)).collect()
    }

    fn toml_for(me: &PrivateKey, members: &[PrivateKey]) -> String {
        let mut out = format!(
            "[node]\nlisten_addr = \"127.0.0.1:7101\"\nprivate_key = \"0x{}\"\n\n[consensus]\ndelay_ms = 300\n",
            hex::encode(encode_private_key(me))
        );
        for (i, k) in members.iter().enumerate() {
            out.push_str(&format!(
                "\n[[peers]]\naddress = \"127.0.0.1:{}\"\npublic_key = \"{}\"\n",
                7101 + i,
                hex::encode(encode_public_key(k.verifying_key()))
            ));
        }
        out
    }

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_resolve() {
        let members = keys(4);
        let file = write(&toml_for(&members[1], &members));
        let cli = Cli::parse_from(["yacd"]);

        let config = NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:7101");
        assert_eq!(config.peers.len(), 4);
        assert_eq!(config.me.address, "127.0.0.1:7102");
        assert_eq!(config.me, config.peers[1]);
        assert_eq!(config.yac.delay, Duration::from_millis(300));
        assert_eq!(config.yac.retry_fanout, 1);
        assert_eq!(config.round_interval, Duration::from_millis(2000));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides() {
        let members = keys(2);
        let file = write(&toml_for(&members[0], &members));
        let other_key = hex::encode(encode_private_key(&members[1]));
        let cli = Cli::parse_from([
            "yacd",
            "--listen",
            "0.0.0.0:9000",
            "--key",
            other_key.as_str(),
            "--delay-ms",
            "50",
            "--round-interval-ms",
            "500",
            "--log-level",
            "debug",
        ]);

        let config = NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.me, config.peers[1]);
        assert_eq!(config.yac.delay, Duration::from_millis(50));
        assert_eq!(config.round_interval, Duration::from_millis(500));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_own_key_must_be_member() {
        let members = keys(3);
        let outsider = keys(1).remove(0);
        let file = write(&toml_for(&outsider, &members));
        let cli = Cli::parse_from(["yacd"]);

        let err = NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).unwrap_err();
        assert!(err.to_string().contains("not among the configured peers"));
    }

    #[test]
    fn test_no_peers_rejected() {
        let me = keys(1).remove(0);
        let file = write(&toml_for(&me, &[]));
        let cli = Cli::parse_from(["yacd"]);
        assert!(NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).is_err());
    }

    #[test]
    fn test_bad_public_key() {
        let me = keys(1).remove(0);
        let mut content = toml_for(&me, std::slice::from_ref(&me));
        content.push_str("\n[[peers]]\naddress = \"x:1\"\npublic_key = \"zz\"\n");
        let file = write(&content);
        let cli = Cli::parse_from(["yacd"]);

        let err = NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).unwrap_err();
        assert!(format!("{:#}", err).contains("public key of peer x:1"));
    }

    #[test]
    fn test_truncated_private_key_rejected() {
        let members = keys(2);
        let file = write(&toml_for(&members[0], &members));
        // drop the leading byte of an otherwise valid key
        let short_key = hex::encode(&encode_private_key(&members[0])[1..]);
        let cli = Cli::parse_from(["yacd", "--key", short_key.as_str()]);

        let err = NodeConfig::resolve(load_config_file(file.path()).unwrap(), &cli).unwrap_err();
        assert!(format!("{:#}", err).contains("private key"));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config_file(Path::new("/nonexistent/yac.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_consensus_defaults() {
        let section = ConsensusSection::default();
        assert_eq!(section.delay_ms, 1000);
        assert_eq!(section.retry_fanout, 1);
        assert_eq!(section.round_interval_ms, 2000);
    }
}
