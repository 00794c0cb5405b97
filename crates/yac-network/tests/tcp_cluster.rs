//! Engines agreeing over real TCP connections with secp256k1 signatures

use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use yac_consensus::{
    ClusterOrdering, HashGate, Peer, Secp256k1CryptoProvider, TokioTimer, Yac, YacConfig,
    YacHandle, YacHash,
};
use yac_crypto::{public_key_to_address, PrivateKey};
use yac_network::{NetworkConfig, NetworkService};
use yac_primitives::H256;

/// Placeholder for members nobody dials
const UNDIALED: &str = "127.0.0.1:1";

struct Node {
    network: NetworkService,
    handle: YacHandle,
    engine: JoinHandle<()>,
}

/// Start `online` of `total` members and wait until they are fully meshed.
///
/// Members listen on ephemeral ports, so they start from the highest
/// identifier down: a member dials only higher identifiers, whose addresses
/// are known by then.
async fn start_cluster(total: usize, online: usize) -> (Vec<Node>, ClusterOrdering) {
    let mut keys: Vec<PrivateKey> = (0..total).map(|_| PrivateKey::random(&mut OsRng)).collect();
    keys.sort_by_key(|k| std::cmp::Reverse(public_key_to_address(k.verifying_key())));
    let offline = total - online;

    let mut peers: Vec<Peer> = Vec::new();
    let mut networks = Vec::new();
    for (i, key) in keys.iter().enumerate() {
        let id = public_key_to_address(key.verifying_key());
        if i < offline {
            peers.push(Peer::from_public_key(UNDIALED, key.verifying_key()));
            continue;
        }

        let mut members = peers.clone();
        members.extend(
            keys[i..]
                .iter()
                .map(|k| Peer::from_public_key(UNDIALED, k.verifying_key())),
        );
        let network = NetworkService::new(
            NetworkConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                peer_id: id,
                reconnect_interval: Duration::from_millis(50),
                ..Default::default()
            },
            members,
        );
        let addr = network.start().await.unwrap();
        peers.push(Peer::from_public_key(addr.to_string(), key.verifying_key()));
        networks.push((key.clone(), addr, network));
    }

    peers.sort_by_key(|p| p.id);
    let order = ClusterOrdering::new(peers).unwrap();

    let mut nodes = Vec::new();
    for (key, addr, network) in networks {
        let crypto = Arc::new(Secp256k1CryptoProvider::new(key, addr.to_string()));
        let (handle, engine) = Yac::spawn(
            Arc::new(network.clone()),
            crypto,
            Arc::new(TokioTimer::new()),
            order.clone(),
            YacConfig::with_delay(Duration::from_millis(100)),
        );
        network.set_handler(Arc::new(handle.clone()));
        nodes.push(Node {
            network,
            handle,
            engine,
        });
    }

    let mesh = online - 1;
    timeout(Duration::from_secs(10), async {
        while nodes.iter().any(|n| n.network.peer_count() < mesh) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("cluster meshed in time");

    (nodes, order)
}

async fn stop_cluster(nodes: Vec<Node>) {
    for node in nodes {
        node.network.stop();
        node.handle.shutdown();
        timeout(Duration::from_secs(5), node.engine)
            .await
            .expect("engine stopped")
            .unwrap();
    }
}

fn candidate(round: u64, tag: u8) -> YacHash {
    YacHash::new(round, H256::from_bytes([tag; 32]), H256::from_bytes([tag ^ 0xff; 32]))
}

async fn expect_commit(nodes: &[Node], hash: YacHash, order: &ClusterOrdering) {
    let mut subscriptions: Vec<_> = nodes.iter().map(|n| n.handle.subscribe_commits()).collect();
    for node in nodes {
        node.handle.vote(hash, order.clone());
    }
    for rx in &mut subscriptions {
        let committed = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("commit in time")
            .unwrap();
        assert_eq!(committed, hash);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tcp_cluster_commits() {
    let (nodes, order) = start_cluster(4, 4).await;
    assert_eq!(order.supermajority(), 3);

    expect_commit(&nodes, candidate(1, 0x11), &order).await;
    // the same connections carry the next round
    expect_commit(&nodes, candidate(2, 0x22), &order).await;

    stop_cluster(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tcp_cluster_tolerates_absent_member() {
    let (nodes, order) = start_cluster(4, 3).await;
    assert_eq!(nodes.len(), 3);

    expect_commit(&nodes, candidate(5, 0x55), &order).await;

    stop_cluster(nodes).await;
}
