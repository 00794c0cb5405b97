//! Network service

use crate::error::{NetworkError, NetworkResult};
use crate::peer::{read_message, write_message, PeerConnection, PeerInfo, PeerManager};
use crate::types::{ConsensusPayload, Handshake, Message, MessageType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use yac_consensus::{
    CommitMessage, Peer, RejectMessage, VoteMessage, YacNetwork, YacNetworkNotifications,
};
use yac_primitives::Address;

/// Time allowed for the handshake exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type SharedHandler = Arc<RwLock<Option<Arc<dyn YacNetworkNotifications>>>>;

/// Network service configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Maximum peers
    pub max_peers: usize,
    /// Protocol version
    pub protocol_version: u32,
    /// Our peer identifier
    pub peer_id: Address,
    /// Pause between dialing rounds for missing peers
    pub reconnect_interval: Duration,
    /// Outbound queue length per peer
    pub send_queue: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7001)),
            max_peers: 64,
            protocol_version: 1,
            peer_id: Address::ZERO,
            reconnect_interval: Duration::from_secs(2),
            send_queue: 256,
        }
    }
}

/// TCP transport between cluster members.
///
/// Each pair of members shares one connection: the member with the lower
/// identifier dials, the other accepts. Inbound consensus messages are handed
/// to the registered [`YacNetworkNotifications`] handler tagged with the
/// sending member.
#[derive(Clone)]
pub struct NetworkService {
    /// Configuration
    config: NetworkConfig,
    /// Cluster members by identifier
    members: Arc<HashMap<Address, Peer>>,
    /// Peer manager
    peers: Arc<PeerManager>,
    /// Receiver of inbound consensus messages
    handler: SharedHandler,
    /// Bound listen address once started
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
    /// Running flag
    running: Arc<RwLock<bool>>,
    /// Stop signal for background tasks
    shutdown: Arc<watch::Sender<bool>>,
    /// Connection serial counter
    next_conn_id: Arc<AtomicU64>,
}

impl NetworkService {
    /// Create a service for a cluster of `members`
    pub fn new(config: NetworkConfig, members: Vec<Peer>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            peers: Arc::new(PeerManager::new(config.max_peers)),
            members: Arc::new(members.into_iter().map(|p| (p.id, p)).collect()),
            config,
            handler: Arc::new(RwLock::new(None)),
            local_addr: Arc::new(RwLock::new(None)),
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(shutdown),
            next_conn_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register the receiver of inbound consensus messages
    pub fn set_handler(&self, handler: Arc<dyn YacNetworkNotifications>) {
        *self.handler.write() = Some(handler);
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Get peer count
    pub fn peer_count(&self) -> usize {
        self.peers.peer_count()
    }

    /// Get connected peer IDs
    pub fn connected_peers(&self) -> Vec<Address> {
        self.peers.peer_ids()
    }

    /// Whether a connection to `peer_id` is open
    pub fn is_connected(&self, peer_id: &Address) -> bool {
        self.peers.has_peer(peer_id)
    }

    /// Get peer info
    pub fn get_peer(&self, peer_id: &Address) -> Option<PeerInfo> {
        self.peers.get_peer(peer_id)
    }

    /// Get our peer ID
    pub fn peer_id(&self) -> Address {
        self.config.peer_id
    }

    /// Bound listen address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Start listening and dialing. Returns the bound address.
    pub async fn start(&self) -> NetworkResult<SocketAddr> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(NetworkError::AlreadyRunning);
            }
            *running = true;
        }

        let listener = match TcpListener::bind(self.config.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.running.write() = false;
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;
        *self.local_addr.write() = Some(local_addr);
        self.shutdown.send_if_modified(|stopped| std::mem::replace(stopped, false));
        info!(addr = %local_addr, peer_id = %self.config.peer_id, "Listening");

        // Accept incoming connections
        let service = self.clone();
        let mut stop = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "Incoming connection");
                            let service = service.clone();
                            tokio::spawn(async move {
                                if let Err(e) = service.handle_connection(stream, addr, None).await {
                                    warn!(%addr, error = %e, "Inbound connection failed");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "Accept error"),
                    },
                }
            }
            debug!("Accept loop stopped");
        });

        // Dial missing peers
        let service = self.clone();
        let mut stop = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.reconnect_interval);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => service.dial_missing().await,
                }
            }
            debug!("Dialer stopped");
        });

        Ok(local_addr)
    }

    /// Stop the service and close every connection
    pub fn stop(&self) {
        *self.running.write() = false;
        self.shutdown.send_replace(true);
        for conn in self.peers.clear() {
            let _ = conn.try_send(Message::disconnect());
        }
        info!(peer_id = %self.config.peer_id, "Network stopped");
    }

    /// Members this node is responsible for dialing that are not connected
    fn dial_targets(&self) -> Vec<Peer> {
        let me = self.config.peer_id;
        self.members
            .values()
            .filter(|p| p.id > me && !self.peers.has_peer(&p.id))
            .cloned()
            .collect()
    }

    async fn dial_missing(&self) {
        for peer in self.dial_targets() {
            if let Err(e) = self.connect(&peer).await {
                debug!(peer = %peer, addr = %peer.address, error = %e, "Dial failed");
            }
        }
    }

    /// Connect to a member
    pub async fn connect(&self, peer: &Peer) -> NetworkResult<()> {
        if !self.peers.can_accept() {
            return Err(NetworkError::ConnectionFailed("max peers reached".into()));
        }

        debug!(peer = %peer, addr = %peer.address, "Connecting");
        let stream = TcpStream::connect(peer.address.as_str()).await?;
        let addr = stream.peer_addr()?;
        self.handle_connection(stream, addr, Some(peer.id)).await?;
        Ok(())
    }

    async fn handshake(
        &self,
        stream: &mut TcpStream,
        expected: Option<Address>,
    ) -> NetworkResult<Peer> {
        let ours = Handshake::new(self.config.protocol_version, self.config.peer_id);
        write_message(stream, &Message::handshake(&ours)?).await?;

        let theirs = read_message(stream).await?.to_handshake()?;
        if theirs.version != self.config.protocol_version {
            return Err(NetworkError::Protocol(format!(
                "version mismatch: ours {}, theirs {}",
                self.config.protocol_version, theirs.version
            )));
        }
        if theirs.peer_id == self.config.peer_id {
            return Err(NetworkError::Protocol("connected to self".into()));
        }
        if let Some(expected) = expected {
            if theirs.peer_id != expected {
                return Err(NetworkError::Protocol(format!(
                    "expected peer {}, got {}",
                    expected, theirs.peer_id
                )));
            }
        }
        self.members
            .get(&theirs.peer_id)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(theirs.peer_id))
    }

    /// Handshake, register and spawn the reader and writer of a connection
    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        expected: Option<Address>,
    ) -> NetworkResult<Address> {
        let peer = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.handshake(&mut stream, expected))
            .await
            .map_err(|_| NetworkError::Timeout(format!("handshake with {}", addr)))??;
        let peer_id = peer.id;
        let inbound = expected.is_none();

        let (tx, rx) = mpsc::channel::<Message>(self.config.send_queue.max(1));
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(PeerConnection {
            peer_id,
            conn_id,
            sender: tx,
        });
        self.peers
            .add_peer(PeerInfo::new(peer_id, addr, inbound), conn)?;

        info!(peer = %peer_id, %addr, inbound, "Peer connected");

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(Self::write_loop(write_half, rx, self.shutdown.subscribe()));

        let service = self.clone();
        tokio::spawn(async move {
            service.read_loop(read_half, peer).await;
            if service.peers.remove_peer(&peer_id, conn_id) {
                info!(peer = %peer_id, "Peer disconnected");
            }
        });

        Ok(peer_id)
    }

    async fn write_loop(
        mut write_half: tokio::net::tcp::OwnedWriteHalf,
        mut rx: mpsc::Receiver<Message>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            let msg = tokio::select! {
                _ = stop.changed() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            let last = msg.msg_type == MessageType::Disconnect;
            if write_message(&mut write_half, &msg).await.is_err() || last {
                break;
            }
        }
    }

    async fn read_loop(&self, read_half: tokio::net::tcp::OwnedReadHalf, peer: Peer) {
        let mut reader = tokio::io::BufReader::new(read_half);
        let mut stop = self.shutdown.subscribe();

        loop {
            let msg = tokio::select! {
                _ = stop.changed() => break,
                msg = read_message(&mut reader) => match msg {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Read failed");
                        break;
                    }
                },
            };
            match msg.msg_type {
                MessageType::Disconnect => break,
                MessageType::Handshake => {
                    warn!(peer = %peer, "Unexpected handshake after connect");
                }
                MessageType::Vote | MessageType::Commit | MessageType::Reject => {
                    match msg.to_consensus() {
                        Ok(Some(payload)) => self.deliver(&peer, payload),
                        Ok(None) => {}
                        Err(e) => warn!(peer = %peer, error = %e, "Malformed consensus message"),
                    }
                }
            }
        }
    }

    fn deliver(&self, from: &Peer, payload: ConsensusPayload) {
        let Some(handler) = self.handler.read().clone() else {
            debug!(peer = %from, "No handler registered, message dropped");
            return;
        };
        match payload {
            ConsensusPayload::Vote(vote) => handler.on_vote(from.clone(), vote),
            ConsensusPayload::Commit(commit) => handler.on_commit(from.clone(), commit),
            ConsensusPayload::Reject(reject) => handler.on_reject(from.clone(), reject),
        }
    }

    /// Queue `msg` for `to` without waiting. Loss is logged and tolerated.
    fn send(&self, to: &Peer, msg: NetworkResult<Message>) {
        if to.id == self.config.peer_id {
            return;
        }
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!(peer = %to, error = %e, "Failed to encode message");
                return;
            }
        };
        let result = self
            .peers
            .get_connection(&to.id)
            .ok_or(NetworkError::NotConnected(to.id))
            .and_then(|conn| conn.try_send(msg));
        if let Err(e) = result {
            warn!(peer = %to, error = %e, "Outbound message dropped");
        }
    }
}

impl YacNetwork for NetworkService {
    fn send_vote(&self, to: &Peer, vote: VoteMessage) {
        self.send(to, Message::vote(&vote));
    }

    fn send_commit(&self, to: &Peer, commit: CommitMessage) {
        self.send(to, Message::commit(&commit));
    }

    fn send_reject(&self, to: &Peer, reject: RejectMessage) {
        self.send(to, Message::reject(&reject));
    }
}
