//! Peer management

use crate::error::{NetworkError, NetworkResult};
use crate::types::{Message, MAX_MESSAGE_SIZE};
use bytes::BytesMut;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use yac_primitives::Address;

/// Information on an open connection
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Peer identifier
    pub id: Address,
    /// Remote address
    pub addr: SocketAddr,
    /// Is inbound connection
    pub inbound: bool,
}

impl PeerInfo {
    /// Create new peer info
    pub fn new(id: Address, addr: SocketAddr, inbound: bool) -> Self {
        Self { id, addr, inbound }
    }
}

/// Peer connection handle
pub struct PeerConnection {
    /// Peer identifier
    pub peer_id: Address,
    /// Serial distinguishing successive connections to the same peer
    pub conn_id: u64,
    /// Outgoing message queue
    pub sender: mpsc::Sender<Message>,
}

impl PeerConnection {
    /// Queue a message without waiting; fails when the queue is full or the
    /// writer has gone.
    pub fn try_send(&self, msg: Message) -> NetworkResult<()> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NetworkError::QueueFull(self.peer_id),
            mpsc::error::TrySendError::Closed(_) => NetworkError::ChannelClosed,
        })
    }
}

/// Read one frame from the stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> NetworkResult<Message> {
    // Read length prefix (4 bytes)
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 || len > MAX_MESSAGE_SIZE {
        return Err(NetworkError::InvalidMessage(format!(
            "invalid message length {}",
            len
        )));
    }

    let mut buf = BytesMut::with_capacity(4 + len);
    buf.extend_from_slice(&len_buf);
    buf.resize(4 + len, 0);
    stream.read_exact(&mut buf[4..]).await?;

    Message::decode(buf.freeze())
        .ok_or_else(|| NetworkError::InvalidMessage("failed to decode message".into()))
}

/// Write one frame to the stream
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> NetworkResult<()> {
    let data = msg.encode();
    stream.write_all(&data).await?;
    stream.flush().await?;
    Ok(())
}

/// Peer manager
pub struct PeerManager {
    /// Connected peers info
    peers: RwLock<HashMap<Address, PeerInfo>>,
    /// Peer connections
    connections: RwLock<HashMap<Address, Arc<PeerConnection>>>,
    /// Max peers
    max_peers: usize,
}

impl PeerManager {
    /// Create new peer manager
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            max_peers,
        }
    }

    /// Add a peer
    pub fn add_peer(&self, info: PeerInfo, conn: Arc<PeerConnection>) -> NetworkResult<()> {
        let mut peers = self.peers.write();
        let mut connections = self.connections.write();

        if peers.contains_key(&info.id) {
            return Err(NetworkError::AlreadyConnected(info.id));
        }

        if peers.len() >= self.max_peers {
            return Err(NetworkError::ConnectionFailed("max peers reached".into()));
        }

        peers.insert(info.id, info);
        connections.insert(conn.peer_id, conn);
        Ok(())
    }

    /// Remove a peer, but only if `conn_id` is still its current connection
    pub fn remove_peer(&self, peer_id: &Address, conn_id: u64) -> bool {
        let mut peers = self.peers.write();
        let mut connections = self.connections.write();
        match connections.get(peer_id) {
            Some(conn) if conn.conn_id == conn_id => {
                connections.remove(peer_id);
                peers.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    /// Drop every connection
    pub fn clear(&self) -> Vec<Arc<PeerConnection>> {
        self.peers.write().clear();
        self.connections.write().drain().map(|(_, c)| c).collect()
    }

    /// Get peer info
    pub fn get_peer(&self, peer_id: &Address) -> Option<PeerInfo> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Get peer connection
    pub fn get_connection(&self, peer_id: &Address) -> Option<Arc<PeerConnection>> {
        self.connections.read().get(peer_id).cloned()
    }

    /// Get all peer IDs
    pub fn peer_ids(&self) -> Vec<Address> {
        self.peers.read().keys().cloned().collect()
    }

    /// Get peer count
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Check if can accept more peers
    pub fn can_accept(&self) -> bool {
        self.peers.read().len() < self.max_peers
    }

    /// Check if peer exists
    pub fn has_peer(&self, peer_id: &Address) -> bool {
        self.peers.read().contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8000".parse().unwrap()
    }

    fn id(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn conn(peer_id: Address, conn_id: u64, capacity: usize) -> (Arc<PeerConnection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(PeerConnection {
            peer_id,
            conn_id,
            sender: tx,
        });
        (conn, rx)
    }

    #[test]
    fn test_peer_info_creation() {
        let info = PeerInfo::new(id(1), test_addr(), false);
        assert_eq!(info.id, id(1));
        assert_eq!(info.addr, test_addr());
        assert!(!info.inbound);
    }

    #[test]
    fn test_peer_manager_add_remove() {
        let manager = PeerManager::new(10);
        let (c, _rx) = conn(id(1), 7, 1);

        manager.add_peer(PeerInfo::new(id(1), test_addr(), false), c).unwrap();
        assert!(manager.has_peer(&id(1)));
        assert_eq!(manager.peer_count(), 1);
        assert_eq!(manager.peer_ids(), vec![id(1)]);

        // stale connection serial leaves the peer in place
        assert!(!manager.remove_peer(&id(1), 6));
        assert!(manager.has_peer(&id(1)));

        assert!(manager.remove_peer(&id(1), 7));
        assert!(!manager.has_peer(&id(1)));
        assert!(manager.get_connection(&id(1)).is_none());
    }

    #[test]
    fn test_peer_manager_max_peers() {
        let manager = PeerManager::new(2);
        let mut receivers = Vec::new();
        for i in 0..2 {
            let (c, rx) = conn(id(i), i as u64, 1);
            receivers.push(rx);
            manager.add_peer(PeerInfo::new(id(i), test_addr(), true), c).unwrap();
        }
        assert!(!manager.can_accept());

        let (c, _rx) = conn(id(99), 99, 1);
        let result = manager.add_peer(PeerInfo::new(id(99), test_addr(), true), c);
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
    }

    #[test]
    fn test_peer_manager_duplicate() {
        let manager = PeerManager::new(10);
        let (c1, _rx1) = conn(id(1), 1, 1);
        let (c2, _rx2) = conn(id(1), 2, 1);

        manager.add_peer(PeerInfo::new(id(1), test_addr(), false), c1).unwrap();
        let result = manager.add_peer(PeerInfo::new(id(1), test_addr(), true), c2);
        assert!(matches!(result, Err(NetworkError::AlreadyConnected(a)) if a == id(1)));
        assert_eq!(manager.get_connection(&id(1)).unwrap().conn_id, 1);
    }

    #[test]
    fn test_peer_manager_clear() {
        let manager = PeerManager::new(10);
        let (c1, _rx1) = conn(id(1), 1, 1);
        let (c2, _rx2) = conn(id(2), 2, 1);
        manager.add_peer(PeerInfo::new(id(1), test_addr(), false), c1).unwrap();
        manager.add_peer(PeerInfo::new(id(2), test_addr(), false), c2).unwrap();

        assert_eq!(manager.clear().len(), 2);
        assert_eq!(manager.peer_count(), 0);
    }

    #[test]
    fn test_try_send_full_and_closed() {
        let (c, mut rx) = conn(id(1), 1, 1);
        c.try_send(Message::disconnect()).unwrap();
        assert!(matches!(c.try_send(Message::disconnect()), Err(NetworkError::QueueFull(_))));

        assert_eq!(rx.try_recv().unwrap().msg_type, MessageType::Disconnect);
        drop(rx);
        assert!(matches!(c.try_send(Message::disconnect()), Err(NetworkError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_read_write_message() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = Message::new(MessageType::Vote, bytes::Bytes::from_static(b"payload"));

        write_message(&mut a, &msg).await.unwrap();
        let read = read_message(&mut b).await.unwrap();
        assert_eq!(read.msg_type, MessageType::Vote);
        assert_eq!(&read.payload[..], b"payload");
    }

    #[tokio::test]
    async fn test_read_message_rejects_oversized_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        let result = read_message(&mut b).await;
        assert!(matches!(result, Err(NetworkError::InvalidMessage(_))));
    }
}
