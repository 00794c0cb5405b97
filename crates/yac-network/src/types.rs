//! Wire types

use crate::error::{NetworkError, NetworkResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use yac_consensus::{CommitMessage, RejectMessage, VoteMessage};
use yac_primitives::Address;

/// Largest accepted frame body, type byte included
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Handshake message
    Handshake = 0,
    /// Single vote
    Vote = 20,
    /// Commit aggregate
    Commit = 21,
    /// Reject aggregate
    Reject = 22,
    /// Disconnect
    Disconnect = 255,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            20 => Ok(Self::Vote),
            21 => Ok(Self::Commit),
            22 => Ok(Self::Reject),
            255 => Ok(Self::Disconnect),
            _ => Err(()),
        }
    }
}

/// Handshake data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Protocol version
    pub version: u32,
    /// Sender's peer identifier
    pub peer_id: Address,
}

impl Handshake {
    /// Create a new handshake
    pub fn new(version: u32, peer_id: Address) -> Self {
        Self { version, peer_id }
    }
}

/// Consensus payload carried by a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusPayload {
    /// Single vote
    Vote(VoteMessage),
    /// Commit aggregate
    Commit(CommitMessage),
    /// Reject aggregate
    Reject(RejectMessage),
}

/// Network message
#[derive(Debug, Clone)]
pub struct Message {
    /// Message type
    pub msg_type: MessageType,
    /// Payload
    pub payload: Bytes,
}

impl Message {
    /// Create a new message
    pub fn new(msg_type: MessageType, payload: Bytes) -> Self {
        Self { msg_type, payload }
    }

    /// Create empty message
    pub fn empty(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payload: Bytes::new(),
        }
    }

    /// Create disconnect message
    pub fn disconnect() -> Self {
        Self::empty(MessageType::Disconnect)
    }

    /// Create handshake message
    pub fn handshake(handshake: &Handshake) -> NetworkResult<Self> {
        Self::json(MessageType::Handshake, handshake)
    }

    /// Create vote message
    pub fn vote(vote: &VoteMessage) -> NetworkResult<Self> {
        Self::json(MessageType::Vote, vote)
    }

    /// Create commit message
    pub fn commit(commit: &CommitMessage) -> NetworkResult<Self> {
        Self::json(MessageType::Commit, commit)
    }

    /// Create reject message
    pub fn reject(reject: &RejectMessage) -> NetworkResult<Self> {
        Self::json(MessageType::Reject, reject)
    }

    fn json<T: Serialize>(msg_type: MessageType, value: &T) -> NetworkResult<Self> {
        Ok(Self::new(msg_type, serde_json::to_vec(value)?.into()))
    }

    /// Parse a handshake payload
    pub fn to_handshake(&self) -> NetworkResult<Handshake> {
        if self.msg_type != MessageType::Handshake {
            return Err(NetworkError::Protocol(format!(
                "expected handshake, got {:?}",
                self.msg_type
            )));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Parse a consensus payload; `None` for control messages
    pub fn to_consensus(&self) -> NetworkResult<Option<ConsensusPayload>> {
        let payload = match self.msg_type {
            MessageType::Vote => ConsensusPayload::Vote(serde_json::from_slice(&self.payload)?),
            MessageType::Commit => {
                ConsensusPayload::Commit(serde_json::from_slice(&self.payload)?)
            }
            MessageType::Reject => {
                ConsensusPayload::Reject(serde_json::from_slice(&self.payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(payload))
    }

    /// Encode message to bytes
    /// Format: [length: 4 bytes][type: 1 byte][payload: N bytes]
    pub fn encode(&self) -> Bytes {
        let len = 1 + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + len);
        buf.put_u32(len as u32);
        buf.put_u8(self.msg_type as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode message from bytes
    pub fn decode(mut data: Bytes) -> Option<Self> {
        if data.len() < 5 {
            return None;
        }
        let len = data.get_u32() as usize;
        if data.len() < len || len < 1 || len > MAX_MESSAGE_SIZE {
            return None;
        }
        let msg_type = MessageType::try_from(data.get_u8()).ok()?;
        let payload = data.split_to(len - 1);
        Some(Self { msg_type, payload })
    }
}
