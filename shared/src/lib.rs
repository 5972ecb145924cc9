//! Wire protocol shared by the position-sync client and the relay.
//!
//! A single record type travels on the wire, [`NetPacket`]. The relay uses
//! the same record to hand a newly connected peer its identity, so the
//! protocol layer lifts packets into the tagged [`Message`] enum before any
//! application logic looks at them.

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod tick;

pub use tick::{is_fresh, StaleFilter, TickOrdering, TickSequencer, TICK_MODULUS};

/// Upper bound on an encoded packet. Keeps a datagram under a typical MTU and
/// caps allocation driven by a hostile string length prefix.
pub const MAX_PACKET_SIZE: usize = 1200;

/// The position record exchanged between participants.
///
/// Field order is the wire order: `username`, `tick`, `position_x`,
/// `position_y`. An empty `username` never describes a player position.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetPacket {
    pub username: String,
    pub tick: u16,
    pub position_x: f64,
    pub position_y: f64,
}

impl NetPacket {
    /// Position update from `username` at `tick`.
    pub fn update(
        username: impl Into<String>,
        tick: u16,
        position_x: f64,
        position_y: f64,
    ) -> Self {
        Self {
            username: username.into(),
            tick,
            position_x,
            position_y,
        }
    }

    /// Identity-assignment packet sent by the relay. Tick and position carry
    /// no information.
    pub fn welcome(assigned: impl Into<String>) -> Self {
        Self::update(assigned, 0, 0.0, 0.0)
    }

    /// False for packets sent before the relay's welcome arrived.
    pub fn has_identity(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Protocol-level view of an inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The relay assigned this participant an identity.
    Welcome { assigned: String },
    /// A position update stamped with the sender's identity.
    Update {
        identity: String,
        tick: u16,
        position_x: f64,
        position_y: f64,
    },
}

impl Message {
    /// Lifts a wire packet into a protocol message.
    ///
    /// Whether a packet is a welcome depends on receiver state: any packet
    /// carrying an identity while `local_identity` is still unset assigns it.
    /// Packets with an empty identity are never position updates and yield
    /// `None`.
    pub fn classify(packet: NetPacket, local_identity: Option<&str>) -> Option<Self> {
        if !packet.has_identity() {
            return None;
        }

        match local_identity {
            None => Some(Message::Welcome {
                assigned: packet.username,
            }),
            Some(_) => Some(Message::Update {
                identity: packet.username,
                tick: packet.tick,
                position_x: packet.position_x,
                position_y: packet.position_y,
            }),
        }
    }

    /// Wire representation of this message.
    pub fn into_packet(self) -> NetPacket {
        match self {
            Message::Welcome { assigned } => NetPacket::welcome(assigned),
            Message::Update {
                identity,
                tick,
                position_x,
                position_y,
            } => NetPacket::update(identity, tick, position_x, position_y),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("packet of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("malformed packet: {0}")]
    Malformed(#[from] bincode::Error),
}

#[derive(Debug, Error)]
#[error("failed to encode packet: {0}")]
pub struct EncodeError(#[from] bincode::Error);

/// Fixed-width little-endian fields, length-prefixed strings, no trailing
/// bytes. Strings carry their own length so no external schema is needed.
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_PACKET_SIZE as u64)
        .with_little_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Serializes a packet for one datagram.
pub fn encode(packet: &NetPacket) -> Result<Vec<u8>, EncodeError> {
    Ok(wire_options().serialize(packet)?)
}

/// Parses one datagram. Oversized, truncated and trailing-garbage input
/// is rejected.
pub fn decode(bytes: &[u8]) -> Result<NetPacket, DecodeError> {
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(DecodeError::TooLarge {
            len: bytes.len(),
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(wire_options().deserialize(bytes)?)
}
