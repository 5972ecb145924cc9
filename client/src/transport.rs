//! The outbound half of the message channel the sync engine is handed.
//!
//! The engine only needs `send(bytes)`; how the channel was established is
//! the embedder's business. Inbound bytes reach the engine through
//! [`crate::dispatcher::InboundDispatcher`].

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport channel closed")]
    Closed,
    #[error("transport i/o error: {0}")]
    Io(#[from] io::Error),
}

pub trait Transport: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), SendError>;
}

/// Sends datagrams on a UDP socket already connected to the relay.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> Result<(), SendError> {
        self.socket.try_send(bytes)?;
        Ok(())
    }
}

/// In-memory transport handing every sent message to a receiver.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiver that collects what it sends.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, bytes: &[u8]) -> Result<(), SendError> {
        self.sender.send(bytes.to_vec()).map_err(|_| SendError::Closed)
    }
}
