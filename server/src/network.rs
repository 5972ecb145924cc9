//! Relay network layer: identity assignment and update rebroadcast over UDP

use crate::peer_manager::PeerManager;
use log::{debug, error, info, warn};
use shared::{decode, encode, NetPacket};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to the main relay loop
#[derive(Debug)]
pub enum RelayMessage {
    DatagramReceived { data: Vec<u8>, addr: SocketAddr },
    PeerTimeout { identity: String },
}

/// Messages sent from the main relay loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: NetPacket, addr: SocketAddr },
    BroadcastPacket { packet: NetPacket },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_peers: usize,
    /// Peers silent for longer than this are dropped
    pub peer_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_peers: 32,
            peer_timeout: Duration::from_secs(5),
        }
    }
}

/// Authoritative relay assigning identities and rebroadcasting positions
pub struct Relay {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerManager>>,
    config: RelayConfig,

    // Communication channels
    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Relay {
    /// Binds the relay socket. Nothing is processed until [`run`](Self::run).
    pub async fn new(addr: &str, config: RelayConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Relay {
            socket,
            peers: Arc::new(RwLock::new(PeerManager::new(config.max_peers))),
            config,
            relay_tx,
            relay_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let data = buffer[..len].to_vec();
                        let message = RelayMessage::DatagramReceived { data, addr };
                        if let Err(e) = relay_tx.send(message) {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet } => {
                        let peer_addrs = {
                            let peers_guard = peers.read().await;
                            peers_guard.peer_addrs()
                        };

                        for (identity, addr) in peer_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", identity, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that drops peers that went silent
    fn spawn_timeout_checker(&self) {
        let peers = Arc::clone(&self.peers);
        let relay_tx = self.relay_tx.clone();
        let timeout = self.config.peer_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut peers_guard = peers.write().await;
                    peers_guard.check_timeouts(timeout)
                };

                for identity in timed_out {
                    if let Err(e) = relay_tx.send(RelayMessage::PeerTimeout { identity }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &NetPacket,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue(&self, message: OutboundMessage) {
        if let Err(e) = self.outbound_tx.send(message) {
            error!("Failed to queue outbound packet: {}", e);
        }
    }

    /// Welcomes unknown senders and rebroadcasts updates from known ones
    async fn handle_datagram(&self, data: &[u8], addr: SocketAddr) {
        let mut packet = match decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", addr, e);
                return;
            }
        };

        let identity = {
            let peers = self.peers.read().await;
            peers.find_peer_by_addr(addr)
        };

        let identity = match identity {
            Some(identity) => identity,
            None => {
                let assigned = {
                    let mut peers = self.peers.write().await;
                    peers.add_peer(addr)
                };

                match assigned {
                    Some(assigned) => {
                        self.queue(OutboundMessage::SendPacket {
                            packet: NetPacket::welcome(assigned),
                            addr,
                        });
                    }
                    None => warn!("Relay full, ignoring {}", addr),
                }
                return;
            }
        };

        {
            let mut peers = self.peers.write().await;
            peers.record_update(addr);
        }

        // The relay is authoritative over identities
        if packet.username != identity {
            if !packet.username.is_empty() {
                debug!("Peer {} claimed identity '{}'", identity, packet.username);
            }
            packet.username = identity;
        }

        self.queue(OutboundMessage::BroadcastPacket { packet });
    }

    /// Main relay loop
    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Relay started successfully");

        while let Some(message) = self.relay_rx.recv().await {
            match message {
                RelayMessage::DatagramReceived { data, addr } => {
                    self.handle_datagram(&data, addr).await;
                }
                RelayMessage::PeerTimeout { identity } => {
                    info!("Stopped relaying for {}", identity);
                }
            }
        }

        info!("Relay shutting down");
        Ok(())
    }
}
