//! Peer bookkeeping for the relay
//!
//! This module tracks which addresses have joined the relay and the identity
//! each one was assigned:
//! - Identity assignment on first contact, with a capacity limit
//! - Address lookup for stamping relayed updates
//! - Activity tracking and timeout cleanup
//!
//! Identities are `player-N` with N counting up from 1 and never reused
//! within the lifetime of the relay.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A participant known to the relay
#[derive(Debug, Clone)]
pub struct Peer {
    /// Identity handed out in the welcome packet
    pub identity: String,
    /// Address updates are relayed to
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this peer
    pub last_seen: Instant,
    /// Number of position updates relayed on this peer's behalf
    pub updates_relayed: u64,
}

impl Peer {
    pub fn new(identity: String, addr: SocketAddr) -> Self {
        Self {
            identity,
            addr,
            last_seen: Instant::now(),
            updates_relayed: 0,
        }
    }

    /// Returns true if nothing has arrived from this peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All peers currently joined to the relay, keyed by address
pub struct PeerManager {
    peers: HashMap<SocketAddr, Peer>,
    next_peer_number: u32,
    max_peers: usize,
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_number: 1,
            max_peers,
        }
    }

    /// Registers a new peer and returns its assigned identity
    ///
    /// Returns None if the relay is at capacity. An address that is already
    /// joined keeps its existing identity.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<String> {
        if let Some(peer) = self.peers.get(&addr) {
            return Some(peer.identity.clone());
        }

        if self.peers.len() >= self.max_peers {
            return None;
        }

        let identity = format!("player-{}", self.next_peer_number);
        self.next_peer_number += 1;

        info!("Peer {} joined from {}", identity, addr);
        self.peers.insert(addr, Peer::new(identity.clone(), addr));

        Some(identity)
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove_peer(&mut self, addr: &SocketAddr) -> bool {
        if let Some(peer) = self.peers.remove(addr) {
            info!("Peer {} left after {} updates", peer.identity, peer.updates_relayed);
            true
        } else {
            false
        }
    }

    /// Identity assigned to the peer at `addr`
    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<String> {
        self.peers.get(&addr).map(|peer| peer.identity.clone())
    }

    /// Marks activity from `addr` and counts one relayed update
    ///
    /// Returns the peer's running update count, or None if `addr` is unknown.
    pub fn record_update(&mut self, addr: SocketAddr) -> Option<u64> {
        let peer = self.peers.get_mut(&addr)?;
        peer.last_seen = Instant::now();
        peer.updates_relayed += 1;
        Some(peer.updates_relayed)
    }

    /// Removes peers silent for longer than `timeout` and returns their
    /// identities
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<String> {
        let timed_out: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(addr, _)| *addr)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|addr| {
                let peer = self.peers.remove(&addr)?;
                info!(
                    "Peer {} timed out after {} updates",
                    peer.identity, peer.updates_relayed
                );
                Some(peer.identity)
            })
            .collect()
    }

    /// Identity and address of every joined peer, for broadcasting
    pub fn peer_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.peers
            .values()
            .map(|peer| (peer.identity.clone(), peer.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
