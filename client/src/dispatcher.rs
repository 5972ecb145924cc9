//! Routes inbound datagrams to per-identity workers.
//!
//! Each identity gets its own task draining an unbounded queue, so one
//! sender's updates are applied in arrival order while different senders
//! proceed concurrently. Decoding happens here, before routing; malformed
//! datagrams never reach a worker.
//!
//! Until the welcome has been applied, packets are handled inline in arrival
//! order. Otherwise a peer update racing ahead on its own worker could be
//! taken for the welcome.

use crate::engine::{InboundOutcome, SyncEngine};
use log::{debug, warn};
use shared::{decode, NetPacket};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct InboundDispatcher {
    engine: Arc<SyncEngine>,
    workers: HashMap<String, mpsc::UnboundedSender<NetPacket>>,
}

impl InboundDispatcher {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            workers: HashMap::new(),
        }
    }

    /// Decodes `bytes` and queues the packet on its sender's worker. Returns
    /// false if the datagram was malformed and dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, bytes: &[u8]) -> bool {
        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping inbound message: {}", e);
                return false;
            }
        };

        if !self.engine.is_identified() {
            self.engine.handle_packet(packet);
            return true;
        }

        let identity = packet.username.clone();
        let sender = self
            .workers
            .entry(identity.clone())
            .or_insert_with(|| Self::spawn_worker(Arc::clone(&self.engine), identity.clone()));

        if let Err(mpsc::error::SendError(packet)) = sender.send(packet) {
            // Worker exited; start a fresh one for this identity
            let sender = Self::spawn_worker(Arc::clone(&self.engine), identity.clone());
            let _ = sender.send(packet);
            self.workers.insert(identity, sender);
        }

        true
    }

    /// Stops the worker for `identity` once its queue drains.
    pub fn retire(&mut self, identity: &str) -> bool {
        self.workers.remove(identity).is_some()
    }

    /// Identities with a live worker.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(engine: Arc<SyncEngine>, identity: String) -> mpsc::UnboundedSender<NetPacket> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<NetPacket>();

        tokio::spawn(async move {
            while let Some(packet) = receiver.recv().await {
                match engine.handle_packet(packet) {
                    InboundOutcome::StaleSelfEcho => debug!("Discarded stale self-echo"),
                    InboundOutcome::StalePeer(peer) => {
                        debug!("Discarded stale update from {}", peer)
                    }
                    _ => {}
                }
            }
            debug!("Inbound worker for '{}' stopped", identity);
        });

        sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyncConfig;
    use crate::registry::GameState;
    use assert_approx_eq::assert_approx_eq;
    use shared::encode;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn bytes(packet: NetPacket) -> Vec<u8> {
        encode(&packet).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_welcome_then_peers() {
        let engine = Arc::new(SyncEngine::new(SyncConfig::default()));
        let mut dispatcher = InboundDispatcher::new(Arc::clone(&engine));

        assert!(dispatcher.dispatch(&bytes(NetPacket::welcome("alice"))));
        assert!(engine.is_identified());
        assert_eq!(dispatcher.worker_count(), 0);

        assert!(dispatcher.dispatch(&bytes(NetPacket::update("bob", 1, 5.0, 7.0))));
        assert!(dispatcher.dispatch(&bytes(NetPacket::update("carol", 1, 1.0, 2.0))));
        wait_until(|| engine.snapshot().len() == 2).await;

        assert_eq!(engine.registry().get("bob"), Some(GameState::new(5.0, 7.0)));
        assert_eq!(dispatcher.worker_count(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_malformed() {
        let engine = Arc::new(SyncEngine::new(SyncConfig::default()));
        let mut dispatcher = InboundDispatcher::new(Arc::clone(&engine));

        assert!(!dispatcher.dispatch(&[1, 2, 3]));
        assert_eq!(dispatcher.worker_count(), 0);
        assert!(!engine.is_identified());
    }

    #[tokio::test]
    async fn test_same_identity_applied_in_order() {
        let engine = Arc::new(SyncEngine::new(SyncConfig {
            start_position: GameState::new(0.0, 0.0),
            ..SyncConfig::default()
        }));
        let mut dispatcher = InboundDispatcher::new(Arc::clone(&engine));

        dispatcher.dispatch(&bytes(NetPacket::welcome("alice")));
        for tick in 1..=100u16 {
            dispatcher.dispatch(&bytes(NetPacket::update("alice", tick, tick as f64, 0.0)));
        }

        wait_until(|| engine.last_echo_tick() == 100).await;
        let echo = engine.last_echo().unwrap();
        assert_eq!(echo.tick, 100);
        assert_approx_eq!(echo.position_x, 100.0);
    }

    #[tokio::test]
    async fn test_retire_and_respawn() {
        let engine = Arc::new(SyncEngine::new(SyncConfig::default()));
        let mut dispatcher = InboundDispatcher::new(Arc::clone(&engine));

        dispatcher.dispatch(&bytes(NetPacket::welcome("alice")));
        dispatcher.dispatch(&bytes(NetPacket::update("bob", 1, 1.0, 1.0)));
        wait_until(|| engine.snapshot().len() == 1).await;

        assert!(dispatcher.retire("bob"));
        assert!(!dispatcher.retire("bob"));
        assert_eq!(dispatcher.worker_count(), 0);

        dispatcher.dispatch(&bytes(NetPacket::update("bob", 2, 3.0, 3.0)));
        wait_until(|| engine.registry().get("bob") == Some(GameState::new(3.0, 3.0))).await;
    }
}
