//! Integration tests for the position-sync client and relay
//!
//! These tests validate cross-component interactions and real network behavior.

use client::engine::{InboundOutcome, SyncConfig, SyncEngine};
use client::input::{IdleInput, ScriptedInput};
use client::network::{Client, ClientConfig};
use client::registry::GameState;
use serde::Serialize;
use server::network::{Relay, RelayConfig};
use shared::{decode, encode, NetPacket, TickOrdering};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// WIRE FORMAT TESTS
mod protocol_tests {
    use super::*;

    /// Field layout an independent implementation would write with stock bincode
    #[derive(Serialize)]
    struct ForeignPacket {
        name: String,
        tick: u16,
        x: f64,
        y: f64,
    }

    /// Tests that the codec matches plain bincode so other implementations interoperate
    #[test]
    fn stock_bincode_interop() {
        let foreign = ForeignPacket {
            name: "bob".to_string(),
            tick: 300,
            x: 5.0,
            y: 7.0,
        };
        let bytes = bincode::serialize(&foreign).unwrap();

        let packet = decode(&bytes).unwrap();
        assert_eq!(packet, NetPacket::update("bob", 300, 5.0, 7.0));
        assert_eq!(encode(&packet).unwrap(), bytes);
    }

    /// Tests decode round trip over a spread of packets
    #[test]
    fn packet_roundtrip() {
        let packets = vec![
            NetPacket::welcome("player-1"),
            NetPacket::update("alice", 1, 10.0, 10.0),
            NetPacket::update("bob", u16::MAX, -250.5, 1e9),
        ];

        for packet in packets {
            assert_eq!(decode(&encode(&packet).unwrap()).unwrap(), packet);
        }
    }

    /// Tests malformed packet handling
    #[test]
    fn malformed_packet_handling() {
        let valid_data = encode(&NetPacket::update("alice", 1, 1.0, 1.0)).unwrap();

        let truncated_data = &valid_data[..valid_data.len() / 2];
        assert!(decode(truncated_data).is_err(), "Should fail to decode truncated packet");

        let empty_data: Vec<u8> = vec![];
        assert!(decode(&empty_data).is_err(), "Should fail to decode empty packet");

        let mut corrupted_data = valid_data.clone();
        corrupted_data[0] = 0xFF;
        assert!(decode(&corrupted_data).is_err(), "Should fail to decode corrupted packet");
    }
}

/// PROTOCOL STATE MACHINE TESTS
mod engine_tests {
    use super::*;

    fn engine_at(x: f64, y: f64) -> SyncEngine {
        SyncEngine::new(SyncConfig {
            start_position: GameState::new(x, y),
            ..SyncConfig::default()
        })
    }

    fn wire(packet: NetPacket) -> Vec<u8> {
        encode(&packet).unwrap()
    }

    /// Tests a full welcome, echo and peer sequence delivered as raw bytes
    #[test]
    fn welcome_echo_and_peer_sequence() {
        let engine = engine_at(10.0, 10.0);

        assert_eq!(
            engine.handle_bytes(&wire(NetPacket::welcome("alice"))),
            InboundOutcome::Welcome("alice".to_string())
        );
        assert_eq!(
            engine.handle_bytes(&wire(NetPacket::update("alice", 1, 20.0, 20.0))),
            InboundOutcome::SelfEcho
        );
        assert_eq!(
            engine.handle_bytes(&wire(NetPacket::update("bob", 1, 5.0, 7.0))),
            InboundOutcome::Peer("bob".to_string())
        );
        assert_eq!(
            engine.handle_bytes(&wire(NetPacket::update("bob", 2, 6.0, 8.0))),
            InboundOutcome::Peer("bob".to_string())
        );

        let predicted = engine.predicted_position();
        assert_eq!(predicted, GameState::new(15.0, 15.0));
        assert_eq!(engine.snapshot(), vec![("bob".to_string(), GameState::new(6.0, 8.0))]);
    }

    /// Tests the documented rollover limitation of the strict comparator
    #[test]
    fn strict_rollover_drops_first_wrapped_echo() {
        let engine = engine_at(0.0, 0.0);
        engine.handle_packet(NetPacket::welcome("alice"));

        for tick in [65534u16, 65535] {
            assert_eq!(
                engine.handle_packet(NetPacket::update("alice", tick, 0.0, 0.0)),
                InboundOutcome::SelfEcho
            );
        }
        assert_eq!(
            engine.handle_packet(NetPacket::update("alice", 0, 0.0, 0.0)),
            InboundOutcome::StaleSelfEcho
        );
        assert_eq!(engine.last_echo_tick(), 65535);
    }

    /// Tests the opt-in wraparound comparator across the same rollover
    #[test]
    fn wrapping_rollover_accepts_wrapped_echo() {
        let engine = SyncEngine::new(SyncConfig {
            tick_ordering: TickOrdering::Wrapping,
            ..SyncConfig::default()
        });
        engine.handle_packet(NetPacket::welcome("alice"));
        engine.handle_packet(NetPacket::update("alice", 65535, 0.0, 0.0));

        assert_eq!(
            engine.handle_packet(NetPacket::update("alice", 0, 0.0, 0.0)),
            InboundOutcome::SelfEcho
        );
        assert_eq!(engine.last_echo_tick(), 0);
    }

    /// Tests that many concurrent inbound messages for distinct identities all land
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inbound_distinct_identities() {
        let engine = Arc::new(engine_at(0.0, 0.0));
        engine.handle_packet(NetPacket::welcome("alice"));

        let peers = 200;
        let handles: Vec<_> = (0..peers)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let bytes = wire(NetPacket::update(format!("peer-{:03}", i), 1, i as f64, 1.0));
                    engine.handle_bytes(&bytes)
                })
            })
            .collect();

        for handle in handles {
            assert!(matches!(handle.await.unwrap(), InboundOutcome::Peer(_)));
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), peers);
        assert_eq!(snapshot[7], ("peer-007".to_string(), GameState::new(7.0, 1.0)));
    }
}

/// CLIENT-RELAY INTEGRATION TESTS
mod client_relay_tests {
    use super::*;

    async fn start_relay() -> SocketAddr {
        start_relay_with(RelayConfig::default()).await
    }

    async fn start_relay_with(config: RelayConfig) -> SocketAddr {
        let mut relay = Relay::new("127.0.0.1:0", config)
            .await
            .expect("Failed to bind relay");
        let addr = relay.local_addr().unwrap();
        tokio::spawn(async move { relay.run().await });
        addr
    }

    fn fast_config() -> ClientConfig {
        ClientConfig {
            tick_rate: 100,
            ..ClientConfig::default()
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        wait_for(condition, Duration::from_secs(2)).await;
    }

    async fn wait_for(condition: impl Fn() -> bool, limit: Duration) {
        let steps = limit.as_millis() / 5;
        for _ in 0..steps {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    /// Tests that two clients learn distinct identities and see each other
    #[tokio::test]
    async fn two_clients_sync_through_relay() {
        let relay = start_relay().await;

        let mut alice = Client::new(
            &relay.to_string(),
            fast_config(),
            Box::new(ScriptedInput::new(vec![(1.0, 0.0); 20])),
        )
        .await
        .unwrap();
        let mut bob = Client::new(&relay.to_string(), fast_config(), Box::new(IdleInput))
            .await
            .unwrap();

        let alice_engine = alice.engine();
        let bob_engine = bob.engine();

        let alice_task = tokio::spawn(async move { alice.run().await });
        let bob_task = tokio::spawn(async move { bob.run().await });

        wait_until(|| alice_engine.is_identified() && bob_engine.is_identified()).await;

        let alice_id = alice_engine.identity().unwrap();
        let bob_id = bob_engine.identity().unwrap();
        assert_ne!(alice_id, bob_id);
        assert!(alice_id.starts_with("player-"));

        wait_until(|| bob_engine.registry().get(&alice_id).is_some()).await;
        wait_until(|| alice_engine.registry().get(&bob_id).is_some()).await;

        // Neither client lists itself as a peer
        assert!(alice_engine.registry().get(&alice_id).is_none());
        assert!(bob_engine.registry().get(&bob_id).is_none());

        // Self-echoes are flowing back
        wait_until(|| alice_engine.last_echo().is_some()).await;
        assert!(alice_engine.last_echo_tick() > 0);

        alice_task.abort();
        bob_task.abort();
    }

    /// Tests that an idle client's echoed position converges on its own
    #[tokio::test]
    async fn idle_client_position_stable() {
        let relay = start_relay().await;

        let mut client = Client::new(&relay.to_string(), fast_config(), Box::new(IdleInput))
            .await
            .unwrap();
        let engine = client.engine();
        let task = tokio::spawn(async move { client.run().await });

        wait_until(|| engine.last_echo_tick() > 5).await;
        assert_eq!(engine.predicted_position(), GameState::new(50.0, 50.0));
        assert!(engine.snapshot().is_empty());

        task.abort();
    }

    /// Tests that a client idling with suppressed sends keeps its identity
    /// across relay peer timeouts and never sees itself as a peer
    #[tokio::test]
    async fn suppressed_idle_client_keeps_identity() {
        let relay = start_relay_with(RelayConfig {
            peer_timeout: Duration::from_millis(500),
            ..RelayConfig::default()
        })
        .await;

        let config = ClientConfig {
            tick_rate: 100,
            sync: SyncConfig {
                suppress_idle_sends: true,
                keepalive_interval: Duration::from_millis(200),
                ..SyncConfig::default()
            },
            ..ClientConfig::default()
        };
        let steps = std::iter::repeat((1.0, 0.0))
            .take(5)
            .chain(std::iter::repeat((0.0, 0.0)).take(250))
            .chain(std::iter::repeat((1.0, 0.0)).take(100));

        let input = Box::new(ScriptedInput::new(steps));
        let mut client = Client::new(&relay.to_string(), config, input).await.unwrap();
        let engine = client.engine();
        let task = tokio::spawn(async move { client.run().await });

        // Moving again after the idle stretch produces fresh echoes
        wait_for(|| engine.last_echo_tick() > 100, Duration::from_secs(10)).await;

        assert_eq!(engine.identity(), Some("player-1".to_string()));
        assert!(engine.snapshot().is_empty(), "own echoes filed as a peer");

        task.abort();
    }
}
