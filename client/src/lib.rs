//! # Position Sync Client
//!
//! Client side of the position-synchronization protocol. A participant sends
//! its position every update cycle, learns its identity from the relay's
//! welcome, smooths its own position toward the relay's echoes and keeps the
//! last-known position of every other participant for rendering.
//!
//! ## Module Organization
//!
//! ### Engine Module (`engine`)
//! The protocol state machine: identity assignment, self-echo smoothing,
//! peer updates and the outbound update cycle.
//!
//! ### Registry Module (`registry`)
//! Reader-writer locked map of remote players with pluggable eviction.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Decodes inbound datagrams and serializes them per sender identity.
//!
//! ### Transport Module (`transport`)
//! The `send(bytes)` collaborator and its UDP and in-memory implementations.
//!
//! ### Input Module (`input`)
//! Movement sources polled once per update cycle.
//!
//! ### Network Module (`network`)
//! The UDP client loop tying everything together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::WanderInput;
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(
//!         "127.0.0.1:8080",
//!         ClientConfig::default(),
//!         Box::new(WanderInput::new(1.0)),
//!     )
//!     .await?;
//!
//!     // Render side reads the engine at its own cadence
//!     let engine = client.engine();
//!     tokio::spawn(async move {
//!         loop {
//!             let _players = engine.snapshot();
//!             let _me = engine.predicted_position();
//!             tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!         }
//!     });
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod engine;
pub mod input;
pub mod network;
pub mod registry;
pub mod transport;

pub use engine::{InboundOutcome, SyncConfig, SyncEngine, SyncError};
pub use registry::{GameState, PlayerRegistry};
pub use transport::{SendError, Transport};
