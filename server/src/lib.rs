//! # Position Sync Relay
//!
//! The relay is the one participant every other participant talks to. It
//! hands each newcomer an identity and rebroadcasts every position update to
//! all joined peers, the sender included, so that each participant sees its
//! own echo as well as everyone else's position.
//!
//! ## Core Responsibilities
//!
//! ### Identity Assignment
//! The first valid datagram from an unknown address joins that address and
//! is answered with a welcome packet carrying the assigned identity
//! (`player-1`, `player-2`, ...). Identities are never reused.
//!
//! ### Authoritative Stamping
//! Participants cannot pick their own identity. Every relayed update has its
//! identity field overwritten with the one assigned to the sender's address.
//!
//! ### Peer Lifecycle
//! Peers that stay silent longer than the configured timeout are dropped and
//! no longer receive broadcasts. A later datagram from the same address
//! joins again under a fresh identity.
//!
//! ## Architecture Design
//!
//! The relay reuses a small event-driven layout:
//! - **Network Receiver**: reads datagrams and forwards them to the main loop
//! - **Network Sender**: drains the outbound queue, fanning broadcasts out
//! - **Timeout Checker**: drops silent peers once a second
//! - **Main Loop**: decodes, joins, stamps and queues broadcasts
//!
//! Malformed datagrams are logged and dropped; nothing a peer sends can stop
//! the relay.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut relay = Relay::new("127.0.0.1:8080", RelayConfig::default()).await?;
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod peer_manager;
