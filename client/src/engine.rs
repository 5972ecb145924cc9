//! Client-side synchronization state machine.
//!
//! The engine starts unidentified. The first packet carrying an identity is
//! the relay's welcome and fixes the local identity for the rest of the
//! connection. After that every inbound update is either a self-echo, which
//! nudges the local predicted position halfway toward the relay's copy, or a
//! peer update, which lands in the [`PlayerRegistry`].
//!
//! Inbound handling may run on several tasks at once. Local state sits
//! behind a mutex held only for the short classification step; peer
//! updates release it before touching the registry.

use crate::registry::{EvictionPolicy, GameState, NeverEvict, PlayerRegistry};
use crate::transport::{SendError, Transport};
use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::{
    decode, encode, EncodeError, Message, NetPacket, StaleFilter, TickOrdering, TickSequencer,
};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to send update: {0}")]
    Send(#[from] SendError),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Comparison used by every staleness filter the engine runs.
    pub tick_ordering: TickOrdering,
    /// Drop peer updates whose tick is not newer than the peer's last one.
    pub filter_peer_updates: bool,
    /// Skip the outbound update when the position has not moved since the
    /// last successful send.
    pub suppress_idle_sends: bool,
    /// Longest gap between sends while idle sends are suppressed. Must stay
    /// below the relay's peer timeout or an idle client is dropped and
    /// rejoins under a new identity.
    pub keepalive_interval: Duration,
    pub start_position: GameState,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_ordering: TickOrdering::Strict,
            filter_peer_updates: false,
            suppress_idle_sends: false,
            keepalive_interval: Duration::from_secs(2),
            start_position: GameState::new(50.0, 50.0),
        }
    }
}

/// What the engine did with one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Local identity assigned.
    Welcome(String),
    /// Fresh self-echo blended into the predicted position.
    SelfEcho,
    StaleSelfEcho,
    /// Peer position written to the registry.
    Peer(String),
    StalePeer(String),
    /// Carried no identity.
    Ignored,
    /// Could not be decoded.
    Malformed,
}

struct LocalState {
    identity: Option<String>,
    predicted: GameState,
    last_echo: Option<NetPacket>,
    echo_filter: StaleFilter,
    sequencer: TickSequencer,
    last_sent: Option<GameState>,
    last_sent_at: Option<Instant>,
}

pub struct SyncEngine {
    config: SyncConfig,
    local: Mutex<LocalState>,
    registry: PlayerRegistry,
}

impl SyncEngine {
    /// Unidentified engine whose registry never evicts.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_eviction(config, Box::new(NeverEvict))
    }

    /// Engine whose registry evicts peers according to `eviction`.
    pub fn with_eviction(config: SyncConfig, eviction: Box<dyn EvictionPolicy>) -> Self {
        let local = LocalState {
            identity: None,
            predicted: config.start_position,
            last_echo: None,
            echo_filter: StaleFilter::new(config.tick_ordering),
            sequencer: TickSequencer::new(),
            last_sent: None,
            last_sent_at: None,
        };

        Self {
            config,
            local: Mutex::new(local),
            registry: PlayerRegistry::with_eviction(eviction),
        }
    }

    /// Decodes and applies one inbound datagram. Malformed input is logged
    /// and dropped without touching any state.
    pub fn handle_bytes(&self, bytes: &[u8]) -> InboundOutcome {
        match decode(bytes) {
            Ok(packet) => self.handle_packet(packet),
            Err(e) => {
                warn!("Dropping inbound message: {}", e);
                InboundOutcome::Malformed
            }
        }
    }

    /// Applies one decoded packet: the welcome while unidentified, then
    /// self-echoes and peer updates.
    pub fn handle_packet(&self, packet: NetPacket) -> InboundOutcome {
        let mut local = self.local.lock();

        let message = match Message::classify(packet, local.identity.as_deref()) {
            Some(message) => message,
            None => {
                debug!("Ignoring packet without identity");
                return InboundOutcome::Ignored;
            }
        };

        match message {
            Message::Welcome { assigned } => {
                info!("Assigned identity: {}", assigned);
                local.identity = Some(assigned.clone());
                InboundOutcome::Welcome(assigned)
            }

            Message::Update {
                identity,
                tick,
                position_x,
                position_y,
            } if local.identity.as_deref() == Some(identity.as_str()) => {
                if !local.echo_filter.accept(tick) {
                    return InboundOutcome::StaleSelfEcho;
                }

                let echoed = GameState::new(position_x, position_y);
                local.predicted = local.predicted.midpoint(&echoed);
                local.last_echo = Some(NetPacket::update(identity, tick, position_x, position_y));
                InboundOutcome::SelfEcho
            }

            Message::Update {
                identity,
                tick,
                position_x,
                position_y,
            } => {
                drop(local);
                let state = GameState::new(position_x, position_y);

                if self.config.filter_peer_updates {
                    if !self
                        .registry
                        .upsert_if_fresh(&identity, tick, state, self.config.tick_ordering)
                    {
                        return InboundOutcome::StalePeer(identity);
                    }
                } else {
                    self.registry.upsert_with_tick(&identity, tick, state);
                }

                InboundOutcome::Peer(identity)
            }
        }
    }

    /// Moves the local predicted position by an input-driven delta.
    pub fn apply_input(&self, dx: f64, dy: f64) {
        let mut local = self.local.lock();
        local.predicted.position_x += dx;
        local.predicted.position_y += dy;
    }

    /// Builds this cycle's outbound update, stamping it with the next tick.
    /// Returns `None` only when idle suppression skips the cycle; a send is
    /// still due once `keepalive_interval` has passed since the last one.
    pub fn build_packet(&self, now: Instant) -> Option<NetPacket> {
        let mut local = self.local.lock();

        if self.config.suppress_idle_sends && local.last_sent == Some(local.predicted) {
            let keepalive_due = local.last_sent_at.map_or(true, |sent_at| {
                now.saturating_duration_since(sent_at) >= self.config.keepalive_interval
            });
            if !keepalive_due {
                return None;
            }
        }

        let tick = local.sequencer.next();
        Some(NetPacket::update(
            local.identity.clone().unwrap_or_default(),
            tick,
            local.predicted.position_x,
            local.predicted.position_y,
        ))
    }

    /// Runs one outbound cycle: build, encode and hand the update to the
    /// transport. Failures are returned to the caller; the engine stays
    /// usable for the next cycle.
    pub fn send_cycle(&self, transport: &dyn Transport) -> Result<Option<NetPacket>, SyncError> {
        self.send_cycle_at(transport, Instant::now())
    }

    /// [`send_cycle`](Self::send_cycle) with an explicit clock reading.
    pub fn send_cycle_at(
        &self,
        transport: &dyn Transport,
        now: Instant,
    ) -> Result<Option<NetPacket>, SyncError> {
        let packet = match self.build_packet(now) {
            Some(packet) => packet,
            None => return Ok(None),
        };

        let bytes = encode(&packet)?;
        transport.send(&bytes)?;

        let mut local = self.local.lock();
        local.last_sent = Some(GameState::new(packet.position_x, packet.position_y));
        local.last_sent_at = Some(now);
        Ok(Some(packet))
    }

    /// Identity assigned by the relay's welcome, if one has arrived.
    pub fn identity(&self) -> Option<String> {
        self.local.lock().identity.clone()
    }

    /// True once the welcome has been applied.
    pub fn is_identified(&self) -> bool {
        self.local.lock().identity.is_some()
    }

    /// Local position after input and self-echo smoothing.
    pub fn predicted_position(&self) -> GameState {
        self.local.lock().predicted
    }

    /// The most recent self-echo accepted from the relay.
    pub fn last_echo(&self) -> Option<NetPacket> {
        self.local.lock().last_echo.clone()
    }

    /// Tick of the last accepted self-echo, 0 before any.
    pub fn last_echo_tick(&self) -> u16 {
        self.local.lock().echo_filter.last_accepted()
    }

    /// Peers seen so far. Never contains the local identity.
    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Sorted copy of every peer position, for the render side.
    pub fn snapshot(&self) -> Vec<(String, GameState)> {
        self.registry.snapshot()
    }

    /// Applies the registry's eviction policy.
    pub fn evict_stale(&self, now: Instant) -> Vec<String> {
        self.registry.evict(now)
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
