//! UDP client driving the sync engine against a relay.

use crate::dispatcher::InboundDispatcher;
use crate::engine::{SyncConfig, SyncEngine, SyncError};
use crate::input::InputSource;
use crate::registry::{EvictionPolicy, IdleTimeout, NeverEvict};
use crate::transport::UdpTransport;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid relay address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("giving up after {failures} consecutive send failures: {last}")]
    SendFailures { failures: u32, last: SyncError },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tick_rate: u32,
    pub sync: SyncConfig,
    /// Evict peers silent for this long. `None` keeps them forever.
    pub peer_ttl: Option<Duration>,
    /// Consecutive failed sends tolerated before `run` returns an error.
    pub max_send_failures: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            sync: SyncConfig::default(),
            peer_ttl: None,
            max_send_failures: 60,
        }
    }
}

pub struct Client {
    socket: Arc<UdpSocket>,
    relay_addr: SocketAddr,
    engine: Arc<SyncEngine>,
    transport: UdpTransport,
    dispatcher: InboundDispatcher,
    input: Box<dyn InputSource>,
    config: ClientConfig,
}

impl Client {
    /// Binds a local socket connected to `relay_addr`. Nothing is sent until
    /// [`run`](Self::run).
    pub async fn new(
        relay_addr: &str,
        config: ClientConfig,
        input: Box<dyn InputSource>,
    ) -> Result<Self, ClientError> {
        let relay_addr: SocketAddr = relay_addr.parse()?;
        let bind_addr = if relay_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(relay_addr).await?;
        let socket = Arc::new(socket);

        let eviction: Box<dyn EvictionPolicy> = match config.peer_ttl {
            Some(ttl) => Box::new(IdleTimeout(ttl)),
            None => Box::new(NeverEvict),
        };
        let engine = Arc::new(SyncEngine::with_eviction(config.sync.clone(), eviction));

        Ok(Client {
            transport: UdpTransport::new(Arc::clone(&socket)),
            dispatcher: InboundDispatcher::new(Arc::clone(&engine)),
            socket,
            relay_addr,
            engine,
            input,
            config,
        })
    }

    /// Shared handle for the render side.
    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the receive loop, the fixed-rate update cycle and periodic
    /// housekeeping until the send path fails persistently.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate.max(1) as f64);
        let mut update_interval = interval(tick_duration);
        update_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut housekeeping_interval = interval(Duration::from_secs(1));

        let mut buffer = [0u8; 2048];
        let mut send_failures = 0u32;

        info!("Syncing with relay at {} at {}Hz", self.relay_addr, self.config.tick_rate);

        loop {
            tokio::select! {
                result = self.socket.recv(&mut buffer) => {
                    match result {
                        Ok(len) => {
                            self.dispatcher.dispatch(&buffer[..len]);
                        }
                        Err(e) => {
                            // Connected UDP sockets surface ICMP errors here
                            // while the relay is unreachable
                            debug!("Error receiving packet: {}", e);
                            sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                _ = update_interval.tick() => {
                    let (dx, dy) = self.input.poll();
                    self.engine.apply_input(dx, dy);

                    match self.engine.send_cycle(&self.transport) {
                        Ok(_) => send_failures = 0,
                        Err(e) => {
                            send_failures += 1;
                            warn!("Update cycle failed ({} in a row): {}", send_failures, e);
                            if send_failures >= self.config.max_send_failures {
                                error!("Transport keeps failing, stopping client");
                                return Err(ClientError::SendFailures {
                                    failures: send_failures,
                                    last: e,
                                });
                            }
                        }
                    }
                },

                _ = housekeeping_interval.tick() => {
                    for identity in self.engine.evict_stale(Instant::now()) {
                        self.dispatcher.retire(&identity);
                    }
                    self.log_view();
                },
            }
        }
    }

    /// Headless stand-in for a renderer: logs what one would draw.
    fn log_view(&self) {
        let predicted = self.engine.predicted_position();
        let players = self.engine.snapshot();

        debug!(
            "{}: at ({:.1}, {:.1}), {} other players",
            self.engine.identity().unwrap_or_else(|| "<unassigned>".to_string()),
            predicted.position_x,
            predicted.position_y,
            players.len()
        );
        for (identity, state) in players {
            debug!("  {} at ({:.1}, {:.1})", identity, state.position_x, state.position_y);
        }
    }
}
