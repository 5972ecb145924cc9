use clap::Parser;
use client::engine::SyncConfig;
use client::input::WanderInput;
use client::network::{Client, ClientConfig};
use log::info;
use shared::TickOrdering;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Update cycles per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Treat tick 0 after 65535 as fresh instead of stale
    #[arg(long)]
    wrapping_ticks: bool,

    /// Apply the staleness filter to other players' updates too
    #[arg(long)]
    filter_peers: bool,

    /// Skip sending when the position has not changed
    #[arg(long)]
    suppress_idle: bool,

    /// With --suppress-idle, still send at least this often (keep below the
    /// relay's peer timeout)
    #[arg(long, default_value = "2000")]
    keepalive_ms: u64,

    /// Forget players silent for this many seconds (0 keeps them forever)
    #[arg(long, default_value = "0")]
    peer_ttl_secs: u64,

    /// Distance moved per update cycle
    #[arg(long, default_value = "1.0")]
    speed: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        tick_rate: args.tick_rate,
        sync: SyncConfig {
            tick_ordering: if args.wrapping_ticks {
                TickOrdering::Wrapping
            } else {
                TickOrdering::Strict
            },
            filter_peer_updates: args.filter_peers,
            suppress_idle_sends: args.suppress_idle,
            keepalive_interval: Duration::from_millis(args.keepalive_ms),
            ..SyncConfig::default()
        },
        peer_ttl: (args.peer_ttl_secs > 0).then(|| Duration::from_secs(args.peer_ttl_secs)),
        ..ClientConfig::default()
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let input = Box::new(WanderInput::new(args.speed));
    let mut client = Client::new(&args.server, config, input).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
