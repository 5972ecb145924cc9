use clap::Parser;
use log::info;
use server::network::{Relay, RelayConfig};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Relay IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Relay port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,
    /// Maximum number of joined peers
    #[arg(short, long, default_value = "32")]
    max_peers: usize,
    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value = "5")]
    peer_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = RelayConfig {
        max_peers: args.max_peers,
        peer_timeout: Duration::from_secs(args.peer_timeout_secs),
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut relay = Relay::new(&address, config).await?;

    tokio::select! {
        result = relay.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
