//! Switchboard Server Binary
//!
//! Exposes engine sessions to remote controllers over TCP.

use clap::Parser;
use switchboard::network::Server;
use switchboard::Config;
use tracing_subscriber::{fmt, EnvFilter};

/// Switchboard Server
#[derive(Parser, Debug)]
#[command(name = "switchboard-server")]
#[command(about = "Remote control bridge for the Switchboard communications engine")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:1720")]
    listen: String,

    /// Maximum concurrent connections (one session each)
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Engine options used when a client sends none
    #[arg(short, long, default_value = "")]
    options: String,

    /// Idle read timeout per connection in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,switchboard=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Switchboard Server v{}", switchboard::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    // Engine defaults come from the options string, network settings from args
    let engine = match Config::from_options(&args.options) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid options: {}", e);
            std::process::exit(1);
        }
    };
    let config = Config::builder()
        .protocols(engine.protocols)
        .default_protocol(engine.default_protocol)
        .queue_warn_depth(engine.queue_warn_depth)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let mut server = Server::new(config);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
