//! Command line interface for the `ddpframe` demo server.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `ddpframe` binary.
#[derive(Debug, Parser)]
#[command(name = "ddpframe", version, about = "Demo DDP-style real-time server")]
pub struct Cli {
    /// Address to listen on for websocket clients.
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Id announced in the greeting frame.
    #[arg(long, default_value = "0")]
    pub server_id: String,

    /// Seconds between keep-alive pings.
    #[arg(long, default_value_t = 54)]
    pub ping_period: u64,

    /// Seconds to wait for a pong before dropping the client.
    #[arg(long, default_value_t = 60)]
    pub pong_wait: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
