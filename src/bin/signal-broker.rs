//! Signaling broker server
//!
//! Run with: signal-broker [--host 0.0.0.0] [--port 8080]
//!
//! The port can also come from the `PORT` environment variable. Log output is
//! controlled with `RUST_LOG` (default `info`).

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use signal_broker::server::config::DEFAULT_PORT;
use signal_broker::{BrokerConfig, ServerConfig, SignalServer};

#[derive(Debug, Parser)]
#[command(name = "signal-broker", version, about = "Signaling broker for site and operator video sessions")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Drop `watch` from connections that have not sent hello
    #[arg(long)]
    require_hello: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig::with_addr(SocketAddr::new(args.host, args.port))
        .max_connections(args.max_connections);

    let mut broker_config = BrokerConfig::default();
    if args.require_hello {
        broker_config = broker_config.require_hello();
    }

    let server = SignalServer::with_broker_config(config, broker_config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .with_context(|| format!("server on {} failed", server.bind_addr()))?;

    Ok(())
}
