//! Signaling server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::broker::{BrokerConfig, SignalBroker};
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// Signaling server
pub struct SignalServer {
    config: ServerConfig,
    broker: Arc<SignalBroker>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl SignalServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_broker_config(config, BrokerConfig::default())
    }

    /// Create a new server with custom broker configuration
    pub fn with_broker_config(config: ServerConfig, broker_config: BrokerConfig) -> Self {
        Self::with_broker(config, Arc::new(SignalBroker::with_config(broker_config)))
    }

    /// Create a new server around an existing broker
    pub fn with_broker(config: ServerConfig, broker: Arc<SignalBroker>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            broker,
            connection_semaphore,
        }
    }

    /// Get a reference to the broker
    pub fn broker(&self) -> &Arc<SignalBroker> {
        &self.broker
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// Accept errors are logged and the loop continues, so this runs until
    /// the task is cancelled or binding fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Connections that are already open keep running after shutdown.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "Signaling server listening");

        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        if let Some(handle) = stats_handle {
            handle.abort();
        }

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let connection = Connection::new(
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.broker),
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }

            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    fn spawn_stats_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.stats_interval;
        if interval.is_zero() {
            return None;
        }

        let broker = Arc::clone(&self.broker);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = broker.stats().await;
                tracing::info!(
                    clients = stats.clients,
                    sites = stats.published_sites,
                    operators = stats.operators,
                    watchers = stats.watcher_entries,
                    primaries = stats.primaries,
                    relayed = stats.messages_relayed,
                    dropped = stats.messages_dropped,
                    rejected = stats.messages_rejected,
                    "Broker stats"
                );
            }
        }))
    }
}
