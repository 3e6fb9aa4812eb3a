//! Per-connection WebSocket handling
//!
//! Each connection runs a read loop in its own task, so its messages are
//! handled in arrival order, and a writer task that drains the outbox the
//! broker queues into.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broker::{Disposition, SignalBroker};
use crate::error::{Error, Result};
use crate::protocol::ServerMessage;
use crate::registry::ClientId;
use crate::server::config::ServerConfig;

type WsSink = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = futures::stream::SplitStream<WebSocketStream<TcpStream>>;

/// One accepted transport connection
pub struct Connection {
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    broker: Arc<SignalBroker>,
}

impl Connection {
    /// Wrap an accepted socket
    pub fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        broker: Arc<SignalBroker>,
    ) -> Self {
        Self {
            socket,
            peer_addr,
            config,
            broker,
        }
    }

    /// Upgrade to WebSocket and serve until the peer leaves
    ///
    /// Whatever ends the read loop (close frame, `bye`, transport error), the
    /// connection is unwound from the broker before this returns.
    pub async fn run(self) -> Result<()> {
        let Self {
            socket,
            peer_addr,
            config,
            broker,
        } = self;

        let ws = tokio::time::timeout(
            config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout(config.handshake_timeout))??;

        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::channel(config.outbound_queue_capacity);

        let client_id = broker.connect(tx).await;
        tracing::info!(client_id = %client_id, peer = %peer_addr, "Client connected");

        let mut writer = spawn_writer(client_id, sink, rx);

        let result = read_loop(&broker, client_id, &mut stream).await;

        // Removing the registry entry drops the outbox sender, which lets the
        // writer drain what is queued and close the socket.
        broker.disconnect(client_id).await;

        if tokio::time::timeout(config.close_timeout, &mut writer)
            .await
            .is_err()
        {
            tracing::debug!(client_id = %client_id, "Writer did not finish in time");
            writer.abort();
        }

        result
    }
}

async fn read_loop(broker: &SignalBroker, client_id: ClientId, stream: &mut WsStream) -> Result<()> {
    while let Some(frame) = stream.next().await {
        let disposition = match frame? {
            Message::Text(text) => broker.dispatch(client_id, text.as_str()).await,
            Message::Binary(data) => broker.dispatch_bytes(client_id, &data).await,
            Message::Close(_) => break,
            // Ping is answered by tungstenite
            _ => Disposition::Continue,
        };

        if disposition == Disposition::Close {
            break;
        }
    }

    Ok(())
}

fn spawn_writer(
    client_id: ClientId,
    mut sink: WsSink,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(client_id = %client_id, kind = message.kind(), error = %e, "Failed to encode message");
                    continue;
                }
            };

            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(client_id = %client_id, error = %e, "Write failed");
                return;
            }
        }

        let _ = sink.close().await;
    })
}
