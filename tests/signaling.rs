//! End-to-end tests using real WebSocket clients against a running server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use signal_broker::{ClientId, ServerConfig, SignalBroker, SignalServer, SiteId};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: SocketAddr,
    broker: Arc<SignalBroker>,
    _shutdown: oneshot::Sender<()>,
}

/// Boot a server on an ephemeral port.
async fn boot_server() -> TestServer {
    boot_server_with(|config| config).await
}

/// Boot a server with adjusted configuration.
async fn boot_server_with(configure: impl FnOnce(ServerConfig) -> ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = configure(ServerConfig::with_addr(addr).stats_interval(Duration::ZERO));
    let server = Arc::new(SignalServer::new(config));
    let broker = Arc::clone(server.broker());

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve_until(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        broker,
        _shutdown: shutdown_tx,
    }
}

struct Peer {
    ws: WsStream,
    id: ClientId,
}

impl Peer {
    /// Connect and read the welcome.
    async fn connect(server: &TestServer) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", server.addr)).await.unwrap();
        let mut peer = Self {
            ws,
            id: ClientId::generate(),
        };

        let welcome = peer.recv().await;
        assert_eq!(welcome["type"], "welcome");
        peer.id = serde_json::from_value(welcome["clientId"].clone()).unwrap();
        peer
    }

    async fn site(server: &TestServer, site: &str) -> Self {
        let mut peer = Self::connect(server).await;
        peer.send(json!({"type": "hello", "role": "site", "siteId": site, "name": "Test site"}))
            .await;
        let site = &SiteId::from(site);
        let broker = &server.broker;
        let id = peer.id;
        wait_for(|| async move { broker.resolve_site(site).await == Some(id) }).await;
        peer
    }

    async fn operator(server: &TestServer) -> Self {
        let mut peer = Self::connect(server).await;
        peer.send(json!({"type": "hello", "role": "operator", "name": "op"}))
            .await;
        peer
    }

    async fn send(&mut self, value: Value) {
        self.send_text(value.to_string()).await;
    }

    async fn send_text(&mut self, text: String) {
        assert_ok!(self.ws.send(Message::Text(text.into())).await);
    }

    /// Next text frame, raw.
    async fn recv_text(&mut self) -> String {
        loop {
            let frame = timeout(TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return text.as_str().to_owned();
            }
        }
    }

    async fn recv(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).unwrap()
    }

    /// Assert nothing arrives for a short while.
    async fn expect_silence(&mut self) {
        let result = timeout(Duration::from_millis(200), self.ws.next()).await;
        assert!(result.is_err(), "unexpected frame: {:?}", result);
    }
}

/// Whether a WebSocket upgrade completes, the welcome included.
async fn try_connect(server: &TestServer) -> bool {
    let attempt = timeout(Duration::from_millis(500), async {
        let (mut ws, _) = connect_async(format!("ws://{}", server.addr)).await.ok()?;
        match ws.next().await {
            Some(Ok(Message::Text(_))) => Some(()),
            _ => None,
        }
    })
    .await;
    matches!(attempt, Ok(Some(())))
}

/// Retry until a connection is accepted.
async fn connect_eventually(server: &TestServer) {
    for _ in 0..50 {
        if try_connect(server).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never accepted a connection");
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_full_session_scenario() {
    let server = boot_server().await;
    let mut site = Peer::site(&server, "X").await;
    let mut o1 = Peer::operator(&server).await;

    o1.send(json!({"type": "watch", "siteId": "X"})).await;
    assert_eq!(
        site.recv().await,
        json!({"type": "incoming-viewer", "operatorId": o1.id.to_string(), "siteId": "X"})
    );

    site.send(json!({
        "type": "offer",
        "to": o1.id.to_string(),
        "siteId": "X",
        "sdp": {"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"},
    }))
    .await;
    assert_eq!(
        o1.recv().await,
        json!({
            "type": "offer",
            "from": site.id.to_string(),
            "siteId": "X",
            "sdp": {"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"},
        })
    );

    o1.send(json!({"type": "answer", "siteId": "X", "sdp": {"type": "answer", "sdp": "v=0"}}))
        .await;
    assert_eq!(
        site.recv().await,
        json!({
            "type": "answer",
            "from": o1.id.to_string(),
            "siteId": "X",
            "sdp": {"type": "answer", "sdp": "v=0"},
        })
    );

    o1.send(json!({"type": "promote", "siteId": "X"})).await;
    assert_eq!(
        site.recv().await,
        json!({"type": "promote", "operatorId": o1.id.to_string(), "siteId": "X"})
    );
    assert_eq!(server.broker.primary_of(&SiteId::from("X")).await, Some(o1.id));

    let o1_id = o1.id;
    drop(o1);
    let broker = &server.broker;
    wait_for(|| async move { broker.clients().lookup(o1_id).await.is_none() }).await;
    assert!(server.broker.primary_of(&SiteId::from("X")).await.is_none());

    let mut o2 = Peer::operator(&server).await;
    o2.send(json!({"type": "watch", "siteId": "X"})).await;
    assert_eq!(
        site.recv().await,
        json!({"type": "incoming-viewer", "operatorId": o2.id.to_string(), "siteId": "X"})
    );
    o2.expect_silence().await;
}

#[tokio::test]
async fn test_watch_offline_site_over_the_wire() {
    let server = boot_server().await;
    let mut op = Peer::operator(&server).await;

    op.send(json!({"type": "watch", "siteId": "nowhere"})).await;

    assert_eq!(
        op.recv().await,
        json!({"type": "site-offline", "siteId": "nowhere"})
    );
    assert!(server
        .broker
        .watchers_of(&SiteId::from("nowhere"))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_ice_candidate_forwarded_byte_identical() {
    let server = boot_server().await;
    let mut site = Peer::site(&server, "X").await;
    let mut op = Peer::operator(&server).await;
    op.send(json!({"type": "watch", "siteId": "X"})).await;
    site.recv().await;

    let candidate = r#"{"candidate" : "candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx",   "sdpMid":"0","usernameFragment":null}"#;
    op.send_text(format!(
        r#"{{"type":"ice","siteId":"X","candidate":{}}}"#,
        candidate
    ))
    .await;

    let frame = site.recv_text().await;
    assert_eq!(
        frame,
        format!(r#"{{"type":"ice","from":"{}","candidate":{}}}"#, op.id, candidate)
    );

    site.send_text(format!(
        r#"{{"type":"ice","to":"{}","candidate":{}}}"#,
        op.id, candidate
    ))
    .await;

    let frame = op.recv_text().await;
    assert_eq!(
        frame,
        format!(
            r#"{{"type":"ice","from":"{}","siteId":"X","candidate":{}}}"#,
            site.id, candidate
        )
    );
}

#[tokio::test]
async fn test_malformed_frames_do_not_close_connection() {
    let server = boot_server().await;
    let mut op = Peer::operator(&server).await;

    op.send_text("definitely not json".to_string()).await;
    op.send(json!({"type": "from-the-future", "siteId": "X"})).await;
    op.send(json!({"type": "watch"})).await;
    assert_ok!(
        op.ws
            .send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef].into()))
            .await
    );

    op.send(json!({"type": "watch", "siteId": "X"})).await;
    assert_eq!(op.recv().await, json!({"type": "site-offline", "siteId": "X"}));
}

#[tokio::test]
async fn test_site_disconnect_notifies_watchers() {
    let server = boot_server().await;
    let mut site = Peer::site(&server, "X").await;
    let mut op = Peer::operator(&server).await;
    op.send(json!({"type": "watch", "siteId": "X"})).await;
    site.recv().await;

    assert_ok!(site.ws.close(None).await);

    assert_eq!(op.recv().await, json!({"type": "site-offline", "siteId": "X"}));
    assert!(server.broker.resolve_site(&SiteId::from("X")).await.is_none());
}

#[tokio::test]
async fn test_attention_reaches_every_watcher() {
    let server = boot_server().await;
    let mut site = Peer::site(&server, "X").await;
    let mut a = Peer::operator(&server).await;
    let mut b = Peer::operator(&server).await;
    a.send(json!({"type": "watch", "siteId": "X"})).await;
    b.send(json!({"type": "watch", "siteId": "X"})).await;
    site.recv().await;
    site.recv().await;

    site.send(json!({"type": "attention"})).await;

    for op in [&mut a, &mut b] {
        let msg = op.recv().await;
        assert_eq!(msg["type"], "attention");
        assert_eq!(msg["siteId"], "X");
        assert!(msg["at"].is_i64());
    }
    site.expect_silence().await;
}

#[tokio::test]
async fn test_bye_closes_connection() {
    let server = boot_server().await;
    let mut op = Peer::operator(&server).await;
    let id = op.id;

    op.send(json!({"type": "bye"})).await;

    let ended = timeout(TIMEOUT, async {
        loop {
            match op.ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "connection was not closed");
    let broker = &server.broker;
    wait_for(|| async move { broker.clients().lookup(id).await.is_none() }).await;
}

#[tokio::test]
async fn test_connection_limit_refuses_then_frees_slot() {
    let server = boot_server_with(|config| config.max_connections(1)).await;
    let first = Peer::connect(&server).await;
    let first_id = first.id;

    assert!(!try_connect(&server).await);

    drop(first);
    let broker = &server.broker;
    wait_for(|| async move { broker.clients().lookup(first_id).await.is_none() }).await;

    connect_eventually(&server).await;
}

#[tokio::test]
async fn test_stalled_upgrade_releases_slot_after_timeout() {
    let server = boot_server_with(|config| {
        config
            .max_connections(1)
            .handshake_timeout(Duration::from_millis(200))
    })
    .await;

    // Plain TCP, never upgraded
    let _idle = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    connect_eventually(&server).await;
}
