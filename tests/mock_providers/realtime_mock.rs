//! WebSocket mock of the OpenAI Realtime API
//!
//! Accepts one connection at a time. Every client event is forwarded to the
//! test as parsed JSON; the test scripts server events through
//! [`MockCommand`]s.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// Instructions for the mock server.
#[derive(Debug)]
pub enum MockCommand {
    /// Send a server event
    Send(Value),
    /// Close the connection
    Close,
}

/// Running mock server.
pub struct RealtimeMockServer {
    pub addr: SocketAddr,
    /// Authorization header of the last accepted connection
    pub authorization: Arc<Mutex<Option<String>>>,
    /// Number of connections that ended
    pub closed_connections: Arc<AtomicU64>,
    client_events: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<MockCommand>,
    handle: JoinHandle<()>,
}

impl RealtimeMockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (events_tx, client_events) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let authorization = Arc::new(Mutex::new(None));
        let closed_connections = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(serve(
            listener,
            events_tx,
            commands_rx,
            authorization.clone(),
            closed_connections.clone(),
        ));

        Self {
            addr,
            authorization,
            closed_connections,
            client_events,
            commands,
            handle,
        }
    }

    /// Base URL to configure as the realtime endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub fn send(&self, event: Value) {
        self.commands.send(MockCommand::Send(event)).unwrap();
    }

    pub fn close(&self) {
        self.commands.send(MockCommand::Close).unwrap();
    }

    /// Next client event, failing the test after two seconds.
    pub async fn next_event(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.client_events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("mock server stopped")
    }

    /// Next client event of the given type, skipping others.
    pub async fn next_event_of(&mut self, event_type: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Wait until `n` connections have ended.
    pub async fn wait_closed(&self, n: u64) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while self.closed_connections.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for the gateway to close the AI leg");
    }
}

impl Drop for RealtimeMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Endpoint that accepts TCP connections but never answers the WebSocket
/// upgrade, holding every socket open until dropped.
pub struct StalledEndpoint {
    pub addr: SocketAddr,
    /// Number of TCP connections accepted
    pub accepted: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl StalledEndpoint {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicU64::new(0));

        let counter = accepted.clone();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Self {
            addr,
            accepted,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Wait until the gateway has dialled in.
    pub async fn wait_accepted(&self) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.accepted.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("gateway never dialled the realtime endpoint");
    }
}

impl Drop for StalledEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    listener: TcpListener,
    events_tx: mpsc::UnboundedSender<Value>,
    mut commands_rx: mpsc::UnboundedReceiver<MockCommand>,
    authorization: Arc<Mutex<Option<String>>>,
    closed_connections: Arc<AtomicU64>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let mut seen_auth = None;
        let callback = |request: &Request, response: Response| {
            seen_auth = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };

        let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
            continue;
        };
        *authorization.lock().await = seen_auth;

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                            let _ = events_tx.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
                command = commands_rx.recv() => match command {
                    Some(MockCommand::Send(event)) => {
                        if write.send(Message::Text(event.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(MockCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
            }
        }

        closed_connections.fetch_add(1, Ordering::SeqCst);
    }
}
