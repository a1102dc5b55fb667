//! Shared test infrastructure: mock GraphQL servers and wait helpers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing_subscriber::EnvFilter;

use crate::identifiers::OperationId;
use crate::protocol::{ConnectionInitPayload, SUBPROTOCOL};

/// How long helpers wait for an expected event.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or the wait times out.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// An HTTP endpoint nothing listens on.
pub async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/v1/graphql")
}

// ============================================================================
// MockWsServer
// ============================================================================

/// Knobs for [`MockWsServer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockWsBehavior {
    /// Close the first connection right after its `connection_init`.
    pub reject_first_init: bool,
    /// Delay before every `connection_ack`.
    pub ack_delay: Duration,
}

#[derive(Debug, Clone)]
enum Control {
    Drop,
    Push(String),
}

struct WsContext {
    behavior: MockWsBehavior,
    rejected: AtomicBool,
    connections: AtomicUsize,
    subscribes: AtomicUsize,
    inits: mpsc::UnboundedSender<ConnectionInitPayload>,
    completes: mpsc::UnboundedSender<OperationId>,
}

/// Minimal `graphql-transport-ws` server.
///
/// Acks every `connection_init`, answers each `subscribe` with one
/// `next { data: { tick: 1 } }` (or an `error` when the query mentions
/// `fail`) and answers pings.
pub struct MockWsServer {
    /// HTTP form of the endpoint, as a client would be configured with.
    pub url: String,
    context: Arc<WsContext>,
    control: broadcast::Sender<Control>,
    inits: mpsc::UnboundedReceiver<ConnectionInitPayload>,
    completes: mpsc::UnboundedReceiver<OperationId>,
    task: JoinHandle<()>,
}

impl MockWsServer {
    pub async fn start(behavior: MockWsBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (init_tx, inits) = mpsc::unbounded_channel();
        let (complete_tx, completes) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(16);

        let context = Arc::new(WsContext {
            behavior,
            rejected: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            inits: init_tx,
            completes: complete_tx,
        });

        let task = tokio::spawn({
            let context = Arc::clone(&context);
            let control = control.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_ws(stream, Arc::clone(&context), control.subscribe()));
                }
            }
        });

        Self {
            url: format!("http://{addr}/v1/graphql"),
            context,
            control,
            inits,
            completes,
            task,
        }
    }

    /// Waits for the next `connection_init` payload.
    pub async fn next_init(&mut self) -> ConnectionInitPayload {
        timeout(WAIT_TIMEOUT, self.inits.recv())
            .await
            .expect("timed out waiting for connection_init")
            .expect("server stopped")
    }

    /// Waits for the next client `complete`.
    pub async fn next_complete(&mut self) -> OperationId {
        timeout(WAIT_TIMEOUT, self.completes.recv())
            .await
            .expect("timed out waiting for complete")
            .expect("server stopped")
    }

    /// Number of accepted WebSocket handshakes.
    pub fn connection_count(&self) -> usize {
        self.context.connections.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` frames received.
    pub fn subscribe_count(&self) -> usize {
        self.context.subscribes.load(Ordering::SeqCst)
    }

    /// Drops every live connection without a close handshake.
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Sends a raw frame on every live connection.
    pub fn push(&self, frame: Value) {
        let _ = self.control.send(Control::Push(frame.to_string()));
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn negotiate(_request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    response
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    Ok(response)
}

async fn serve_ws(
    stream: TcpStream,
    context: Arc<WsContext>,
    mut control: broadcast::Receiver<Control>,
) {
    let Ok(mut ws) = accept_hdr_async(stream, negotiate).await else {
        return;
    };
    context.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = control.recv() => match command {
                Ok(Control::Push(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Control::Drop) | Err(_) => return,
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !handle_frame(&mut ws, &context, &text).await {
                        return;
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            },
        }
    }
}

async fn handle_frame(ws: &mut WebSocketStream<TcpStream>, context: &WsContext, text: &str) -> bool {
    let Ok(message) = serde_json::from_str::<Value>(text) else {
        return true;
    };

    match message["type"].as_str() {
        Some("connection_init") => {
            let payload = serde_json::from_value(message["payload"].clone()).unwrap_or_default();
            let _ = context.inits.send(payload);
            if context.behavior.reject_first_init && !context.rejected.swap(true, Ordering::SeqCst) {
                let _ = ws.close(None).await;
                return false;
            }
            if !context.behavior.ack_delay.is_zero() {
                sleep(context.behavior.ack_delay).await;
            }
            reply(ws, json!({ "type": "connection_ack" })).await
        }
        Some("subscribe") => {
            context.subscribes.fetch_add(1, Ordering::SeqCst);
            let id = message["id"].clone();
            let query = message["payload"]["query"].as_str().unwrap_or_default();
            let frame = if query.contains("fail") {
                json!({ "type": "error", "id": id, "payload": [{ "message": "denied" }] })
            } else {
                json!({ "type": "next", "id": id, "payload": { "data": { "tick": 1 } } })
            };
            reply(ws, frame).await
        }
        Some("complete") => {
            if let Ok(id) = serde_json::from_value(message["id"].clone()) {
                let _ = context.completes.send(id);
            }
            true
        }
        Some("ping") => reply(ws, json!({ "type": "pong" })).await,
        _ => true,
    }
}

async fn reply(ws: &mut WebSocketStream<TcpStream>, frame: Value) -> bool {
    ws.send(Message::Text(frame.to_string().into())).await.is_ok()
}

// ============================================================================
// MockHttpServer
// ============================================================================

/// One request received by [`MockHttpServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

/// HTTP server answering every request with a fixed status and body.
pub struct MockHttpServer {
    pub url: String,
    requests: mpsc::UnboundedReceiver<CapturedRequest>,
    count: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockHttpServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    /// Like [`start`](Self::start), but holds each response for `delay`
    /// after the request has been captured.
    pub async fn start_with_delay(status: u16, body: &'static str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (request_tx, requests) = mpsc::unbounded_channel();
        let count = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let count = Arc::clone(&count);
            async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let Some(captured) = read_request(&mut stream).await else {
                        continue;
                    };
                    count.fetch_add(1, Ordering::SeqCst);
                    let _ = request_tx.send(captured);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }

                    let response = format!(
                        "HTTP/1.1 {status} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            }
        });

        Self {
            url: format!("http://{addr}/v1/graphql"),
            requests,
            count,
            task,
        }
    }

    /// Waits for the next captured request.
    pub async fn next_request(&mut self) -> CapturedRequest {
        timeout(WAIT_TIMEOUT, self.requests.recv())
            .await
            .expect("timed out waiting for request")
            .expect("server stopped")
    }

    /// Number of requests served.
    pub fn request_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let headers: Vec<(String, String)> = head
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();
        let length = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = head_end + 4;
        if buf.len() >= body_start + length {
            let body = String::from_utf8_lossy(&buf[body_start..body_start + length]).to_string();
            return Some(CapturedRequest { headers, body });
        }
    }
}
