//! Streaming connection manager.
//!
//! One persistent `graphql-transport-ws` connection shared by all
//! subscriptions, owned by a background worker task.
//!
//! # Lifecycle
//!
//! The connection is lazy: the worker starts with the first subscription and
//! only holds a socket while at least one subscription is active.
//!
//! ```text
//! Idle ──subscribe──▶ Connecting ──ack──▶ Open ──last complete──▶ Idle
//!                       ▲    │              │
//!                       │  failure        lost / restart
//!                       │    ▼              │
//!                       └─ Waiting ◀────────┘
//! ```
//!
//! Auth headers are computed when `connection_init` is sent, so every
//! (re)connect presents the credential current at that moment. A credential
//! change observed before `connection_ack` discards the handshake and
//! reconnects at once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::AuthHeaders;
use crate::error::{Error, Result};
use crate::identifiers::OperationId;
use crate::protocol::{
    ClientMessage, ConnectionInitPayload, GraphQLResponse, Operation, SUBPROTOCOL, ServerMessage,
};

use super::retry::RetryOptions;
use super::subscription::Subscription;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for the `connection_ack` handshake.
const ACK_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-subscription result channel.
type ResultSender = mpsc::UnboundedSender<Result<GraphQLResponse>>;

/// Commands from handles to the worker.
pub(crate) enum Command {
    /// Register and start an operation.
    Subscribe {
        id: OperationId,
        payload: Value,
        sink: ResultSender,
    },
    /// Stop an operation.
    Complete(OperationId),
    /// Reconnect the session identified by the epoch.
    Restart(u64),
    /// Stop the worker.
    Shutdown,
}

/// Why an open session ended.
enum SessionEnd {
    Idle,
    Restart,
    Lost(Error),
    Shutdown,
}

/// Why a retry wait ended.
enum WaitOutcome {
    Elapsed,
    Restart,
    Shutdown,
}

// ============================================================================
// Streaming URL
// ============================================================================

/// Derives the WebSocket URL from the GraphQL HTTP endpoint.
///
/// `https` becomes `wss`, `http` becomes `ws`. `ws` and `wss` are kept.
///
/// # Errors
///
/// Returns [`Error::Config`] for any other scheme.
pub fn streaming_url(endpoint: &Url) -> Result<Url> {
    let scheme = match endpoint.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::config(format!(
                "unsupported endpoint scheme `{other}`"
            )));
        }
    };

    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot derive {scheme} URL from {endpoint}")))?;
    Ok(url)
}

// ============================================================================
// StreamingConnection
// ============================================================================

/// Handle to the shared streaming connection.
///
/// Cloning is cheap; clones drive the same worker.
#[derive(Clone)]
pub struct StreamingConnection {
    state: Arc<ConnectionState>,
    command_tx: mpsc::UnboundedSender<Command>,
    idle_worker: Arc<Mutex<Option<mpsc::UnboundedReceiver<Command>>>>,
}

/// State shared between handles and the worker.
struct ConnectionState {
    url: Url,
    headers: AuthHeaders,
    retry: RetryOptions,
    open: AtomicBool,
    epoch: AtomicU64,
    attempts: AtomicU64,
}

impl StreamingConnection {
    /// Creates a connection manager for the GraphQL endpoint.
    ///
    /// No socket is opened until the first subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint scheme has no WebSocket
    /// counterpart.
    pub fn new(endpoint: &Url, headers: AuthHeaders, retry: RetryOptions) -> Result<Self> {
        let url = streaming_url(endpoint)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok(Self {
            state: Arc::new(ConnectionState {
                url,
                headers,
                retry,
                open: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
            command_tx,
            idle_worker: Arc::new(Mutex::new(Some(command_rx))),
        })
    }

    /// Returns the WebSocket URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.state.url
    }

    /// Returns `true` while a connection is acknowledged and serving.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// Returns the number of connection attempts made so far.
    #[inline]
    #[must_use]
    pub fn connection_attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::Relaxed)
    }

    /// Closes the open connection and reconnects with fresh headers.
    ///
    /// Active subscriptions are re-sent on the new connection. Returns
    /// `false` without doing anything if no connection is open.
    pub fn restart(&self) -> bool {
        if self
            .state
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Restart ignored, streaming connection not open");
            return false;
        }

        let epoch = self.state.epoch.load(Ordering::Acquire);
        info!(epoch, "Restarting streaming connection");
        self.command_tx.send(Command::Restart(epoch)).is_ok()
    }

    /// Starts a subscription.
    ///
    /// Connects first if no connection is open.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection was shut down
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::Json`] if the operation cannot be serialized
    pub fn subscribe(&self, operation: &Operation) -> Result<Subscription> {
        self.ensure_worker()?;

        let id = OperationId::generate();
        let payload = serde_json::to_value(operation)?;
        let (sink, receiver) = mpsc::unbounded_channel();

        debug!(%id, operation = operation.label(), "Starting subscription");
        self.command_tx
            .send(Command::Subscribe { id, payload, sink })
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(Subscription::new(id, receiver, self.command_tx.clone()))
    }

    /// Stops the worker and closes the connection.
    ///
    /// Active subscriptions end with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        self.idle_worker.lock().take();
        let _ = self.command_tx.send(Command::Shutdown);
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut idle = self.idle_worker.lock();
        let Some(commands) = idle.take() else {
            return Ok(());
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                *idle = Some(commands);
                return Err(Error::config("streaming requires a tokio runtime"));
            }
        };

        debug!(url = %self.state.url, "Spawning streaming worker");
        runtime.spawn(Worker::new(Arc::clone(&self.state), commands).run());
        Ok(())
    }
}

impl fmt::Debug for StreamingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConnection")
            .field("url", &self.state.url.as_str())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Worker
// ============================================================================

struct ActiveSubscription {
    payload: Value,
    sink: ResultSender,
}

struct Worker {
    state: Arc<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    subscriptions: FxHashMap<OperationId, ActiveSubscription>,
}

impl Worker {
    fn new(state: Arc<ConnectionState>, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            state,
            commands,
            subscriptions: FxHashMap::default(),
        }
    }

    async fn run(mut self) {
        let mut retries: u32 = 0;
        let mut last_error: Option<Error> = None;

        loop {
            if self.subscriptions.is_empty() {
                retries = 0;
                last_error = None;
                match self.commands.recv().await {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => {
                        self.apply_offline(command);
                        continue;
                    }
                }
            }

            if let Some(error) = last_error.take() {
                if retries >= self.state.retry.attempts || !self.state.retry.should_retry(&error) {
                    warn!(retries, error = %error, "Giving up on streaming connection");
                    self.fail_all(|| Error::retries_exhausted(retries, error.to_string()));
                    continue;
                }

                let wait = self.state.retry.wait(retries);
                retries = retries.saturating_add(1);
                if let WaitOutcome::Shutdown = self.wait_for_retry(wait).await {
                    break;
                }
                if self.subscriptions.is_empty() {
                    continue;
                }
            }

            let (mut socket, generation) = match self.connect().await {
                Ok(connected) => connected,
                Err(error) => {
                    warn!(retries, error = %error, "Streaming connection attempt failed");
                    last_error = Some(error);
                    continue;
                }
            };

            // Open is published under the credential lock: a token change
            // either fails this check or finds the session open and restarts it.
            let epoch = self.state.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            let published = self
                .state
                .headers
                .credential()
                .if_generation(generation, || self.state.open.store(true, Ordering::Release));
            if !published {
                debug!("Credential changed during handshake, reconnecting");
                let _ = socket.close(None).await;
                continue;
            }

            retries = 0;
            info!(
                url = %self.state.url,
                epoch,
                subscriptions = self.subscriptions.len(),
                "Streaming connection established"
            );

            let end = self.serve(&mut socket, epoch).await;
            self.state.open.store(false, Ordering::Release);

            match end {
                SessionEnd::Idle => {
                    debug!("No active subscriptions, closing streaming connection");
                    let _ = socket.close(None).await;
                }
                SessionEnd::Restart => {
                    let _ = socket.close(None).await;
                }
                SessionEnd::Lost(error) => {
                    warn!(error = %error, "Streaming connection lost");
                    last_error = Some(error);
                }
                SessionEnd::Shutdown => {
                    let _ = socket.close(None).await;
                    break;
                }
            }
        }

        self.state.open.store(false, Ordering::Release);
        self.fail_all(|| Error::ConnectionClosed);
        debug!("Streaming worker terminated");
    }

    /// Opens a socket and completes the protocol handshake.
    ///
    /// Returns the socket and the credential generation its headers came from.
    async fn connect(&mut self) -> Result<(Socket, u64)> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(url = %self.state.url, attempt, "Connecting streaming transport");

        let mut request = self.state.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (mut socket, _) = connect_async(request).await?;

        let (headers, generation) = self.state.headers.current_with_generation();
        let init = ClientMessage::ConnectionInit {
            payload: ConnectionInitPayload { headers },
        };
        send_message(&mut socket, &init).await?;

        timeout(ACK_TIMEOUT, wait_for_ack(&mut socket))
            .await
            .map_err(|_| Error::protocol("timed out waiting for connection_ack"))??;

        Ok((socket, generation))
    }

    async fn serve(&mut self, socket: &mut Socket, epoch: u64) -> SessionEnd {
        let resubscribe: Vec<ClientMessage> = self
            .subscriptions
            .iter()
            .map(|(id, active)| ClientMessage::Subscribe {
                id: *id,
                payload: active.payload.clone(),
            })
            .collect();
        for message in &resubscribe {
            if let Err(e) = send_message(socket, message).await {
                return SessionEnd::Lost(e);
            }
        }

        loop {
            if self.subscriptions.is_empty() {
                return SessionEnd::Idle;
            }

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(Command::Shutdown) => return SessionEnd::Shutdown,
                        Some(Command::Restart(requested)) => {
                            if requested == epoch {
                                return SessionEnd::Restart;
                            }
                            trace!(requested, epoch, "Ignoring restart for previous session");
                        }
                        Some(Command::Subscribe { id, payload, sink }) => {
                            let message = ClientMessage::Subscribe { id, payload: payload.clone() };
                            self.subscriptions.insert(id, ActiveSubscription { payload, sink });
                            if let Err(e) = send_message(socket, &message).await {
                                return SessionEnd::Lost(e);
                            }
                        }
                        Some(Command::Complete(id)) => {
                            if self.subscriptions.remove(&id).is_some() {
                                trace!(%id, "Completing subscription");
                                if let Err(e) = send_message(socket, &ClientMessage::Complete { id }).await {
                                    return SessionEnd::Lost(e);
                                }
                            }
                        }
                    }
                }

                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.dispatch(socket, &text).await {
                                return SessionEnd::Lost(e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return SessionEnd::Lost(Error::connection(close_reason(frame.as_ref())));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return SessionEnd::Lost(e.into()),
                        None => return SessionEnd::Lost(Error::connection("socket stream ended")),
                    }
                }
            }
        }
    }

    /// Routes one server frame to its subscription.
    ///
    /// Only socket write failures are returned; bad or unknown frames are
    /// logged and dropped.
    async fn dispatch(&mut self, socket: &mut Socket, text: &str) -> Result<()> {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable server message");
                return Ok(());
            }
        };

        match message {
            ServerMessage::Next { id, payload } => {
                let delivered = match self.subscriptions.get(&id) {
                    Some(active) => active.sink.send(Ok(payload)).is_ok(),
                    None => {
                        warn!(%id, "Dropping result for unknown operation");
                        return Ok(());
                    }
                };
                if !delivered {
                    debug!(%id, "Subscriber gone, completing operation");
                    self.subscriptions.remove(&id);
                    send_message(socket, &ClientMessage::Complete { id }).await?;
                }
            }
            ServerMessage::Error { id, payload } => match self.subscriptions.remove(&id) {
                Some(active) => {
                    debug!(%id, errors = payload.len(), "Operation rejected by server");
                    let _ = active.sink.send(Err(Error::graphql(payload)));
                }
                None => warn!(%id, "Dropping error for unknown operation"),
            },
            ServerMessage::Complete { id } => {
                if self.subscriptions.remove(&id).is_some() {
                    trace!(%id, "Operation completed by server");
                }
            }
            ServerMessage::Ping { payload } => {
                send_message(socket, &ClientMessage::Pong { payload }).await?;
            }
            ServerMessage::Pong { .. } | ServerMessage::ConnectionAck { .. } => {}
        }

        Ok(())
    }

    async fn wait_for_retry(&mut self, mut wait: BoxFuture<'static, ()>) -> WaitOutcome {
        loop {
            tokio::select! {
                () = &mut wait => return WaitOutcome::Elapsed,
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return WaitOutcome::Shutdown,
                    Some(Command::Restart(epoch)) if epoch == self.state.epoch.load(Ordering::Acquire) => {
                        debug!("Restart requested during retry wait");
                        return WaitOutcome::Restart;
                    }
                    Some(command) => self.apply_offline(command),
                },
            }
        }
    }

    /// Applies a command while no socket is open.
    fn apply_offline(&mut self, command: Command) {
        match command {
            Command::Subscribe { id, payload, sink } => {
                self.subscriptions
                    .insert(id, ActiveSubscription { payload, sink });
            }
            Command::Complete(id) => {
                self.subscriptions.remove(&id);
            }
            Command::Restart(_) | Command::Shutdown => {}
        }
    }

    fn fail_all(&mut self, error: impl Fn() -> Error) {
        let count = self.subscriptions.len();
        for (_, active) in self.subscriptions.drain() {
            let _ = active.sink.send(Err(error()));
        }
        if count > 0 {
            debug!(count, "Failed active subscriptions");
        }
    }
}

// ============================================================================
// Socket helpers
// ============================================================================

async fn send_message(socket: &mut Socket, message: &ClientMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    socket.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn wait_for_ack(socket: &mut Socket) -> Result<()> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)? {
                ServerMessage::ConnectionAck { .. } => return Ok(()),
                ServerMessage::Ping { payload } => {
                    send_message(socket, &ClientMessage::Pong { payload }).await?;
                }
                other => {
                    return Err(Error::protocol(format!(
                        "expected connection_ack, got {other:?}"
                    )));
                }
            },
            Some(Ok(Message::Close(frame))) => {
                return Err(Error::connection(close_reason(frame.as_ref())));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::connection("socket ended before connection_ack")),
        }
    }
}

fn close_reason(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) => format!(
            "closed by server ({}): {}",
            u16::from(frame.code),
            frame.reason.as_str()
        ),
        None => "closed by server".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
