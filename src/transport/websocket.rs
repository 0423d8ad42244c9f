//! Always-reconnecting WebSocket transport.
//!
//! One background run loop owns the socket. It reconnects forever with
//! exponential backoff, reports its state through a watch channel, and fans
//! inbound `message` frames out to subscribed callbacks. Registrations are
//! cleared whenever the socket drops: subscriptions do not survive a
//! reconnect, and callers that were already subscribed are not notified of
//! the loss.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::config::TransportConfig;

use super::{
    ClientFrame, ExponentialBackoff, InboundMessage, LinkState, MessageHandler, RouteTable,
    ServerFrame, Subscription, Transport, TransportError,
};

const COMMAND_BUFFER_SIZE: usize = 32;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;

/// How a connection session ended.
enum SessionEnd {
    /// Deactivation was requested; the run loop must stop
    Shutdown,
    /// The socket dropped; the run loop should reconnect
    Dropped,
}

struct Inner {
    config: TransportConfig,
    state_tx: watch::Sender<LinkState>,
    routes: RouteTable,
    /// Present while a socket is up; commands are forwarded to the run loop
    outbound: Mutex<Option<mpsc::Sender<ClientFrame>>>,
    active: AtomicBool,
    /// Bumped on every activation; stale run loops must not clobber a newer one
    generation: AtomicU64,
    shutdown: broadcast::Sender<()>,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn set_state(&self, generation: u64, state: LinkState) {
        if self.is_current(generation) {
            self.state_tx.send_replace(state);
        }
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Message { destination, body }) => {
                let delivered = self.routes.dispatch(&InboundMessage {
                    destination: destination.clone(),
                    body,
                });
                tracing::trace!(
                    destination = %destination,
                    delivered = delivered,
                    "Dispatched inbound message"
                );
            }
            Ok(ServerFrame::Error { code, message }) => {
                // Broker protocol errors do not change connection state and
                // do not fail pending readiness waits.
                tracing::error!(code = %code, message = %message, "Broker reported an error");
            }
            Ok(ServerFrame::Pong) => {
                tracing::trace!("Heartbeat pong received");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse broker frame");
            }
        }
    }
}

/// WebSocket-backed [`Transport`] with built-in reconnection.
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

impl WebSocketTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let (shutdown, _) = broadcast::channel(1);

        Self {
            inner: Arc::new(Inner {
                config,
                state_tx,
                routes: RouteTable::new(),
                outbound: Mutex::new(None),
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    /// The broker endpoint this transport connects to.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    async fn send_command(&self, frame: ClientFrame) -> Result<(), TransportError> {
        // Clone the sender out so the lock is not held across the send
        let tx = { self.inner.outbound.lock().await.clone() };
        match tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| TransportError::ChannelClosed),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn activate(&self) {
        if self.inner.active.swap(true, Ordering::AcqRel) {
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let shutdown_rx = self.inner.shutdown.subscribe();
        let inner = self.inner.clone();

        tokio::spawn(run(inner, generation, shutdown_rx));
    }

    async fn deactivate(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }

        // Invalidate the running generation first: a run loop that has not
        // yet subscribed its shutdown receiver still stops at its next
        // generation check.
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.shutdown.send(());
        *self.inner.outbound.lock().await = None;
        self.inner.routes.clear();
        self.inner.state_tx.send_replace(LinkState::Disconnected);

        tracing::info!(url = %self.inner.config.url, "Transport deactivated");
    }

    fn state(&self) -> watch::Receiver<LinkState> {
        self.inner.state_tx.subscribe()
    }

    async fn subscribe(
        &self,
        destination: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, TransportError> {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            destination: destination.to_string(),
        };

        // Register the route first so a frame arriving right after the
        // broker processes the subscribe cannot be dropped.
        self.inner
            .routes
            .insert(destination, subscription.id, handler);

        if let Err(e) = self
            .send_command(ClientFrame::Subscribe {
                id: subscription.id,
                destination: destination.to_string(),
            })
            .await
        {
            self.inner.routes.remove(destination, subscription.id);
            return Err(e);
        }

        tracing::debug!(
            subscription_id = %subscription.id,
            destination = %destination,
            "Subscribed to destination"
        );

        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), TransportError> {
        self.inner
            .routes
            .remove(&subscription.destination, subscription.id);

        match self
            .send_command(ClientFrame::Unsubscribe {
                id: subscription.id,
            })
            .await
        {
            Ok(()) => Ok(()),
            // Local removal is enough when the link is down
            Err(TransportError::NotConnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn publish(&self, destination: &str, body: String) -> Result<(), TransportError> {
        self.send_command(ClientFrame::Send {
            destination: destination.to_string(),
            body,
        })
        .await
    }
}

/// The transport run loop: connect, run a session, reconnect on drop.
async fn run(inner: Arc<Inner>, generation: u64, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut backoff = ExponentialBackoff::with_config(inner.config.backoff());

    tracing::info!(url = %inner.config.url, "Transport run loop started");

    loop {
        if !inner.is_current(generation) || !inner.active.load(Ordering::Acquire) {
            break;
        }

        inner.set_state(generation, LinkState::Connecting);

        let stream = tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = connect_async(inner.config.url.as_str()) => match result {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "WebSocket connect failed, retrying"
                    );
                    inner.set_state(generation, LinkState::Disconnected);
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            }
        };

        backoff.reset();

        let end = session(&inner, generation, stream, &mut shutdown_rx).await;

        // The session is over: registrations made against it are void and
        // the readiness barrier re-arms for the next connection.
        if inner.is_current(generation) {
            inner.routes.clear();
            *inner.outbound.lock().await = None;
        }
        inner.set_state(generation, LinkState::Disconnected);

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Dropped => {
                let delay = backoff.next_delay();
                tracing::info!(
                    retry_in_ms = delay.as_millis() as u64,
                    "Connection lost, reconnecting"
                );
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::info!(url = %inner.config.url, "Transport run loop stopped");
}

/// Drive one established connection until it drops or shutdown is requested.
async fn session(
    inner: &Arc<Inner>,
    generation: u64,
    stream: WsStream,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::channel::<ClientFrame>(COMMAND_BUFFER_SIZE);

    if !inner.is_current(generation) || !inner.active.load(Ordering::Acquire) {
        return SessionEnd::Shutdown;
    }
    *inner.outbound.lock().await = Some(tx);

    // Only flip to Connected once the command channel is installed, so
    // callers released by the gate can subscribe immediately.
    inner.set_state(generation, LinkState::Connected);
    tracing::info!(url = %inner.config.url, "WebSocket connection established");

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(inner.config.heartbeat_interval.max(1)));
    // Skip immediate first tick
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = sink.close().await;
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                if send_frame(&mut sink, &ClientFrame::Ping).await.is_err() {
                    return SessionEnd::Dropped;
                }
            }
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                }
                // Outbound sender cleared by deactivation
                None => return SessionEnd::Shutdown,
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => inner.handle_text(&text),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Broker closed the connection");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {
                    tracing::debug!("Ignoring non-text frame");
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    return SessionEnd::Dropped;
                }
                None => {
                    tracing::warn!("WebSocket stream ended");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &ClientFrame) -> Result<(), TransportError> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound frame");
            return Ok(());
        }
    };

    sink.send(Message::Text(json))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}
