//! Transport abstraction for the always-reconnecting pub/sub client.
//!
//! The gate never talks to a socket directly. It drives a [`Transport`],
//! observes its reported [`LinkState`] through a watch channel, and hands
//! subscription callbacks through untouched. Message bodies are opaque
//! strings at this layer.

mod backoff;
mod frame;
mod router;
pub mod websocket;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use frame::{ClientFrame, ServerFrame};
pub use router::RouteTable;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Connection state last reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No connection and no attempt in progress
    #[default]
    Disconnected,
    /// An activation is running but the broker has not confirmed yet
    Connecting,
    /// The broker confirmed the connection; subscribe/publish are safe
    Connected,
}

/// An inbound message delivered to a subscription callback.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Logical channel the broker routed this message on
    pub destination: String,
    /// Opaque body; the transport does not parse it
    pub body: String,
}

/// Callback invoked once per inbound message on a subscribed destination.
///
/// Invocations are in-order per destination; there is no ordering guarantee
/// across destinations.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Caller-owned handle for one (destination, callback) registration.
///
/// The transport keeps no registry of handles on the caller's behalf;
/// releasing the handle via `unsubscribe` is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub destination: String,
}

/// Errors reported by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires an established connection
    #[error("Transport is not connected")]
    NotConnected,

    /// The outbound command channel to the connection task is gone
    #[error("Transport command channel closed")]
    ChannelClosed,

    /// Underlying WebSocket failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// An always-reconnecting publish/subscribe client.
///
/// Implementations own their reconnect policy; `activate` starts the
/// connection attempt sequence and the transport keeps retrying on its own
/// until `deactivate`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start the transport's connection loop.
    ///
    /// Idempotent: activating an already-active transport is a no-op. Must
    /// be called from within a tokio runtime.
    fn activate(&self);

    /// Tear down the transport if active; idempotent when already inactive.
    async fn deactivate(&self);

    /// Watch receiver over the transport's reported connection state.
    fn state(&self) -> watch::Receiver<LinkState>;

    /// Register a callback for a destination and return its handle.
    ///
    /// Callers must only invoke this once the transport reports connected;
    /// the gate enforces that ordering.
    async fn subscribe(
        &self,
        destination: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, TransportError>;

    /// Release a subscription handle, stopping delivery for its callback.
    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), TransportError>;

    /// Send an opaque body to a destination. Fire-and-forget: delivery is
    /// not acknowledged and the broker may drop on disconnect.
    async fn publish(&self, destination: &str, body: String) -> Result<(), TransportError>;
}
