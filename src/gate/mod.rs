//! Readiness-gated access to a reconnecting transport.
//!
//! Callers never poll connection state themselves. Every gated operation
//! activates the transport if needed and suspends on the readiness barrier
//! until the transport reports connected; the barrier re-arms automatically
//! whenever the transport drops, so the same wait protects every reconnect
//! cycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;
use crate::error::{GateError, Result};
use crate::transport::websocket::WebSocketTransport;
use crate::transport::{InboundMessage, LinkState, Subscription, Transport};

/// Serializes all transport usage behind a readiness barrier.
///
/// The gate owns nothing durable: it holds a shared transport and a watch
/// receiver over its state. Gating always goes through the readiness wait
/// rather than the [`connected`](ConnectionGate::connected) flag, so a
/// caller can never slip through between "flag says connected" and the
/// transport flipping back to disconnected.
pub struct ConnectionGate<T: Transport> {
    transport: Arc<T>,
    connect_timeout: Option<Duration>,
}

impl<T: Transport> ConnectionGate<T> {
    /// Gate with an unbounded readiness wait: if the transport never
    /// connects, gated calls suspend indefinitely.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            connect_timeout: None,
        }
    }

    /// Gate whose readiness waits fail with
    /// [`GateError::ConnectionTimeout`] after `timeout`.
    pub fn with_connect_timeout(transport: Arc<T>, timeout: Duration) -> Self {
        Self {
            transport,
            connect_timeout: Some(timeout),
        }
    }

    /// The shared transport behind this gate.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Activate the transport if inactive and wait until it reports
    /// connected.
    pub async fn connect(&self) -> Result<()> {
        self.await_ready().await
    }

    /// Like [`connect`](Self::connect), invoking `on_ready` once readiness
    /// is confirmed.
    pub async fn connect_with<F>(&self, on_ready: F) -> Result<()>
    where
        F: FnOnce(),
    {
        self.await_ready().await?;
        on_ready();
        Ok(())
    }

    /// Wait for readiness, then register `on_message` for `destination`.
    ///
    /// Safe to call before any [`connect`](Self::connect): it shares the
    /// same readiness wait and triggers activation itself.
    pub async fn subscribe<F>(&self, destination: &str, on_message: F) -> Result<Subscription>
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        self.await_ready().await?;
        let subscription = self
            .transport
            .subscribe(destination, Arc::new(on_message))
            .await?;
        Ok(subscription)
    }

    /// Release a subscription handle.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        self.transport.unsubscribe(subscription).await?;
        Ok(())
    }

    /// Wait for readiness, then send a structured body serialized as JSON.
    ///
    /// Never errors merely for being called before `connect`; like every
    /// gated call it activates the transport and suspends until readiness.
    pub async fn publish<B>(&self, destination: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let text = serde_json::to_string(body)?;
        self.publish_raw(destination, text).await
    }

    /// Wait for readiness, then send a pre-serialized body unchanged.
    pub async fn publish_raw(&self, destination: &str, body: String) -> Result<()> {
        self.await_ready().await?;
        self.transport.publish(destination, body).await?;
        Ok(())
    }

    /// Tear down the transport if active; idempotent when already inactive.
    ///
    /// Does not resolve or clear the readiness barrier: the next gated call
    /// re-activates the transport and waits afresh.
    pub async fn disconnect(&self) {
        self.transport.deactivate().await;
    }

    /// Last state the transport reported. Observational only; gated calls
    /// never consult this flag.
    pub fn connected(&self) -> bool {
        *self.transport.state().borrow() == LinkState::Connected
    }

    /// The shared readiness wait: activate if needed, then suspend until
    /// the transport's state watch reads `Connected`. The watch cell is
    /// re-armed by the transport on every close, so a wait started after a
    /// drop can only be released by a fresh connected signal.
    async fn await_ready(&self) -> Result<()> {
        self.transport.activate();

        let mut state = self.transport.state();
        let wait = state.wait_for(|s| *s == LinkState::Connected);

        match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(GateError::Stopped),
                Err(_) => Err(GateError::ConnectionTimeout),
            },
            None => match wait.await {
                Ok(_) => Ok(()),
                Err(_) => Err(GateError::Stopped),
            },
        }
    }
}

impl ConnectionGate<WebSocketTransport> {
    /// Build a WebSocket-backed gate from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let transport = Arc::new(WebSocketTransport::new(settings.transport.clone()));
        Self {
            transport,
            connect_timeout: settings.transport.connect_timeout(),
        }
    }
}
