//! Readiness-gated access to a realtime chat backend.
//!
//! The crate is built around two pieces: a [`Transport`] abstraction over an
//! always-reconnecting publish/subscribe client, and a [`ConnectionGate`]
//! that serializes all transport usage behind a readiness barrier so callers
//! never subscribe or publish before the transport reports connected.

// Supporting modules
pub mod config;
pub mod error;
pub mod message;

// Core
pub mod gate;
pub mod transport;

pub use config::{Settings, TransportConfig};
pub use error::{GateError, Result};
pub use gate::ConnectionGate;
pub use message::{ChatMessage, MessageType, SenderInfo};
pub use transport::websocket::WebSocketTransport;
pub use transport::{InboundMessage, LinkState, Subscription, Transport, TransportError};
