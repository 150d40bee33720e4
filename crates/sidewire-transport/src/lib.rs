//! Transport abstraction layer for sidewire.
//!
//! Provides the [`Connector`] and [`Connection`] traits: a connector opens
//! exactly one message-oriented duplex connection, and the connection
//! moves whole messages in order. Framing, reconnects and encryption are
//! not this layer's business.
//!
//! Two implementations ship here:
//!
//! - [`WebSocketConnector`] (feature `websocket`, default): a
//!   `tokio-tungstenite` client.
//! - [`MemoryConnection::pair`]: two in-process ends wired together,
//!   used to drive a client against a scripted peer in tests.

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryConnector};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens the single connection a client uses for its whole lifetime.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens the connection. Resolves once the transport is ready to
    /// carry messages in both directions.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive whole messages.
///
/// All methods take `&self`: one task sits in [`recv`](Self::recv) for
/// the connection's lifetime while any number of callers
/// [`send`](Self::send) concurrently, so implementations must not make
/// a pending receive block senders.
pub trait Connection: Send + Sync + 'static {
    /// Sends one message to the remote peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection. A pending or later `recv` on this end
    /// returns `Ok(None)`.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
