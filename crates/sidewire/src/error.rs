//! Unified error type for the sidewire client.

use std::time::Duration;

use sidewire_protocol::ProtocolError;
use sidewire_transport::TransportError;

/// Top-level error that wraps the sub-crate errors and adds the
/// call-level failures.
///
/// The `#[from]` variants let `?` convert sub-crate errors automatically.
/// Everything a caller is expected to handle (`NotConnected`,
/// `ServiceFault`, `IdentityNotFound`, ...) has its own variant.
#[derive(Debug, thiserror::Error)]
pub enum SidewireError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A call was attempted while the client is not `Ready`.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a client that already left `Disconnected`.
    #[error("client already started")]
    AlreadyStarted,

    /// The service answered with `violate: true`. `detail` is whatever
    /// the service put in the reply's data.
    #[error("service rejected `{operation}`: {detail}")]
    ServiceFault {
        operation: String,
        detail: serde_json::Value,
    },

    /// The call was still pending when the connection went away.
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    /// The handshake could not be completed; the client is `Errored`.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No identity in the most recent listing matched.
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// No reply arrived within the call's deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Every sequence number is held by a pending call.
    #[error("too many calls in flight (limit {0})")]
    TooManyInFlight(u32),

    /// The service answered, but reported that the operation did not
    /// succeed (e.g. `success: false`).
    #[error("`{operation}` failed: {reason}")]
    OperationFailed { operation: String, reason: String },
}
