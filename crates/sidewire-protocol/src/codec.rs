//! Codec trait and the JSON implementation used on the wire.
//!
//! A codec only turns values into bytes and back. It knows nothing about
//! sequences or categories; classifying a decoded value into a reply or a
//! push happens in [`Inbound::decode`](crate::Inbound::decode).

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so a single codec can live in the client's
/// shared state and be used from the reader task and every caller.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// The service speaks JSON text frames, so this is the codec the client
/// uses. Frames stay human-readable in logs and packet captures.
///
/// ## Example
///
/// ```rust
/// use sidewire_protocol::{Codec, JsonCodec, Operation, Request};
///
/// let codec = JsonCodec;
/// let request = Request {
///     sequence: 7,
///     operation: Operation::Echo,
///     arguments: serde_json::json!({ "message": "hi" }),
/// };
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: Request = codec.decode(&bytes).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
