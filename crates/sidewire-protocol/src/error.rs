//! Error types for the protocol layer.
//!
//! Each crate in sidewire defines its own error enum. A `ProtocolError`
//! always means the bytes or their shape were wrong, never that the
//! network failed.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON, or don't match the requested type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed as JSON but is missing a required field or has
    /// a top-level shape that is neither a reply nor a push.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
