//! Wire protocol for sidewire.
//!
//! This crate defines what travels on the bus and nothing else:
//!
//! - **Types** ([`Request`], [`Reply`], [`PushNotification`], [`Inbound`])
//!   and the two name enumerations ([`Operation`], [`PushKind`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): values to bytes and back.
//! - **Sequences** ([`SequenceAllocator`]): correlation numbers in
//!   `[1, MAX]`, zero reserved for pushes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Inbound) → Correlator / Push dispatcher
//! ```
//!
//! The protocol layer doesn't know about connections or pending calls.

mod codec;
mod error;
mod sequence;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use sequence::{DEFAULT_MAX_SEQUENCE, SequenceAllocator};
pub use types::{Inbound, Operation, PUSH_SEQUENCE, PushKind, PushNotification, Reply, Request};
