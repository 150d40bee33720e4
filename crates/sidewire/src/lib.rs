//! # Sidewire
//!
//! Client engine for a request/reply + push notification bus carried over
//! a single WebSocket.
//!
//! One [`Client`] owns one connection. Calls are tagged with a sequence
//! number and may complete in any order; the service's unsolicited
//! pushes are routed to subscribers by [`PushKind`]. The connection goes
//! through a fixed lifecycle (see [`ConnectionState`]) and only accepts
//! application calls once the handshake has identified the bot.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sidewire::prelude::*;
//!
//! # async fn run() -> Result<(), SidewireError> {
//! sidewire::logging::init();
//!
//! let client = Client::builder().host("127.0.0.1:24011").build();
//! client.on(PushKind::IdentityJoined, |push| {
//!     println!("joined: {}", push.data);
//!     Ok(())
//! });
//!
//! let bot_name = client.connect().await?;
//! let players = client.list_identities().await?;
//! println!("{bot_name} sees {} players", players.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod correlator;
mod error;
mod facade;
mod identity;
pub mod logging;
mod reader;
mod state;

pub use client::{Client, ClientBuilder, ClientEvent};
pub use config::{ClientConfig, DEFAULT_URL, SERVICE_PATH};
pub use error::SidewireError;
pub use facade::MenuEntry;
pub use identity::{Identity, IdentityInfo, IdentityQuery};
pub use state::ConnectionState;

pub use sidewire_protocol::{Operation, PushKind, PushNotification, Reply};
pub use sidewire_push::{HandlerError, SubscriptionId};

/// Convenience re-exports for the common case.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientEvent, ConnectionState, Identity,
        IdentityInfo, IdentityQuery, MenuEntry, Operation, PushKind, PushNotification, Reply,
        SidewireError, SubscriptionId,
    };
}
