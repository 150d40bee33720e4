//! Client configuration.

use std::time::Duration;

use sidewire_protocol::{DEFAULT_MAX_SEQUENCE, Operation};

/// Endpoint used when no URL or host is configured.
pub const DEFAULT_URL: &str = "ws://localhost:24011/omega_side";

/// Path the service listens on; appended to bare `host:port` values.
pub const SERVICE_PATH: &str = "/omega_side";

/// Configuration for a [`Client`](crate::Client).
///
/// Build one through [`ClientBuilder`](crate::ClientBuilder) or fill the
/// fields directly; [`validated`](Self::validated) is applied either way.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the service.
    pub url: String,

    /// Upper bound of the sequence space. Also the maximum number of
    /// calls that may be pending at once.
    pub max_sequence: u32,

    /// Deadline applied to every call that doesn't set its own.
    /// `None` waits until a reply arrives or the connection closes.
    pub call_timeout: Option<Duration>,

    /// Upper bound on the whole handshake (identify + subscriptions).
    pub handshake_timeout: Duration,

    /// Command run as the bot to learn its own name.
    pub identify_command: String,

    /// JSON pointer to the bot name inside the identify reply.
    pub identify_pointer: String,

    /// Subscription calls issued during the handshake, in order.
    pub mandatory_subscriptions: Vec<Operation>,

    /// Capacity of the lifecycle event channel. Slow receivers that fall
    /// further behind than this miss the oldest events.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_sequence: DEFAULT_MAX_SEQUENCE,
            call_timeout: None,
            handshake_timeout: Duration::from_secs(5),
            identify_command: "tell @s @s".to_string(),
            identify_pointer: "/result/OutputMessages/0/Parameters/0".to_string(),
            mandatory_subscriptions: vec![
                Operation::SubscribeIdentityJoined,
                Operation::SubscribeIdentityLeft,
            ],
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Expands a bare `host:port` into the service URL. Values that
    /// already carry a scheme are returned unchanged.
    pub fn url_for_host(host: &str) -> String {
        if host.starts_with("ws://") || host.starts_with("wss://") {
            host.to_string()
        } else {
            format!("ws://{host}{SERVICE_PATH}")
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// - `max_sequence` raised to at least 1.
    /// - `event_capacity` raised to at least 1 (a zero-capacity broadcast
    ///   channel panics on creation).
    pub fn validated(mut self) -> Self {
        if self.max_sequence == 0 {
            tracing::warn!("max_sequence of 0 raised to 1");
            self.max_sequence = 1;
        }
        if self.event_capacity == 0 {
            self.event_capacity = 1;
        }
        self
    }
}
