//! `Client` builder, lifecycle controller and call surface.
//!
//! A client owns exactly one connection. [`Client::connect`] opens it,
//! spawns the reader task, runs the handshake and only then lets
//! application calls through. Every clone of a `Client` shares the same
//! connection, pending-call table and subscribers.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde_json::{Value, json};
use sidewire_protocol::{Codec, JsonCodec, Operation, PushKind, PushNotification, Reply, Request};
use sidewire_push::{HandlerError, PushDispatcher, SubscriptionId};
use sidewire_transport::{Connection, Connector, WebSocketConnector};
use tokio::sync::{broadcast, mpsc, watch};

use crate::correlator::{Correlator, Ticket};
use crate::identity::IdentityInfo;
use crate::{ClientConfig, ConnectionState, SidewireError, reader};

/// Lifecycle notifications, delivered on [`Client::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake finished; fired exactly once per client.
    Ready { bot_name: String },
    /// An inbound frame could not be decoded and was dropped.
    MalformedFrame { reason: String },
    /// The transport reported an error; `Errored` follows.
    TransportError { reason: String },
    /// The connection reached `Closed`.
    Closed,
    /// The connection reached `Errored`.
    Errored { reason: String },
}

/// State shared by every clone of a client and by its reader task.
pub(crate) struct Shared<K: Connector> {
    pub(crate) config: ClientConfig,
    connector: K,
    conn: OnceLock<Arc<K::Connection>>,
    state: watch::Sender<ConnectionState>,
    pub(crate) correlator: Correlator,
    pub(crate) push: PushDispatcher,
    pub(crate) codec: JsonCodec,
    events: broadcast::Sender<ClientEvent>,
    bot_name: OnceLock<String>,
    /// Most recent identity listing, filled by `list_identities`.
    pub(crate) identities: Mutex<Option<Vec<IdentityInfo>>>,
}

impl<K: Connector> Shared<K> {
    /// Moves to `next` if the state machine allows it.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            tracing::debug!(%from, to = %next, "connection state changed");
        }
        changed
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No receivers is fine: events are optional to observe.
        let _ = self.events.send(event);
    }

    /// Moves to a final state and abandons every pending call.
    ///
    /// Safe to call more than once; only the first call that actually
    /// changes the state logs and emits an event.
    pub(crate) fn teardown(&self, terminal: ConnectionState, reason: Option<String>) -> bool {
        let moved = self.transition(terminal);
        let abandoned = self.correlator.abandon_all();
        if moved {
            match terminal {
                ConnectionState::Errored => {
                    let reason = reason.unwrap_or_else(|| "unknown error".to_string());
                    tracing::error!(%reason, abandoned, "connection errored");
                    self.emit(ClientEvent::Errored { reason });
                }
                _ => {
                    tracing::info!(abandoned, "connection closed");
                    self.emit(ClientEvent::Closed);
                }
            }
        }
        moved
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn ensure_ready(&self) -> Result<(), SidewireError> {
        if self.state.borrow().is_ready() {
            Ok(())
        } else {
            Err(SidewireError::NotConnected)
        }
    }

    fn connection(&self) -> Result<Arc<K::Connection>, SidewireError> {
        self.conn.get().cloned().ok_or(SidewireError::NotConnected)
    }

    /// Sends a request and waits for the reply with the same sequence.
    ///
    /// Does not check the lifecycle state: the handshake calls this while
    /// `Handshaking`. Application calls go through [`Client::call`].
    pub(crate) async fn request(
        &self,
        operation: Operation,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Reply, SidewireError> {
        let conn = self.connection()?;
        let (ticket, rx) = self.correlator.register(&operation)?;
        let mut guard = PendingGuard {
            correlator: &self.correlator,
            ticket: Some(ticket),
        };

        let request = Request {
            sequence: ticket.sequence,
            operation,
            arguments,
        };
        let bytes = self.codec.encode(&request)?;
        tracing::debug!(seq = request.sequence, operation = %request.operation, "sending request");
        conn.send(&bytes).await?;

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        seq = request.sequence,
                        operation = %request.operation,
                        ?limit,
                        "call timed out"
                    );
                    return Err(SidewireError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        // The entry is gone by now (completed or abandoned).
        guard.ticket = None;
        outcome.unwrap_or(Err(SidewireError::ConnectionClosed))
    }

    /// Identifies the bot, then registers the mandatory subscriptions.
    async fn handshake(&self) -> Result<String, SidewireError> {
        let reply = self
            .request(
                Operation::RunAsPlayer,
                json!({ "cmd": self.config.identify_command }),
                None,
            )
            .await?;

        let bot_name = reply
            .data
            .pointer(&self.config.identify_pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SidewireError::HandshakeFailed(format!(
                    "identify reply has no name at `{}`",
                    self.config.identify_pointer
                ))
            })?
            .to_string();
        tracing::debug!(%bot_name, "bot identified");

        for operation in &self.config.mandatory_subscriptions {
            self.request(operation.clone(), json!({}), None).await?;
            tracing::debug!(%operation, "mandatory subscription registered");
        }

        Ok(bot_name)
    }
}

/// Removes a pending entry if the waiting caller goes away early
/// (timeout, send error, or the call future being dropped).
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    ticket: Option<Ticket>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.correlator.cancel(&ticket);
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use sidewire::prelude::*;
///
/// # async fn run() -> Result<(), SidewireError> {
/// let client = ClientBuilder::new()
///     .host("127.0.0.1:24011")
///     .call_timeout(Duration::from_secs(10))
///     .build();
/// let bot_name = client.connect().await?;
/// let reply = client.echo("hello").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the full WebSocket URL.
    pub fn url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    /// Sets the service host as `host:port`; the service path is appended.
    pub fn host(mut self, host: &str) -> Self {
        self.config.url = ClientConfig::url_for_host(host);
        self
    }

    /// Sets the upper bound of the sequence space.
    pub fn max_sequence(mut self, max: u32) -> Self {
        self.config.max_sequence = max;
        self
    }

    /// Sets a default deadline for every call.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    /// Sets the deadline for the whole handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets the command used to learn the bot's name, and where the name
    /// sits in its reply.
    pub fn identify(mut self, command: &str, pointer: &str) -> Self {
        self.config.identify_command = command.to_string();
        self.config.identify_pointer = pointer.to_string();
        self
    }

    /// Replaces the subscriptions registered during the handshake.
    pub fn mandatory_subscriptions(mut self, operations: Vec<Operation>) -> Self {
        self.config.mandatory_subscriptions = operations;
        self
    }

    /// Builds a client that connects with the given connector.
    pub fn build_with<K: Connector>(self, connector: K) -> Client<K> {
        Client::new(self.config, connector)
    }

    /// Builds a client that dials the configured WebSocket URL.
    pub fn build(self) -> Client<WebSocketConnector> {
        let connector = WebSocketConnector::new(self.config.url.clone());
        self.build_with(connector)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A handle to one connection to the service.
///
/// Cheap to clone; clones share everything. Call
/// [`connect`](Self::connect) once, then issue calls from as many tasks
/// as needed.
pub struct Client<K: Connector = WebSocketConnector> {
    pub(crate) shared: Arc<Shared<K>>,
}

impl<K: Connector> Clone for Client<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Client<WebSocketConnector> {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<K: Connector> Client<K> {
    /// Creates a disconnected client. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(config: ClientConfig, connector: K) -> Self {
        let config = config.validated();
        let (events, _) = broadcast::channel(config.event_capacity);
        let shared = Shared {
            correlator: Correlator::new(config.max_sequence),
            config,
            connector,
            conn: OnceLock::new(),
            state: watch::Sender::new(ConnectionState::Disconnected),
            push: PushDispatcher::new(),
            codec: JsonCodec,
            events,
            bot_name: OnceLock::new(),
            identities: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Opens the connection, performs the handshake, and returns the
    /// bot's name once the client is `Ready`.
    ///
    /// # Errors
    /// - [`SidewireError::AlreadyStarted`] if called more than once.
    /// - [`SidewireError::Transport`] if the transport can't be opened.
    /// - [`SidewireError::HandshakeFailed`] if any handshake step fails;
    ///   the client is then `Errored`.
    pub async fn connect(&self) -> Result<String, SidewireError> {
        let shared = &self.shared;
        if !shared.transition(ConnectionState::Connecting) {
            return Err(SidewireError::AlreadyStarted);
        }
        tracing::info!(url = %shared.config.url, "connecting");

        let conn = match shared.connector.connect().await {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                shared.teardown(ConnectionState::Errored, Some(e.to_string()));
                return Err(e.into());
            }
        };
        let conn_id = conn.id();
        // Only the first `connect` gets this far, so the cell is empty.
        let _ = shared.conn.set(Arc::clone(&conn));

        if !shared.transition(ConnectionState::Handshaking) {
            // Closed while the transport was opening.
            let _ = conn.close().await;
            return Err(SidewireError::ConnectionClosed);
        }
        tracing::debug!(%conn_id, "transport open, handshaking");
        tokio::spawn(reader::run(Arc::clone(shared), Arc::clone(&conn)));

        let limit = shared.config.handshake_timeout;
        let bot_name = match tokio::time::timeout(limit, shared.handshake()).await {
            Ok(Ok(bot_name)) => bot_name,
            Ok(Err(SidewireError::HandshakeFailed(reason))) => {
                return Err(self.abort_handshake(&conn, reason).await);
            }
            Ok(Err(e)) => return Err(self.abort_handshake(&conn, e.to_string()).await),
            Err(_) => {
                let reason = format!("timed out after {limit:?}");
                return Err(self.abort_handshake(&conn, reason).await);
            }
        };

        let _ = shared.bot_name.set(bot_name.clone());
        if !shared.transition(ConnectionState::Ready) {
            return Err(SidewireError::ConnectionClosed);
        }
        tracing::info!(
            %conn_id,
            %bot_name,
            version = env!("CARGO_PKG_VERSION"),
            "client ready"
        );
        shared.emit(ClientEvent::Ready {
            bot_name: bot_name.clone(),
        });
        Ok(bot_name)
    }

    async fn abort_handshake(&self, conn: &K::Connection, reason: String) -> SidewireError {
        tracing::warn!(%reason, "handshake failed");
        self.shared
            .teardown(ConnectionState::Errored, Some(format!("handshake failed: {reason}")));
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "close after failed handshake");
        }
        SidewireError::HandshakeFailed(reason)
    }

    /// Closes the connection. Pending calls fail with
    /// [`SidewireError::ConnectionClosed`]. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), SidewireError> {
        if !self.shared.teardown(ConnectionState::Closed, None) {
            return Ok(());
        }
        if let Some(conn) = self.shared.conn.get() {
            conn.close().await?;
        }
        Ok(())
    }

    /// Calls a remote operation and waits for its reply.
    ///
    /// Uses the configured default deadline, if any.
    ///
    /// # Errors
    /// - [`SidewireError::NotConnected`] unless the client is `Ready`;
    ///   nothing is sent in that case.
    /// - [`SidewireError::ServiceFault`] if the service flags the request.
    /// - [`SidewireError::ConnectionClosed`] if the connection goes away
    ///   first.
    /// - [`SidewireError::Timeout`] if a deadline is configured and passes.
    pub async fn call(
        &self,
        operation: impl Into<Operation>,
        arguments: Value,
    ) -> Result<Reply, SidewireError> {
        self.shared.ensure_ready()?;
        let timeout = self.shared.config.call_timeout;
        self.shared.request(operation.into(), arguments, timeout).await
    }

    /// Like [`call`](Self::call), with an explicit deadline.
    pub async fn call_with_timeout(
        &self,
        operation: impl Into<Operation>,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Reply, SidewireError> {
        self.shared.ensure_ready()?;
        self.shared
            .request(operation.into(), arguments, Some(timeout))
            .await
    }

    /// Sends a request for which the service never replies.
    ///
    /// Completes once the frame is written; no pending call is registered.
    pub async fn notify(
        &self,
        operation: impl Into<Operation>,
        arguments: Value,
    ) -> Result<(), SidewireError> {
        self.shared.ensure_ready()?;
        let conn = self.shared.connection()?;
        let request = Request {
            sequence: self.shared.correlator.allocate_untracked()?,
            operation: operation.into(),
            arguments,
        };
        let bytes = self.shared.codec.encode(&request)?;
        tracing::debug!(seq = request.sequence, operation = %request.operation, "sending request (no reply)");
        conn.send(&bytes).await?;
        Ok(())
    }

    /// Registers a callback for one kind of push notification.
    ///
    /// Callbacks run on the reader task, one after another in
    /// subscription order, so they should return quickly. An error or
    /// panic is logged and doesn't affect other subscribers or calls.
    pub fn on<F>(&self, kind: PushKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PushNotification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared.push.subscribe_fn(kind, handler)
    }

    /// Subscribes a channel to one kind of push notification.
    pub fn subscribe(
        &self,
        kind: PushKind,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<PushNotification>) {
        self.shared.push.subscribe(kind)
    }

    /// Removes a push subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.push.unsubscribe(id)
    }

    /// Subscribes to lifecycle events. Only events sent after this call
    /// are received.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The bot's own name, known once the handshake identified it.
    pub fn bot_name(&self) -> Option<&str> {
        self.shared.bot_name.get().map(String::as_str)
    }

    /// Number of calls currently waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.correlator.pending_len()
    }

    /// The sequence bound in use (also the in-flight call limit).
    pub fn max_sequence(&self) -> u32 {
        self.shared.correlator.max_sequence()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}
