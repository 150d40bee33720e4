//! The reader task: one per connection.
//!
//! Receives frames until the transport ends and routes each one:
//!   - replies → the pending-call table
//!   - pushes → the push dispatcher
//!   - undecodable frames → logged, reported as an event, dropped
//!
//! When the transport closes or fails the task tears the client down,
//! which abandons every pending call. A clean close that lands while the
//! handshake is still running counts as a failure (`Errored`).

use std::sync::Arc;

use sidewire_protocol::Inbound;
use sidewire_transport::{Connection, Connector};

use crate::ConnectionState;
use crate::client::{ClientEvent, Shared};

pub(crate) async fn run<K: Connector>(shared: Arc<Shared<K>>, conn: Arc<K::Connection>) {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "reader started");

    loop {
        match conn.recv().await {
            Ok(Some(data)) => handle_frame(&shared, &data),
            Ok(None) => {
                // A close before Ready means the handshake failed.
                if shared.state() == ConnectionState::Handshaking {
                    tracing::warn!(%conn_id, "connection closed during handshake");
                    shared.teardown(
                        ConnectionState::Errored,
                        Some("closed during handshake".to_string()),
                    );
                } else {
                    tracing::info!(%conn_id, "connection closed by peer");
                    shared.teardown(ConnectionState::Closed, None);
                }
                break;
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(%conn_id, error = %reason, "transport error");
                shared.emit(ClientEvent::TransportError {
                    reason: reason.clone(),
                });
                shared.teardown(ConnectionState::Errored, Some(reason));
                break;
            }
        }
    }

    tracing::debug!(%conn_id, "reader stopped");
}

pub(crate) fn handle_frame<K: Connector>(shared: &Shared<K>, data: &[u8]) {
    match Inbound::decode(&shared.codec, data) {
        Ok(Inbound::Reply(reply)) => {
            let seq = reply.sequence;
            if !shared.correlator.complete(reply) {
                tracing::debug!(seq, "reply for unknown sequence dropped");
            }
        }
        Ok(Inbound::Push(push)) => {
            shared.push.dispatch(&push);
        }
        Err(e) => {
            let reason = e.to_string();
            tracing::warn!(error = %reason, len = data.len(), "dropping malformed frame");
            shared.emit(ClientEvent::MalformedFrame { reason });
        }
    }
}
