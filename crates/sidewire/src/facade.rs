//! Named operations on top of [`Client::call`].
//!
//! Each method shapes the arguments for one service operation and picks
//! the useful part out of the reply. Nothing here touches the wire
//! directly.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sidewire_protocol::Operation;
use sidewire_transport::Connector;

use crate::identity::{Identity, IdentityInfo, IdentityQuery, check_success};
use crate::{Client, SidewireError};

/// A chat menu entry offered to every identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    /// Words that open the entry.
    pub triggers: Vec<String>,
    /// Shown after the trigger, e.g. `[name]`.
    pub argument_hint: String,
    /// One-line description listed next to the triggers.
    pub usage: String,
}

impl MenuEntry {
    /// An entry with a single trigger and no argument hint.
    pub fn new(trigger: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            triggers: vec![trigger.into()],
            argument_hint: String::new(),
            usage: usage.into(),
        }
    }
}

impl<K: Connector> Client<K> {
    /// Runs a command as the bot and returns the service's result data.
    pub async fn run_command(&self, command: &str) -> Result<Value, SidewireError> {
        let reply = self.call(Operation::RunAsPlayer, json!({ "cmd": command })).await?;
        Ok(reply.data)
    }

    /// Runs a command through the service's own command channel.
    pub async fn run_service_command(&self, command: &str) -> Result<Value, SidewireError> {
        let reply = self.call(Operation::RunAsService, json!({ "cmd": command })).await?;
        Ok(reply.data)
    }

    /// Runs a command whose result is never reported back.
    ///
    /// The service doesn't reply to this operation at all, so it goes out
    /// through [`notify`](Self::notify) and completes once written.
    pub async fn run_command_no_reply(&self, command: &str) -> Result<(), SidewireError> {
        self.notify(Operation::RunWriteOnly, json!({ "cmd": command })).await
    }

    /// Round-trips `message` through the service.
    pub async fn echo(&self, message: &str) -> Result<Value, SidewireError> {
        let reply = self.call(Operation::Echo, json!({ "message": message })).await?;
        Ok(reply.data)
    }

    /// Fetches the identities currently connected and remembers the list
    /// for [`identity`](Self::identity).
    pub async fn list_identities(&self) -> Result<Vec<IdentityInfo>, SidewireError> {
        let operation = Operation::ListIdentities;
        let reply = self.call(operation.clone(), json!({})).await?;
        let listing: Vec<IdentityInfo> =
            serde_json::from_value(reply.data).map_err(|e| SidewireError::OperationFailed {
                operation: operation.to_string(),
                reason: format!("bad identity listing: {e}"),
            })?;

        tracing::debug!(count = listing.len(), "identity listing refreshed");
        *self.identity_cache() = Some(listing.clone());
        Ok(listing)
    }

    /// Resolves an identity from the most recent listing.
    ///
    /// Fetches a listing first if none was taken yet. A stale listing is
    /// not refreshed; call [`list_identities`](Self::list_identities) for
    /// that.
    ///
    /// # Errors
    /// [`SidewireError::IdentityNotFound`] if nothing in the listing
    /// matches.
    pub async fn identity(&self, query: IdentityQuery) -> Result<Identity<K>, SidewireError> {
        let cached = self.identity_cache().clone();
        let listing = match cached {
            Some(listing) => listing,
            None => self.list_identities().await?,
        };

        listing
            .into_iter()
            .find(|info| query.matches(info))
            .map(|info| Identity::new(info, self.clone()))
            .ok_or_else(|| SidewireError::IdentityNotFound(query.to_string()))
    }

    /// Sends a chat message to one identity by name.
    pub async fn say_to(&self, name: &str, message: &str) -> Result<(), SidewireError> {
        self.call(Operation::SayTo, json!({ "player": name, "msg": message }))
            .await?;
        Ok(())
    }

    /// Relays a message to the chat bridge attached to the service.
    pub async fn send_bridge_message(&self, message: &str) -> Result<(), SidewireError> {
        self.call(Operation::SendBridgeMessage, json!({ "msg": message }))
            .await?;
        Ok(())
    }

    /// Registers a menu entry and returns the id the service assigned.
    ///
    /// Selections arrive as [`PushKind::MenuTriggered`] pushes.
    ///
    /// [`PushKind::MenuTriggered`]: sidewire_protocol::PushKind::MenuTriggered
    pub async fn register_menu(&self, entry: &MenuEntry) -> Result<String, SidewireError> {
        let operation = Operation::RegisterMenu;
        let arguments = serde_json::to_value(entry).map_err(sidewire_protocol::ProtocolError::Encode)?;
        let reply = self.call(operation.clone(), arguments).await?;
        check_success(&operation, &reply.data)?;

        match reply.data.get("sub_id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(SidewireError::OperationFailed {
                operation: operation.to_string(),
                reason: "reply carries no sub_id".to_string(),
            }),
        }
    }

    /// Asks the service to forward one data feed as
    /// [`PushKind::DataFeed`](sidewire_protocol::PushKind::DataFeed) pushes.
    pub async fn subscribe_data_feed(&self, feed: &str) -> Result<(), SidewireError> {
        let operation = Operation::SubscribeDataFeed;
        let reply = self.call(operation.clone(), json!({ "pktID": feed })).await?;
        check_success(&operation, &reply.data)
    }

    /// Asks the service to forward world changes as
    /// [`PushKind::WorldStateChanged`](sidewire_protocol::PushKind::WorldStateChanged)
    /// pushes.
    pub async fn subscribe_world_state(&self) -> Result<(), SidewireError> {
        let operation = Operation::SubscribeWorldState;
        let reply = self.call(operation.clone(), json!({})).await?;
        check_success(&operation, &reply.data)
    }

    fn identity_cache(&self) -> std::sync::MutexGuard<'_, Option<Vec<IdentityInfo>>> {
        self.shared
            .identities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
