//! Connected identities (players) and the actions scoped to one.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sidewire_protocol::Operation;
use sidewire_transport::{Connector, WebSocketConnector};

use crate::{Client, SidewireError};

/// One entry of the identity listing, as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Display name; actions address the identity by it.
    pub name: String,
    /// Id assigned for the current session.
    #[serde(rename = "runtimeID", default)]
    pub runtime_id: u64,
    #[serde(default)]
    pub uuid: String,
    /// Stable id that survives reconnects.
    #[serde(rename = "uniqueID", default)]
    pub unique_id: i64,
}

/// How to find an identity in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityQuery {
    /// Exact, case-sensitive name match.
    Name(String),
    /// Match on [`IdentityInfo::unique_id`].
    UniqueId(i64),
}

impl IdentityQuery {
    pub(crate) fn matches(&self, info: &IdentityInfo) -> bool {
        match self {
            Self::Name(name) => info.name == *name,
            Self::UniqueId(id) => info.unique_id == *id,
        }
    }
}

impl std::fmt::Display for IdentityQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name `{name}`"),
            Self::UniqueId(id) => write!(f, "unique id {id}"),
        }
    }
}

/// A connected identity, bound to the client that found it.
///
/// The fields are a snapshot from the listing; every action addresses the
/// identity by its name.
pub struct Identity<K: Connector = WebSocketConnector> {
    info: IdentityInfo,
    client: Client<K>,
}

impl<K: Connector> Clone for Identity<K> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            client: self.client.clone(),
        }
    }
}

impl<K: Connector> std::fmt::Debug for Identity<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Identity").field(&self.info).finish()
    }
}

impl<K: Connector> Identity<K> {
    pub(crate) fn new(info: IdentityInfo, client: Client<K>) -> Self {
        Self { info, client }
    }

    /// The listing entry this identity was built from.
    pub fn info(&self) -> &IdentityInfo {
        &self.info
    }

    /// Name used to address every action.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Account uuid; empty when the listing didn't carry one.
    pub fn uuid(&self) -> &str {
        &self.info.uuid
    }

    /// See [`IdentityInfo::unique_id`].
    pub fn unique_id(&self) -> i64 {
        self.info.unique_id
    }

    /// See [`IdentityInfo::runtime_id`].
    pub fn runtime_id(&self) -> u64 {
        self.info.runtime_id
    }

    /// Sends a chat message to this identity only.
    pub async fn say(&self, message: &str) -> Result<(), SidewireError> {
        self.message(Operation::SayTo, message).await
    }

    /// Shows `message` as a large on-screen title.
    pub async fn title(&self, message: &str) -> Result<(), SidewireError> {
        self.message(Operation::TitleTo, message).await
    }

    /// Shows `message` under the current title.
    pub async fn subtitle(&self, message: &str) -> Result<(), SidewireError> {
        self.message(Operation::SubtitleTo, message).await
    }

    /// Shows `message` in the action bar above the hotbar.
    pub async fn actionbar(&self, message: &str) -> Result<(), SidewireError> {
        self.message(Operation::ActionbarTo, message).await
    }

    /// Shows `hint` and waits for the next line the identity types.
    ///
    /// Resolves only when the identity answers, or when the configured
    /// call timeout passes.
    pub async fn request_next_input(&self, hint: &str) -> Result<String, SidewireError> {
        let operation = Operation::NextInput;
        let reply = self
            .client
            .call(operation.clone(), json!({ "player": self.info.name, "hint": hint }))
            .await?;
        check_success(&operation, &reply.data)?;
        reply
            .data
            .get("input")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SidewireError::OperationFailed {
                operation: operation.to_string(),
                reason: "reply carries no input".to_string(),
            })
    }

    /// Current `[x, y, z]` of the identity, if it matches `selector`
    /// (e.g. `@a[tag=builder]`).
    pub async fn position(&self, selector: &str) -> Result<[f64; 3], SidewireError> {
        let operation = Operation::Position;
        let reply = self
            .client
            .call(operation.clone(), json!({ "player": self.info.name, "limit": selector }))
            .await?;
        check_success(&operation, &reply.data)?;
        serde_json::from_value(reply.data.get("pos").cloned().unwrap_or(Value::Null)).map_err(
            |e| SidewireError::OperationFailed {
                operation: operation.to_string(),
                reason: format!("bad position: {e}"),
            },
        )
    }

    /// Reads a stored value. `None` if nothing is stored under `key`.
    pub async fn get_data(&self, key: &str) -> Result<Option<Value>, SidewireError> {
        let reply = self
            .client
            .call(
                Operation::GetIdentityData,
                json!({ "player": self.info.name, "entry": key }),
            )
            .await?;
        let found = reply.data.get("found").and_then(Value::as_bool).unwrap_or(false);
        if !found {
            return Ok(None);
        }
        Ok(Some(reply.data.get("data").cloned().unwrap_or(Value::Null)))
    }

    /// Stores `value` under `key` for this identity.
    pub async fn set_data(&self, key: &str, value: Value) -> Result<(), SidewireError> {
        let operation = Operation::SetIdentityData;
        let reply = self
            .client
            .call(
                operation.clone(),
                json!({ "player": self.info.name, "entry": key, "data": value }),
            )
            .await?;
        check_success(&operation, &reply.data)
    }

    /// Removes the identity from the world.
    pub async fn kick(&self, reason: Option<&str>) -> Result<(), SidewireError> {
        let command = match reason {
            Some(reason) => format!("kick {} {reason}", self.info.name),
            None => format!("kick {}", self.info.name),
        };
        self.client.run_command(&command).await?;
        Ok(())
    }

    async fn message(&self, operation: Operation, message: &str) -> Result<(), SidewireError> {
        self.client
            .call(operation, json!({ "player": self.info.name, "msg": message }))
            .await?;
        Ok(())
    }
}

/// Turns a `"success": false` answer into [`SidewireError::OperationFailed`].
/// Answers without a `success` field count as success.
pub(crate) fn check_success(operation: &Operation, data: &Value) -> Result<(), SidewireError> {
    if data.get("success").and_then(Value::as_bool) != Some(false) {
        return Ok(());
    }
    let reason = data
        .get("err")
        .and_then(Value::as_str)
        .unwrap_or("service reported failure")
        .to_string();
    Err(SidewireError::OperationFailed {
        operation: operation.to_string(),
        reason,
    })
}
