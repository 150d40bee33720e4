//! Wire types: what a request, a reply and a push notification look like.
//!
//! Every frame on the bus carries a `client` field: the correlation
//! number. Zero is reserved for pushes the service sends on its own;
//! anything else is the sequence of the request being answered.
//!
//! ```text
//! request  → {"client": 12, "function": "echo", "args": {...}}
//! reply    ← {"client": 12, "violate": false,   "data": {...}}
//! push     ← {"client": 0,  "type": "playerLogin", "sub": "", "data": {...}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// The correlation number reserved for push notifications.
///
/// Never handed out by the [`SequenceAllocator`](crate::SequenceAllocator).
pub const PUSH_SEQUENCE: u32 = 0;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A remote operation the service exposes, identified by name on the wire.
///
/// The set of operations grows with the service, so unknown names are not
/// an error: they round-trip through [`Operation::Custom`].
///
/// Serialized as the bare wire name:
///
/// ```rust
/// use sidewire_protocol::Operation;
///
/// let json = serde_json::to_string(&Operation::RunAsPlayer).unwrap();
/// assert_eq!(json, "\"send_player_cmd\"");
/// assert_eq!(Operation::from("reg_menu"), Operation::RegisterMenu);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    /// Diagnostic: the service echoes the arguments back.
    Echo,
    /// Run a game command as the bot's own player.
    RunAsPlayer,
    /// Run a command through the service's own command channel.
    RunAsService,
    /// Run a command and expect no reply frame at all.
    RunWriteOnly,
    /// List the identities currently connected.
    ListIdentities,
    /// Read a keyed value stored for an identity.
    GetIdentityData,
    /// Store a keyed value for an identity.
    SetIdentityData,
    /// Subscribe to identity-joined pushes.
    SubscribeIdentityJoined,
    /// Subscribe to identity-left pushes.
    SubscribeIdentityLeft,
    /// Subscribe to a data feed (pushes of category `mcPkt`).
    SubscribeDataFeed,
    /// Subscribe to world-state changes.
    SubscribeWorldState,
    /// Register a menu entry.
    RegisterMenu,
    /// Send a message across the bridge to an external chat.
    SendBridgeMessage,
    /// Ask an identity for its next line of input.
    NextInput,
    /// Send a chat message to one identity.
    SayTo,
    /// Show a title to one identity.
    TitleTo,
    /// Show a subtitle to one identity.
    SubtitleTo,
    /// Show an action-bar message to one identity.
    ActionbarTo,
    /// Query an identity's position.
    Position,
    /// Any operation name not listed above.
    Custom(String),
}

impl Operation {
    /// Returns the name used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Echo => "echo",
            Self::RunAsPlayer => "send_player_cmd",
            Self::RunAsService => "send_ws_cmd",
            Self::RunWriteOnly => "send_wo_cmd",
            Self::ListIdentities => "get_players_list",
            Self::GetIdentityData => "player.get_data",
            Self::SetIdentityData => "player.set_data",
            Self::SubscribeIdentityJoined => "reg_login",
            Self::SubscribeIdentityLeft => "reg_logout",
            Self::SubscribeDataFeed => "reg_mc_packet",
            Self::SubscribeWorldState => "reg_block_update",
            Self::RegisterMenu => "reg_menu",
            Self::SendBridgeMessage => "send_qq_msg",
            Self::NextInput => "player.next_input",
            Self::SayTo => "player.say_to",
            Self::TitleTo => "player.title_to",
            Self::SubtitleTo => "player.subtitle_to",
            Self::ActionbarTo => "player.actionbar_to",
            Self::Position => "player.pos",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        match name {
            "echo" => Self::Echo,
            "send_player_cmd" => Self::RunAsPlayer,
            "send_ws_cmd" => Self::RunAsService,
            "send_wo_cmd" => Self::RunWriteOnly,
            "get_players_list" => Self::ListIdentities,
            "player.get_data" => Self::GetIdentityData,
            "player.set_data" => Self::SetIdentityData,
            "reg_login" => Self::SubscribeIdentityJoined,
            "reg_logout" => Self::SubscribeIdentityLeft,
            "reg_mc_packet" => Self::SubscribeDataFeed,
            "reg_block_update" => Self::SubscribeWorldState,
            "reg_menu" => Self::RegisterMenu,
            "send_qq_msg" => Self::SendBridgeMessage,
            "player.next_input" => Self::NextInput,
            "player.say_to" => Self::SayTo,
            "player.title_to" => Self::TitleTo,
            "player.subtitle_to" => Self::SubtitleTo,
            "player.actionbar_to" => Self::ActionbarTo,
            "player.pos" => Self::Position,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for Operation {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Custom(_) => Self::Custom(name),
            known => known,
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PushKind
// ---------------------------------------------------------------------------

/// The channel a push notification is routed to.
///
/// Decoded once from the frame's `type` string when the frame arrives, so
/// subscribers match on a closed enum instead of comparing strings.
/// Categories this client doesn't know yet land in [`PushKind::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    /// An identity connected (`playerLogin`).
    IdentityJoined,
    /// An identity disconnected (`playerLogout`).
    IdentityLeft,
    /// A registered menu entry was triggered (`menuTriggered`).
    MenuTriggered,
    /// A packet from a subscribed data feed (`mcPkt`).
    DataFeed,
    /// Part of the world changed (`blockUpdate`).
    WorldStateChanged,
    /// Anything else.
    Generic,
}

impl PushKind {
    /// Every channel, in declaration order.
    pub const ALL: [PushKind; 6] = [
        Self::IdentityJoined,
        Self::IdentityLeft,
        Self::MenuTriggered,
        Self::DataFeed,
        Self::WorldStateChanged,
        Self::Generic,
    ];

    /// Maps a wire category to its channel.
    pub fn classify(category: &str) -> Self {
        match category {
            "playerLogin" => Self::IdentityJoined,
            "playerLogout" => Self::IdentityLeft,
            "menuTriggered" => Self::MenuTriggered,
            "mcPkt" => Self::DataFeed,
            "blockUpdate" => Self::WorldStateChanged,
            _ => Self::Generic,
        }
    }

    /// Returns the wire category for this channel, or `None` for
    /// [`PushKind::Generic`], which has no single name.
    pub fn category(self) -> Option<&'static str> {
        match self {
            Self::IdentityJoined => Some("playerLogin"),
            Self::IdentityLeft => Some("playerLogout"),
            Self::MenuTriggered => Some("menuTriggered"),
            Self::DataFeed => Some("mcPkt"),
            Self::WorldStateChanged => Some("blockUpdate"),
            Self::Generic => None,
        }
    }
}

impl fmt::Display for PushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityJoined => write!(f, "IdentityJoined"),
            Self::IdentityLeft => write!(f, "IdentityLeft"),
            Self::MenuTriggered => write!(f, "MenuTriggered"),
            Self::DataFeed => write!(f, "DataFeed"),
            Self::WorldStateChanged => write!(f, "WorldStateChanged"),
            Self::Generic => write!(f, "Generic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// An outgoing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation number, in `[1, MAX]`.
    #[serde(rename = "client")]
    pub sequence: u32,

    /// Which remote operation to run.
    #[serde(rename = "function")]
    pub operation: Operation,

    /// Operation arguments, shaped however the operation expects.
    #[serde(rename = "args")]
    pub arguments: Value,
}

/// The service's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Sequence of the request this answers.
    #[serde(rename = "client")]
    pub sequence: u32,

    /// `true` when the service rejected the request as malformed.
    /// This is an application-level report, not a transport error.
    #[serde(rename = "violate")]
    pub fault: bool,

    /// The result (or, when `fault` is set, the service's explanation).
    pub data: Value,
}

/// An unsolicited event from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    /// Channel this push is routed to.
    pub kind: PushKind,
    /// Category exactly as it appeared on the wire.
    pub category: String,
    /// Sub-category; its meaning depends on the category (for menu
    /// pushes it is the id returned at registration).
    pub subcategory: String,
    /// Event payload.
    pub data: Value,
}

impl PushNotification {
    /// Builds a push, classifying `category` into its [`PushKind`].
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        data: Value,
    ) -> Self {
        let category = category.into();
        Self {
            kind: PushKind::classify(&category),
            category,
            subcategory: subcategory.into(),
            data,
        }
    }

    /// Deserializes the payload into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.data).map_err(ProtocolError::Decode)
    }

    /// The wire representation of this push (`client` is always zero).
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "client": PUSH_SEQUENCE,
            "type": self.category,
            "sub": self.subcategory,
            "data": self.data,
        })
    }
}

/// A decoded inbound frame: either a reply or a push.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to one of our requests.
    Reply(Reply),
    /// Unsolicited event.
    Push(PushNotification),
}

impl Inbound {
    /// Decodes raw bytes with the given codec and classifies the result.
    ///
    /// # Errors
    /// `ProtocolError::Decode` for bytes that aren't JSON,
    /// `ProtocolError::MalformedFrame` for JSON of the wrong shape.
    pub fn decode(codec: &impl crate::Codec, data: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = codec.decode(data)?;
        Self::from_value(value)
    }

    /// Classifies an already-parsed frame by its `client` field.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = value else {
            return Err(malformed("frame is not a JSON object"));
        };

        let sequence = fields
            .get("client")
            .ok_or_else(|| malformed("missing `client`"))?
            .as_u64()
            .ok_or_else(|| malformed("`client` is not an unsigned integer"))?;
        let sequence = u32::try_from(sequence)
            .map_err(|_| malformed("`client` out of range"))?;

        let data = fields
            .remove("data")
            .ok_or_else(|| malformed("missing `data`"))?;

        if sequence == PUSH_SEQUENCE {
            let category = take_string(&mut fields, "type")?;
            let subcategory = take_string(&mut fields, "sub")?;
            return Ok(Self::Push(PushNotification::new(
                category,
                subcategory,
                data,
            )));
        }

        let fault = fields
            .get("violate")
            .ok_or_else(|| malformed("missing `violate`"))?
            .as_bool()
            .ok_or_else(|| malformed("`violate` is not a boolean"))?;

        Ok(Self::Reply(Reply {
            sequence,
            fault,
            data,
        }))
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, ProtocolError> {
    match fields.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(malformed(&format!("`{key}` is not a string"))),
        None => Err(malformed(&format!("missing `{key}`"))),
    }
}

fn malformed(reason: &str) -> ProtocolError {
    ProtocolError::MalformedFrame(reason.to_string())
}

// =========================================================================
// Tests
// =========================================================================
