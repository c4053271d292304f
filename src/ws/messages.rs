//! WebSocket message types: envelope, commands, and server frames.
//!
//! Opaque payloads (`data`, `info`) never pass through `serde_json::Value`:
//! inbound they are captured as [`RawValue`] text, outbound they are
//! embedded through [`Raw`]'s serializer, so their bytes reach the peer
//! exactly as the publisher or hook produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::domain::{ClientId, PresenceEntry, Raw};
use crate::mediator::{ClientError, Disconnect};

/// Top-level WebSocket message envelope.
///
/// Inbound frames keep their payload as unparsed JSON text; outbound
/// frames carry a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage<P = Box<RawValue>> {
    /// Client-provided ID for commands, echoed in the matching response or
    /// error; empty for server-initiated frames.
    #[serde(default)]
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: P,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client channel publication.
    Event,
    /// Server → Client push message queued by a hook.
    Message,
    /// Server → Client notice that credentials were extended.
    Refresh,
    /// Server → Client business error.
    Error,
    /// Server → Client disconnect notice, sent right before closing.
    Disconnect,
}

/// Commands that a client can send over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsCommand {
    /// Authenticate the connection. Credentials are assumed verified by an
    /// upstream layer.
    Connect {
        /// User the connection acts as.
        user: String,
        /// Opaque connection info.
        info: Option<Raw>,
        /// Credential deadline as unix seconds.
        expire_at: Option<i64>,
    },
    /// Subscribe to a channel.
    Subscribe {
        /// Channel name.
        channel: String,
    },
    /// Unsubscribe from a channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },
    /// Publish into a channel.
    Publish {
        /// Channel name.
        channel: String,
        /// Publication payload.
        data: Raw,
    },
    /// Query the presence of a channel.
    Presence {
        /// Channel name.
        channel: String,
    },
    /// Custom RPC call answered by the RPC hook.
    Rpc {
        /// Request payload.
        data: Raw,
    },
    /// One-way asynchronous message; never answered.
    Message {
        /// Message payload.
        data: Raw,
    },
}

/// Why a command payload could not be turned into a [`WsCommand`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The payload is not a JSON object with a string `command` field.
    #[error("malformed command")]
    Malformed,
    /// The `command` field names no known command.
    #[error("unknown command: {0}")]
    Unknown(String),
    /// A known command lacks a required field.
    #[error("{command} requires {field}")]
    Missing {
        /// Command name.
        command: &'static str,
        /// Missing field.
        field: &'static str,
    },
}

impl CommandError {
    /// Business error answered to the peer.
    #[must_use]
    pub fn to_client_error(&self) -> ClientError {
        match self {
            Self::Malformed => ClientError::bad_request(),
            Self::Unknown(_) => ClientError::method_not_found(),
            Self::Missing { .. } => ClientError::new(107, self.to_string()),
        }
    }
}

/// Union of every command's fields, as found in the payload.
#[derive(Debug, Deserialize)]
struct CommandFields {
    command: String,
    user: Option<String>,
    channel: Option<String>,
    info: Option<Box<RawValue>>,
    expire_at: Option<i64>,
    data: Option<Box<RawValue>>,
}

fn raw(value: Option<Box<RawValue>>) -> Raw {
    value.map(|v| Raw::from(v.get())).unwrap_or_default()
}

impl WsCommand {
    /// Names accepted in the `command` field.
    pub const NAMES: [&'static str; 7] = [
        "connect",
        "subscribe",
        "unsubscribe",
        "publish",
        "presence",
        "rpc",
        "message",
    ];

    /// Returns `true` if `name` is a known command.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    /// Parses a command payload. `data` and `info` are kept byte for byte.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing why the payload was refused.
    pub fn parse(payload: &RawValue) -> Result<Self, CommandError> {
        let fields: CommandFields =
            serde_json::from_str(payload.get()).map_err(|_| CommandError::Malformed)?;
        let channel = |command: &'static str| {
            fields.channel.clone().ok_or(CommandError::Missing {
                command,
                field: "channel",
            })
        };

        match fields.command.as_str() {
            "connect" => Ok(Self::Connect {
                user: fields.user.clone().ok_or(CommandError::Missing {
                    command: "connect",
                    field: "user",
                })?,
                info: fields.info.as_deref().map(|v| Raw::from(v.get())),
                expire_at: fields.expire_at,
            }),
            "subscribe" => Ok(Self::Subscribe {
                channel: channel("subscribe")?,
            }),
            "unsubscribe" => Ok(Self::Unsubscribe {
                channel: channel("unsubscribe")?,
            }),
            "publish" => {
                let channel = channel("publish")?;
                Ok(Self::Publish {
                    channel,
                    data: raw(fields.data),
                })
            }
            "presence" => Ok(Self::Presence {
                channel: channel("presence")?,
            }),
            "rpc" => Ok(Self::Rpc {
                data: raw(fields.data),
            }),
            "message" => Ok(Self::Message {
                data: raw(fields.data),
            }),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Response payload of `connect`.
#[derive(Debug, Serialize)]
pub struct ConnectResult<'a> {
    /// Assigned connection identifier.
    pub client: ClientId,
    /// Authenticated user.
    pub user: &'a str,
    /// Credential deadline (unix seconds), if any.
    pub expire_at: Option<i64>,
}

/// Response payload of `subscribe`.
#[derive(Debug, Serialize)]
pub struct SubscribeResult<'a> {
    /// Subscribed channel.
    pub channel: &'a str,
}

/// Response payload of `unsubscribe`.
#[derive(Debug, Serialize)]
pub struct UnsubscribeResult<'a> {
    /// Channel named in the command.
    pub channel: &'a str,
    /// `false` if the session was not subscribed.
    pub removed: bool,
}

/// Response payload of `publish`.
#[derive(Debug, Serialize)]
pub struct PublishResult<'a> {
    /// Target channel.
    pub channel: &'a str,
    /// Publication identifier.
    pub uid: uuid::Uuid,
}

/// Response payload of a `presence` query.
#[derive(Debug, Serialize)]
pub struct PresenceResult<'a> {
    /// Queried channel.
    pub channel: &'a str,
    /// Clients present in the channel.
    pub presence: Vec<PresenceEntry>,
}

/// Response payload of `rpc`: the hook's reply, embedded verbatim.
#[derive(Debug, Serialize)]
pub struct RpcResult<'a> {
    /// Reply bytes.
    pub data: &'a Raw,
}

/// Payload of a `refresh` frame.
#[derive(Debug, Serialize)]
pub struct RefreshNotice {
    /// New credential deadline (unix seconds).
    pub expire_at: i64,
}

impl<P> WsMessage<P> {
    fn server(id: impl Into<String>, msg_type: WsMessageType, payload: P) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Successful response to the command with the given ID.
    #[must_use]
    pub fn response(id: impl Into<String>, payload: P) -> Self {
        Self::server(id, WsMessageType::Response, payload)
    }

    /// Channel publication.
    #[must_use]
    pub fn event(payload: P) -> Self {
        Self::server(String::new(), WsMessageType::Event, payload)
    }

    /// Push message from a hook.
    #[must_use]
    pub fn push(payload: P) -> Self {
        Self::server(String::new(), WsMessageType::Message, payload)
    }
}

impl WsMessage<RefreshNotice> {
    /// Credentials extended until `expire_at`.
    #[must_use]
    pub fn refresh(expire_at: DateTime<Utc>) -> Self {
        Self::server(
            String::new(),
            WsMessageType::Refresh,
            RefreshNotice {
                expire_at: expire_at.timestamp(),
            },
        )
    }
}

impl<'a> WsMessage<&'a ClientError> {
    /// Business error answering the command with the given ID.
    #[must_use]
    pub fn error(id: impl Into<String>, error: &'a ClientError) -> Self {
        Self::server(id, WsMessageType::Error, error)
    }
}

impl<'a> WsMessage<&'a Disconnect> {
    /// Disconnect notice.
    #[must_use]
    pub fn disconnect(disconnect: &'a Disconnect) -> Self {
        Self::server(String::new(), WsMessageType::Disconnect, disconnect)
    }
}

impl<P: Serialize> WsMessage<P> {
    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Fails if an embedded [`Raw`] payload is not valid JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
