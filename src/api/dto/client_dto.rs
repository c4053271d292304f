//! Client, presence and forced-disconnect DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::{IntoParams, ToSchema};

use crate::domain::{ClientInfo, PresenceEntry, Raw};

/// A connected client as listed by `GET /clients`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClientDto {
    /// Connection identifier.
    pub client: uuid::Uuid,
    /// User the connection authenticated as.
    pub user: String,
    /// Connection info, if any.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Raw>,
}

impl From<ClientInfo> for ClientDto {
    fn from(info: ClientInfo) -> Self {
        Self {
            client: *info.client.as_uuid(),
            user: info.user,
            info: info.info,
        }
    }
}

/// Response body for `GET /clients`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClientListResponse {
    /// Connected clients, ordered by user.
    pub data: Vec<ClientDto>,
    /// Number of connected clients.
    pub total: usize,
}

/// Query parameters for `GET /clients`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClientListParams {
    /// Only list connections of this user.
    pub user: Option<String>,
}

/// One presence record of a channel.
#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceMemberDto {
    /// Connection identifier.
    pub client: uuid::Uuid,
    /// User of the connection.
    pub user: String,
    /// Connection info, if any.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Raw>,
    /// Last time the owning session confirmed the record.
    pub updated_at: DateTime<Utc>,
}

impl From<PresenceEntry> for PresenceMemberDto {
    fn from(entry: PresenceEntry) -> Self {
        Self {
            client: *entry.info.client.as_uuid(),
            user: entry.info.user,
            info: entry.info.info,
            updated_at: entry.updated_at,
        }
    }
}

/// Response body for `GET /channels/{channel}/presence`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    /// Queried channel.
    pub channel: String,
    /// Clients present in the channel.
    pub members: Vec<PresenceMemberDto>,
}

/// Request body for `POST /clients/{id}/disconnect`.
///
/// Both fields are optional; an empty body disconnects with the `force`
/// instruction.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DisconnectRequest {
    /// Disconnect code sent to the client.
    pub code: Option<u16>,
    /// Disconnect reason sent to the client.
    pub reason: Option<String>,
}

/// Response body for `POST /clients/{id}/disconnect`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisconnectResponse {
    /// Disconnected client.
    pub client: uuid::Uuid,
    /// Code the client will observe.
    pub code: u16,
    /// Reason the client will observe.
    pub reason: String,
    /// `false` when the client was already closing with another reason.
    pub applied: bool,
}

/// Request body for `POST /clients/{id}/push`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushRequest {
    /// Payload delivered to the client as a `message` frame.
    #[schema(value_type = Object)]
    pub data: Box<RawValue>,
}
