//! Publications and the connection metadata attached to them.
//!
//! A [`Publication`] is a single message written into a channel. Client
//! publishes carry the publisher's [`ClientInfo`]; server-side publishes
//! through the REST API carry none.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ClientId, Raw};

/// Public metadata describing a connected client.
///
/// Attached to publications and stored as presence entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Connection identifier.
    pub client: ClientId,
    /// User the connection authenticated as.
    pub user: String,
    /// Opaque connection info supplied at connect or refresh time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Raw>,
}

/// A single message written into a channel.
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    /// Unique publication identifier.
    pub uid: uuid::Uuid,
    /// Opaque payload.
    pub data: Raw,
    /// Publisher metadata, absent for server-side publishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ClientInfo>,
    /// Time the publication was accepted by the gateway.
    pub timestamp: DateTime<Utc>,
}

impl Publication {
    /// Creates a publication with a fresh UID and the current timestamp.
    #[must_use]
    pub fn new(data: Raw, info: Option<ClientInfo>) -> Self {
        Self {
            uid: uuid::Uuid::new_v4(),
            data,
            info,
            timestamp: Utc::now(),
        }
    }
}

/// A publication routed to a channel, as fanned out by the broker.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelPublication {
    /// Target channel.
    pub channel: String,
    /// The publication itself.
    pub publication: Publication,
}
