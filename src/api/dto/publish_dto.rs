//! Server-side publish DTOs.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::ToSchema;

/// Request body for `POST /publish`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// Target channel.
    pub channel: String,
    /// Publication payload, published byte for byte.
    #[schema(value_type = Object)]
    pub data: Box<RawValue>,
}

/// Response body for `POST /publish`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    /// Target channel echoed from the request.
    pub channel: String,
    /// Unique publication identifier.
    pub uid: uuid::Uuid,
    /// Number of sessions the publication was handed to.
    pub delivered: usize,
}
