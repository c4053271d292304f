//! Server-side publish handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{PublishRequest, PublishResponse};
use crate::app_state::AppState;
use crate::domain::{Publication, Raw};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /publish`: Publish into a channel on behalf of the server.
///
/// Server publications carry no client info and are not reported to the
/// publish hook.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for an empty channel name.
#[utoipa::path(
    post,
    path = "/api/v1/publish",
    tag = "Publish",
    summary = "Publish into a channel",
    description = "Fans a publication out to every session subscribed to the channel. Hooks are not consulted.",
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Publication accepted", body = PublishResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn publish(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if req.channel.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "channel must not be empty".to_string(),
        ));
    }
    let publication = Publication::new(Raw::from(req.data.get()), None);
    let uid = publication.uid;
    let delivered = state.broker.publish(&req.channel, publication);
    tracing::debug!(channel = %req.channel, %uid, delivered, "server publication");

    Ok((
        StatusCode::OK,
        Json(PublishResponse {
            channel: req.channel,
            uid,
            delivered,
        }),
    ))
}

/// Publish routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/publish", post(publish))
}
