//! Client administration handlers: list, forced disconnect, push, presence.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ClientDto, ClientListParams, ClientListResponse, DisconnectRequest, DisconnectResponse,
    PresenceMemberDto, PresenceResponse, PushRequest,
};
use crate::app_state::AppState;
use crate::domain::{ClientId, Raw};
use crate::error::{ErrorResponse, GatewayError};
use crate::mediator::Disconnect;

/// `GET /clients`: List connected clients.
///
/// # Errors
///
/// Never fails; the `Result` keeps the handler signature uniform.
#[utoipa::path(
    get,
    path = "/api/v1/clients",
    tag = "Clients",
    summary = "List connected clients",
    description = "Returns every connected client, optionally filtered by user.",
    params(ClientListParams),
    responses(
        (status = 200, description = "Connected clients", body = ClientListResponse),
    )
)]
pub async fn list_clients(
    State(state): State<AppState>,
    Query(params): Query<ClientListParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let data: Vec<ClientDto> = state
        .hub
        .list(params.user.as_deref())
        .await
        .into_iter()
        .map(ClientDto::from)
        .collect();
    let total = data.len();
    Ok(Json(ClientListResponse { data, total }))
}

/// `POST /clients/{id}/disconnect`: Force a client to disconnect.
///
/// Cancels every in-flight hook invocation of the client. The session
/// then closes with the recorded instruction and fires the disconnect
/// hook.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a code outside
/// [`Disconnect::CODES`] and [`GatewayError::ClientNotFound`] if the client
/// is not connected.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{id}/disconnect",
    tag = "Clients",
    summary = "Force a client to disconnect",
    params(("id" = uuid::Uuid, Path, description = "Client identifier")),
    request_body = DisconnectRequest,
    responses(
        (status = 200, description = "Disconnect recorded", body = DisconnectResponse),
        (status = 400, description = "Code outside 3000..=4999", body = ErrorResponse),
        (status = 404, description = "Client not found", body = ErrorResponse),
    )
)]
pub async fn disconnect_client(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    body: Option<Json<DisconnectRequest>>,
) -> Result<impl IntoResponse, GatewayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(code) = req.code.filter(|code| !Disconnect::CODES.contains(code)) {
        return Err(GatewayError::InvalidRequest(format!(
            "disconnect code {code} outside {}..={}",
            Disconnect::CODES.start(),
            Disconnect::CODES.end()
        )));
    }
    let forced = Disconnect::force();
    let disconnect = Disconnect::new(
        req.code.unwrap_or(forced.code),
        req.reason.unwrap_or(forced.reason),
    );

    let client = state.hub.get(ClientId::from_uuid(id)).await?;
    let applied = client.disconnect(disconnect.clone());
    let effective = client.closed_reason().cloned().unwrap_or(disconnect);
    tracing::info!(client = %id, applied, code = effective.code, "forced disconnect");

    Ok((
        StatusCode::OK,
        Json(DisconnectResponse {
            client: id,
            code: effective.code,
            reason: effective.reason,
            applied,
        }),
    ))
}

/// `POST /clients/{id}/push`: Send an asynchronous message to a client.
///
/// # Errors
///
/// Returns [`GatewayError::ClientNotFound`] if the client is not connected
/// and [`GatewayError::ClientClosed`] if it is closing.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{id}/push",
    tag = "Clients",
    summary = "Push a message to a client",
    params(("id" = uuid::Uuid, Path, description = "Client identifier")),
    request_body = PushRequest,
    responses(
        (status = 202, description = "Message queued"),
        (status = 404, description = "Client not found", body = ErrorResponse),
        (status = 409, description = "Client is closing", body = ErrorResponse),
    )
)]
pub async fn push_to_client(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<PushRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let client = state.hub.get(ClientId::from_uuid(id)).await?;
    client.send(Raw::from(req.data.get()))?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /channels/{channel}/presence`: Clients present in a channel.
///
/// # Errors
///
/// Never fails; unknown channels have no members.
#[utoipa::path(
    get,
    path = "/api/v1/channels/{channel}/presence",
    tag = "Channels",
    summary = "Channel presence",
    params(("channel" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel members", body = PresenceResponse),
    )
)]
pub async fn channel_presence(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let members = state
        .presence
        .members(&channel)
        .await
        .into_iter()
        .map(PresenceMemberDto::from)
        .collect();
    Ok(Json(PresenceResponse { channel, members }))
}

/// Client and channel routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/{id}/disconnect", post(disconnect_client))
        .route("/clients/{id}/push", post(push_to_client))
        .route("/channels/{channel}/presence", get(channel_presence))
}
