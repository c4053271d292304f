//! REST API layer: route handlers, DTOs, router composition, and the
//! OpenAPI document.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` lives at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "relay-gateway",
        description = "Administration API of the real-time pub/sub gateway"
    ),
    paths(
        handlers::system::health_handler,
        handlers::publish::publish,
        handlers::client::list_clients,
        handlers::client::disconnect_client,
        handlers::client::push_to_client,
        handlers::client::channel_presence,
    ),
    tags(
        (name = "System", description = "Service status"),
        (name = "Publish", description = "Server-side publications"),
        (name = "Clients", description = "Connected client administration"),
        (name = "Channels", description = "Channel presence"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
