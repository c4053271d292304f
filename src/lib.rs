//! # relay-gateway
//!
//! Real-time pub/sub WebSocket gateway with a typed event mediation layer.
//!
//! Clients connect over WebSocket, subscribe to channels, publish, call
//! RPCs and send asynchronous messages. Every one of those lifecycle
//! events is reported to the [`mediator`], which hands it to an optional
//! business-logic hook and turns the hook's reply into a verdict the
//! session obeys: proceed, reject with a business error, or terminate the
//! connection.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Session (ws/)            REST Handlers (api/)
//!     │        │                              │
//!     │        ├── Mediator (mediator/) ── HookRegistry ── your hooks
//!     │        │
//!     ├── Broker · PresenceRegistry · Hub (domain/)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use relay_gateway::config::GatewayConfig;
//! use relay_gateway::mediator::{
//!     ClientError, HookRegistry, Scope, SubscribeContext, SubscribeHandler, SubscribeReply,
//! };
//!
//! #[derive(Debug)]
//! struct PublicOnly;
//!
//! #[async_trait]
//! impl SubscribeHandler for PublicOnly {
//!     async fn on_subscribe(&self, _scope: Scope, ctx: SubscribeContext<'_>) -> SubscribeReply {
//!         if ctx.channel.starts_with("public:") {
//!             SubscribeReply::accept()
//!         } else {
//!             SubscribeReply::reject(ClientError::permission_denied())
//!         }
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let hooks = HookRegistry::new().on_subscribe(Arc::new(PublicOnly));
//! relay_gateway::serve(GatewayConfig::default(), hooks).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod mediator;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::mediator::{Disconnect, HookRegistry};

/// Builds the full HTTP router: REST API, `/ws` upgrade, tracing and CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `config.listen_addr` and serves the gateway until Ctrl-C.
///
/// On shutdown every connected client is disconnected with
/// [`Disconnect::shutdown`] so that sessions close cleanly and disconnect
/// hooks fire.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: GatewayConfig, hooks: HookRegistry) -> std::io::Result<()> {
    let state = AppState::new(config, hooks);
    let listener = tokio::net::TcpListener::bind(state.config.listen_addr).await?;
    tracing::info!(addr = %state.config.listen_addr, "server listening");

    let hub = std::sync::Arc::clone(&state.hub);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            let closed = hub.disconnect_all(&Disconnect::shutdown()).await;
            tracing::info!(closed, "shutting down");
        })
        .await
}
