//! REST endpoint handlers organized by resource.

pub mod client;
pub mod publish;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(publish::routes())
        .merge(client::routes())
}
