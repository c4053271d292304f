//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::domain::{Broker, Hub, PresenceRegistry};
use crate::mediator::{HookRegistry, Mediator, MediatorConfig};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Mediator dispatching session events to the registered hooks.
    pub mediator: Arc<Mediator>,
    /// Broker fanning publications out to sessions.
    pub broker: Broker,
    /// Channel presence snapshot.
    pub presence: Arc<PresenceRegistry>,
    /// Connected clients.
    pub hub: Arc<Hub>,
    /// Configuration the gateway was started with.
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Wires a fresh gateway state around the given hooks.
    #[must_use]
    pub fn new(config: GatewayConfig, hooks: HookRegistry) -> Self {
        let mediator = Mediator::new(hooks, MediatorConfig::from(&config));
        Self {
            mediator: Arc::new(mediator),
            broker: Broker::new(config.broker_capacity),
            presence: Arc::new(PresenceRegistry::new()),
            hub: Arc::new(Hub::new()),
            config: Arc::new(config),
        }
    }
}
