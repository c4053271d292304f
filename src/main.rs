//! relay-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and a
//! small set of audit hooks that log connection lifecycles and echo RPC
//! calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use relay_gateway::config::GatewayConfig;
use relay_gateway::mediator::{
    ConnectContext, ConnectHandler, ConnectReply, DisconnectContext, DisconnectHandler,
    DisconnectReply, HookRegistry, RpcContext, RpcHandler, RpcReply, Scope,
};

/// Logs connects and disconnects, echoes RPC payloads.
#[derive(Debug)]
struct AuditHooks;

#[async_trait]
impl ConnectHandler for AuditHooks {
    async fn on_connect(&self, _scope: Scope, ctx: ConnectContext<'_>) -> ConnectReply {
        tracing::info!(client = %ctx.client.id(), user = ctx.client.user(), "audit: connect");
        ConnectReply::accept()
    }
}

#[async_trait]
impl DisconnectHandler for AuditHooks {
    async fn on_disconnect(&self, _scope: Scope, ctx: DisconnectContext<'_>) -> DisconnectReply {
        tracing::info!(
            client = %ctx.client.id(),
            code = ctx.disconnect.code,
            reason = %ctx.disconnect.reason,
            "audit: disconnect"
        );
        DisconnectReply
    }
}

#[async_trait]
impl RpcHandler for AuditHooks {
    async fn on_rpc(&self, _scope: Scope, ctx: RpcContext<'_>) -> RpcReply {
        RpcReply::data(ctx.data.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config =
        GatewayConfig::from_env().map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;
    tracing::info!(addr = %config.listen_addr, "starting relay-gateway");

    let audit = Arc::new(AuditHooks);
    let hooks = HookRegistry::new()
        .on_connect(Arc::clone(&audit) as Arc<dyn ConnectHandler>)
        .on_disconnect(Arc::clone(&audit) as Arc<dyn DisconnectHandler>)
        .on_rpc(audit);

    relay_gateway::serve(config, hooks).await?;
    Ok(())
}
