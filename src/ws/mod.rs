//! WebSocket layer: connection sessions, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` hosts one session per connection. The
//! session owns the connection lifecycle and reports every lifecycle
//! event to the [`crate::mediator::Mediator`], applying its verdicts.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
