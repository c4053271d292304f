//! Domain layer: identities, payloads, publications, and shared stores.
//!
//! This module contains the server-side state the mediator's collaborators
//! work with: client identity and metadata, opaque payloads, the broker
//! that fans publications out to sessions, channel presence, and the hub
//! of connected clients.

pub mod broker;
pub mod client_id;
pub mod hub;
pub mod presence;
pub mod publication;
pub mod raw;

pub use broker::Broker;
pub use client_id::ClientId;
pub use hub::Hub;
pub use presence::{PresenceEntry, PresenceRegistry};
pub use publication::{ChannelPublication, ClientInfo, Publication};
pub use raw::Raw;
