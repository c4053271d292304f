//! Data Transfer Objects for REST request/response serialization.
//!
//! Opaque payloads (`data`, `info`) travel as arbitrary JSON values.

pub mod client_dto;
pub mod publish_dto;

pub use client_dto::*;
pub use publish_dto::*;
