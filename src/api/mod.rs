//! # HTTP API
//!
//! Route configuration and request handlers.

pub mod handlers;
pub mod routes;

pub use routes::configure_routes;
