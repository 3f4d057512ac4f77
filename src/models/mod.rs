//! # API Models
//!
//! Request and response body structures for the HTTP surface.
//! Everything serializes camelCase; responses are wrapped in the
//! standard [`ApiResponse`] envelope.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;
