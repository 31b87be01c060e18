// crates/backend-lib/src/middleware/mod.rs

//! Middleware for the `promstream` HTTP surface.

pub mod basic_auth;

pub use basic_auth::basic_auth;
