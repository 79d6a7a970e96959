//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Translate [`common::FlowError`] kinds into the platform's status codes.
//! - Inject shared application state (`AppState`) into handlers.
//!
//! TLS is terminated in front of this server.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
