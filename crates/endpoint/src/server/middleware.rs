//! Axum middleware layers applied to the router.
//!
//! Includes request tracing, timeout enforcement, and response compression.

use std::time::Duration;

/// Default per-request timeout applied to all routes.
///
/// Longer than the business step timeout so that a slow business step is
/// reported by the exchange handler rather than cut off here.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
