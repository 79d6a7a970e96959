//! Shared application state injected into every Axum handler.

use envelope::{KeyStore, ProtocolHandler};

/// Application state shared across all request handlers.
///
/// Cheap to clone: the handler holds `Arc`-backed key store and business step.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Runs each data exchange.
    pub protocol: ProtocolHandler,
}

impl AppState {
    /// Create a new [`AppState`] around `protocol`.
    pub fn new(protocol: ProtocolHandler) -> Self {
        Self { protocol }
    }

    /// The key store behind the protocol handler.
    pub fn keys(&self) -> &KeyStore {
        self.protocol.keys()
    }
}
