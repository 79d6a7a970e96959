//! Request and response bodies exchanged with the calling platform.
//!
//! Field names are fixed by the platform and must not change.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data exchange endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /flow`.
///
/// All three fields are standard-alphabet base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRequest {
    /// RSA-OAEP(SHA-256) wrapped 16-byte AES session key.
    pub encrypted_aes_key: String,
    /// AES-128-GCM ciphertext followed by the 16-byte authentication tag.
    pub encrypted_flow_data: String,
    /// 12-byte GCM initialisation vector.
    pub initial_vector: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"key_mismatch"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::FlowError> for ErrorResponse {
    fn from(e: &crate::FlowError) -> Self {
        Self::new(e.code(), e.public_message())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: String,
    /// Generation of the private key currently serving exchanges.
    pub key_generation: u64,
}
