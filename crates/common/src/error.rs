//! The exchange failure taxonomy.
//!
//! Every failure inside the endpoint is reported as a [`FlowError`]. The calling
//! platform reacts differently to each kind, so the variants must never be
//! merged: a [`FlowError::KeyMismatch`] tells the caller to refetch the public
//! key and re-wrap, anything else is final for the submitted bytes.

use thiserror::Error;

/// HTTP status the calling platform treats as "refresh the public key".
pub const KEY_REFRESH_STATUS: u16 = 421;

/// Top-level exchange error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`FlowError::KeyMismatch`] → 421
/// - [`FlowError::TagVerification`], [`FlowError::MalformedPayload`] → 400
/// - [`FlowError::Business`], [`FlowError::Configuration`], [`FlowError::Internal`] → 500
#[derive(Debug, Error)]
pub enum FlowError {
    /// The private key could not be loaded: unparsable PEM, wrong or missing
    /// passphrase, or a format tag that does not match the bytes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The wrapped session key could not be unwrapped with the active private
    /// key, or unwrapped to something that is not a 16-byte AES key.
    #[error("session key does not match key generation {generation}")]
    KeyMismatch {
        /// Generation of the private key that was tried.
        generation: u64,
    },

    /// AES-GCM authentication failed for the ciphertext, tag, or IV.
    #[error("payload authentication failed")]
    TagVerification,

    /// The envelope or the decrypted payload is not well formed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The business step failed or did not answer in time.
    #[error("business processing failed: {0}")]
    Business(String),

    /// An unexpected internal error occurred while building the response.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            FlowError::KeyMismatch { .. } => KEY_REFRESH_STATUS,
            FlowError::TagVerification => 400,
            FlowError::MalformedPayload(_) => 400,
            FlowError::Business(_) => 500,
            FlowError::Configuration(_) => 500,
            FlowError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code, used in error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Configuration(_) => "configuration_error",
            FlowError::KeyMismatch { .. } => "key_mismatch",
            FlowError::TagVerification => "tag_verification_failed",
            FlowError::MalformedPayload(_) => "malformed_payload",
            FlowError::Business(_) => "processing_failed",
            FlowError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to return to the caller. Never includes internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            FlowError::Configuration(_) => "endpoint is misconfigured",
            FlowError::KeyMismatch { .. } => "refresh the public key and retry",
            FlowError::TagVerification => "payload could not be authenticated",
            FlowError::MalformedPayload(_) => "request payload is malformed",
            FlowError::Business(_) => "request could not be processed",
            FlowError::Internal(_) => "internal error",
        }
    }
}
