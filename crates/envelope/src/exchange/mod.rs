//! One request/response exchange: decrypt the inbound envelope, re-encrypt the
//! outbound payload.
//!
//! ```text
//! encrypted_aes_key   --RSA-OAEP(SHA-256)-->  SessionKey (16 bytes)
//! encrypted_flow_data --AES-128-GCM(key, iv)-> JSON object
//! response            --AES-128-GCM(key, !iv)-> base64(ciphertext || tag)
//! ```
//!
//! [`decrypt_request`] and [`encrypt_response`] are the server side. The
//! client-side mirrors, [`encrypt_request`] and [`decrypt_response`], exist for
//! the self-test and for tests.

pub mod handler;

pub use handler::{BusinessError, BusinessHandler, ExchangeStage, ProtocolHandler};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{protocol::EncryptedRequest, FlowError};
use rsa::RsaPublicKey;
use serde_json::Value;
use thiserror::Error;

use crate::cipher::{self, CipherError, InitializationVector, SessionKey};
use crate::keys::{oaep_encrypt, KeyGeneration, KeyStore, RsaError};

/// A request envelope with its base64 layers removed.
#[derive(Debug)]
pub struct DecodedEnvelope {
    /// RSA-wrapped session key.
    pub wrapped_key: Vec<u8>,
    /// Ciphertext followed by the GCM tag.
    pub sealed_payload: Vec<u8>,
    /// Request IV.
    pub iv: InitializationVector,
}

impl DecodedEnvelope {
    /// Decode the three base64 fields of `req`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::MalformedPayload`] for invalid base64 or an IV that
    /// is not 12 bytes.
    pub fn decode(req: &EncryptedRequest) -> Result<Self, FlowError> {
        let wrapped_key = decode_field("encrypted_aes_key", &req.encrypted_aes_key)?;
        let sealed_payload = decode_field("encrypted_flow_data", &req.encrypted_flow_data)?;
        let iv_bytes = decode_field("initial_vector", &req.initial_vector)?;
        let iv = InitializationVector::from_slice(&iv_bytes)
            .map_err(|e| FlowError::MalformedPayload(e.to_string()))?;
        Ok(Self {
            wrapped_key,
            sealed_payload,
            iv,
        })
    }
}

/// Everything the response path needs from a verified request.
#[derive(Debug)]
pub struct DecryptedRequest {
    /// The decrypted JSON object.
    pub payload: Value,
    /// Session key unwrapped for this exchange.
    pub session_key: SessionKey,
    /// The request IV; the response uses its complement.
    pub iv: InitializationVector,
    /// Generation of the private key that unwrapped the session key.
    pub key_generation: KeyGeneration,
}

/// Decrypt and validate an inbound request.
///
/// # Errors
///
/// - [`FlowError::MalformedPayload`] for bad base64, a bad IV length, or a
///   plaintext that is not a UTF-8 JSON object.
/// - [`FlowError::KeyMismatch`] if the session key does not unwrap.
/// - [`FlowError::TagVerification`] if the payload does not authenticate.
pub fn decrypt_request(store: &KeyStore, req: &EncryptedRequest) -> Result<DecryptedRequest, FlowError> {
    let envelope = DecodedEnvelope::decode(req)?;
    let (session_key, key_generation) = store.unwrap(&envelope.wrapped_key)?;
    let payload = open_payload(&envelope, &session_key)?;
    Ok(DecryptedRequest {
        payload,
        session_key,
        iv: envelope.iv,
        key_generation,
    })
}

/// Authenticate, decrypt, and parse the payload of `envelope`.
///
/// # Errors
///
/// Returns [`FlowError::TagVerification`] if the tag does not verify (or the
/// payload is too short to carry one) and [`FlowError::MalformedPayload`] if
/// the plaintext is not a JSON object.
pub fn open_payload(envelope: &DecodedEnvelope, key: &SessionKey) -> Result<Value, FlowError> {
    let plaintext = cipher::open(&envelope.sealed_payload, key, &envelope.iv).map_err(|e| match e {
        CipherError::Truncated | CipherError::AeadFailure => FlowError::TagVerification,
        other => FlowError::Internal(other.to_string()),
    })?;
    parse_object(&plaintext)
}

/// Encrypt `payload` for the response to a request sent with `request_iv`.
///
/// # Errors
///
/// Returns [`FlowError::Internal`] if serialisation or sealing fails.
pub fn encrypt_response(
    payload: &Value,
    key: &SessionKey,
    request_iv: &InitializationVector,
) -> Result<String, FlowError> {
    let plaintext =
        serde_json::to_vec(payload).map_err(|e| FlowError::Internal(e.to_string()))?;
    let sealed = cipher::seal(&plaintext, key, &request_iv.complement())
        .map_err(|e| FlowError::Internal(e.to_string()))?;
    Ok(STANDARD.encode(sealed))
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Errors from the client-side helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Wrapping the session key failed.
    #[error(transparent)]
    Rsa(#[from] RsaError),

    /// Sealing or opening failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// The response body is not base64.
    #[error("response is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload could not be (de)serialised.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Build a request the way the calling platform does.
///
/// # Errors
///
/// Returns [`ClientError`] if wrapping, serialisation, or sealing fails.
pub fn encrypt_request(
    public_key: &RsaPublicKey,
    payload: &Value,
    key: &SessionKey,
    iv: &InitializationVector,
) -> Result<EncryptedRequest, ClientError> {
    let wrapped = oaep_encrypt(public_key, key.as_bytes())?;
    let sealed = cipher::seal(&serde_json::to_vec(payload)?, key, iv)?;
    Ok(EncryptedRequest {
        encrypted_aes_key: STANDARD.encode(wrapped),
        encrypted_flow_data: STANDARD.encode(sealed),
        initial_vector: STANDARD.encode(iv.as_bytes()),
    })
}

/// Decrypt a response body the way the calling platform does.
///
/// # Errors
///
/// Returns [`ClientError`] if the body is not base64, does not authenticate
/// under the complemented IV, or is not JSON.
pub fn decrypt_response(
    body: &str,
    key: &SessionKey,
    request_iv: &InitializationVector,
) -> Result<Value, ClientError> {
    let sealed = STANDARD.decode(body.trim())?;
    let plaintext = cipher::open(&sealed, key, &request_iv.complement())?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, FlowError> {
    STANDARD
        .decode(value)
        .map_err(|e| FlowError::MalformedPayload(format!("{name} is not valid base64: {e}")))
}

fn parse_object(plaintext: &[u8]) -> Result<Value, FlowError> {
    let value: Value = serde_json::from_slice(plaintext)
        .map_err(|e| FlowError::MalformedPayload(format!("payload is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(FlowError::MalformedPayload(
            "payload must be a JSON object".into(),
        ));
    }
    Ok(value)
}
