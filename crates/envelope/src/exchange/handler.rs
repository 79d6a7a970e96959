//! [`ProtocolHandler`]: sequences one exchange and classifies its failure.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{protocol::EncryptedRequest, FlowError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{encrypt_response, open_payload, DecodedEnvelope};
use crate::keys::{KeyGeneration, KeyStore};

/// Stages of a single exchange, in order.
///
/// A failure is reported against the last stage that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    Received,
    KeyUnwrapped,
    PayloadVerified,
    BusinessProcessed,
    ResponseEncrypted,
    Sent,
}

impl ExchangeStage {
    /// Stable name for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStage::Received => "received",
            ExchangeStage::KeyUnwrapped => "key_unwrapped",
            ExchangeStage::PayloadVerified => "payload_verified",
            ExchangeStage::BusinessProcessed => "business_processed",
            ExchangeStage::ResponseEncrypted => "response_encrypted",
            ExchangeStage::Sent => "sent",
        }
    }
}

/// Failure reported by a [`BusinessHandler`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BusinessError(pub String);

/// The business step: turns a verified request payload into the next payload.
///
/// Implementations never see key material.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusinessHandler: Send + Sync {
    /// Produce the JSON object to send back for `payload`.
    async fn process(&self, payload: Value) -> Result<Value, BusinessError>;
}

/// Runs exchanges against a [`KeyStore`] and a [`BusinessHandler`].
#[derive(Clone)]
pub struct ProtocolHandler {
    keys: KeyStore,
    business: Arc<dyn BusinessHandler>,
    business_timeout: Duration,
}

/// Where an exchange got to; carried into the failure log line.
struct Progress {
    stage: ExchangeStage,
    key_generation: Option<KeyGeneration>,
}

impl ProtocolHandler {
    /// Create a handler. `business_timeout` bounds each business call.
    pub fn new(keys: KeyStore, business: Arc<dyn BusinessHandler>, business_timeout: Duration) -> Self {
        Self {
            keys,
            business,
            business_timeout,
        }
    }

    /// The key store this handler unwraps with.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Handle one exchange, returning the base64 response body.
    ///
    /// # Errors
    ///
    /// Returns the [`FlowError`] of the first failing stage. Business failures
    /// and timeouts are always [`FlowError::Business`].
    pub async fn handle(&self, request: &EncryptedRequest) -> Result<String, FlowError> {
        let mut progress = Progress {
            stage: ExchangeStage::Received,
            key_generation: None,
        };

        let result = self.run(request, &mut progress).await;
        match &result {
            Ok(_) => debug!(
                stage = progress.stage.as_str(),
                key_generation = progress.key_generation,
                "exchange completed"
            ),
            Err(e) => {
                let key_generation = match e {
                    FlowError::KeyMismatch { generation } => Some(*generation),
                    _ => progress.key_generation,
                };
                warn!(
                    stage = progress.stage.as_str(),
                    kind = e.code(),
                    key_generation,
                    error = %e,
                    "exchange failed"
                );
            }
        }
        result
    }

    async fn run(&self, request: &EncryptedRequest, progress: &mut Progress) -> Result<String, FlowError> {
        let envelope = DecodedEnvelope::decode(request)?;

        // The only key store access of the exchange.
        let (session_key, generation) = self.keys.unwrap(&envelope.wrapped_key)?;
        progress.stage = ExchangeStage::KeyUnwrapped;
        progress.key_generation = Some(generation);

        let payload = open_payload(&envelope, &session_key)?;
        progress.stage = ExchangeStage::PayloadVerified;

        let next = match tokio::time::timeout(self.business_timeout, self.business.process(payload)).await {
            Ok(Ok(next)) if next.is_object() => next,
            Ok(Ok(_)) => {
                return Err(FlowError::Business(
                    "business handler returned a non-object payload".into(),
                ))
            }
            Ok(Err(e)) => return Err(FlowError::Business(e.to_string())),
            Err(_) => {
                return Err(FlowError::Business(format!(
                    "business handler timed out after {}ms",
                    self.business_timeout.as_millis()
                )))
            }
        };
        progress.stage = ExchangeStage::BusinessProcessed;

        let body = encrypt_response(&next, &session_key, &envelope.iv)?;
        progress.stage = ExchangeStage::ResponseEncrypted;

        progress.stage = ExchangeStage::Sent;
        Ok(body)
    }
}

impl std::fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("keys", &self.keys)
            .field("business_timeout", &self.business_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{InitializationVector, SessionKey};
    use crate::exchange::{decrypt_response, encrypt_request};
    use crate::test_keys;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn request_for(
        public: &rsa::RsaPublicKey,
        payload: Value,
    ) -> (EncryptedRequest, SessionKey, InitializationVector) {
        let key = SessionKey::random();
        let iv = InitializationVector::random();
        let req = encrypt_request(public, &payload, &key, &iv).unwrap();
        (req, key, iv)
    }

    fn handler_with(mock: MockBusinessHandler) -> ProtocolHandler {
        ProtocolHandler::new(test_keys::store_first(), Arc::new(mock), TIMEOUT)
    }

    #[tokio::test]
    async fn successful_exchange_round_trips() {
        let mut mock = MockBusinessHandler::new();
        mock.expect_process()
            .withf(|p| p["screen"] == "WELCOME")
            .times(1)
            .returning(|_| Ok(json!({"screen": "DONE", "data": {"status": "ok"}})));
        let handler = handler_with(mock);

        let (req, key, iv) = request_for(&test_keys::first().to_public_key(), json!({"screen": "WELCOME"}));
        let body = handler.handle(&req).await.unwrap();

        let response = decrypt_response(&body, &key, &iv).unwrap();
        assert_eq!(response, json!({"screen": "DONE", "data": {"status": "ok"}}));
    }

    #[tokio::test]
    async fn key_mismatch_never_reaches_business() {
        let mut mock = MockBusinessHandler::new();
        mock.expect_process().never();
        let handler = handler_with(mock);

        let (req, _, _) = request_for(&test_keys::second().to_public_key(), json!({}));
        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, FlowError::KeyMismatch { generation: 1 }));
        assert_eq!(err.http_status(), 421);
    }

    #[tokio::test]
    async fn tampered_payload_never_reaches_business() {
        let mut mock = MockBusinessHandler::new();
        mock.expect_process().never();
        let handler = handler_with(mock);

        let (mut req, _, _) = request_for(&test_keys::first().to_public_key(), json!({"a": 1}));
        let mut chars: Vec<char> = req.encrypted_flow_data.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        req.encrypted_flow_data = chars.into_iter().collect();

        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, FlowError::TagVerification));
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn business_failure_is_generic_protocol_failure() {
        let mut mock = MockBusinessHandler::new();
        mock.expect_process()
            .returning(|_| Err(BusinessError("flow token expired".into())));
        let handler = handler_with(mock);

        let (req, _, _) = request_for(&test_keys::first().to_public_key(), json!({}));
        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, FlowError::Business(ref m) if m.contains("flow token expired")));
        assert_ne!(err.http_status(), 421);
    }

    #[tokio::test]
    async fn non_object_business_result_is_rejected() {
        let mut mock = MockBusinessHandler::new();
        mock.expect_process().returning(|_| Ok(json!(["not", "an", "object"])));
        let handler = handler_with(mock);

        let (req, _, _) = request_for(&test_keys::first().to_public_key(), json!({}));
        assert!(matches!(
            handler.handle(&req).await,
            Err(FlowError::Business(_))
        ));
    }

    struct Stalled;

    #[async_trait]
    impl BusinessHandler for Stalled {
        async fn process(&self, _payload: Value) -> Result<Value, BusinessError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn slow_business_step_times_out() {
        let handler = ProtocolHandler::new(
            test_keys::store_first(),
            Arc::new(Stalled),
            Duration::from_millis(20),
        );
        let (req, _, _) = request_for(&test_keys::first().to_public_key(), json!({}));
        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, FlowError::Business(ref m) if m.contains("timed out")));
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(ExchangeStage::Received.as_str(), "received");
        assert_eq!(ExchangeStage::Sent.as_str(), "sent");
    }
}
