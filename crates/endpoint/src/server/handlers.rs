//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use common::{
    protocol::{EncryptedRequest, ErrorResponse, HealthResponse},
    FlowError,
};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use super::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// `POST /flow` - one encrypted data exchange.
///
/// Success is `200` with the base64 response as `text/plain`. Failures use the
/// status from [`FlowError::http_status`]; `421` tells the platform to refetch
/// the public key.
pub async fn exchange(State(state): State<AppState>, body: Bytes) -> Response {
    let exchange_id = Uuid::new_v4();
    let span = info_span!("exchange", %exchange_id);

    async move {
        let request: EncryptedRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                let err = FlowError::MalformedPayload(format!("request body: {e}"));
                warn!(kind = err.code(), error = %err, "rejected request body");
                return error_response(&err);
            }
        };

        match state.protocol.handle(&request).await {
            Ok(encrypted) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, TEXT_PLAIN)],
                encrypted,
            )
                .into_response(),
            Err(e) => error_response(&e),
        }
    }
    .instrument(span)
    .await
}

/// `GET /public-key` - SPKI PEM of the active key.
pub async fn public_key(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        state.keys().public_key_pem(),
    )
        .into_response()
}

/// `GET /health` - liveness check.
///
/// A running server always has a loaded key; startup aborts otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok".into(),
        key_generation: state.keys().generation(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn error_response(e: &FlowError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(e))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::router;
    use crate::test_support;
    use axum_test::TestServer;
    use envelope::{
        exchange::{decrypt_response, encrypt_request},
        keys::parse_public_key_pem,
        InitializationVector, SessionKey,
    };
    use serde_json::{json, Value};

    fn server() -> TestServer {
        TestServer::new(router::build(test_support::state())).unwrap()
    }

    fn request_to(
        public_pem: &str,
        payload: &Value,
    ) -> (EncryptedRequest, SessionKey, InitializationVector) {
        let public = parse_public_key_pem(public_pem).unwrap();
        let key = SessionKey::random();
        let iv = InitializationVector::random();
        let req = encrypt_request(&public, payload, &key, &iv).unwrap();
        (req, key, iv)
    }

    #[tokio::test]
    async fn exchange_returns_plain_base64_body() {
        let server = server();
        let payload = json!({
            "screen": "TEST_SCREEN",
            "data": {"name": "Test User", "email": "test@example.com"},
            "flow_token": "test-flow-token"
        });
        let (req, key, iv) = request_to(&test_support::first().public_pem, &payload);

        let resp = server.post("/flow").json(&req).await;
        resp.assert_status_ok();
        let content_type = resp.header("content-type");
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));

        let decrypted = decrypt_response(&resp.text(), &key, &iv).unwrap();
        assert_eq!(
            decrypted,
            json!({"screen": "TEST_SCREEN", "data": {"name": "Test User", "email": "test@example.com"}})
        );
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let server = server();
        let (req, key, iv) = request_to(&test_support::first().public_pem, &json!({"action": "ping"}));
        let resp = server.post("/flow").json(&req).await;
        resp.assert_status_ok();
        let decrypted = decrypt_response(&resp.text(), &key, &iv).unwrap();
        assert_eq!(decrypted, json!({"data": {"status": "active"}}));
    }

    #[tokio::test]
    async fn stale_public_key_returns_421() {
        let server = server();
        let (req, _, _) = request_to(&test_support::second().public_pem, &json!({"action": "ping"}));
        let resp = server.post("/flow").json(&req).await;
        resp.assert_status(StatusCode::MISDIRECTED_REQUEST);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "key_mismatch");
    }

    #[tokio::test]
    async fn tampered_payload_returns_400() {
        let server = server();
        let (mut req, _, _) = request_to(&test_support::first().public_pem, &json!({"action": "ping"}));
        let mut chars: Vec<char> = req.encrypted_flow_data.chars().collect();
        chars[1] = if chars[1] == 'A' { 'B' } else { 'A' };
        req.encrypted_flow_data = chars.into_iter().collect();

        let resp = server.post("/flow").json(&req).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "tag_verification_failed");
    }

    #[tokio::test]
    async fn unparsable_body_returns_400() {
        let server = server();
        let resp = server.post("/flow").text("{not json").await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server.post("/flow").json(&json!({"encrypted_aes_key": "AAAA"})).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn business_failure_returns_500_not_421() {
        let server = server();
        let (req, _, _) = request_to(&test_support::first().public_pem, &json!({"action": "INIT"}));
        let resp = server.post("/flow").json(&req).await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "processing_failed");
        assert!(!body.message.contains("screen"));
    }

    #[tokio::test]
    async fn public_key_endpoint_serves_active_key() {
        let server = server();
        let resp = server.get("/public-key").await;
        resp.assert_status_ok();
        assert_eq!(resp.text(), test_support::first().public_pem);
    }

    #[tokio::test]
    async fn health_reports_key_generation() {
        let server = server();
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: HealthResponse = resp.json();
        assert_eq!(body.status, "ok");
        assert_eq!(body.key_generation, 1);
    }
}
