//! Default business step wired into the binary.
//!
//! Screen navigation belongs to the integrating application. This responder
//! only answers the platform's protocol-level messages and otherwise echoes
//! the requested screen and data back unchanged.

use async_trait::async_trait;
use envelope::{BusinessError, BusinessHandler};
use serde_json::{json, Map, Value};

/// Answers health pings and error notifications; echoes everything else.
#[derive(Debug, Clone, Default)]
pub struct EchoResponder;

#[async_trait]
impl BusinessHandler for EchoResponder {
    async fn process(&self, payload: Value) -> Result<Value, BusinessError> {
        if payload.get("action").and_then(Value::as_str) == Some("ping") {
            return Ok(json!({"data": {"status": "active"}}));
        }
        if payload.pointer("/data/error").is_some() {
            return Ok(json!({"data": {"acknowledged": true}}));
        }

        let screen = payload
            .get("screen")
            .and_then(Value::as_str)
            .ok_or_else(|| BusinessError("payload has no screen".into()))?;
        let data = payload
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(json!({"screen": screen, "data": data}))
    }
}
