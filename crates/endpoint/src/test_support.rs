//! Keypairs and state shared by the endpoint's unit tests.

use std::{sync::Arc, sync::OnceLock, time::Duration};

use envelope::{
    lifecycle::{self, GenerateOptions, KeyPairPem},
    ProtocolHandler,
};

use crate::{config::Config, keys, responder::EchoResponder, server::state::AppState};

pub const PASSPHRASE: &str = "test123";

fn generate() -> KeyPairPem {
    let opts = GenerateOptions {
        bits: 1024,
        pbkdf2_iterations: 1_000,
    };
    lifecycle::generate(PASSPHRASE, &opts).unwrap()
}

/// The key the test state serves.
pub fn first() -> &'static KeyPairPem {
    static PAIR: OnceLock<KeyPairPem> = OnceLock::new();
    PAIR.get_or_init(generate)
}

/// A key the test state does not know.
pub fn second() -> &'static KeyPairPem {
    static PAIR: OnceLock<KeyPairPem> = OnceLock::new();
    PAIR.get_or_init(generate)
}

pub fn inline_config() -> Config {
    Config {
        private_key: Some(first().private_pem.clone()),
        private_key_path: None,
        private_key_passphrase: PASSPHRASE.into(),
        private_key_format: None,
        listen_port: 0,
        business_timeout_ms: 5_000,
        key_reload_interval_secs: 60,
        otel_exporter_otlp_endpoint: None,
        log_level: "debug".into(),
    }
}

pub fn state() -> AppState {
    let store = keys::load(&inline_config()).unwrap();
    let protocol = ProtocolHandler::new(store, Arc::new(EchoResponder), Duration::from_secs(5));
    AppState::new(protocol)
}
