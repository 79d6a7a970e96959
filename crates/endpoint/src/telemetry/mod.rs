//! Tracing setup: structured JSON logs, optionally exported as OTLP spans.
//!
//! # Telemetry invariants
//!
//! - **No key material or decrypted payloads** in any span attribute or log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
