//! Hybrid-encryption primitives for the flow data exchange.
//!
//! - [`cipher`]: AES-128-GCM sealing and the IV complement rule.
//! - [`keys`]: RSA-OAEP key transport and the rotatable [`KeyStore`].
//! - [`exchange`]: request decryption, response encryption, and the
//!   per-request [`ProtocolHandler`].
//! - [`lifecycle`]: offline generate / convert / self-test tooling.
//!
//! # Module invariants
//!
//! - **No I/O.** Nothing here reads files, sockets, or the environment; the
//!   binaries hand in PEM text and request bodies.
//! - **No key material in logs.** Keys and plaintext are never traced.

pub mod cipher;
pub mod exchange;
pub mod keys;
pub mod lifecycle;

pub use cipher::{InitializationVector, SessionKey};
pub use exchange::{BusinessError, BusinessHandler, ProtocolHandler};
pub use common::FlowError;
pub use keys::{KeyFormat, KeyStore, PrivateKeyMaterial};
