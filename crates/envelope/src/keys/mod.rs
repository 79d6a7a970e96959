//! Server private key: loading, session key unwrap, and rotation.
//!
//! # Lifecycle
//!
//! 1. At startup the configuration layer builds a [`PrivateKeyMaterial`] and
//!    calls [`KeyStore::load`]. Parsing and passphrase checks happen here, so a
//!    bad key stops the service before it serves anything.
//! 2. Each exchange calls [`KeyStore::unwrap`] exactly once.
//! 3. [`KeyStore::rotate`] replaces the active key by reference swap.
//!
//! # Padding
//!
//! Key transport is RSA-OAEP with SHA-256 for both the label hash and MGF1.
//! No other padding is attempted.

pub mod material;
pub mod store;

pub use material::{KeyFormat, PrivateKeyMaterial};
pub use store::{KeyGeneration, KeyStore};

use rand::rngs::OsRng;
pub use rsa::RsaPublicKey;

use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
    Oaep, RsaPrivateKey,
};
use sha2::Sha256;
use thiserror::Error;

/// Errors from the raw RSA primitives.
#[derive(Debug, Error)]
pub enum RsaError {
    /// OAEP encryption or decryption failed.
    #[error("rsa-oaep operation failed: {0}")]
    Oaep(String),

    /// The public key could not be encoded or decoded.
    #[error("public key encoding failed: {0}")]
    Encoding(String),
}

/// Encrypt `plaintext` to `public_key` with RSA-OAEP(SHA-256).
///
/// # Errors
///
/// Returns [`RsaError::Oaep`] if the message is too long for the modulus.
pub fn oaep_encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, RsaError> {
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| RsaError::Oaep(e.to_string()))
}

/// Decrypt an RSA-OAEP(SHA-256) ciphertext.
///
/// # Errors
///
/// Returns [`RsaError::Oaep`] if the ciphertext was not produced for this key
/// or is corrupt.
pub fn oaep_decrypt(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, RsaError> {
    private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| RsaError::Oaep(e.to_string()))
}

/// SPKI `PUBLIC KEY` PEM for `public_key`.
///
/// # Errors
///
/// Returns [`RsaError::Encoding`] if DER encoding fails.
pub fn public_key_pem(public_key: &RsaPublicKey) -> Result<String, RsaError> {
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| RsaError::Encoding(e.to_string()))
}

/// Parse an SPKI `PUBLIC KEY` PEM.
///
/// # Errors
///
/// Returns [`RsaError::Encoding`] if the PEM is not an RSA public key.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, RsaError> {
    RsaPublicKey::from_public_key_pem(pem.trim()).map_err(|e| RsaError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys;

    #[test]
    fn oaep_round_trip() {
        let sk = test_keys::first();
        let ct = oaep_encrypt(&sk.to_public_key(), b"sixteen byte key").unwrap();
        assert_eq!(oaep_decrypt(sk, &ct).unwrap(), b"sixteen byte key");
    }

    #[test]
    fn oaep_wrong_key_fails() {
        let ct = oaep_encrypt(&test_keys::first().to_public_key(), b"sixteen byte key").unwrap();
        assert!(oaep_decrypt(test_keys::second(), &ct).is_err());
    }

    #[test]
    fn public_pem_has_spki_label() {
        let pem = public_key_pem(&test_keys::first().to_public_key()).unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(parse_public_key_pem(&pem).unwrap(), test_keys::first().to_public_key());
    }

    #[test]
    fn parse_public_key_rejects_private_pem() {
        let pem = test_keys::plain_pkcs1(test_keys::first());
        assert!(parse_public_key_pem(&pem).is_err());
    }
}
