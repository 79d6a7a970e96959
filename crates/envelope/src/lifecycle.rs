//! Offline key lifecycle: generate, convert, and self-test keypairs.
//!
//! These run out of band (see the `keytool` binary) but go through the same
//! OAEP, key store, and exchange code as the live endpoint.
//!
//! Generated private keys are PKCS#8 `ENCRYPTED PRIVATE KEY` documents using
//! PBES2 with PBKDF2-HMAC-SHA256 and AES-256-CBC.

use common::FlowError;
use pkcs8::{pkcs5::pbes2, EncodePrivateKey, LineEnding, PrivateKeyInfo};
use rand::{rngs::OsRng, RngCore};
use rsa::{pkcs1::EncodeRsaPrivateKey, traits::PublicKeyParts, RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::cipher::{InitializationVector, SessionKey};
use crate::exchange::{self, ClientError};
use crate::keys::{
    material::ENCRYPTED_PKCS8_LABEL, oaep_decrypt, oaep_encrypt, parse_public_key_pem,
    public_key_pem, KeyFormat, KeyStore, PrivateKeyMaterial, RsaError,
};

/// Fixed plaintext of the asymmetric self-test.
pub const SELF_TEST_MESSAGE: &str = "Hello, WhatsApp Flow!";

/// Default RSA modulus size.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus accepted by [`generate`].
pub const MIN_KEY_BITS: usize = 1024;

/// Default PBKDF2 iteration count for encrypted private keys.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Errors produced by the lifecycle tooling.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Encrypted keys need a non-empty passphrase.
    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    /// Generation options are out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// RSA key generation failed.
    #[error("key generation failed: {0}")]
    Generation(String),

    /// PEM/DER encoding or decoding failed.
    #[error("key encoding failed: {0}")]
    Encoding(String),

    /// The private key could not be loaded.
    #[error(transparent)]
    Key(#[from] FlowError),

    /// An RSA primitive failed.
    #[error(transparent)]
    Rsa(#[from] RsaError),

    /// The client side of the exchange round trip failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The supplied public key does not belong to the private key.
    #[error("public key does not match the private key")]
    PublicKeyMismatch,

    /// A round trip returned different bytes than went in.
    #[error("self-test round trip mismatch: {0}")]
    RoundTripMismatch(&'static str),
}

/// Options for [`generate`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// RSA modulus size in bits.
    pub bits: usize,
    /// PBKDF2 iteration count for the private key encryption.
    pub pbkdf2_iterations: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// A private key PEM and its SPKI public key PEM.
#[derive(Clone)]
pub struct KeyPairPem {
    /// Private key, encrypted or plain depending on the operation.
    pub private_pem: String,
    /// SPKI `PUBLIC KEY` PEM.
    pub public_pem: String,
}

impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("private_pem", &"[REDACTED]")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

/// Outcome of a successful [`self_test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestReport {
    /// RSA modulus size in bits.
    pub modulus_bits: usize,
    /// Whether a separately supplied public key was checked against the private key.
    pub public_key_checked: bool,
}

/// Generate a keypair with the private key encrypted under `passphrase`.
///
/// # Errors
///
/// Returns [`LifecycleError::EmptyPassphrase`] or
/// [`LifecycleError::InvalidOptions`] for bad input, and
/// [`LifecycleError::Generation`] / [`LifecycleError::Encoding`] if the
/// underlying primitives fail.
pub fn generate(passphrase: &str, options: &GenerateOptions) -> Result<KeyPairPem, LifecycleError> {
    if passphrase.is_empty() {
        return Err(LifecycleError::EmptyPassphrase);
    }
    if options.bits < MIN_KEY_BITS {
        return Err(LifecycleError::InvalidOptions(format!(
            "key size must be at least {MIN_KEY_BITS} bits, got {}",
            options.bits
        )));
    }
    if options.pbkdf2_iterations == 0 {
        return Err(LifecycleError::InvalidOptions(
            "pbkdf2 iterations must be > 0".into(),
        ));
    }

    let private_key = RsaPrivateKey::new(&mut OsRng, options.bits)
        .map_err(|e| LifecycleError::Generation(e.to_string()))?;
    let private_pem = encrypt_private_key(&private_key, passphrase, options.pbkdf2_iterations)?;
    let public_pem = public_key_pem(&private_key.to_public_key())?;

    info!(bits = options.bits, "generated keypair");
    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}

/// Decrypt an encrypted private key into plain PKCS#1 form.
///
/// The public key is recomputed from the private key.
///
/// # Errors
///
/// Returns [`LifecycleError::Key`] if the key cannot be decrypted with
/// `passphrase`, and [`LifecycleError::Encoding`] if re-encoding fails.
pub fn convert(encrypted_pem: &str, passphrase: &str) -> Result<KeyPairPem, LifecycleError> {
    if passphrase.is_empty() {
        return Err(LifecycleError::EmptyPassphrase);
    }
    let material = PrivateKeyMaterial::new(
        encrypted_pem,
        Some(passphrase.to_owned()),
        KeyFormat::EncryptedPkcs8,
    );
    let private_key = material.parse()?;
    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| LifecycleError::Encoding(e.to_string()))?
        .as_str()
        .to_owned();
    let public_pem = public_key_pem(&private_key.to_public_key())?;

    info!("converted encrypted private key to PKCS#1");
    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}

/// Prove a keypair works before it is deployed.
///
/// 1. Load `material` through [`KeyStore::load`].
/// 2. If `public_pem` is given, require it to match the private key.
/// 3. OAEP-encrypt [`SELF_TEST_MESSAGE`] to the public key and decrypt it with
///    the private key.
/// 4. Run a full exchange round trip with a reference payload.
///
/// # Errors
///
/// Returns the first failing check as a [`LifecycleError`].
pub fn self_test(
    material: &PrivateKeyMaterial,
    public_pem: Option<&str>,
) -> Result<SelfTestReport, LifecycleError> {
    let store = KeyStore::load(material)?;
    let derived = store.with_private_key(|sk| sk.to_public_key());

    let public_key_checked = match public_pem {
        Some(pem) => {
            let supplied = parse_public_key_pem(pem)?;
            if supplied != derived {
                return Err(LifecycleError::PublicKeyMismatch);
            }
            true
        }
        None => false,
    };

    let ciphertext = oaep_encrypt(&derived, SELF_TEST_MESSAGE.as_bytes())?;
    let decrypted = store.with_private_key(|sk| oaep_decrypt(sk, &ciphertext))?;
    if decrypted != SELF_TEST_MESSAGE.as_bytes() {
        return Err(LifecycleError::RoundTripMismatch("asymmetric message"));
    }
    debug!("asymmetric round trip ok");

    exchange_round_trip(&store, &derived)?;
    debug!("exchange round trip ok");

    Ok(SelfTestReport {
        modulus_bits: derived.size() * 8,
        public_key_checked,
    })
}

fn exchange_round_trip(store: &KeyStore, public_key: &RsaPublicKey) -> Result<(), LifecycleError> {
    let request_payload = json!({
        "screen": "TEST_SCREEN",
        "data": {"name": "Test User", "email": "test@example.com"},
        "flow_token": "test-flow-token"
    });
    let key = SessionKey::random();
    let iv = InitializationVector::random();

    let request = exchange::encrypt_request(public_key, &request_payload, &key, &iv)?;
    let decrypted = exchange::decrypt_request(store, &request)?;
    if decrypted.payload != request_payload {
        return Err(LifecycleError::RoundTripMismatch("request payload"));
    }
    if decrypted.session_key.as_bytes() != key.as_bytes() {
        return Err(LifecycleError::RoundTripMismatch("session key"));
    }

    let response_payload: Value = json!({"screen": "SUCCESS", "data": {}});
    let body = exchange::encrypt_response(&response_payload, &decrypted.session_key, &decrypted.iv)?;
    if exchange::decrypt_response(&body, &key, &iv)? != response_payload {
        return Err(LifecycleError::RoundTripMismatch("response payload"));
    }
    Ok(())
}

fn encrypt_private_key(
    private_key: &RsaPrivateKey,
    passphrase: &str,
    iterations: u32,
) -> Result<String, LifecycleError> {
    let encoding = |e: &dyn std::fmt::Display| LifecycleError::Encoding(e.to_string());

    let der = private_key.to_pkcs8_der().map_err(|e| encoding(&e))?;
    let info = PrivateKeyInfo::try_from(der.as_bytes()).map_err(|e| encoding(&e))?;

    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
        .map_err(|e| encoding(&e))?;

    let encrypted = info
        .encrypt_with_params(params, passphrase.as_bytes())
        .map_err(|e| encoding(&e))?;
    let pem = encrypted
        .to_pem(ENCRYPTED_PKCS8_LABEL, LineEnding::LF)
        .map_err(|e| encoding(&e))?;
    Ok(pem.as_str().to_owned())
}
