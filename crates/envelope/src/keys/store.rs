//! [`KeyStore`]: the active private key behind an atomically swappable reference.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use common::FlowError;
use rsa::RsaPrivateKey;
use tracing::info;

use super::{oaep_decrypt, public_key_pem, PrivateKeyMaterial};
use crate::cipher::{SessionKey, KEY_LEN};

/// Version of the active private key. Starts at 1, +1 per rotation.
///
/// Diagnostics only; never used to choose a key.
pub type KeyGeneration = u64;

/// One loaded key and everything derived from it.
struct ActiveKey {
    private_key: RsaPrivateKey,
    public_pem: String,
    generation: KeyGeneration,
}

impl ActiveKey {
    fn from_material(
        material: &PrivateKeyMaterial,
        generation: KeyGeneration,
    ) -> Result<Self, FlowError> {
        let private_key = material.parse()?;
        let public_pem = public_key_pem(&private_key.to_public_key())
            .map_err(|e| FlowError::Configuration(e.to_string()))?;
        Ok(Self {
            private_key,
            public_pem,
            generation,
        })
    }
}

/// Thread-safe holder of the server private key.
///
/// Readers take a lock-free snapshot via [`ArcSwap`], so an unwrap that
/// started before a rotation finishes with the key it started with. Rotations
/// are serialised by a mutex that readers never touch.
#[derive(Clone)]
pub struct KeyStore {
    active: Arc<ArcSwap<ActiveKey>>,
    rotation: Arc<Mutex<()>>,
}

impl KeyStore {
    /// Parse `material` and build a store serving it as generation 1.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if the key cannot be loaded; see
    /// [`PrivateKeyMaterial::parse`].
    pub fn load(material: &PrivateKeyMaterial) -> Result<Self, FlowError> {
        let active = ActiveKey::from_material(material, 1)?;
        info!(
            key_generation = active.generation,
            format = ?material.format(),
            "private key loaded"
        );
        Ok(Self {
            active: Arc::new(ArcSwap::from_pointee(active)),
            rotation: Arc::new(Mutex::new(())),
        })
    }

    /// Unwrap an RSA-OAEP wrapped session key.
    ///
    /// Returns the session key together with the generation of the key that
    /// unwrapped it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::KeyMismatch`] if decryption fails or yields
    /// anything other than [`KEY_LEN`] bytes.
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<(SessionKey, KeyGeneration), FlowError> {
        let active = self.active.load();
        let mismatch = FlowError::KeyMismatch {
            generation: active.generation,
        };

        let plain = oaep_decrypt(&active.private_key, wrapped).map_err(|_| mismatch)?;
        let key = SessionKey::from_slice(&plain).map_err(|_| FlowError::KeyMismatch {
            generation: active.generation,
        });
        wipe(plain);
        Ok((key?, active.generation))
    }

    /// Replace the active key.
    ///
    /// The new material is parsed before anything changes; on error the
    /// current key keeps serving.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if `material` cannot be loaded.
    pub fn rotate(&self, material: &PrivateKeyMaterial) -> Result<KeyGeneration, FlowError> {
        let _guard = self.rotation.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.active.load().generation + 1;
        let next = ActiveKey::from_material(material, generation)?;
        self.active.store(Arc::new(next));
        info!(key_generation = generation, "private key rotated");
        Ok(generation)
    }

    /// Generation of the active key.
    pub fn generation(&self) -> KeyGeneration {
        self.active.load().generation
    }

    /// SPKI PEM of the active public key, derived from the private key.
    pub fn public_key_pem(&self) -> String {
        self.active.load().public_pem.clone()
    }

    /// The active private key. Used by the offline self-test.
    pub(crate) fn with_private_key<R>(&self, f: impl FnOnce(&RsaPrivateKey) -> R) -> R {
        f(&self.active.load().private_key)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn wipe(mut buf: Vec<u8>) {
    buf.iter_mut().for_each(|b| *b = 0);
}
