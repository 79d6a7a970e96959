//! AES-128-GCM sealing and opening of exchange payloads.
//!
//! The platform fixes the cipher: AES-128-GCM, 12-byte IV, 16-byte tag appended
//! to the ciphertext, no associated data. The response reuses the request's
//! session key, so it must use a different IV; see
//! [`InitializationVector::complement`].

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes128Gcm, Nonce, Tag,
};
use thiserror::Error;

/// Byte length of an AES-128 session key.
pub const KEY_LEN: usize = 16;

/// Byte length of a GCM initialisation vector.
pub const IV_LEN: usize = 12;

/// Byte length of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Key material is not [`KEY_LEN`] bytes.
    #[error("invalid session key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// IV is not [`IV_LEN`] bytes.
    #[error("invalid IV length: expected {IV_LEN} bytes, got {0}")]
    InvalidIvLength(usize),

    /// The sealed payload is too short to contain a tag.
    #[error("sealed payload shorter than the {TAG_LEN}-byte tag")]
    Truncated,

    /// AES-GCM encryption failed or the tag did not verify.
    #[error("aead operation failed")]
    AeadFailure,
}

/// Per-exchange AES-128 key.
///
/// Deliberately not `Clone`: a session key belongs to exactly one exchange.
/// The bytes are zeroed on drop and never printed.
pub struct SessionKey(Box<[u8; KEY_LEN]>);

impl SessionKey {
    /// Build a session key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Generate a fresh random session key from the OS CSPRNG.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut buf = Box::new([0u8; KEY_LEN]);
        rand::rngs::OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// A 12-byte GCM initialisation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializationVector([u8; IV_LEN]);

impl InitializationVector {
    /// Wrap raw IV bytes.
    pub fn new(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse an IV from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidIvLength`] unless `bytes` is exactly
    /// [`IV_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let arr: [u8; IV_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Generate a random IV from the OS CSPRNG.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut buf = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        Self(buf)
    }

    /// The response IV: every bit of the request IV inverted.
    ///
    /// Both sides derive it independently; it is never sent on the wire.
    pub fn complement(&self) -> Self {
        let mut out = self.0;
        out.iter_mut().for_each(|b| *b = !*b);
        Self(out)
    }

    /// Raw IV bytes.
    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Encrypt `plaintext`, returning `ciphertext || tag`.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] on an internal AEAD error (unreachable
/// for payloads under the GCM length limit).
pub fn seal(
    plaintext: &[u8],
    key: &SessionKey,
    iv: &InitializationVector,
) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv.as_bytes()), b"", &mut buffer)
        .map_err(|_| CipherError::AeadFailure)?;
    buffer.extend_from_slice(tag.as_slice());
    Ok(buffer)
}

/// Verify and decrypt `ciphertext || tag`.
///
/// Nothing is returned unless the tag verifies.
///
/// # Errors
///
/// Returns [`CipherError::Truncated`] if `sealed` is shorter than [`TAG_LEN`],
/// and [`CipherError::AeadFailure`] if authentication fails.
pub fn open(
    sealed: &[u8],
    key: &SessionKey,
    iv: &InitializationVector,
) -> Result<Vec<u8>, CipherError> {
    let body_len = sealed
        .len()
        .checked_sub(TAG_LEN)
        .ok_or(CipherError::Truncated)?;
    let (body, tag) = sealed.split_at(body_len);

    let cipher = build_cipher(key)?;
    let mut buffer = body.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv.as_bytes()),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CipherError::AeadFailure)?;
    Ok(buffer)
}

fn build_cipher(key: &SessionKey) -> Result<Aes128Gcm, CipherError> {
    Aes128Gcm::new_from_slice(key.as_bytes()).map_err(|_| CipherError::InvalidKeyLength(KEY_LEN))
}
