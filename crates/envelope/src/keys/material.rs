//! [`PrivateKeyMaterial`]: PEM bytes, passphrase, and format tag as supplied by
//! configuration, plus the eager parser that turns them into an RSA key.

use common::FlowError;
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::DecodePrivateKey,
    RsaPrivateKey,
};
use serde::Deserialize;

/// PEM label of an unencrypted PKCS#1 private key.
pub const PKCS1_LABEL: &str = "RSA PRIVATE KEY";

/// PEM label of a PKCS#8 `EncryptedPrivateKeyInfo`.
pub const ENCRYPTED_PKCS8_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Encoding of the private key PEM. The two formats are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// Plain PKCS#1 `RSA PRIVATE KEY`; any passphrase is ignored.
    Pkcs1,
    /// PKCS#8 `ENCRYPTED PRIVATE KEY`; a passphrase is required.
    EncryptedPkcs8,
}

impl KeyFormat {
    /// Detect the format from the first PEM `BEGIN` label.
    ///
    /// Returns `None` for labels that neither format accepts.
    pub fn detect(pem: &str) -> Option<Self> {
        match pem_label(pem)? {
            PKCS1_LABEL => Some(KeyFormat::Pkcs1),
            ENCRYPTED_PKCS8_LABEL => Some(KeyFormat::EncryptedPkcs8),
            _ => None,
        }
    }

    /// The PEM label this format is written under.
    pub fn label(&self) -> &'static str {
        match self {
            KeyFormat::Pkcs1 => PKCS1_LABEL,
            KeyFormat::EncryptedPkcs8 => ENCRYPTED_PKCS8_LABEL,
        }
    }
}

impl std::str::FromStr for KeyFormat {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pkcs1" => Ok(KeyFormat::Pkcs1),
            "encrypted_pkcs8" | "pkcs8_encrypted" => Ok(KeyFormat::EncryptedPkcs8),
            other => Err(FlowError::Configuration(format!(
                "unknown private key format `{other}`"
            ))),
        }
    }
}

/// The server's private key as handed over by the configuration layer.
#[derive(Clone)]
pub struct PrivateKeyMaterial {
    pem: String,
    passphrase: Option<String>,
    format: KeyFormat,
}

impl PrivateKeyMaterial {
    /// Material with an explicit format tag.
    ///
    /// An empty passphrase is treated as no passphrase.
    pub fn new(pem: impl Into<String>, passphrase: Option<String>, format: KeyFormat) -> Self {
        Self {
            pem: pem.into(),
            passphrase: passphrase.filter(|p| !p.is_empty()),
            format,
        }
    }

    /// Material whose format is detected from the PEM label.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if the label is not one of the two
    /// supported formats.
    pub fn detect(pem: impl Into<String>, passphrase: Option<String>) -> Result<Self, FlowError> {
        let pem = pem.into();
        let format = KeyFormat::detect(&pem).ok_or_else(|| {
            FlowError::Configuration(format!(
                "private key PEM must be `{PKCS1_LABEL}` or `{ENCRYPTED_PKCS8_LABEL}`"
            ))
        })?;
        Ok(Self::new(pem, passphrase, format))
    }

    /// The declared format.
    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// The PEM text.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Parse and validate the RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] when the declared format does not
    /// match the PEM label, the PEM does not parse, an encrypted key has no
    /// passphrase or the wrong one, or the key fails RSA consistency checks.
    pub fn parse(&self) -> Result<RsaPrivateKey, FlowError> {
        let label = pem_label(&self.pem)
            .ok_or_else(|| FlowError::Configuration("private key is not PEM encoded".into()))?;
        if label != self.format.label() {
            return Err(FlowError::Configuration(format!(
                "private key format is {:?} but the PEM is labelled `{label}`",
                self.format
            )));
        }

        let key = match self.format {
            KeyFormat::Pkcs1 => RsaPrivateKey::from_pkcs1_pem(&self.pem)
                .map_err(|e| FlowError::Configuration(format!("invalid PKCS#1 private key: {e}")))?,
            KeyFormat::EncryptedPkcs8 => {
                let passphrase = self.passphrase.as_deref().ok_or_else(|| {
                    FlowError::Configuration("encrypted private key requires a passphrase".into())
                })?;
                RsaPrivateKey::from_pkcs8_encrypted_pem(&self.pem, passphrase.as_bytes())
                    .map_err(|_| {
                        FlowError::Configuration(
                            "could not decrypt private key: wrong passphrase or corrupt PEM".into(),
                        )
                    })?
            }
        };

        key.validate()
            .map_err(|e| FlowError::Configuration(format!("inconsistent RSA private key: {e}")))?;
        Ok(key)
    }
}

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("format", &self.format)
            .field("pem", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Label of the first `-----BEGIN <label>-----` line.
fn pem_label(pem: &str) -> Option<&str> {
    pem.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))
}
