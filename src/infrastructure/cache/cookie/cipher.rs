//! Cookie payload encryption hooks

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::DomainError;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric transformation applied to cookie payloads
pub trait CookieCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, DomainError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, DomainError>;
}

/// Tamper-evident cookie encoding: base64url payload plus an HMAC-SHA256 tag.
///
/// Integrity only. The payload is readable by anyone holding the cookie.
#[derive(Clone)]
pub struct HmacCookieSigner {
    secret: Vec<u8>,
}

impl HmacCookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, DomainError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| DomainError::configuration(format!("Invalid cookie secret: {}", e)))
    }
}

impl std::fmt::Debug for HmacCookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacCookieSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl CookieCipher for HmacCookieSigner {
    fn encrypt(&self, plaintext: &str) -> Result<String, DomainError> {
        let payload = URL_SAFE_NO_PAD.encode(plaintext);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let tag = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, tag))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, DomainError> {
        let (payload, tag) = ciphertext
            .rsplit_once('.')
            .ok_or_else(|| DomainError::validation("Cookie value is not signed"))?;

        let tag = hex::decode(tag)
            .map_err(|e| DomainError::validation(format!("Malformed cookie signature: {}", e)))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| DomainError::validation("Cookie signature mismatch"))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| DomainError::validation(format!("Malformed cookie payload: {}", e)))?;

        String::from_utf8(bytes)
            .map_err(|e| DomainError::validation(format!("Cookie payload is not UTF-8: {}", e)))
    }
}
