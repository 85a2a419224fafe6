//! Keyed URL signing for backends that act as their own vendor.
//!
//! The local and memory backends have no cloud service to presign against,
//! so they sign `key` + expiry with a BLAKE2b MAC under the backend's
//! secret. Whatever serves those URLs calls [`KeyedSigner::verify_url`] to
//! enforce the signature and the expiry.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;
use zeroize::Zeroizing;

use omnistore_common::{Error, Result};

type Blake2bMac256 = Blake2bMac<U32>;

/// Longest secret BLAKE2b accepts as a key.
pub const MAX_SECRET_LEN: usize = 64;

/// Query parameter carrying the unix expiry.
pub const EXPIRES_PARAM: &str = "expires";
/// Query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "signature";

/// Characters escaped in the key part of a signed URL; `/` is kept.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Signs canonical keys with a shared secret.
pub struct KeyedSigner {
    secret: Zeroizing<Vec<u8>>,
    base: String,
}

impl std::fmt::Debug for KeyedSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedSigner")
            .field("secret", &"[REDACTED]")
            .field("base", &self.base)
            .finish()
    }
}

impl KeyedSigner {
    /// Create a signer for URLs rooted at `base`.
    ///
    /// `base` is prepended verbatim, so `"/"` yields host-relative URLs and
    /// `"https://files.example.com"` yields absolute ones.
    ///
    /// # Errors
    /// - Secret is empty or longer than [`MAX_SECRET_LEN`] bytes
    pub fn new(secret: impl AsRef<[u8]>, base: impl Into<String>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
            return Err(Error::Config(format!(
                "signing secret must be 1 to {} bytes, got {}",
                MAX_SECRET_LEN,
                secret.len()
            )));
        }

        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Sign `key` so it stays valid for `expires_in` from now.
    pub fn sign(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.sign_at(key, expires_in, Utc::now())
    }

    /// Sign `key` relative to an explicit clock reading.
    pub fn sign_at(&self, key: &str, expires_in: Duration, now: DateTime<Utc>) -> Result<String> {
        let window = chrono::Duration::from_std(expires_in)
            .map_err(|e| Error::Signing(format!("Invalid expiry window: {}", e)))?;
        let expires = (now + window).timestamp();
        let signature = URL_SAFE_NO_PAD.encode(self.mac(key, expires)?.finalize().into_bytes());

        Ok(format!(
            "{}/{}?{}={}&{}={}",
            self.base,
            utf8_percent_encode(key, KEY_ENCODE_SET),
            EXPIRES_PARAM,
            expires,
            SIGNATURE_PARAM,
            signature
        ))
    }

    /// Check a signature for `key` and `expires` at time `now`.
    ///
    /// # Errors
    /// - `Signing` when the URL has expired or the signature does not match
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> Result<()> {
        if now.timestamp() >= expires {
            return Err(Error::Signing(format!("URL for {} has expired", key)));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::Signing("Malformed signature".to_string()))?;

        self.mac(key, expires)?
            .verify_slice(&signature)
            .map_err(|_| Error::Signing(format!("Signature mismatch for {}", key)))
    }

    /// Verify a URL produced by [`KeyedSigner::sign`] and return its key.
    pub fn verify_url(&self, signed: &str, now: DateTime<Utc>) -> Result<String> {
        let url = Url::parse(signed)
            .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(signed)))
            .map_err(|e| Error::Signing(format!("Unparseable signed URL: {}", e)))?;

        let mut expires = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                EXPIRES_PARAM => expires = value.parse::<i64>().ok(),
                SIGNATURE_PARAM => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let expires =
            expires.ok_or_else(|| Error::Signing("Missing expiry parameter".to_string()))?;
        let signature =
            signature.ok_or_else(|| Error::Signing("Missing signature parameter".to_string()))?;

        let path = percent_decode_str(url.path()).decode_utf8_lossy();
        let base_path = Url::parse(&self.base)
            .map(|base| base.path().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| self.base.clone());
        let key = path
            .strip_prefix(base_path.as_str())
            .unwrap_or(&path)
            .trim_start_matches('/')
            .to_string();

        self.verify(&key, expires, &signature, now)?;
        Ok(key)
    }

    fn mac(&self, key: &str, expires: i64) -> Result<Blake2bMac256> {
        let mut mac = <Blake2bMac256 as Mac>::new_from_slice(&self.secret)
            .map_err(|e| Error::Signing(format!("Invalid signing key: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> KeyedSigner {
        KeyedSigner::new(b"0123456789abcdef", "https://files.example.com").unwrap()
    }

    #[test]
    fn test_secret_length_checked() {
        assert!(KeyedSigner::new(b"", "/").is_err());
        assert!(KeyedSigner::new([7u8; MAX_SECRET_LEN + 1], "/").is_err());
        assert!(KeyedSigner::new([7u8; MAX_SECRET_LEN], "/").is_ok());
    }

    #[test]
    fn test_sign_embeds_expiry() {
        let now = Utc::now();
        let url = signer()
            .sign_at("dir/a.txt", Duration::from_secs(3600), now)
            .unwrap();

        assert!(url.starts_with("https://files.example.com/dir/a.txt?"));
        let expected = format!("{}={}", EXPIRES_PARAM, now.timestamp() + 3600);
        assert!(url.contains(&expected));
        assert!(url.contains(&format!("{}=", SIGNATURE_PARAM)));
    }

    #[test]
    fn test_verify_round_trip() {
        let now = Utc::now();
        let signer = signer();
        let url = signer
            .sign_at("dir/my file.txt", Duration::from_secs(60), now)
            .unwrap();

        let key = signer.verify_url(&url, now).unwrap();
        assert_eq!(key, "dir/my file.txt");
    }

    #[test]
    fn test_verify_rejects_expired() {
        let now = Utc::now();
        let signer = signer();
        let url = signer.sign_at("a.txt", Duration::from_secs(60), now).unwrap();

        let later = now + chrono::Duration::seconds(61);
        assert!(matches!(signer.verify_url(&url, later), Err(Error::Signing(_))));
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let now = Utc::now();
        let url = signer().sign_at("a.txt", Duration::from_secs(60), now).unwrap();

        let other = KeyedSigner::new(b"another-secret", "https://files.example.com").unwrap();
        assert!(other.verify_url(&url, now).is_err());
    }

    #[test]
    fn test_verify_rejects_tampered_key() {
        let now = Utc::now();
        let signer = signer();
        let url = signer.sign_at("a.txt", Duration::from_secs(60), now).unwrap();

        let tampered = url.replace("/a.txt?", "/b.txt?");
        assert!(signer.verify_url(&tampered, now).is_err());
    }

    #[test]
    fn test_relative_base() {
        let now = Utc::now();
        let signer = KeyedSigner::new(b"secret", "/").unwrap();
        let url = signer.sign_at("a/b.txt", Duration::from_secs(60), now).unwrap();

        assert!(url.starts_with("/a/b.txt?"));
        assert_eq!(signer.verify_url(&url, now).unwrap(), "a/b.txt");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0123456789abcdef"));
    }
}
