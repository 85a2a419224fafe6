//! Public vs signed URL policy for `get_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use omnistore_common::{Error, Result};

/// Default validity window of a signed URL.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 60 * 60;

/// Longest window accepted; S3 refuses presigned URLs valid for over a week.
pub const MAX_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Whether objects on a backend are reachable without a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Anyone with the endpoint can read; `get_url` returns the bare key.
    #[default]
    Public,
    /// Reads need a signature; `get_url` returns a signed, expiring URL.
    Private,
}

impl AccessMode {
    /// Map a vendor canned ACL onto an access mode.
    ///
    /// Only the `public-read*` family is public. Everything else
    /// (`private`, `authenticated-read`, `bucket-owner-*`, unknown values)
    /// needs a signature to read.
    pub fn from_acl(acl: &str) -> Self {
        match acl.trim().to_ascii_lowercase().as_str() {
            "public-read" | "public-read-write" => AccessMode::Public,
            _ => AccessMode::Private,
        }
    }
}

/// Produces signed URLs for a canonical key.
///
/// The signature and expiry are enforced by whatever serves the URL; the
/// signer never checks that the key exists.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Sign `key` for reads during the next `expires_in`.
    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Access mode plus validity window for signed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlPolicy {
    /// Public or private access.
    pub access: AccessMode,
    /// Validity of signed URLs in seconds.
    pub expiry_secs: u64,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::public()
    }
}

impl UrlPolicy {
    /// Public access.
    pub fn public() -> Self {
        Self {
            access: AccessMode::Public,
            expiry_secs: DEFAULT_URL_EXPIRY_SECS,
        }
    }

    /// Private access with the default one hour window.
    pub fn private() -> Self {
        Self {
            access: AccessMode::Private,
            expiry_secs: DEFAULT_URL_EXPIRY_SECS,
        }
    }

    /// Override the signed URL window.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry_secs = expiry.as_secs();
        self
    }

    /// Signed URL window.
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    /// Check the window is usable.
    pub fn validate(&self) -> Result<()> {
        if self.expiry_secs == 0 || self.expiry_secs > MAX_URL_EXPIRY_SECS {
            return Err(Error::Config(format!(
                "URL expiry must be between 1 and {} seconds, got {}",
                MAX_URL_EXPIRY_SECS, self.expiry_secs
            )));
        }
        Ok(())
    }

    /// Apply the policy to a canonical key.
    ///
    /// Public keys are returned unchanged; the caller decides scheme and
    /// host. Private keys go through `signer`.
    pub async fn url_for<S>(&self, key: &str, signer: &S) -> Result<String>
    where
        S: UrlSigner + ?Sized,
    {
        match self.access {
            AccessMode::Public => Ok(key.to_string()),
            AccessMode::Private => signer.sign(key, self.expiry()).await,
        }
    }
}
