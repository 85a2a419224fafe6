//! S3 backend configuration.

use std::path::PathBuf;

use aws_sdk_s3::config::Credentials;
use serde::{Deserialize, Serialize};

use omnistore_common::{Error, Result};

use crate::endpoint::{bucket_host, strip_scheme};
use crate::path::Addressing;
use crate::url_policy::{AccessMode, UrlPolicy, DEFAULT_URL_EXPIRY_SECS};

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_acl() -> String {
    "public-read".to_string()
}

fn default_url_expiry_secs() -> u64 {
    DEFAULT_URL_EXPIRY_SECS
}

/// S3 backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket holding the objects.
    pub bucket: String,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key; falls back to `AWS_ACCESS_KEY_ID`.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret key; falls back to `AWS_SECRET_ACCESS_KEY`.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Session token; falls back to `AWS_SESSION_TOKEN`.
    #[serde(default)]
    pub session_token: Option<String>,
    /// API endpoint of an S3-compatible service.
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    /// Address the bucket as the first path segment.
    #[serde(default)]
    pub force_path_style: bool,
    /// Public endpoint override (CDN or mirror host).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Canned ACL applied to uploads; decides public vs private URLs.
    #[serde(default = "default_acl")]
    pub acl: String,
    /// `Cache-Control` header applied to uploads.
    #[serde(default)]
    pub cache_control: Option<String>,
    /// Validity of presigned URLs in seconds.
    #[serde(default = "default_url_expiry_secs")]
    pub url_expiry_secs: u64,
    /// Directory for `get` temporary files.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl S3Config {
    /// Configuration for `bucket` with defaults everywhere else.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            s3_endpoint: None,
            force_path_style: false,
            endpoint: None,
            acl: default_acl(),
            cache_control: None,
            url_expiry_secs: default_url_expiry_secs(),
            temp_dir: None,
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::Config("S3 backend requires a bucket".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(Error::Config("S3 backend requires a region".to_string()));
        }
        self.url_policy().validate()
    }

    /// URL policy derived from the canned ACL.
    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            access: AccessMode::from_acl(&self.acl),
            expiry_secs: self.url_expiry_secs,
        }
    }

    /// Addressing mode matching `force_path_style`.
    pub fn addressing(&self) -> Addressing {
        if self.force_path_style {
            Addressing::path_style(self.bucket.clone())
        } else {
            Addressing::VirtualHosted
        }
    }

    /// API endpoint URL with a scheme, when a custom one is configured.
    pub fn api_endpoint_url(&self) -> Option<String> {
        self.s3_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| {
                if url.starts_with("http://") || url.starts_with("https://") {
                    url.to_string()
                } else {
                    format!("https://{}", url)
                }
            })
    }

    /// Host the SDK talks to, without scheme.
    pub fn api_host(&self) -> String {
        match self.api_endpoint_url() {
            Some(url) => strip_scheme(&url).trim_end_matches('/').to_string(),
            None => format!("s3.{}.amazonaws.com", self.region),
        }
    }

    /// Endpoint reported when no override is configured.
    pub fn default_endpoint(&self) -> String {
        if self.force_path_style {
            self.api_host()
        } else {
            bucket_host(&self.bucket, &self.api_host())
        }
    }

    /// Static credentials from the config, else from the environment.
    pub fn credentials(&self) -> Option<Credentials> {
        let access_key = self
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .filter(|key| !key.is_empty())?;
        let secret_key = self
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .filter(|key| !key.is_empty())?;
        let session_token = self
            .session_token
            .clone()
            .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok())
            .filter(|token| !token.is_empty());

        Some(Credentials::new(
            access_key,
            secret_key,
            session_token,
            None,
            "omnistore",
        ))
    }
}
