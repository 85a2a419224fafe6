//! In-memory storage backend for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use omnistore_common::{Error, Result};

use crate::endpoint::{bucket_host, resolve_endpoint};
use crate::object::Object;
use crate::path::{normalize_key, require_key, Addressing};
use crate::provider::{Body, ByteStream, Storage};
use crate::signing::KeyedSigner;
use crate::url_policy::{UrlPolicy, UrlSigner};

/// Host the memory backend pretends to live on.
pub const MEMORY_DEFAULT_HOST: &str = "memory.localhost";

/// Memory backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bucket name used in the default endpoint.
    pub bucket: String,
    /// Endpoint override.
    pub endpoint: Option<String>,
    /// Put the bucket in the URL path instead of the host.
    pub path_style: bool,
    /// Access mode and signed URL window.
    #[serde(flatten)]
    pub url_policy: UrlPolicy,
    /// Secret for signed URLs.
    pub secret: Option<String>,
    /// Directory for `get` temporary files.
    pub temp_dir: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            bucket: "memory".to_string(),
            endpoint: None,
            path_style: false,
            url_policy: UrlPolicy::default(),
            secret: None,
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory storage backend.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Entry>>,
    addressing: Addressing,
    endpoint: String,
    url_policy: UrlPolicy,
    signer: Option<KeyedSigner>,
    temp_dir: PathBuf,
    handle: Weak<dyn Storage>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    ///
    /// # Errors
    /// - Invalid URL window or signing secret
    pub fn new(config: MemoryConfig) -> Result<Arc<Self>> {
        config.url_policy.validate()?;

        let addressing = if config.path_style {
            Addressing::path_style(config.bucket.clone())
        } else {
            Addressing::VirtualHosted
        };

        let endpoint = resolve_endpoint(config.endpoint.as_deref(), || {
            if config.path_style {
                MEMORY_DEFAULT_HOST.to_string()
            } else {
                bucket_host(&config.bucket, MEMORY_DEFAULT_HOST)
            }
        });

        let signed_base = if config.path_style {
            format!("https://{}/{}", endpoint, config.bucket)
        } else {
            format!("https://{}", endpoint)
        };
        let signer = config
            .secret
            .as_deref()
            .map(|secret| KeyedSigner::new(secret, signed_base))
            .transpose()?;

        let temp_dir = config.temp_dir.unwrap_or_else(std::env::temp_dir);

        Ok(Arc::new_cyclic(|me: &Weak<MemoryBackend>| Self {
            objects: RwLock::new(HashMap::new()),
            addressing,
            endpoint,
            url_policy: config.url_policy,
            signer,
            temp_dir,
            handle: me.clone() as Weak<dyn Storage>,
        }))
    }

    /// Signer backing private URLs, for whatever serves them.
    pub fn signer(&self) -> Option<&KeyedSigner> {
        self.signer.as_ref()
    }

    fn object(&self, key: &str, entry: &Entry) -> Object {
        Object::new(key, self.handle.clone())
            .with_size(entry.data.len() as u64)
            .with_last_modified(Some(entry.last_modified))
    }
}

#[async_trait]
impl UrlSigner for MemoryBackend {
    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.signer
            .as_ref()
            .ok_or_else(|| Error::Signing("Memory backend has no signing secret".to_string()))?
            .sign(key, expires_in)
    }
}

#[async_trait]
impl Storage for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn to_key(&self, path: &str) -> String {
        normalize_key(path, &self.addressing)
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_stream(&self, path: &str) -> Result<ByteStream> {
        let key = self.to_key(path);
        require_key(&key, "get")?;

        let data = self
            .objects
            .read()
            .await
            .get(&key)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", key)))?;

        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn put(&self, path: &str, body: Body<'_>) -> Result<Object> {
        let key = self.to_key(path);
        require_key(&key, "put")?;

        // Read fully before touching the map so a failed read stores nothing.
        let data = body.into_bytes().await?;
        let entry = Entry {
            data,
            last_modified: Utc::now(),
        };
        let object = self.object(&key, &entry);

        tracing::debug!(key = %key, bytes = entry.data.len(), "Stored object in memory");
        self.objects.write().await.insert(key, entry);

        Ok(object)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.to_key(path);
        require_key(&key, "delete")?;

        self.objects.write().await.remove(&key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Object>> {
        let prefix = self.to_key(prefix);
        let objects = self.objects.read().await;

        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, entry)| self.object(key, entry))
            .collect())
    }

    async fn get_url(&self, path: &str) -> Result<String> {
        let key = self.to_key(path);
        require_key(&key, "get_url")?;
        self.url_policy.url_for(&key, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::url_policy::AccessMode;

    fn backend() -> Arc<MemoryBackend> {
        MemoryBackend::new(MemoryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_conformance() {
        conformance::run_all(backend()).await;
    }

    #[tokio::test]
    async fn test_conformance_path_style() {
        let storage = MemoryBackend::new(MemoryConfig {
            path_style: true,
            ..MemoryConfig::default()
        })
        .unwrap();
        conformance::run_all(storage).await;
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(backend().endpoint(), "memory.memory.localhost");

        let storage = MemoryBackend::new(MemoryConfig {
            path_style: true,
            ..MemoryConfig::default()
        })
        .unwrap();
        assert_eq!(storage.endpoint(), MEMORY_DEFAULT_HOST);
    }

    #[test]
    fn test_endpoint_override() {
        let storage = MemoryBackend::new(MemoryConfig {
            endpoint: Some("cdn.example.com".to_string()),
            ..MemoryConfig::default()
        })
        .unwrap();
        assert_eq!(storage.endpoint(), "cdn.example.com");
    }

    #[tokio::test]
    async fn test_path_style_url_input() {
        let storage = MemoryBackend::new(MemoryConfig {
            bucket: "media".to_string(),
            path_style: true,
            ..MemoryConfig::default()
        })
        .unwrap();

        storage.put("a/b.txt", "x".into()).await.unwrap();
        let url = format!("https://{}/media/a/b.txt", storage.endpoint());
        assert_eq!(storage.to_key(&url), "a/b.txt");
        assert!(storage.get(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_put_reports_size_and_time() {
        let storage = backend();
        let before = Utc::now();
        let object = storage.put("/dir/file.bin", vec![1u8, 2, 3].into()).await.unwrap();

        assert_eq!(object.path(), "dir/file.bin");
        assert_eq!(object.size(), 3);
        assert!(object.last_modified().unwrap() >= before);
    }

    #[tokio::test]
    async fn test_private_url_is_signed() {
        let storage = MemoryBackend::new(MemoryConfig {
            url_policy: UrlPolicy::private(),
            secret: Some("test-secret".to_string()),
            ..MemoryConfig::default()
        })
        .unwrap();

        conformance::private_url(&*storage, Duration::from_secs(3600)).await;

        let url = storage.get_url("a.txt").await.unwrap();
        let key = storage.signer().unwrap().verify_url(&url, Utc::now()).unwrap();
        assert_eq!(key, "a.txt");
    }

    #[tokio::test]
    async fn test_private_url_with_scheme_in_endpoint() {
        let storage = MemoryBackend::new(MemoryConfig {
            endpoint: Some("https://cdn.example.com/".to_string()),
            url_policy: UrlPolicy::private(),
            secret: Some("test-secret".to_string()),
            ..MemoryConfig::default()
        })
        .unwrap();
        assert_eq!(storage.endpoint(), "cdn.example.com");

        let url = storage.get_url("https://cdn.example.com/a.txt").await.unwrap();
        assert!(url.starts_with("https://cdn.example.com/a.txt?"), "{}", url);
        let key = storage.signer().unwrap().verify_url(&url, Utc::now()).unwrap();
        assert_eq!(key, "a.txt");
    }

    #[tokio::test]
    async fn test_private_url_without_secret() {
        let storage = MemoryBackend::new(MemoryConfig {
            url_policy: UrlPolicy::private(),
            ..MemoryConfig::default()
        })
        .unwrap();

        let err = storage.get_url("a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_config_deserialize() {
        let config: MemoryConfig = serde_json::from_value(serde_json::json!({
            "bucket": "media",
            "access": "private",
            "expiry_secs": 600,
            "secret": "s3cr3t"
        }))
        .unwrap();

        assert_eq!(config.bucket, "media");
        assert_eq!(config.url_policy.access, AccessMode::Private);
        assert_eq!(config.url_policy.expiry_secs, 600);
        assert!(!config.path_style);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let result = MemoryBackend::new(MemoryConfig {
            url_policy: UrlPolicy::private().with_expiry(Duration::ZERO),
            ..MemoryConfig::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
