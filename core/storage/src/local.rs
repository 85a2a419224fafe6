//! Local filesystem storage backend.
//!
//! Objects are plain files under a root directory; key prefixes map onto
//! subdirectories. Uploads are written into a hidden staging directory
//! under the root and renamed into place once complete, so readers never
//! observe a partial file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use omnistore_common::{Error, Result};

use crate::endpoint::resolve_endpoint;
use crate::object::Object;
use crate::path::{normalize_key, require_key, Addressing};
use crate::provider::{reader_stream, Body, ByteStream, Storage};
use crate::signing::KeyedSigner;
use crate::url_policy::{UrlPolicy, UrlSigner};

/// Directory under the root holding in-flight uploads.
pub const STAGING_DIR: &str = ".omnistore-staging";

/// Local backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root directory of the store.
    pub root: PathBuf,
    /// Endpoint override; defaults to `/`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access mode and signed URL window.
    #[serde(default, flatten)]
    pub url_policy: UrlPolicy,
    /// Secret for signed URLs.
    #[serde(default)]
    pub secret: Option<String>,
    /// Directory for `get` temporary files.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl LocalConfig {
    /// Public store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            endpoint: None,
            url_policy: UrlPolicy::default(),
            secret: None,
            temp_dir: None,
        }
    }
}

/// Local filesystem storage backend.
pub struct LocalBackend {
    root: PathBuf,
    endpoint: String,
    url_policy: UrlPolicy,
    signer: Option<KeyedSigner>,
    temp_dir: PathBuf,
    handle: Weak<dyn Storage>,
}

impl LocalBackend {
    /// Create a new local backend.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Root cannot be created or resolved
    /// - Invalid URL window or signing secret
    pub fn new(config: LocalConfig) -> Result<Arc<Self>> {
        config.url_policy.validate()?;

        if !config.root.exists() {
            std::fs::create_dir_all(&config.root)?;
        }
        let root = std::fs::canonicalize(&config.root)?;

        let endpoint = resolve_endpoint(config.endpoint.as_deref(), || "/".to_string());
        let signed_base = if endpoint.starts_with('/') {
            endpoint.clone()
        } else {
            format!("https://{}", endpoint)
        };
        let signer = config
            .secret
            .as_deref()
            .map(|secret| KeyedSigner::new(secret, signed_base))
            .transpose()?;

        let temp_dir = config.temp_dir.unwrap_or_else(std::env::temp_dir);

        tracing::info!(root = %root.display(), "Opened local store");

        Ok(Arc::new_cyclic(|me: &Weak<LocalBackend>| Self {
            root,
            endpoint,
            url_policy: config.url_policy,
            signer,
            temp_dir,
            handle: me.clone() as Weak<dyn Storage>,
        }))
    }

    /// Resolved root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Signer backing private URLs, for whatever serves them.
    pub fn signer(&self) -> Option<&KeyedSigner> {
        self.signer.as_ref()
    }

    /// Map a canonical key onto a path under the root.
    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        let mut fs_path = self.root.clone();
        for (index, component) in key.split('/').filter(|c| !c.is_empty()).enumerate() {
            if component == "." || component == ".." {
                return Err(Error::InvalidInput(format!(
                    "Key may not contain relative components: {}",
                    key
                )));
            }
            if index == 0 && component == STAGING_DIR {
                return Err(Error::InvalidInput(format!("Key is reserved: {}", key)));
            }
            fs_path.push(component);
        }
        Ok(fs_path)
    }

    fn object(&self, key: String, fs_meta: &std::fs::Metadata) -> Object {
        let modified: Option<DateTime<Utc>> = fs_meta.modified().ok().map(DateTime::from);
        Object::new(key, self.handle.clone())
            .with_size(fs_meta.len())
            .with_last_modified(modified)
    }

    /// Write `body` to `staged`, returning the byte count.
    async fn write_staged(&self, staged: &Path, body: Body<'_>) -> Result<u64> {
        let mut reader = body.into_reader().await?;
        let mut file = fs::File::create(staged).await?;

        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to write upload: {}", e)))?;
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}

#[async_trait]
impl UrlSigner for LocalBackend {
    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.signer
            .as_ref()
            .ok_or_else(|| Error::Signing("Local backend has no signing secret".to_string()))?
            .sign(key, expires_in)
    }
}

#[async_trait]
impl Storage for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    /// Absolute filesystem paths under the root are accepted as well.
    fn to_key(&self, path: &str) -> String {
        let root = self.root.to_string_lossy();
        let path = match path.strip_prefix(root.as_ref()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };
        normalize_key(path, &Addressing::VirtualHosted)
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
        let fs_path = self.to_fs_path(&key)?;

        let file = fs::File::open(&fs_path)
            .await
            .map_err(|e| Error::from_io(e, format!("File not found: {}", key)))?;

        if file.metadata().await?.is_dir() {
            return Err(Error::NotFound(format!("{} is a directory", key)));
        }

        Ok(reader_stream(file))
    }

    async fn put(&self, path: &str, body: Body<'_>) -> Result<Object> {
        let key = self.to_key(path);
        require_key(&key, "put")?;
        let fs_path = self.to_fs_path(&key)?;

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging_dir = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir).await?;
        let staged = staging_dir.join(format!("{}.part", Uuid::new_v4()));

        let written = match self.write_staged(&staged, body).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staged, &fs_path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(Error::Io(e));
        }

        tracing::debug!(key = %key, bytes = written, "Stored object on local filesystem");

        let fs_meta = fs::metadata(&fs_path).await?;
        Ok(self.object(key, &fs_meta))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.to_key(path);
        require_key(&key, "delete")?;
        let fs_path = self.to_fs_path(&key)?;

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Object>> {
        let prefix = self.to_key(prefix);

        // Only the directory holding the prefix's last segment can match.
        let base_key = match prefix.rfind('/') {
            Some(index) => &prefix[..index],
            None => "",
        };
        let base = self.to_fs_path(base_key)?;
        let base_rel = if base_key.is_empty() {
            String::new()
        } else {
            format!("{}/", base_key)
        };

        let mut results = Vec::new();
        let mut pending = vec![(base, base_rel)];

        while let Some((dir, rel)) = pending.pop() {
            match fs::metadata(&dir).await {
                Ok(dir_meta) if dir_meta.is_dir() => {}
                _ => continue,
            }
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(String::from) else {
                    continue;
                };
                if rel.is_empty() && name == STAGING_DIR {
                    continue;
                }

                let key = format!("{}{}", rel, name);
                if entry.file_type().await?.is_dir() {
                    let dir_key = format!("{}/", key);
                    if dir_key.starts_with(&prefix) || prefix.starts_with(&dir_key) {
                        pending.push((entry.path(), dir_key));
                    }
                    continue;
                }

                if !key.starts_with(&prefix) {
                    continue;
                }
                // Follows symlinks; dangling links are skipped.
                if let Ok(fs_meta) = fs::metadata(entry.path()).await {
                    if fs_meta.is_file() {
                        results.push(self.object(key, &fs_meta));
                    }
                }
            }
        }

        Ok(results)
    }

    async fn get_url(&self, path: &str) -> Result<String> {
        let key = self.to_key(path);
        require_key(&key, "get_url")?;
        self.url_policy.url_for(&key, self).await
    }
}
