//! S3 storage backend implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream as SdkByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use serde_json::Value;

use omnistore_common::{Error, Result};

use crate::endpoint::resolve_endpoint;
use crate::object::Object;
use crate::path::{normalize_key, require_key, Addressing};
use crate::provider::{reader_stream, Body, ByteStream, Storage};
use crate::url_policy::{UrlPolicy, UrlSigner};

use super::config::S3Config;

/// Keys per `DeleteObjects` request; the S3 API maximum.
const DELETE_BATCH_SIZE: usize = 1000;

/// S3 storage backend.
///
/// Implements the Storage trait on top of the AWS SDK client. All settings
/// are resolved at construction and never change afterwards.
pub struct S3Backend {
    client: Client,
    bucket: String,
    addressing: Addressing,
    endpoint: String,
    acl: ObjectCannedAcl,
    cache_control: Option<String>,
    url_policy: UrlPolicy,
    has_credentials: bool,
    temp_dir: PathBuf,
    handle: Weak<dyn Storage>,
}

impl S3Backend {
    /// Create a backend using credentials from the config or environment.
    ///
    /// # Errors
    /// - Missing bucket or region
    /// - Invalid URL window
    pub fn new(config: S3Config) -> Result<Arc<Self>> {
        let credentials = config.credentials();
        Self::with_credentials(config, credentials)
    }

    /// Create a backend with explicit credentials.
    ///
    /// The client is built without a credentials provider when `credentials`
    /// is `None`. Every request then fails when the SDK tries to sign it, and
    /// private URLs fail with `Signing`. Only configuration and endpoint
    /// queries work in that state.
    pub fn with_credentials(config: S3Config, credentials: Option<Credentials>) -> Result<Arc<Self>> {
        config.validate()?;

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);
        if let Some(url) = config.api_endpoint_url() {
            builder = builder.endpoint_url(url);
        }
        let has_credentials = credentials.is_some();
        if let Some(credentials) = credentials {
            builder = builder.credentials_provider(credentials);
        }

        Self::from_parts(config, Client::from_conf(builder.build()), has_credentials)
    }

    /// Create a backend around an SDK client built by the caller.
    ///
    /// The client decides region, credentials and transport; `config` still
    /// supplies bucket, addressing, endpoint, ACL and URL policy.
    pub fn with_client(config: S3Config, client: Client) -> Result<Arc<Self>> {
        config.validate()?;
        let has_credentials = client.config().credentials_provider().is_some();
        Self::from_parts(config, client, has_credentials)
    }

    fn from_parts(config: S3Config, client: Client, has_credentials: bool) -> Result<Arc<Self>> {
        let endpoint = resolve_endpoint(config.endpoint.as_deref(), || config.default_endpoint());
        let url_policy = config.url_policy();
        let addressing = config.addressing();
        let temp_dir = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = %endpoint,
            "Configured S3 backend"
        );

        Ok(Arc::new_cyclic(|me: &Weak<S3Backend>| Self {
            client,
            bucket: config.bucket,
            addressing,
            endpoint,
            acl: ObjectCannedAcl::from(config.acl.as_str()),
            cache_control: config.cache_control,
            url_policy,
            has_credentials,
            temp_dir,
            handle: me.clone() as Weak<dyn Storage>,
        }))
    }

    /// Bucket this backend writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object(&self, key: impl Into<String>) -> Object {
        Object::new(key, self.handle.clone())
    }
}

/// Map an SDK failure, turning missing keys into `NotFound`.
fn map_sdk_error<E, R>(operation: &str, key: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let missing = matches!(
        err.as_service_error().and_then(|e| e.code()),
        Some("NoSuchKey") | Some("NotFound")
    );
    if missing {
        return Error::NotFound(format!("Object not found: {}", key));
    }
    Error::Backend(format!(
        "S3 {} failed for '{}': {}",
        operation,
        key,
        DisplayErrorContext(&err)
    ))
}

fn to_utc(timestamp: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

#[async_trait]
impl UrlSigner for S3Backend {
    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String> {
        if !self.has_credentials {
            return Err(Error::Signing(
                "S3 backend has no credentials to presign with".to_string(),
            ));
        }

        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| Error::Signing(format!("Invalid presigning window: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| Error::Signing(format!("Failed to presign {}: {}", key, DisplayErrorContext(&e))))?;

        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl Storage for S3Backend {
    fn name(&self) -> &str {
        "s3"
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

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", &key, e))?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Opened S3 object stream");
        Ok(reader_stream(response.body.into_async_read()))
    }

    async fn put(&self, path: &str, body: Body<'_>) -> Result<Object> {
        let key = self.to_key(path);
        require_key(&key, "put")?;

        let data = body.into_bytes().await?;
        let size = data.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_length(size as i64)
            .acl(self.acl.clone())
            .body(SdkByteStream::from(data));
        if let Some(cache_control) = &self.cache_control {
            request = request.cache_control(cache_control);
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObject", &key, e))?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes = size, "Uploaded S3 object");
        Ok(self
            .object(key)
            .with_size(size)
            .with_last_modified(Some(Utc::now())))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.to_key(path);
        require_key(&key, "delete")?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteObject", &key, e))?;
        Ok(())
    }

    async fn delete_many(&self, paths: &[String]) -> Result<()> {
        let keys = paths
            .iter()
            .map(|path| {
                let key = self.to_key(path);
                require_key(&key, "delete")?;
                Ok(key)
            })
            .collect::<Result<Vec<String>>>()?;

        let mut failed = Vec::new();
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::InvalidInput(format!("Invalid delete request: {}", e)))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| Error::InvalidInput(format!("Invalid delete request: {}", e)))?;

            let output = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_sdk_error("DeleteObjects", &chunk.join(", "), e))?;

            failed.extend(output.errors().iter().map(|e| {
                format!(
                    "{}: {}",
                    e.key().unwrap_or("<unknown>"),
                    e.message().unwrap_or("unknown error")
                )
            }));
        }

        if failed.is_empty() {
            return Ok(());
        }

        tracing::warn!(bucket = %self.bucket, failed = failed.len(), "Batch delete incomplete");
        Err(Error::Backend(format!(
            "Failed to delete {} of {} objects: {}",
            failed.len(),
            keys.len(),
            failed.join("; ")
        )))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Object>> {
        let prefix = self.to_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                request = request.prefix(&prefix);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| map_sdk_error("ListObjectsV2", &prefix, e))?;

            for entry in response.contents() {
                let Some(key) = entry.key() else {
                    continue;
                };
                results.push(
                    self.object(key)
                        .with_size(entry.size().unwrap_or(0).max(0) as u64)
                        .with_last_modified(entry.last_modified().and_then(to_utc)),
                );
            }

            // Drain every page before returning.
            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        tracing::debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = results.len(),
            "Listed S3 objects"
        );
        Ok(results)
    }

    async fn get_url(&self, path: &str) -> Result<String> {
        let key = self.to_key(path);
        require_key(&key, "get_url")?;
        self.url_policy.url_for(&key, self).await
    }
}

/// Create an S3 backend from a JSON configuration value.
pub fn create_s3_backend(config: Value) -> Result<Arc<dyn Storage>> {
    let config: S3Config = serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("Invalid S3 config: {}", e)))?;
    let backend: Arc<dyn Storage> = S3Backend::new(config)?;
    Ok(backend)
}
