//! Storage contract shared by every backend.

use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::io::{ReaderStream, StreamReader};

use omnistore_common::{Error, Result};

use crate::object::Object;
use crate::spool;

/// Byte stream type for download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Private temporary copy of an object, positioned at offset 0.
///
/// The file has no name on disk; dropping it releases the storage.
pub type LocalFile = tokio::fs::File;

/// Async reader that can also seek.
pub trait SeekableReader: AsyncRead + AsyncSeek {}

impl<T: AsyncRead + AsyncSeek + ?Sized> SeekableReader for T {}

/// Content handed to [`Storage::put`].
pub enum Body<'a> {
    /// In-memory bytes.
    Bytes(Bytes),
    /// A stream of chunks, consumed once.
    Stream(ByteStream),
    /// A reader consumed from its current position.
    Reader(Pin<Box<dyn AsyncRead + Send + 'a>>),
    /// A reader rewound to the start before uploading.
    Seekable(Pin<Box<dyn SeekableReader + Send + 'a>>),
}

impl<'a> Body<'a> {
    /// Wrap a forward-only reader.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'a,
    {
        Body::Reader(Box::pin(reader))
    }

    /// Wrap a seekable reader; it is rewound before every upload.
    ///
    /// Passing `&mut cursor` lets the same buffer be uploaded repeatedly.
    pub fn seekable<R>(reader: R) -> Self
    where
        R: AsyncRead + AsyncSeek + Send + 'a,
    {
        Body::Seekable(Box::pin(reader))
    }

    /// Turn the body into a reader positioned at the first byte to upload.
    pub async fn into_reader(self) -> Result<Pin<Box<dyn AsyncRead + Send + 'a>>> {
        match self {
            Body::Bytes(bytes) => Ok(Box::pin(std::io::Cursor::new(bytes))),
            Body::Stream(stream) => {
                let stream = stream.map(|chunk| chunk.map_err(std::io::Error::other));
                Ok(Box::pin(StreamReader::new(stream)))
            }
            Body::Reader(reader) => Ok(reader),
            Body::Seekable(mut reader) => {
                reader
                    .seek(SeekFrom::Start(0))
                    .await
                    .map_err(|e| Error::Transfer(format!("Failed to rewind upload source: {}", e)))?;
                Ok(Box::pin(reader))
            }
        }
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> Result<Bytes> {
        if let Body::Bytes(bytes) = self {
            return Ok(bytes);
        }

        let mut reader = self.into_reader().await?;
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to read upload source: {}", e)))?;
        Ok(Bytes::from(buffer))
    }
}

impl From<Bytes> for Body<'_> {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body<'_> {
    fn from(data: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Body<'_> {
    fn from(data: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(data))
    }
}

impl From<&'static str> for Body<'_> {
    fn from(data: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

impl From<tokio::fs::File> for Body<'_> {
    fn from(file: tokio::fs::File) -> Self {
        Body::seekable(file)
    }
}

impl From<ByteStream> for Body<'_> {
    fn from(stream: ByteStream) -> Self {
        Body::Stream(stream)
    }
}

/// Wrap an async reader as a [`ByteStream`], mapping read failures to
/// [`Error::Transfer`].
pub fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(
        ReaderStream::new(reader)
            .map(|chunk| chunk.map_err(|e| Error::Transfer(format!("Stream read error: {}", e)))),
    )
}

/// Storage contract implemented by every backend.
///
/// Paths may be bare keys, rooted keys or absolute URLs on the backend's
/// endpoint; implementations reduce them with [`Storage::to_key`] before
/// calling their vendor. Instances are shared across tasks and hold no
/// mutable state beyond their vendor client.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the backend name (e.g., "s3", "local", "memory").
    fn name(&self) -> &str;

    /// Canonical key for a caller-supplied path.
    fn to_key(&self, path: &str) -> String;

    /// Directory receiving the temporary files created by [`Storage::get`].
    fn temp_dir(&self) -> &Path;

    /// Externally reachable host of the backend.
    fn endpoint(&self) -> &str;

    /// Copy the object into a private temporary file rewound to offset 0.
    ///
    /// # Errors
    /// - `NotFound` if the key does not exist
    /// - `Transfer` if the copy is interrupted; no temporary file is left
    async fn get(&self, path: &str) -> Result<LocalFile> {
        let stream = self.get_stream(path).await?;
        spool::spool_to_temp(stream, self.temp_dir()).await
    }

    /// Open a single-pass stream over the object.
    ///
    /// # Errors
    /// - `NotFound` before any bytes are produced if the key does not exist
    async fn get_stream(&self, path: &str) -> Result<ByteStream>;

    /// Upload `body` in full and describe the stored object.
    ///
    /// Seekable bodies are rewound first. A failed upload leaves nothing
    /// visible to `get` or `list`.
    async fn put(&self, path: &str, body: Body<'_>) -> Result<Object>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Delete several objects.
    ///
    /// Failures are reported as one aggregate error, not per key.
    async fn delete_many(&self, paths: &[String]) -> Result<()> {
        let mut failed = Vec::new();
        for path in paths {
            if let Err(e) = self.delete(path).await {
                failed.push(format!("{}: {}", path, e));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            tracing::warn!(backend = self.name(), failed = failed.len(), "Batch delete incomplete");
            Err(Error::Backend(format!(
                "Failed to delete {} of {} objects: {}",
                failed.len(),
                paths.len(),
                failed.join("; ")
            )))
        }
    }

    /// List every object whose key starts with the normalized `prefix`.
    ///
    /// Ordering is backend-defined. Paginated vendors are drained before
    /// returning.
    async fn list(&self, prefix: &str) -> Result<Vec<Object>>;

    /// URL under which the object can be fetched: the bare key for public
    /// backends, a signed expiring URL for private ones.
    ///
    /// # Errors
    /// - `Signing` if the backend has no way to sign
    async fn get_url(&self, path: &str) -> Result<String>;
}
