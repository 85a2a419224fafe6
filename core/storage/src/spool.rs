//! Spooling object streams into private temporary files.

use std::io::SeekFrom;
use std::path::Path;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use omnistore_common::{Error, Result};

use crate::provider::{ByteStream, LocalFile};

/// Drain `stream` into a fresh temporary file under `dir` and rewind it.
///
/// The file is unlinked from creation on, so an interrupted copy leaves
/// nothing behind once the handle is dropped.
pub async fn spool_to_temp(mut stream: ByteStream, dir: &Path) -> Result<LocalFile> {
    let temp_dir = dir.to_path_buf();
    let file = tokio::task::spawn_blocking(move || tempfile::tempfile_in(temp_dir))
        .await
        .map_err(|e| Error::Transfer(format!("Temporary file task failed: {}", e)))?
        .map_err(|e| {
            Error::Transfer(format!(
                "Failed to create temporary file in {}: {}",
                dir.display(),
                e
            ))
        })?;
    let mut file = tokio::fs::File::from_std(file);

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| match e {
            Error::Transfer(_) => e,
            other => Error::Transfer(format!("Download interrupted: {}", other)),
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to write temporary file: {}", e)))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| Error::Transfer(format!("Failed to flush temporary file: {}", e)))?;
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|e| Error::Transfer(format!("Failed to rewind temporary file: {}", e)))?;

    tracing::debug!(bytes = written, dir = %dir.display(), "Spooled object to temporary file");
    Ok(file)
}
