//! Weight artifact provisioning.

use crate::error::DownloadError;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsStatus {
    /// The file was already on disk; nothing was fetched.
    Present,
    Downloaded { bytes: u64 },
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Makes sure `path` holds the weight artifact, streaming it from `url` if absent.
///
/// The body is written chunk by chunk into a `.part` sibling and renamed into
/// place only after the last chunk, so a partial transfer is never mistaken for
/// a complete artifact on the next start.
pub async fn ensure_weights(client: &reqwest::Client, url: &str, path: &Path) -> Result<WeightsStatus, DownloadError> {
    let io_err = |source| DownloadError::Io { path: path.to_path_buf(), source };
    if tokio::fs::try_exists(path).await.map_err(io_err)? {
        return Ok(WeightsStatus::Present);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    info!("Downloading model weights from {}...", url);
    let transport = |source| DownloadError::Transport { url: url.to_string(), source };
    let response = client.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status { url: url.to_string(), status });
    }

    let part = partial_path(path);
    let written = match stream_to_file(response, &part, url).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };
    tokio::fs::rename(&part, path).await.map_err(io_err)?;

    info!("Downloaded weights to {} ({} bytes)", path.display(), written);
    Ok(WeightsStatus::Downloaded { bytes: written })
}

async fn stream_to_file(response: reqwest::Response, part: &Path, url: &str) -> Result<u64, DownloadError> {
    let io_err = |source| DownloadError::Io { path: part.to_path_buf(), source };
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::Transport { url: url.to_string(), source })?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_appends_suffix() {
        let p = partial_path(Path::new("/w/RealESRGAN_x4.onnx"));
        assert_eq!(p, PathBuf::from("/w/RealESRGAN_x4.onnx.part"));
    }

    #[tokio::test]
    async fn existing_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RealESRGAN_x4.onnx");
        std::fs::write(&path, b"weights").unwrap();

        // Unroutable URL: any fetch attempt would fail.
        let client = reqwest::Client::new();
        let status = ensure_weights(&client, "http://127.0.0.1:1/never", &path).await.unwrap();
        assert_eq!(status, WeightsStatus::Present);
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
    }
}
