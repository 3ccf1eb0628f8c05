// src/fetch/transport.rs

//! Byte transports for source downloads
//!
//! A transport only moves bytes to a destination file. Verification, caching
//! and retries live in [`super::Fetcher`].

use crate::error::{Error, Result};
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Moves the bytes behind a URL into a local file
pub trait Transport: Send + Sync {
    /// Write the content of `url` to `dest`, returning the byte count
    ///
    /// Failures must be `Error::FetchError`, with `retryable` set when a
    /// later attempt could succeed.
    fn download(&self, url: &str, dest: &Path, progress: Option<&ProgressBar>) -> Result<u64>;
}

fn fetch_error(url: &str, message: impl Into<String>, retryable: bool) -> Error {
    Error::FetchError {
        url: url.to_string(),
        message: message.into(),
        retryable,
    }
}

/// Local path behind a `file://` URL or absolute path, if it is one
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if url.starts_with('/') {
        Some(PathBuf::from(url))
    } else {
        None
    }
}

/// Copies from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn download(&self, url: &str, dest: &Path, _progress: Option<&ProgressBar>) -> Result<u64> {
        let src = local_path(url)
            .ok_or_else(|| fetch_error(url, "not a local path or file:// URL", false))?;
        if !src.is_file() {
            return Err(fetch_error(url, "no such file", false));
        }
        fs::copy(&src, dest).map_err(|e| fetch_error(url, format!("copy failed: {e}"), false))
    }
}

/// HTTP(S) downloads through a blocking client with a request timeout
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("potluck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, dest: &Path, progress: Option<&ProgressBar>) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_error(url, e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            // Server-side and throttling errors may clear up; client errors will not
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(fetch_error(url, format!("HTTP {status}"), retryable));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut file = File::create(dest).map_err(|e| {
            Error::IoError(format!("Failed to create file {}: {e}", dest.display()))
        })?;

        stream_response_to_file(url, response, &mut file, total_size, progress)
    }
}

/// Stream an HTTP response to a file, never buffering the whole body
fn stream_response_to_file(
    url: &str,
    mut response: reqwest::blocking::Response,
    file: &mut File,
    total_size: u64,
    progress_bar: Option<&ProgressBar>,
) -> Result<u64> {
    if let Some(pb) = progress_bar
        && total_size > 0
    {
        pb.set_length(total_size);
    }

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let bytes_read = response
            .read(&mut buffer)
            .map_err(|e| fetch_error(url, format!("Failed to read response: {e}"), true))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| Error::IoError(format!("Failed to write data: {e}")))?;

        downloaded += bytes_read as u64;

        if let Some(pb) = progress_bar {
            pb.set_position(downloaded);
        }
    }

    debug!("Downloaded {} bytes from {}", downloaded, url);
    Ok(downloaded)
}

/// Dispatches on URL scheme: local paths are copied, everything else goes over HTTP
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(timeout)?,
            file: FileTransport,
        })
    }
}

impl Transport for DefaultTransport {
    fn download(&self, url: &str, dest: &Path, progress: Option<&ProgressBar>) -> Result<u64> {
        if local_path(url).is_some() {
            self.file.download(url, dest, progress)
        } else if url.starts_with("https://") || url.starts_with("http://") {
            self.http.download(url, dest, progress)
        } else {
            Err(fetch_error(url, "unsupported URL scheme", false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("file:///tmp/a.tar.gz"), Some(PathBuf::from("/tmp/a.tar.gz")));
        assert_eq!(local_path("/tmp/a.tar.gz"), Some(PathBuf::from("/tmp/a.tar.gz")));
        assert_eq!(local_path("https://example.com/a.tar.gz"), None);
    }

    #[test]
    fn test_file_transport_copies() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.tar.gz");
        fs::write(&src, b"archive bytes").unwrap();
        let dest = dir.path().join("dest");

        let url = format!("file://{}", src.display());
        let n = FileTransport.download(&url, &dest, None).unwrap();
        assert_eq!(n, 13);
        assert_eq!(fs::read(&dest).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_file_transport_missing_is_not_retryable() {
        let dir = TempDir::new().unwrap();
        let err = FileTransport
            .download("/definitely/not/here.tar.gz", &dir.path().join("x"), None)
            .unwrap_err();
        assert!(matches!(err, Error::FetchError { retryable: false, .. }));
    }

    #[test]
    fn test_default_transport_rejects_unknown_scheme() {
        let dir = TempDir::new().unwrap();
        let transport = DefaultTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .download("ftp://example.com/a.tar.gz", &dir.path().join("x"), None)
            .unwrap_err();
        assert!(matches!(err, Error::FetchError { retryable: false, .. }));
    }
}
