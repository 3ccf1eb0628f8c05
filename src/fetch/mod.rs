// src/fetch/mod.rs

//! Fetcher: download a source archive and verify it against its checksum
//!
//! Verified archives are cached under the checksum, so a second install of
//! the same source never touches the network. A cached copy is re-hashed
//! before reuse; a corrupt cache entry is discarded and fetched again.
//!
//! Transport failures are retried with a linear backoff up to a bounded
//! number of attempts. A checksum mismatch is never retried.

mod transport;

pub use transport::{DefaultTransport, FileTransport, HttpTransport, Transport, local_path};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::{Checksum, hash_file};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Downloads and verifies source archives into a checksum-keyed cache
pub struct Fetcher {
    cache_dir: PathBuf,
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    retry_delay: Duration,
    show_progress: bool,
}

impl Fetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            transport,
            max_attempts: crate::config::DEFAULT_FETCH_ATTEMPTS,
            retry_delay: Duration::from_millis(1000),
            show_progress: false,
        }
    }

    /// Fetcher over the default transports, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = Arc::new(DefaultTransport::new(config.fetch_timeout)?);
        Ok(Self::new(config.layout().source_cache(), transport)
            .with_retries(config.fetch_attempts, config.retry_delay)
            .with_progress(config.progress))
    }

    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a verified copy of `checksum` lives in the cache
    pub fn cached_path(&self, checksum: &Checksum) -> PathBuf {
        self.cache_dir.join(checksum.cache_key())
    }

    /// Whether a verified copy is already cached (without re-hashing)
    pub fn is_cached(&self, checksum: &Checksum) -> bool {
        self.cached_path(checksum).is_file()
    }

    /// Fetch `url` and verify it against `expected`
    ///
    /// Returns the path of the verified local copy.
    pub fn fetch(&self, url: &str, expected: &Checksum) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let cached = self.cached_path(expected);

        if cached.exists() {
            debug!("Using cached source: {}", cached.display());
            let actual = hash_file(expected.algorithm, &cached)?;
            if actual == *expected {
                return Ok(cached);
            }
            warn!("Cached file {} is corrupt, re-downloading", cached.display());
            fs::remove_file(&cached)?;
        }

        // Unique per caller so parallel installs of the same source never collide
        let part = tempfile::Builder::new()
            .prefix(&format!("{}.", expected.cache_key()))
            .suffix(".part")
            .tempfile_in(&self.cache_dir)?
            .into_temp_path();

        info!("Downloading: {}", url);
        let progress = self.progress_bar(url);
        let result = self.download_with_retries(url, &part, progress.as_ref());
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        result?;

        let actual = hash_file(expected.algorithm, &part)?;
        if actual != *expected {
            return Err(Error::IntegrityError {
                url: url.to_string(),
                expected: expected.to_prefixed_string(),
                actual: actual.to_prefixed_string(),
            });
        }

        part.persist(&cached).map_err(|e| {
            Error::IoError(format!("Failed to move source into cache: {}", e.error))
        })?;
        info!("Verified {} ({})", url, expected.to_prefixed_string());
        Ok(cached)
    }

    fn download_with_retries(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressBar>,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.download(url, dest, progress) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Download attempt {}/{} failed: {}, retrying...",
                        attempt, self.max_attempts, e
                    );
                    std::thread::sleep(self.retry_delay * attempt);
                }
                Err(Error::FetchError {
                    url,
                    message,
                    retryable,
                }) if retryable => {
                    return Err(Error::FetchError {
                        url,
                        message: format!("{message} (after {attempt} attempts)"),
                        retryable,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn progress_bar(&self, url: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(crate::recipe::archive_filename(url));
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Serves fixed bytes, failing the first `failures` calls
    struct FlakyTransport {
        body: Vec<u8>,
        failures: u32,
        retryable: bool,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(body: &[u8], failures: u32, retryable: bool) -> Self {
            Self {
                body: body.to_vec(),
                failures,
                retryable,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Transport for FlakyTransport {
        fn download(&self, url: &str, dest: &Path, _: Option<&ProgressBar>) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(Error::FetchError {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                    retryable: self.retryable,
                });
            }
            fs::write(dest, &self.body)?;
            Ok(self.body.len() as u64)
        }
    }

    fn checksum_of(data: &[u8]) -> Checksum {
        Checksum::parse(&sha256(data)).unwrap()
    }

    fn fetcher(dir: &TempDir, transport: Arc<FlakyTransport>) -> Fetcher {
        Fetcher::new(dir.path().join("cache"), transport).with_retries(3, Duration::ZERO)
    }

    #[test]
    fn test_fetch_verifies_and_caches() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"source", 0, true));
        let fetcher = fetcher(&dir, transport.clone());
        let checksum = checksum_of(b"source");

        let path = fetcher.fetch("https://example.com/a.tar.gz", &checksum).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"source");
        assert!(fetcher.is_cached(&checksum));

        // Second fetch is served from the cache
        fetcher.fetch("https://example.com/a.tar.gz", &checksum).unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retryable_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"source", 2, true));
        let fetcher = fetcher(&dir, transport.clone());

        fetcher
            .fetch("https://example.com/a.tar.gz", &checksum_of(b"source"))
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"source", 10, true));
        let fetcher = fetcher(&dir, transport.clone());

        let err = fetcher
            .fetch("https://example.com/a.tar.gz", &checksum_of(b"source"))
            .unwrap_err();
        assert!(matches!(err, Error::FetchError { .. }));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failures_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"source", 10, false));
        let fetcher = fetcher(&dir, transport.clone());

        assert!(fetcher
            .fetch("https://example.com/a.tar.gz", &checksum_of(b"source"))
            .is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_checksum_mismatch_is_fatal_and_not_retried() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"tampered", 0, true));
        let fetcher = fetcher(&dir, transport.clone());
        let expected = checksum_of(b"source");

        let err = fetcher
            .fetch("https://example.com/a.tar.gz", &expected)
            .unwrap_err();
        assert!(matches!(err, Error::IntegrityError { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Nothing left behind in the cache
        assert!(!fetcher.is_cached(&expected));
        let leftovers = fs::read_dir(fetcher.cache_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_corrupt_cache_entry_is_refetched() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport::new(b"source", 0, true));
        let fetcher = fetcher(&dir, transport.clone());
        let checksum = checksum_of(b"source");

        fs::create_dir_all(fetcher.cache_dir()).unwrap();
        fs::write(fetcher.cached_path(&checksum), b"bit rot").unwrap();

        let path = fetcher.fetch("https://example.com/a.tar.gz", &checksum).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"source");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
