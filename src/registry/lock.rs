// src/registry/lock.rs

//! Per-package exclusive locks
//!
//! Every operation that touches a recipe's install prefix or registry row
//! holds `<root>/locks/<name>.lock` for its whole duration. Installs of
//! different recipes proceed in parallel; two installs of the same recipe
//! serialize. The lock is an `flock(LOCK_EX)` and is released on drop,
//! including when the holding process dies.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on one package name
pub struct PackageLock {
    /// Kept open to hold the lock
    file: File,
    path: PathBuf,
    name: String,
}

impl PackageLock {
    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| Error::LockError(format!("Failed to open {}: {}", path.display(), e)))
    }

    /// Acquire the lock, blocking while another install holds it
    pub fn acquire(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;

        if file.try_lock_exclusive().is_err() {
            debug!("Waiting for lock on {}", name);
            file.lock_exclusive().map_err(|e| {
                Error::LockError(format!("Failed to lock {}: {}", path.display(), e))
            })?;
        }

        let mut lock = Self {
            file,
            path,
            name: name.to_string(),
        };
        lock.write_owner();
        debug!("Acquired lock for {}", lock.name);
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Holder pid, for humans inspecting a stuck lock
    fn write_owner(&mut self) {
        if self.file.set_len(0).is_ok() {
            let _ = writeln!(self.file, "{}", std::process::id());
        }
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released lock for {}", self.name);
    }
}
