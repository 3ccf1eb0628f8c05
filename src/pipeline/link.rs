// src/pipeline/link.rs

//! Promotion of a staged build into its prefix, and `bin` links

use crate::error::{Error, Result};
use crate::registry::{FileKind, Registry};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Executables a prefix provides (regular files or links in `<prefix>/bin`)
pub fn prefix_bins(prefix: &Path) -> Result<Vec<PathBuf>> {
    let bin_dir = prefix.join("bin");
    if !bin_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut bins: Vec<PathBuf> = fs::read_dir(&bin_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| !p.is_dir())
        .collect();
    bins.sort();
    Ok(bins)
}

/// Refuse to link over executables that belong to someone else
///
/// A link target is free when it does not exist, when the registry says
/// `name` owns it, or when it is a symlink into `name`'s cellar directory.
pub fn check_link_conflicts(
    registry: &Registry,
    name: &str,
    staged_prefix: &Path,
    bin_dir: &Path,
    own_cellar: &Path,
) -> Result<()> {
    for bin in prefix_bins(staged_prefix)? {
        let Some(file_name) = bin.file_name() else {
            continue;
        };
        let target = bin_dir.join(file_name);
        let Ok(meta) = fs::symlink_metadata(&target) else {
            continue;
        };

        if registry.owner_of(&target)?.as_deref() == Some(name) {
            continue;
        }
        if meta.file_type().is_symlink()
            && fs::read_link(&target).is_ok_and(|dest| dest.starts_with(own_cellar))
        {
            continue;
        }

        return Err(Error::IoError(format!(
            "{} already exists and does not belong to {}",
            target.display(),
            name
        )));
    }
    Ok(())
}

/// Replace `prefix` with the fully built `staging` directory
///
/// An existing prefix is moved aside first and only deleted once the new
/// one is in place; if the move fails it is put back.
pub fn promote(staging: &Path, prefix: &Path) -> Result<()> {
    if let Some(parent) = prefix.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut backup_name = OsString::from(".");
    backup_name.push(prefix.file_name().unwrap_or_default());
    backup_name.push(".old");
    let backup = prefix.with_file_name(backup_name);

    let displaced = prefix.exists();
    if displaced {
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }
        debug!("Moving previous prefix {} aside", prefix.display());
        fs::rename(prefix, &backup)?;
    }

    if let Err(e) = fs::rename(staging, prefix) {
        if displaced && let Err(restore) = fs::rename(&backup, prefix) {
            warn!(
                "Could not restore {} from {}: {}",
                prefix.display(),
                backup.display(),
                restore
            );
        }
        return Err(Error::IoError(format!(
            "Failed to move {} to {}: {}",
            staging.display(),
            prefix.display(),
            e
        )));
    }

    if displaced {
        fs::remove_dir_all(&backup)?;
    }
    Ok(())
}

/// Symlink every executable of `prefix` into `bin_dir`
pub fn link_bins(prefix: &Path, bin_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(bin_dir)?;
    let mut linked = Vec::new();

    for bin in prefix_bins(prefix)? {
        let Some(file_name) = bin.file_name() else {
            continue;
        };
        let link = bin_dir.join(file_name);
        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link)?;
        }
        symlink(&bin, &link)?;
        info!("Linked {} -> {}", link.display(), bin.display());
        linked.push(link);
    }
    Ok(linked)
}

/// Every path owned by an install: its links plus the files under its prefix
pub fn inventory(prefix: &Path, links: &[PathBuf]) -> Vec<(PathBuf, FileKind)> {
    let mut files: Vec<(PathBuf, FileKind)> = links
        .iter()
        .map(|l| (l.clone(), FileKind::Link))
        .collect();

    files.extend(
        WalkDir::new(prefix)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .map(|e| (e.into_path(), FileKind::File)),
    );
    files
}

/// Remove links an install owns, leaving anything that was replaced since
pub fn unlink(paths: &[PathBuf], prefix: &Path) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        let Ok(meta) = fs::symlink_metadata(path) else {
            continue;
        };
        let points_into_prefix = meta.file_type().is_symlink()
            && fs::read_link(path).is_ok_and(|dest| dest.starts_with(prefix));
        if points_into_prefix {
            fs::remove_file(path)?;
            removed += 1;
        } else {
            debug!("Leaving {} in place; it no longer points into {}", path.display(), prefix.display());
        }
    }
    Ok(removed)
}
