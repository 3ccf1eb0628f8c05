// src/build/unpack.rs

//! Source archive unpacking
//!
//! Cached sources are stored under their checksum, without the original
//! file extension, so the compression format is detected from magic bytes.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compression wrapped around a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression from the first bytes of a file
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        match data {
            [0x1f, 0x8b, ..] => Self::Gzip,
            [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, ..] => Self::Xz,
            [0x28, 0xb5, 0x2f, 0xfd, ..] => Self::Zstd,
            _ => Self::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    fn decoder<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Zstd => Box::new(zstd::Decoder::new(reader).map_err(unpack_error)?),
        })
    }
}

fn unpack_error(e: impl std::fmt::Display) -> Error {
    Error::BuildError {
        step: "unpack".to_string(),
        message: e.to_string(),
    }
}

/// Unpack a (possibly compressed) tarball into `dest`
///
/// Returns the source root: `dest` itself, or its only entry when the
/// archive wraps everything in a single top-level directory.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let mut file = File::open(archive)
        .map_err(|e| unpack_error(format!("cannot open {}: {}", archive.display(), e)))?;

    let mut magic = [0u8; 6];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    let compression = Compression::from_magic_bytes(&magic[..n]);
    debug!("Unpacking {} ({})", archive.display(), compression.name());

    fs::create_dir_all(dest)?;
    let decoder = compression.decoder(BufReader::new(file))?;
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(dest)
        .map_err(|e| unpack_error(format!("{}: {}", archive.display(), e)))?;

    source_root(dest)
}

/// Descend into a lone top-level directory
fn source_root(dest: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(dest)?.filter_map(|e| e.ok()).collect();

    if entries.is_empty() {
        return Err(unpack_error("archive is empty"));
    }
    if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
        return Ok(entries[0].path());
    }
    Ok(dest.to_path_buf())
}
