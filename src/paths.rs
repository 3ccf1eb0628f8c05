// src/paths.rs
//! Centralized path derivation for potluck directories

use std::path::{Path, PathBuf};

/// Directory layout under a potluck root
///
/// ```text
/// <root>/
///   bin/                   linked executables
///   cellar/<name>/<ver>/   install prefixes
///   cache/sources/         verified source archives
///   locks/<name>.lock      per-package install locks
///   recipes/               default recipe repository
///   var/potluck.db         installed-recipe registry
///   var/log/<name>.log     output of the last build
///   work/                  scoped build directories
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds links to every installed executable
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cellar(&self) -> PathBuf {
        self.root.join("cellar")
    }

    /// Deterministic install prefix for one recipe version
    pub fn keg(&self, name: &str, version: &str) -> PathBuf {
        self.cellar().join(name).join(version)
    }

    /// Staging prefix a build installs into before it replaces `keg`
    pub fn staging_keg(&self, name: &str, version: &str) -> PathBuf {
        self.cellar().join(name).join(format!(".{version}.partial"))
    }

    pub fn source_cache(&self) -> PathBuf {
        self.root.join("cache").join("sources")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("{name}.lock"))
    }

    pub fn recipes_dir(&self) -> PathBuf {
        self.root.join("recipes")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("var").join("potluck.db")
    }

    /// Captured output of the most recent build of `name`
    pub fn build_log(&self, name: &str) -> PathBuf {
        self.root.join("var").join("log").join(format!("{name}.log"))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Create every directory of the layout; returns the ones that were new
    pub fn create_dirs(&self) -> std::io::Result<Vec<PathBuf>> {
        let dirs = [
            self.bin_dir(),
            self.cellar(),
            self.source_cache(),
            self.locks_dir(),
            self.recipes_dir(),
            self.root.join("var").join("log"),
            self.work_dir(),
        ];

        let mut created = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir)?;
                created.push(dir);
            }
        }
        Ok(created)
    }
}
