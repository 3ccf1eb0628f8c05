// src/registry/mod.rs

//! Installed-recipe registry
//!
//! A small SQLite database under `<root>/var/potluck.db` recording which
//! recipes are installed, at which version and checksum, and which paths
//! each one owns. Each thread opens its own [`Registry`]. Every write runs
//! in an IMMEDIATE transaction, so concurrent writers queue on SQLite's busy
//! timeout instead of failing a read-to-write upgrade; [`PackageLock`]
//! serializes operations on the same recipe.

mod lock;
mod models;
pub mod schema;

pub use lock::PackageLock;
pub use models::{FileKind, InstalledFile, InstalledRecipe, TestStatus};

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long a writer waits for another connection's transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle on the registry database
pub struct Registry {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Registry {
    /// Open (creating and migrating as needed) the registry at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened registry {} (journal_mode={})", path.display(), mode);

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Throwaway registry, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&conn)?;
        Ok(Self { conn, path })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a transaction that holds the write lock from the start
    fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    pub fn find(&self, name: &str) -> Result<Option<InstalledRecipe>> {
        InstalledRecipe::find_by_name(&self.conn, name)
    }

    /// Like [`Registry::find`], but a missing row is `Error::NotInstalled`
    pub fn get(&self, name: &str) -> Result<InstalledRecipe> {
        self.find(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))
    }

    pub fn list(&self) -> Result<Vec<InstalledRecipe>> {
        InstalledRecipe::list_all(&self.conn)
    }

    pub fn installed_names(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|r| r.name).collect())
    }

    pub fn files(&self, install: &InstalledRecipe) -> Result<Vec<InstalledFile>> {
        match install.id {
            Some(id) => InstalledFile::find_by_install(&self.conn, id),
            None => Ok(Vec::new()),
        }
    }

    /// Name of the recipe owning `path`, if any
    pub fn owner_of(&self, path: &Path) -> Result<Option<String>> {
        InstalledFile::owner_of(&self.conn, &path.to_string_lossy())
    }

    /// Record an install and its files, replacing any previous row for the name
    pub fn record_install(
        &self,
        record: &mut InstalledRecipe,
        files: &[(PathBuf, FileKind)],
    ) -> Result<i64> {
        let tx = self.write_transaction()?;

        if let Some(previous) = InstalledRecipe::find_by_name(&tx, &record.name)?
            && let Some(id) = previous.id
        {
            debug!("Replacing registry row for {} {}", previous.name, previous.version);
            InstalledRecipe::delete(&tx, id)?;
        }

        let id = record.insert(&tx)?;
        for (path, kind) in files {
            InstalledFile::new(id, path.to_string_lossy().into_owned(), *kind).insert(&tx)?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Remove a recipe's row, returning it with the files it owned
    pub fn remove(&self, name: &str) -> Result<(InstalledRecipe, Vec<InstalledFile>)> {
        let tx = self.write_transaction()?;

        let record = InstalledRecipe::find_by_name(&tx, name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        let files = match record.id {
            Some(id) => {
                let files = InstalledFile::find_by_install(&tx, id)?;
                InstalledRecipe::delete(&tx, id)?;
                files
            }
            None => Vec::new(),
        };

        tx.commit()?;
        Ok((record, files))
    }

    pub fn set_test_status(&self, name: &str, status: TestStatus) -> Result<()> {
        let tx = self.write_transaction()?;
        let record = InstalledRecipe::find_by_name(&tx, name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        if let Some(id) = record.id {
            InstalledRecipe::set_test_status(&tx, id, status)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn record(version: &str) -> InstalledRecipe {
        InstalledRecipe::new(
            "spread".into(),
            version.into(),
            "sha256:abcd".into(),
            format!("/opt/potluck/cellar/spread/{version}"),
            "script".into(),
        )
    }

    #[test]
    fn test_open_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("var").join("potluck.db");
        let registry = Registry::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(registry.path(), Some(path.as_path()));
        assert!(registry.list().unwrap().is_empty());

        // Reopen keeps data
        let mut row = record("0.1.0");
        registry.record_install(&mut row, &[]).unwrap();
        drop(registry);
        let registry = Registry::open(&path).unwrap();
        assert_eq!(registry.installed_names().unwrap(), vec!["spread"]);
    }

    #[test]
    fn test_record_install_replaces_previous() {
        let registry = Registry::open_in_memory().unwrap();

        let mut old = record("0.1.0");
        registry
            .record_install(&mut old, &[(PathBuf::from("/opt/potluck/bin/spread"), FileKind::Link)])
            .unwrap();

        let mut new = record("0.2.0");
        registry
            .record_install(&mut new, &[(PathBuf::from("/opt/potluck/bin/spread"), FileKind::Link)])
            .unwrap();

        let rows = registry.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version, "0.2.0");
        assert_eq!(registry.files(&rows[0]).unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = Registry::open_in_memory().unwrap();
        let mut row = record("0.1.0");
        registry
            .record_install(&mut row, &[(PathBuf::from("/opt/potluck/bin/spread"), FileKind::Link)])
            .unwrap();

        let (removed, files) = registry.remove("spread").unwrap();
        assert_eq!(removed.version, "0.1.0");
        assert_eq!(files.len(), 1);
        assert!(registry.find("spread").unwrap().is_none());
        assert!(matches!(registry.remove("spread"), Err(Error::NotInstalled(_))));
    }

    #[test]
    fn test_get_missing_is_not_installed() {
        let registry = Registry::open_in_memory().unwrap();
        assert!(matches!(registry.get("nope"), Err(Error::NotInstalled(_))));
        assert!(matches!(
            registry.set_test_status("nope", TestStatus::Passed),
            Err(Error::NotInstalled(_))
        ));
    }

    #[test]
    fn test_concurrent_open_of_fresh_database() {
        const THREADS: usize = 8;

        for round in 0..10 {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("var").join("potluck.db");
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let path = path.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let registry = Registry::open(&path)?;
                        schema::get_schema_version(registry.conn())
                    })
                })
                .collect();

            for handle in handles {
                let version = handle.join().unwrap();
                assert!(version.is_ok(), "round {round}: {:?}", version.as_ref().err());
                assert_eq!(version.unwrap(), schema::SCHEMA_VERSION);
            }
        }
    }

    #[test]
    fn test_concurrent_writers_all_commit() {
        const THREADS: usize = 6;
        const WRITES: usize = 10;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("potluck.db");
        Registry::open(&path).unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || -> Result<()> {
                    let registry = Registry::open(&path)?;
                    barrier.wait();
                    for i in 0..WRITES {
                        let name = format!("tool{t}");
                        let mut row = InstalledRecipe::new(
                            name.clone(),
                            format!("0.{i}.0"),
                            "sha256:abcd".into(),
                            format!("/opt/potluck/cellar/{name}/0.{i}.0"),
                            "script".into(),
                        );
                        let link = PathBuf::from(format!("/opt/potluck/bin/{name}"));
                        registry.record_install(&mut row, &[(link, FileKind::Link)])?;
                        registry.set_test_status(&name, TestStatus::Passed)?;
                    }
                    registry.remove(&format!("tool{t}"))?;
                    let mut row = InstalledRecipe::new(
                        format!("tool{t}"),
                        "1.0.0".into(),
                        "sha256:abcd".into(),
                        format!("/opt/potluck/cellar/tool{t}/1.0.0"),
                        "script".into(),
                    );
                    registry.record_install(&mut row, &[])?;
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap();
            assert!(result.is_ok(), "{:?}", result.as_ref().err());
        }

        let registry = Registry::open(&path).unwrap();
        let rows = registry.list().unwrap();
        assert_eq!(rows.len(), THREADS);
        assert!(rows.iter().all(|r| r.version == "1.0.0"));
    }
}
