// src/registry/models.rs

//! Registry rows: installed recipes and the files they own

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Outcome of the last smoke test of an install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Untested,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TestStatus::Untested => "untested",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
        }
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "untested" => Ok(TestStatus::Untested),
            "passed" => Ok(TestStatus::Passed),
            "failed" => Ok(TestStatus::Failed),
            _ => Err(format!("Invalid test status: {s}")),
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of path an install owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file inside the install prefix
    File,
    /// Symlink in the shared `bin` directory
    Link,
}

impl FileKind {
    pub fn as_str(&self) -> &str {
        match self {
            FileKind::File => "file",
            FileKind::Link => "link",
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(FileKind::File),
            "link" => Ok(FileKind::Link),
            _ => Err(format!("Invalid file kind: {s}")),
        }
    }
}

fn parse_column<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

const INSTALL_COLUMNS: &str =
    "id, name, version, checksum, prefix, builder, recipe_path, installed_at, test_status, tested_at";

/// One installed recipe
#[derive(Debug, Clone)]
pub struct InstalledRecipe {
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    /// Prefixed source checksum (`sha256:<hex>`)
    pub checksum: String,
    pub prefix: String,
    pub builder: String,
    pub recipe_path: Option<String>,
    /// RFC 3339 timestamp
    pub installed_at: String,
    pub test_status: TestStatus,
    pub tested_at: Option<String>,
}

impl InstalledRecipe {
    pub fn new(
        name: String,
        version: String,
        checksum: String,
        prefix: String,
        builder: String,
    ) -> Self {
        Self {
            id: None,
            name,
            version,
            checksum,
            prefix,
            builder,
            recipe_path: None,
            installed_at: chrono::Utc::now().to_rfc3339(),
            test_status: TestStatus::Untested,
            tested_at: None,
        }
    }

    /// Whether this row describes exactly the given source build
    pub fn matches(&self, version: &str, checksum: &str, builder: &str) -> bool {
        self.version == version && self.checksum == checksum && self.builder == builder
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO installs (name, version, checksum, prefix, builder, recipe_path, installed_at, test_status, tested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.name,
                &self.version,
                &self.checksum,
                &self.prefix,
                &self.builder,
                &self.recipe_path,
                &self.installed_at,
                self.test_status.as_str(),
                &self.tested_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {INSTALL_COLUMNS} FROM installs WHERE name = ?1"
        ))?;
        Ok(stmt.query_row([name], Self::from_row).optional()?)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {INSTALL_COLUMNS} FROM installs ORDER BY name"
        ))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_test_status(conn: &Connection, id: i64, status: TestStatus) -> Result<()> {
        conn.execute(
            "UPDATE installs SET test_status = ?1, tested_at = ?2 WHERE id = ?3",
            params![status.as_str(), chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete the row and, through the cascade, its file rows
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM installed_files WHERE install_id = ?1", [id])?;
        conn.execute("DELETE FROM installs WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            version: row.get(2)?,
            checksum: row.get(3)?,
            prefix: row.get(4)?,
            builder: row.get(5)?,
            recipe_path: row.get(6)?,
            installed_at: row.get(7)?,
            test_status: parse_column(row, 8)?,
            tested_at: row.get(9)?,
        })
    }
}

/// A path owned by an install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub id: Option<i64>,
    pub install_id: i64,
    pub path: String,
    pub kind: FileKind,
}

impl InstalledFile {
    pub fn new(install_id: i64, path: String, kind: FileKind) -> Self {
        Self {
            id: None,
            install_id,
            path,
            kind,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO installed_files (install_id, path, kind) VALUES (?1, ?2, ?3)",
            params![self.install_id, &self.path, self.kind.as_str()],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_install(conn: &Connection, install_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, install_id, path, kind FROM installed_files WHERE install_id = ?1 ORDER BY path",
        )?;
        let rows = stmt
            .query_map([install_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Name of the install that owns `path`, if any
    pub fn owner_of(conn: &Connection, path: &str) -> Result<Option<String>> {
        let owner = conn
            .query_row(
                "SELECT i.name FROM installed_files f JOIN installs i ON i.id = f.install_id
                 WHERE f.path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            install_id: row.get(1)?,
            path: row.get(2)?,
            kind: parse_column(row, 3)?,
        })
    }
}
