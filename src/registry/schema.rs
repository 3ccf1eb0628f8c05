// src/registry/schema.rs

//! Registry schema and migrations

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
///
/// The version is read and the migrations applied under one IMMEDIATE
/// transaction, so concurrent openers of a fresh database wait for the
/// first one and then find the schema current.
pub fn migrate(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current_version = get_schema_version(&tx)?;

    if current_version > SCHEMA_VERSION {
        return Err(Error::Config(format!(
            "Registry schema version {} is newer than this build supports ({})",
            current_version, SCHEMA_VERSION
        )));
    }
    if current_version == SCHEMA_VERSION {
        debug!("Registry schema is up to date (version {})", current_version);
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying registry migration to version {}", version);
        apply_migration(&tx, version)?;
        set_schema_version(&tx, version)?;
    }

    tx.commit()?;
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::Config(format!("Unknown migration version: {}", version))),
    }
}

/// Installed recipes and the files each one owns
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE installs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            version TEXT NOT NULL,
            checksum TEXT NOT NULL,
            prefix TEXT NOT NULL,
            builder TEXT NOT NULL,
            recipe_path TEXT,
            installed_at TEXT NOT NULL
        );

        CREATE TABLE installed_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            install_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('file', 'link')),
            FOREIGN KEY (install_id) REFERENCES installs(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_installed_files_install ON installed_files(install_id);
        CREATE UNIQUE INDEX idx_installed_files_path ON installed_files(path);
        ",
    )?;
    Ok(())
}

/// Smoke-test bookkeeping
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        ALTER TABLE installs ADD COLUMN test_status TEXT NOT NULL DEFAULT 'untested'
            CHECK(test_status IN ('untested', 'passed', 'failed'));
        ALTER TABLE installs ADD COLUMN tested_at TEXT;
        ",
    )?;
    Ok(())
}
