// src/commands/uninstall.rs
//! Uninstall command - remove an installed recipe

use super::Session;
use anyhow::{Context, Result};
use potluck::Installer;

pub fn cmd_uninstall(session: Session, name: &str) -> Result<()> {
    let installer = Installer::new(session.config)?;
    let registry = installer
        .open_registry()
        .context("Failed to open registry")?;

    let report = installer.uninstall(&registry, name)?;
    println!("[OK] Uninstalled {} {}", report.name, report.version);
    println!("  Removed: {}", report.prefix.display());
    println!("  Links removed: {}", report.unlinked);
    Ok(())
}
