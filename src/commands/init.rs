// src/commands/init.rs
//! Init command - create the root layout, registry and config

use super::Session;
use anyhow::{Context, Result};
use potluck::Registry;
use potluck::registry::schema::SCHEMA_VERSION;
use std::fs;
use tracing::info;

pub fn cmd_init(session: Session) -> Result<()> {
    let config = session.config;
    let layout = config.layout();
    info!("Initializing potluck root at {}", layout.root().display());

    let created = layout
        .create_dirs()
        .with_context(|| format!("Failed to create {}", layout.root().display()))?;
    for dir in &created {
        println!("Created {}", dir.display());
    }

    let db_path = layout.db_path();
    Registry::open(&db_path).context("Failed to initialize registry")?;
    println!("Registry ready at {} (schema v{})", db_path.display(), SCHEMA_VERSION);

    let config_path = layout.config_path();
    if config_path.exists() {
        println!("Keeping existing {}", config_path.display());
    } else {
        fs::write(&config_path, config.template())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    println!("\nAdd {} to your PATH to use installed tools", layout.bin_dir().display());
    Ok(())
}
