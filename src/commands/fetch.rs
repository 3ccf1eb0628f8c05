// src/commands/fetch.rs
//! Fetch command - download and verify sources without building

use super::Session;
use anyhow::{Context, Result};
use potluck::Fetcher;

pub fn cmd_fetch(session: Session, specs: &[String], progress: bool) -> Result<()> {
    let mut config = session.config.clone();
    config.progress |= progress;
    let fetcher = Fetcher::from_config(&config)?;

    for spec in specs {
        let loaded = session.load_recipe(spec)?;
        let recipe = &loaded.recipe;
        let checksum = recipe
            .checksum()
            .map_err(|e| potluck::Error::ParseError(format!("Invalid sha256 for {}: {}", recipe.name, e)))?;

        let cached = fetcher.is_cached(&checksum);
        let path = fetcher
            .fetch(&recipe.url, &checksum)
            .with_context(|| format!("Failed to fetch source of {}", recipe.name))?;

        let note = if cached { " (cached)" } else { "" };
        println!("[OK] {}: {}{}", recipe.name, path.display(), note);
    }
    Ok(())
}
