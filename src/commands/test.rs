// src/commands/test.rs
//! Test command - re-run the smoke test of an installed recipe

use super::Session;
use anyhow::{Context, Result};
use potluck::recipe::load_recipe_path;
use potluck::{Error, Installer, LoadedRecipe, Registry};
use std::path::Path;

/// Run the recipe's assertions against its installed prefix
///
/// Exits with the test-failure code when any assertion fails.
pub fn cmd_test(session: Session, spec: &str) -> Result<()> {
    let installer = Installer::new(session.config.clone())?;
    let registry = installer
        .open_registry()
        .context("Failed to open registry")?;
    let loaded = resolve_recipe(&session, &registry, spec)?;

    let report = installer.test_installed(&registry, &loaded)?;
    if report.is_empty() {
        println!("{} has no smoke test", loaded.recipe.name);
        return Ok(());
    }

    for result in &report.results {
        let mark = if result.passed() { "[OK]" } else { "[FAILED]" };
        println!("{} {}", mark, result.command);
        for failure in &result.failures {
            println!("    {}", failure);
        }
    }

    let total = report.results.len();
    let report = report.into_result()?;
    println!("\n{}: {} assertion(s) passed", report.recipe, total);
    Ok(())
}

/// The repository's recipe, or the file recorded when it was installed
fn resolve_recipe(session: &Session, registry: &Registry, spec: &str) -> Result<LoadedRecipe> {
    match session.recipes.load(spec) {
        Ok(loaded) => Ok(loaded),
        Err(Error::NotFound(msg)) => {
            let record = registry
                .find(spec)?
                .ok_or_else(|| Error::NotFound(msg.clone()))?;
            let path = record
                .recipe_path
                .ok_or(Error::NotFound(msg))
                .with_context(|| format!("No recipe file recorded for {}", spec))?;
            load_recipe_path(Path::new(&path))
                .with_context(|| format!("Failed to load recorded recipe {}", path))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load recipe '{}'", spec)),
    }
}
