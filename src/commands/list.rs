// src/commands/list.rs
//! List command - installed or available recipes

use super::Session;
use anyhow::Result;
use potluck::Registry;

pub fn cmd_list(session: Session, available: bool) -> Result<()> {
    if available {
        let names = session.recipes.list()?;
        if names.is_empty() {
            println!("No recipes found in {}", session.recipes.dir().display());
            return Ok(());
        }
        println!("Available recipes ({}):", session.recipes.dir().display());
        for name in &names {
            println!("  {}", name);
        }
        println!("\nTotal: {} recipe(s)", names.len());
        return Ok(());
    }

    let db_path = session.config.layout().db_path();
    if !db_path.exists() {
        println!("No recipes installed.");
        return Ok(());
    }

    let registry = Registry::open(&db_path)?;
    let installed = registry.list()?;
    if installed.is_empty() {
        println!("No recipes installed.");
        return Ok(());
    }

    println!("Installed recipes:");
    for record in &installed {
        println!(
            "  {} {} [{}] (tests: {})",
            record.name,
            record.version,
            record.builder,
            record.test_status.as_str()
        );
    }
    println!("\nTotal: {} recipe(s)", installed.len());
    Ok(())
}
