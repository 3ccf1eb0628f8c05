// src/commands/info.rs
//! Info command - recipe metadata and install state

use super::Session;
use anyhow::{Context, Result};
use potluck::{Error, Recipe, Registry};
use potluck::registry::InstalledRecipe;

pub fn cmd_info(session: Session, spec: &str, show_files: bool) -> Result<()> {
    let recipe = match session.recipes.load(spec) {
        Ok(loaded) => Some(loaded.recipe),
        Err(Error::NotFound(_)) => None,
        Err(e) => return Err(e).with_context(|| format!("Failed to load recipe '{}'", spec)),
    };
    let name = recipe.as_ref().map_or(spec, |r| r.name.as_str());

    let db_path = session.config.layout().db_path();
    let registry = if db_path.exists() {
        Some(Registry::open(&db_path)?)
    } else {
        None
    };
    let installed = match &registry {
        Some(registry) => registry.find(name)?,
        None => None,
    };

    if recipe.is_none() && installed.is_none() {
        return Err(Error::NotFound(format!(
            "No recipe or install named {}",
            spec
        ))
        .into());
    }

    if let Some(recipe) = &recipe {
        print_recipe(recipe);
    } else {
        println!("{}: recipe not found in {}", name, session.recipes.dir().display());
    }

    println!();
    match (&installed, &registry) {
        (Some(record), Some(registry)) => {
            print_install(record);
            if show_files {
                let files = registry.files(record)?;
                println!("  Files ({}):", files.len());
                for file in &files {
                    println!("    {} [{}]", file.path, file.kind.as_str());
                }
            }
        }
        _ => println!("Not installed"),
    }
    Ok(())
}

fn print_recipe(recipe: &Recipe) {
    println!("{} {}", recipe.name, recipe.version().unwrap_or_else(|| "(unknown version)".into()));
    if let Some(desc) = &recipe.desc {
        println!("  {}", desc);
    }
    if let Some(homepage) = &recipe.homepage {
        println!("  Homepage: {}", homepage);
    }
    if let Some(license) = &recipe.license {
        println!("  License: {}", license);
    }
    println!("  Source: {}", recipe.url);
    println!("  sha256: {}", recipe.sha256);

    if let Some(install) = &recipe.install {
        println!("  Builder: {}", install.builder.name());
    }
    if !recipe.depends_on.is_empty() {
        let deps: Vec<String> = recipe
            .depends_on
            .iter()
            .map(|d| format!("{} ({})", d.name, d.scope))
            .collect();
        println!("  Dependencies: {}", deps.join(", "));
    }
    println!("  Smoke test: {} assertion(s)", recipe.test.len());
}

fn print_install(record: &InstalledRecipe) {
    println!("Installed: {} {}", record.name, record.version);
    println!("  Prefix: {}", record.prefix);
    println!("  Builder: {}", record.builder);
    println!("  Source checksum: {}", record.checksum);
    println!("  Installed at: {}", record.installed_at);
    match &record.tested_at {
        Some(at) => println!("  Tests: {} ({})", record.test_status.as_str(), at),
        None => println!("  Tests: {}", record.test_status.as_str()),
    }
    if let Some(path) = &record.recipe_path {
        println!("  Recipe file: {}", path);
    }
}
