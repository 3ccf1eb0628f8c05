// src/commands/check.rs
//! Check command - parse and validate recipes

use super::Session;
use anyhow::{Context, Result};
use potluck::Registry;
use potluck::resolver::DependencyResolver;

/// Validate recipes, optionally checking their dependencies too
///
/// With no recipes given, every recipe in the recipe directory is checked.
pub fn cmd_check(session: Session, specs: &[String], deps: bool) -> Result<()> {
    let specs: Vec<String> = if specs.is_empty() {
        session.recipes.list()?
    } else {
        specs.to_vec()
    };
    if specs.is_empty() {
        println!("No recipes found in {}", session.recipes.dir().display());
        return Ok(());
    }

    let resolver = if deps {
        let db_path = session.config.layout().db_path();
        let installed = if db_path.exists() {
            Registry::open(&db_path)?.installed_names()?
        } else {
            Vec::new()
        };
        Some(DependencyResolver::standard(&session.config, installed))
    } else {
        None
    };

    let mut first_error: Option<anyhow::Error> = None;
    let mut failed = 0;
    for spec in &specs {
        let result = session.load_recipe(spec).and_then(|loaded| {
            if let Some(resolver) = &resolver {
                resolver
                    .ensure(&loaded.recipe)
                    .with_context(|| format!("Dependency check failed for {}", loaded.recipe.name))?;
            }
            Ok(loaded)
        });

        match result {
            Ok(loaded) => {
                if loaded.warnings.is_empty() {
                    println!("[OK] {}", loaded.recipe.name);
                } else {
                    println!("[OK] {} ({} warning(s))", loaded.recipe.name, loaded.warnings.len());
                    for warning in &loaded.warnings {
                        println!("  Warning: {}", warning);
                    }
                }
            }
            Err(e) => {
                failed += 1;
                println!("[FAILED] {}: {:#}", spec, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e.context(format!("{} of {} recipe(s) failed validation", failed, specs.len()))),
        None => Ok(()),
    }
}
