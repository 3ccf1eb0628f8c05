// src/recipe/parser.rs

//! Recipe file parsing and validation

use crate::error::{Error, Result};
use crate::recipe::format::{BuildSystem, Recipe};
use std::collections::HashSet;
use std::path::Path;

/// Parse a recipe from a TOML string (syntax and required fields only)
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e))
    })?;

    parse_recipe(&content)
}

/// Parse and validate; returns the recipe with its warnings
pub fn load_recipe(content: &str) -> Result<(Recipe, Vec<String>)> {
    let recipe = parse_recipe(content)?;
    let warnings = validate_recipe(&recipe)?;
    Ok((recipe, warnings))
}

/// Whether a name is usable as a package name and file stem
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}

/// Whether a version is usable as a single keg directory name
pub fn is_valid_version(version: &str) -> bool {
    is_valid_name(version)
}

/// Relative paths inside the unpacked source must not escape it
fn check_relative(what: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    if path.is_empty()
        || p.is_absolute()
        || p.components().any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(Error::ParseError(format!(
            "{} must stay inside the source tree: {:?}",
            what, path
        )));
    }
    Ok(())
}

/// Validate a recipe for completeness and correctness
///
/// Hard problems are returned as `ParseError`; soft ones as warnings.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.name.is_empty() {
        return Err(Error::ParseError("Recipe name cannot be empty".to_string()));
    }
    if !is_valid_name(&recipe.name) {
        return Err(Error::ParseError(format!(
            "Invalid recipe name: {} (allowed: letters, digits, '.', '_', '+', '-')",
            recipe.name
        )));
    }

    if recipe.url.is_empty() {
        return Err(Error::ParseError("Recipe url cannot be empty".to_string()));
    }
    if !(recipe.url.starts_with("https://")
        || recipe.url.starts_with("http://")
        || recipe.url.starts_with("file://")
        || recipe.url.starts_with('/'))
    {
        return Err(Error::ParseError(format!(
            "Unsupported source URL: {} (expected https://, http://, file:// or an absolute path)",
            recipe.url
        )));
    }

    recipe.checksum().map_err(|e| {
        Error::ParseError(format!("Invalid sha256 '{}': {}", recipe.sha256, e))
    })?;

    match recipe.version() {
        Some(v) if is_valid_version(&v) => {}
        Some(v) if !v.is_empty() => {
            return Err(Error::ParseError(format!(
                "Invalid version of {}: {:?} (allowed: letters, digits, '.', '_', '+', '-'; no leading '.')",
                recipe.name, v
            )));
        }
        _ => {
            return Err(Error::ParseError(format!(
                "Cannot determine version of {} from its url; set `version`",
                recipe.name
            )));
        }
    }

    let mut seen = HashSet::new();
    for dep in &recipe.depends_on {
        if dep.name.is_empty() {
            return Err(Error::ParseError("Dependency name cannot be empty".to_string()));
        }
        if !seen.insert(dep.name.as_str()) {
            return Err(Error::ParseError(format!(
                "Duplicate dependency: {}",
                dep.name
            )));
        }
        if dep.name == recipe.name {
            return Err(Error::ParseError(format!(
                "Recipe {} depends on itself",
                recipe.name
            )));
        }
    }

    match &recipe.install {
        None => warnings.push("No install procedure specified".to_string()),
        Some(install) => match &install.builder {
            BuildSystem::Script(script) => {
                if script.steps.is_empty() || script.steps.iter().any(|s| s.trim().is_empty()) {
                    return Err(Error::ParseError(
                        "Script builder needs at least one non-empty step".to_string(),
                    ));
                }
            }
            BuildSystem::Archive(archive) => {
                if archive.bins.is_empty() {
                    return Err(Error::ParseError(
                        "Archive builder needs at least one entry in bins".to_string(),
                    ));
                }
            }
            BuildSystem::Cargo(cargo) => check_relative("Cargo path", &cargo.path)?,
        },
    }

    if let Some(install) = &recipe.install {
        if let Some(workdir) = &install.workdir {
            check_relative("workdir", workdir)?;
        }
        if let BuildSystem::Archive(archive) = &install.builder {
            for bin in &archive.bins {
                check_relative("Archive bin", bin)?;
            }
        }
    }

    for assertion in &recipe.test {
        if assertion.run.trim().is_empty() {
            return Err(Error::ParseError("Test command cannot be empty".to_string()));
        }
        if let Some(pattern) = &assertion.regex {
            regex::Regex::new(pattern).map_err(|e| {
                Error::ParseError(format!("Invalid test regex '{}': {}", pattern, e))
            })?;
        }
    }

    if recipe.desc.is_none() {
        warnings.push("Missing desc".to_string());
    }
    if recipe.homepage.is_none() {
        warnings.push("Missing homepage".to_string());
    }
    if recipe.license.is_none() {
        warnings.push("Missing license".to_string());
    }
    if recipe.test.is_empty() {
        warnings.push("No test assertions specified".to_string());
    }
    if recipe.url.starts_with("http://") {
        warnings.push(format!("Source is fetched over plain http: {}", recipe.url));
    }

    Ok(warnings)
}
