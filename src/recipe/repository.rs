// src/recipe/repository.rs

//! A directory of recipes, looked up by name

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::parser::{is_valid_name, load_recipe};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A recipe together with where it came from and its validation warnings
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub recipe: Recipe,
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Recipes stored as `<dir>/<name>.toml`
///
/// The file stem must equal the recipe's `name`, which keeps names unique
/// within one repository.
#[derive(Debug, Clone)]
pub struct RecipeRepository {
    dir: PathBuf,
}

impl RecipeRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a CLI argument: an existing file path, or a recipe name
    pub fn locate(&self, spec: &str) -> Result<PathBuf> {
        let as_path = Path::new(spec);
        if spec.ends_with(".toml") || spec.contains(std::path::MAIN_SEPARATOR) {
            if as_path.is_file() {
                return Ok(as_path.to_path_buf());
            }
            return Err(Error::NotFound(format!("Recipe file not found: {}", spec)));
        }

        if !is_valid_name(spec) {
            return Err(Error::ParseError(format!("Invalid recipe name: {}", spec)));
        }

        let path = self.dir.join(format!("{spec}.toml"));
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(format!(
                "No recipe named {} in {}",
                spec,
                self.dir.display()
            )))
        }
    }

    /// Locate, parse and validate a recipe
    pub fn load(&self, spec: &str) -> Result<LoadedRecipe> {
        let path = self.locate(spec)?;
        load_recipe_path(&path)
    }

    /// Names of all recipes in the repository, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Load a recipe file, enforcing that a repository-style file stem matches `name`
pub fn load_recipe_path(path: &Path) -> Result<LoadedRecipe> {
    debug!("Loading recipe {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e))
    })?;
    let (recipe, warnings) = load_recipe(&content)?;

    if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        && stem != recipe.name
    {
        return Err(Error::ParseError(format!(
            "Recipe file {} declares name {}; the file must be named {}.toml",
            path.display(),
            recipe.name,
            recipe.name
        )));
    }

    Ok(LoadedRecipe {
        recipe,
        path: path.to_path_buf(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_recipe(dir: &Path, file: &str, name: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(
            &path,
            format!(
                r#"
name = "{name}"
url = "https://example.com/{name}-1.0.tar.gz"
sha256 = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
"#
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_load_by_name_and_path() {
        let dir = TempDir::new().unwrap();
        let path = write_recipe(dir.path(), "spread.toml", "spread");
        let repo = RecipeRepository::new(dir.path());

        let by_name = repo.load("spread").unwrap();
        assert_eq!(by_name.recipe.name, "spread");
        assert_eq!(by_name.path, path);

        let by_path = repo.load(path.to_str().unwrap()).unwrap();
        assert_eq!(by_path.recipe.name, "spread");
    }

    #[test]
    fn test_missing_recipe() {
        let dir = TempDir::new().unwrap();
        let repo = RecipeRepository::new(dir.path());
        assert!(matches!(repo.load("nope"), Err(Error::NotFound(_))));
        assert!(matches!(repo.load("bad name"), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_file_stem_must_match_name() {
        let dir = TempDir::new().unwrap();
        write_recipe(dir.path(), "other.toml", "spread");
        let repo = RecipeRepository::new(dir.path());
        assert!(matches!(repo.load("other"), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_list() {
        let dir = TempDir::new().unwrap();
        write_recipe(dir.path(), "b.toml", "b");
        write_recipe(dir.path(), "a.toml", "a");
        fs::write(dir.path().join("README.md"), "not a recipe").unwrap();

        let repo = RecipeRepository::new(dir.path());
        assert_eq!(repo.list().unwrap(), vec!["a", "b"]);

        let empty = RecipeRepository::new(dir.path().join("missing"));
        assert!(empty.list().unwrap().is_empty());
    }
}
