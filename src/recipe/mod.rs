// src/recipe/mod.rs

//! Recipe model: how to fetch, build, install and test one package
//!
//! # Example Recipe
//!
//! ```toml
//! name = "spread"
//! desc = "Headless TOEFL Vocabulary Builder for Developers"
//! homepage = "https://github.com/nkinba/voca-agent"
//! url = "https://github.com/nkinba/voca-agent/archive/refs/tags/v0.1.0.tar.gz"
//! sha256 = "<64 hex chars>"
//! license = "MIT"
//! depends_on = ["rust:build"]
//!
//! [install]
//! builder = "cargo"
//! path = "app"
//!
//! [[test]]
//! run = "{bin}/spread --help"
//! expect = "spread"
//! ```

mod format;
pub mod parser;
mod repository;

pub use format::{
    ArchiveBuild, Assertion, BuildSystem, CargoBuild, Dependency, DependencyScope,
    InstallSection, Recipe, ScriptBuild, Substitutions, archive_filename, version_from_url,
};
pub use parser::{load_recipe, parse_recipe, parse_recipe_file, validate_recipe};
pub use repository::{LoadedRecipe, RecipeRepository, load_recipe_path};
