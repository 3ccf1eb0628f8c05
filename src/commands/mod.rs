// src/commands/mod.rs
//! Command handlers for the potluck CLI

mod check;
mod fetch;
mod info;
mod init;
mod install;
mod list;
mod test;
mod uninstall;

pub use check::cmd_check;
pub use fetch::cmd_fetch;
pub use info::cmd_info;
pub use init::cmd_init;
pub use install::cmd_install;
pub use list::cmd_list;
pub use test::cmd_test;
pub use uninstall::cmd_uninstall;

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use potluck::{Config, LoadedRecipe, RecipeRepository};

/// Configuration and recipe lookup shared by every command
pub struct Session {
    pub config: Config,
    pub recipes: RecipeRepository,
}

impl Session {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let config = Config::load(global.root.as_deref(), global.config.as_deref())
            .context("Failed to load configuration")?;
        let recipe_dir = global
            .recipe_dir
            .clone()
            .unwrap_or_else(|| config.layout().recipes_dir());

        Ok(Self {
            config,
            recipes: RecipeRepository::new(recipe_dir),
        })
    }

    /// Load and validate a recipe by name or path
    pub fn load_recipe(&self, spec: &str) -> Result<LoadedRecipe> {
        self.recipes
            .load(spec)
            .with_context(|| format!("Failed to load recipe '{}'", spec))
    }
}
