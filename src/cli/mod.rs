// src/cli/mod.rs
//! CLI definitions for potluck
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `install` - Fetch, verify, build, install and smoke-test recipe(s)
//! - `test` - Re-run the smoke test of an installed recipe
//! - `uninstall` - Remove an installed recipe
//! - `fetch` - Download and verify a recipe's source only
//! - `check` - Parse and validate recipe(s)
//! - `list` - List installed (or available) recipes
//! - `info` - Show one recipe's metadata and install state
//! - `init` - Create the root layout and registry

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "potluck")]
#[command(author = "Potluck Contributors")]
#[command(version)]
#[command(about = "Install command-line tools from declarative recipes", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options accepted by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Install root (default: $POTLUCK_ROOT or the platform data directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file (default: <root>/config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Recipe directory used to look up recipes by name (default: <root>/recipes)
    #[arg(long, global = true)]
    pub recipe_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install recipe(s) by name or by path to a .toml file
    Install {
        /// Recipe names or paths
        #[arg(required = true)]
        recipes: Vec<String>,

        /// Rebuild even when the same version is installed
        #[arg(short, long)]
        force: bool,

        /// Do not run the smoke test after installing
        #[arg(long, conflicts_with = "strict_test")]
        skip_test: bool,

        /// Fail (exit 8) when the smoke test fails
        #[arg(long)]
        strict_test: bool,

        /// Number of recipes installed in parallel
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Stop the remaining installs after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Keep the build directory after completion (for debugging)
        #[arg(long)]
        keep_builddir: bool,

        /// Show download progress
        #[arg(long)]
        progress: bool,
    },

    /// Re-run the smoke test of an installed recipe
    Test {
        /// Recipe name or path
        recipe: String,
    },

    /// Remove an installed recipe and its links
    Uninstall {
        /// Installed recipe name
        name: String,
    },

    /// Download and verify a recipe's source without building
    Fetch {
        /// Recipe names or paths
        #[arg(required = true)]
        recipes: Vec<String>,

        /// Show download progress
        #[arg(long)]
        progress: bool,
    },

    /// Parse and validate recipe(s)
    Check {
        /// Recipe names or paths (default: every recipe in the recipe directory)
        recipes: Vec<String>,

        /// Also check that dependencies are available
        #[arg(long)]
        deps: bool,
    },

    /// List installed recipes
    List {
        /// List the recipes in the recipe directory instead
        #[arg(long)]
        available: bool,
    },

    /// Show a recipe's metadata and install state
    Info {
        /// Recipe name or path
        recipe: String,

        /// Also list installed files
        #[arg(long)]
        files: bool,
    },

    /// Create the root layout, registry and default config
    Init,
}
