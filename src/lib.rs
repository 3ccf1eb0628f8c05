// src/lib.rs

//! Potluck recipe installer
//!
//! Installs third-party command-line tools from declarative TOML recipes:
//! fetch the source archive, verify its SHA-256, check dependencies, build it
//! with the recipe's builder, install it under a deterministic prefix and run
//! the recipe's smoke test.
//!
//! # Architecture
//!
//! - Recipes: parsed and validated once per invocation, then discarded
//! - Registry: SQLite index of installed recipes and the files they own
//! - Prefixes: every install lives in `<root>/cellar/<name>/<version>`, with
//!   executables linked into `<root>/bin`
//! - Locks: one exclusive file lock per recipe name guards its prefix and row

pub mod build;
pub mod config;
mod error;
pub mod exec;
pub mod fetch;
pub mod hash;
pub mod paths;
pub mod pipeline;
pub mod recipe;
pub mod registry;
pub mod resolver;
pub mod smoke;

pub use config::Config;
pub use error::{
    EXIT_BUILD, EXIT_DEPENDENCY, EXIT_FETCH, EXIT_GENERIC, EXIT_INTEGRITY, EXIT_PARSE, EXIT_TEST,
    Error, Result,
};
pub use fetch::Fetcher;
pub use hash::{Checksum, HashAlgorithm};
pub use paths::Layout;
pub use pipeline::{
    InstallOptions, InstallOutcome, InstallReport, InstallStage, Installer, UninstallReport,
};
pub use recipe::{LoadedRecipe, Recipe, RecipeRepository};
pub use registry::Registry;
pub use smoke::{TestReport, TestRunner};
