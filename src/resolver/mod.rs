// src/resolver/mod.rs

//! Dependency resolution for recipe installs
//!
//! Dependencies are checked, never installed: each one must already be
//! available from one of the configured locators (the installed-recipe
//! registry, or an executable on the search path). A missing build-scope
//! dependency fails the install before anything is fetched or built.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::recipe::{Dependency, DependencyScope, Recipe};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, info};

/// Something that can tell whether a dependency is present
///
/// Keeps the resolver decoupled from where packages come from, so hosts can
/// plug in other package indexes.
pub trait DependencyLocator: Send + Sync {
    /// Short label used in reports ("registry", "PATH", ...)
    fn name(&self) -> &str;

    /// Where the dependency was found, or `None` if this locator lacks it
    fn locate(&self, dep: &Dependency) -> Result<Option<String>>;
}

/// Recipes recorded as installed in the registry
pub struct InstalledLocator {
    installed: HashSet<String>,
}

impl InstalledLocator {
    pub fn new(installed: impl IntoIterator<Item = String>) -> Self {
        Self {
            installed: installed.into_iter().collect(),
        }
    }
}

impl DependencyLocator for InstalledLocator {
    fn name(&self) -> &str {
        "registry"
    }

    fn locate(&self, dep: &Dependency) -> Result<Option<String>> {
        Ok(self
            .installed
            .contains(&dep.name)
            .then(|| format!("installed recipe {}", dep.name)))
    }
}

/// Executables on a search path, with dependency-name aliases
pub struct PathLocator {
    aliases: HashMap<String, String>,
    /// Extra directories searched before `PATH`
    extra_dirs: Vec<PathBuf>,
    /// Overrides the process `PATH` (tests, sandboxed runs)
    search_path: Option<OsString>,
}

impl PathLocator {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases,
            extra_dirs: Vec::new(),
            search_path: None,
        }
    }

    pub fn with_extra_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn tool_name<'a>(&'a self, dep: &'a Dependency) -> &'a str {
        self.aliases
            .get(&dep.name)
            .map(String::as_str)
            .unwrap_or(&dep.name)
    }

    fn effective_path(&self) -> Option<OsString> {
        let base = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();

        let mut dirs: Vec<PathBuf> = self.extra_dirs.clone();
        dirs.extend(std::env::split_paths(&base));
        std::env::join_paths(dirs).ok()
    }
}

impl DependencyLocator for PathLocator {
    fn name(&self) -> &str {
        "PATH"
    }

    fn locate(&self, dep: &Dependency) -> Result<Option<String>> {
        let tool = self.tool_name(dep);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        match which::which_in(tool, self.effective_path(), cwd) {
            Ok(path) => Ok(Some(path.display().to_string())),
            Err(_) => Ok(None),
        }
    }
}

/// Outcome of checking a recipe's dependencies
#[derive(Debug, Default, Clone)]
pub struct ResolutionReport {
    /// Present dependencies and where each was found
    pub satisfied: Vec<(Dependency, String)>,
    pub missing_build: Vec<String>,
    pub missing_run: Vec<String>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.missing_build.is_empty() && self.missing_run.is_empty()
    }
}

/// Checks dependencies against an ordered list of locators
pub struct DependencyResolver {
    locators: Vec<Box<dyn DependencyLocator>>,
}

impl DependencyResolver {
    pub fn new(locators: Vec<Box<dyn DependencyLocator>>) -> Self {
        Self { locators }
    }

    /// Standard locators: the registry's installed names, then `<root>/bin`
    /// and the process `PATH`
    pub fn standard(config: &Config, installed: impl IntoIterator<Item = String>) -> Self {
        let path = PathLocator::new(config.tool_aliases.clone())
            .with_extra_dir(config.layout().bin_dir());
        Self::new(vec![
            Box::new(InstalledLocator::new(installed)),
            Box::new(path),
        ])
    }

    /// Check every dependency without failing
    pub fn check(&self, deps: &[Dependency]) -> Result<ResolutionReport> {
        let mut report = ResolutionReport::default();

        for dep in deps {
            let mut found = None;
            for locator in &self.locators {
                if let Some(location) = locator.locate(dep)? {
                    debug!("{} ({}) found via {}: {}", dep.name, dep.scope, locator.name(), location);
                    found = Some(location);
                    break;
                }
            }

            match (found, dep.scope) {
                (Some(location), _) => report.satisfied.push((dep.clone(), location)),
                (None, DependencyScope::Build) => report.missing_build.push(dep.name.clone()),
                (None, DependencyScope::Run) => report.missing_run.push(dep.name.clone()),
            }
        }

        Ok(report)
    }

    /// Check a recipe's dependencies, failing on the first missing scope
    ///
    /// Build-scope gaps are reported before run-scope gaps.
    pub fn ensure(&self, recipe: &Recipe) -> Result<ResolutionReport> {
        if recipe.depends_on.is_empty() {
            debug!("No dependencies declared for {}", recipe.name);
            return Ok(ResolutionReport::default());
        }

        let names: Vec<&str> = recipe.depends_on.iter().map(|d| d.name.as_str()).collect();
        info!("Checking dependencies of {}: {}", recipe.name, names.join(", "));

        let report = self.check(&recipe.depends_on)?;

        if !report.missing_build.is_empty() {
            return Err(Error::DependencyMissing {
                scope: DependencyScope::Build.to_string(),
                names: report.missing_build,
            });
        }
        if !report.missing_run.is_empty() {
            return Err(Error::DependencyMissing {
                scope: DependencyScope::Run.to_string(),
                names: report.missing_run,
            });
        }

        Ok(report)
    }
}
