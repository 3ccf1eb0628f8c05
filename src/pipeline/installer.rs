// src/pipeline/installer.rs

//! The install pipeline
//!
//! `install` drives one recipe through
//! `Parsed → DependenciesResolved → Fetched → Verified → Built → Installed →
//! Tested → Done`, halting at the first fatal error. Every error leaving this
//! module carries the recipe name and the stage that failed.

use super::link::{check_link_conflicts, inventory, link_bins, promote, unlink};
use super::stage::{InstallStage, StageTrail};
use crate::build::{BuildExecutor, BuildRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::CancelToken;
use crate::fetch::Fetcher;
use crate::hash::Checksum;
use crate::paths::Layout;
use crate::recipe::{LoadedRecipe, Recipe, Substitutions, validate_recipe};
use crate::registry::{FileKind, InstalledRecipe, PackageLock, Registry, TestStatus};
use crate::resolver::DependencyResolver;
use crate::smoke::{TestReport, TestRunner};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Knobs for one install invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Rebuild even when the same version and checksum is installed
    pub force: bool,
    /// Do not run the smoke test
    pub skip_test: bool,
    /// Treat a failing smoke test as an install failure
    pub strict_test: bool,
    /// Cancel sibling installs once one fails
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// Replaced an earlier install of the same recipe
    Reinstalled,
    /// Same version and checksum already present; nothing was done
    AlreadyInstalled,
}

/// What an install did
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub name: String,
    pub version: String,
    pub prefix: PathBuf,
    pub outcome: InstallOutcome,
    pub trail: StageTrail,
    pub warnings: Vec<String>,
    /// `None` when tests were skipped or the recipe has none
    pub test_report: Option<TestReport>,
    /// Links created in the shared `bin` directory
    pub linked: Vec<PathBuf>,
}

impl InstallReport {
    pub fn tests_passed(&self) -> Option<bool> {
        self.test_report.as_ref().map(TestReport::passed)
    }
}

/// What an uninstall removed
#[derive(Debug, Clone)]
pub struct UninstallReport {
    pub name: String,
    pub version: String,
    pub prefix: PathBuf,
    pub unlinked: usize,
}

/// Runs installs, tests and uninstalls against one root
pub struct Installer {
    config: Config,
    fetcher: Fetcher,
    executor: BuildExecutor,
    tests: TestRunner,
    cancel: CancelToken,
}

impl Installer {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Fetcher::from_config(&config)?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Installer with a caller-supplied fetcher (custom transports)
    pub fn with_fetcher(config: Config, fetcher: Fetcher) -> Self {
        let cancel = CancelToken::new();
        let executor = BuildExecutor::from_config(&config).with_cancel(cancel.clone());
        let tests = TestRunner::new(config.test_timeout).with_cancel(cancel.clone());
        Self {
            config,
            fetcher,
            executor,
            tests,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Token that stops running builds and tests when cancelled
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn open_registry(&self) -> Result<Registry> {
        Registry::open(self.layout().db_path())
    }

    /// Resolver over the registry's installed names and the search path
    pub fn resolver(&self, registry: &Registry) -> Result<DependencyResolver> {
        Ok(DependencyResolver::standard(
            &self.config,
            registry.installed_names()?,
        ))
    }

    /// Version, checksum and builder name of an installable recipe
    fn prepare(recipe: &Recipe) -> Result<(String, Checksum, &'static str)> {
        validate_recipe(recipe)?;

        let install = recipe.install.as_ref().ok_or_else(|| {
            Error::ParseError(format!("Recipe {} has no install procedure", recipe.name))
        })?;
        let version = recipe.version().ok_or_else(|| {
            Error::ParseError(format!("Cannot determine version of {}", recipe.name))
        })?;
        let checksum = recipe
            .checksum()
            .map_err(|e| Error::ParseError(format!("Invalid sha256 for {}: {}", recipe.name, e)))?;

        Ok((version, checksum, install.builder.name()))
    }

    /// Install one recipe
    pub fn install(
        &self,
        registry: &Registry,
        loaded: &LoadedRecipe,
        opts: &InstallOptions,
    ) -> Result<InstallReport> {
        let recipe = &loaded.recipe;
        let name = recipe.name.as_str();

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("install of {} was not started", name)));
        }

        let mut trail = StageTrail::new();
        let mut warnings = loaded.warnings.clone();

        let (version, checksum, builder) =
            Self::prepare(recipe).map_err(|e| e.at_stage(name, InstallStage::Parsed))?;
        trail.advance(InstallStage::Parsed);

        let layout = self.layout();
        let _lock = PackageLock::acquire(layout.lock_path(name), name)?;
        let prefix = layout.keg(name, &version);

        let existing = registry.find(name)?;
        if let Some(record) = &existing
            && !opts.force
            && record.matches(&version, &checksum.to_prefixed_string(), builder)
            && prefix.is_dir()
        {
            info!("{} {} is already installed", name, version);
            trail.advance(InstallStage::Done);
            return Ok(InstallReport {
                name: name.to_string(),
                version,
                prefix,
                outcome: InstallOutcome::AlreadyInstalled,
                trail,
                warnings,
                test_report: None,
                linked: Vec::new(),
            });
        }

        self.resolver(registry)?
            .ensure(recipe)
            .map_err(|e| e.at_stage(name, InstallStage::DependenciesResolved))?;
        trail.advance(InstallStage::DependenciesResolved);

        let archive = self.fetcher.fetch(&recipe.url, &checksum).map_err(|e| {
            let stage = match e {
                Error::IntegrityError { .. } => InstallStage::Verified,
                _ => InstallStage::Fetched,
            };
            e.at_stage(name, stage)
        })?;
        trail.advance(InstallStage::Fetched);
        trail.advance(InstallStage::Verified);

        let staging = layout.staging_keg(name, &version);
        let log_path = layout.build_log(name);
        info!("Building {} {}", name, version);
        self.executor
            .build(&BuildRequest {
                recipe,
                version: &version,
                archive: &archive,
                staging_prefix: &staging,
                log_path: Some(&log_path),
            })
            .map_err(|e| e.at_stage(name, InstallStage::Built))?;
        trail.advance(InstallStage::Built);

        let linked = self
            .install_staged(registry, loaded, &version, &checksum, builder, &staging, &prefix, existing.as_ref())
            .map_err(|e| e.at_stage(name, InstallStage::Installed))?;
        trail.advance(InstallStage::Installed);
        info!("Installed {} {} into {}", name, version, prefix.display());

        let test_report = if opts.skip_test || recipe.test.is_empty() {
            None
        } else {
            match self.run_tests(registry, recipe, &version, &prefix) {
                Ok(report) => {
                    trail.advance(InstallStage::Tested);
                    if !report.passed() {
                        if opts.strict_test {
                            return Err(report
                                .into_result()
                                .err()
                                .unwrap_or_else(|| Error::TestFailure(name.to_string()))
                                .at_stage(name, InstallStage::Tested));
                        }
                        warn!("Smoke test of {} failed; keeping the install", name);
                        warnings.push(format!(
                            "Smoke test failed ({} of {} assertions)",
                            report.failed().count(),
                            report.results.len()
                        ));
                    }
                    Some(report)
                }
                Err(e) if opts.strict_test || matches!(e, Error::Cancelled(_)) => {
                    return Err(e.at_stage(name, InstallStage::Tested));
                }
                Err(e) => {
                    warn!("Smoke test of {} could not run: {}; keeping the install", name, e);
                    warnings.push(format!("Smoke test could not run: {}", e));
                    None
                }
            }
        };

        trail.advance(InstallStage::Done);
        Ok(InstallReport {
            name: name.to_string(),
            version,
            prefix,
            outcome: if existing.is_some() {
                InstallOutcome::Reinstalled
            } else {
                InstallOutcome::Installed
            },
            trail,
            warnings,
            test_report,
            linked,
        })
    }

    /// Promote the staged build, link its executables and record it
    #[allow(clippy::too_many_arguments)]
    fn install_staged(
        &self,
        registry: &Registry,
        loaded: &LoadedRecipe,
        version: &str,
        checksum: &Checksum,
        builder: &str,
        staging: &Path,
        prefix: &Path,
        existing: Option<&InstalledRecipe>,
    ) -> Result<Vec<PathBuf>> {
        let name = loaded.recipe.name.as_str();
        let layout = self.layout();
        let bin_dir = layout.bin_dir();

        check_link_conflicts(registry, name, staging, &bin_dir, &layout.cellar().join(name))?;

        promote(staging, prefix)?;
        let linked = link_bins(prefix, &bin_dir)?;

        // The previous version goes only once the new one is live
        if let Some(old) = existing {
            let old_prefix = Path::new(&old.prefix);
            if old_prefix != prefix {
                info!("Replacing {} {}", name, old.version);
                let old_links: Vec<PathBuf> = registry
                    .files(old)?
                    .into_iter()
                    .filter(|f| f.kind == FileKind::Link)
                    .map(|f| PathBuf::from(f.path))
                    .collect();
                unlink(&old_links, old_prefix)?;
                if old_prefix.exists() {
                    fs::remove_dir_all(old_prefix)?;
                }
            }
        }

        let mut record = InstalledRecipe::new(
            name.to_string(),
            version.to_string(),
            checksum.to_prefixed_string(),
            prefix.to_string_lossy().into_owned(),
            builder.to_string(),
        );
        record.recipe_path = Some(loaded.path.to_string_lossy().into_owned());
        registry.record_install(&mut record, &inventory(prefix, &linked))?;

        Ok(linked)
    }

    fn run_tests(
        &self,
        registry: &Registry,
        recipe: &Recipe,
        version: &str,
        prefix: &Path,
    ) -> Result<TestReport> {
        let vars = Substitutions {
            name: recipe.name.clone(),
            version: version.to_string(),
            prefix: prefix.to_string_lossy().into_owned(),
            bin: prefix.join("bin").to_string_lossy().into_owned(),
            source: String::new(),
            jobs: self.config.jobs.to_string(),
        };

        info!("Testing {} {}", recipe.name, version);
        let report = self.tests.run(recipe, &vars)?;
        if report.was_cancelled() {
            // The recorded status stays as it was
            return Err(Error::Cancelled(format!("smoke test of {} was cancelled", recipe.name)));
        }

        let status = if report.is_empty() {
            TestStatus::Untested
        } else if report.passed() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        registry.set_test_status(&recipe.name, status)?;
        Ok(report)
    }

    /// Re-run the smoke test of an installed recipe
    ///
    /// Returns the report; turning failures into `TestFailure` is up to the caller.
    pub fn test_installed(&self, registry: &Registry, loaded: &LoadedRecipe) -> Result<TestReport> {
        let recipe = &loaded.recipe;
        let name = recipe.name.as_str();
        let _lock = PackageLock::acquire(self.layout().lock_path(name), name)?;

        let record = registry.get(name)?;
        if let Some(version) = recipe.version()
            && version != record.version
        {
            warn!(
                "Recipe {} is at {} but {} is installed; testing the installed version",
                name, version, record.version
            );
        }

        let prefix = PathBuf::from(&record.prefix);
        if !prefix.is_dir() {
            return Err(Error::NotFound(format!(
                "Install prefix {} of {} is missing",
                prefix.display(),
                name
            )));
        }

        self.run_tests(registry, recipe, &record.version, &prefix)
            .map_err(|e| e.at_stage(name, InstallStage::Tested))
    }

    /// Remove an installed recipe: its links, its prefix and its registry row
    pub fn uninstall(&self, registry: &Registry, name: &str) -> Result<UninstallReport> {
        let layout = self.layout();
        let _lock = PackageLock::acquire(layout.lock_path(name), name)?;

        let record = registry.get(name)?;
        let prefix = PathBuf::from(&record.prefix);
        let links: Vec<PathBuf> = registry
            .files(&record)?
            .into_iter()
            .filter(|f| f.kind == FileKind::Link)
            .map(|f| PathBuf::from(f.path))
            .collect();

        let unlinked = unlink(&links, &prefix)?;
        if prefix.exists() {
            fs::remove_dir_all(&prefix)?;
        }
        // Drop the per-name cellar directory once nothing is left in it
        let _ = fs::remove_dir(layout.cellar().join(name));

        registry.remove(name)?;
        info!("Uninstalled {} {}", name, record.version);

        Ok(UninstallReport {
            name: name.to_string(),
            version: record.version,
            prefix,
            unlinked,
        })
    }

    /// Install several recipes on a pool of `jobs` threads
    ///
    /// Each install opens its own registry connection and takes its own
    /// package lock. Results come back in input order.
    pub fn install_many(
        &self,
        recipes: &[LoadedRecipe],
        opts: &InstallOptions,
        jobs: usize,
    ) -> Result<Vec<(String, Result<InstallReport>)>> {
        // Create and migrate the database before any worker connects
        drop(self.open_registry()?);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("potluck-install-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("Failed to start install pool: {}", e)))?;

        let results = pool.install(|| {
            recipes
                .par_iter()
                .map(|loaded| {
                    let result = self
                        .open_registry()
                        .and_then(|registry| self.install(&registry, loaded, opts));
                    if let Err(e) = &result
                        && opts.fail_fast
                    {
                        warn!("{}: {}; cancelling remaining installs", loaded.recipe.name, e);
                        self.cancel.cancel();
                    }
                    (loaded.recipe.name.clone(), result)
                })
                .collect()
        });
        Ok(results)
    }
}
