// src/commands/install.rs
//! Install command - fetch, verify, build, install and smoke-test recipes

use super::Session;
use anyhow::{Context, Result};
use potluck::{InstallOptions, InstallOutcome, InstallReport, Installer, LoadedRecipe};
use std::collections::HashSet;
use tracing::info;

/// Install one or more recipes
///
/// # Arguments
/// * `specs` - Recipe names or paths
/// * `opts` - Force/test/fail-fast switches
/// * `jobs` - Recipes installed in parallel
/// * `keep_builddir` - Keep build directories for debugging
/// * `progress` - Show download progress bars
pub fn cmd_install(
    session: Session,
    specs: &[String],
    opts: InstallOptions,
    jobs: usize,
    keep_builddir: bool,
    progress: bool,
) -> Result<()> {
    // Parse everything up front so a bad recipe fails before any download
    let mut recipes: Vec<LoadedRecipe> = Vec::with_capacity(specs.len());
    let mut seen = HashSet::new();
    for spec in specs {
        let loaded = session.load_recipe(spec)?;
        if seen.insert(loaded.recipe.name.clone()) {
            recipes.push(loaded);
        } else {
            info!("Skipping duplicate recipe {}", loaded.recipe.name);
        }
    }

    let mut config = session.config;
    config.keep_builddir |= keep_builddir;
    config.progress |= progress;
    let installer = Installer::new(config).context("Failed to set up installer")?;

    if let [loaded] = recipes.as_slice() {
        let registry = installer
            .open_registry()
            .context("Failed to open registry")?;
        let report = installer.install(&registry, loaded, &opts)?;
        print_report(&report);
        return Ok(());
    }

    println!("Installing {} recipes ({} at a time)", recipes.len(), jobs.max(1));
    let results = installer.install_many(&recipes, &opts, jobs)?;
    let total = results.len();

    let mut first_error = None;
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(report) => print_report(&report),
            Err(e) => {
                failed += 1;
                println!("[FAILED] {}: {}", name, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e).with_context(|| format!("{} of {} installs failed", failed, total)),
        None => {
            println!("\nInstalled {} recipe(s)", total);
            Ok(())
        }
    }
}

fn print_report(report: &InstallReport) {
    match report.outcome {
        InstallOutcome::AlreadyInstalled => {
            println!(
                "{} {} is already installed (use --force to reinstall)",
                report.name, report.version
            );
            return;
        }
        InstallOutcome::Reinstalled => {
            println!("[OK] Reinstalled {} {}", report.name, report.version);
        }
        InstallOutcome::Installed => {
            println!("[OK] Installed {} {}", report.name, report.version);
        }
    }

    println!("  Prefix: {}", report.prefix.display());
    for link in &report.linked {
        println!("  Linked: {}", link.display());
    }

    match &report.test_report {
        None => println!("  Smoke test: skipped"),
        Some(tests) if tests.passed() => {
            println!("  Smoke test: passed ({} assertion(s))", tests.results.len());
        }
        Some(tests) => {
            println!(
                "  Smoke test: FAILED ({} of {} assertion(s))",
                tests.failed().count(),
                tests.results.len()
            );
            for line in tests.failure_summary().lines() {
                println!("    {}", line);
            }
        }
    }

    for warning in &report.warnings {
        println!("  Warning: {}", warning);
    }
}
