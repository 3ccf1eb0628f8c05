// src/build/builders.rs

//! The builder families a recipe can select

use super::{BuildContext, Builder};
use crate::error::{Error, Result};
use crate::recipe::{ArchiveBuild, BuildSystem, CargoBuild, ScriptBuild};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Pick the builder for a recipe's install procedure
pub fn builder_for(system: &BuildSystem) -> Box<dyn Builder> {
    match system {
        BuildSystem::Cargo(spec) => Box::new(CargoBuilder::new(spec.clone())),
        BuildSystem::Script(spec) => Box::new(ScriptBuilder::new(spec.clone())),
        BuildSystem::Archive(spec) => Box::new(ArchiveBuilder::new(spec.clone())),
    }
}

/// `cargo install` of a crate inside the source tree
pub struct CargoBuilder {
    spec: CargoBuild,
}

impl CargoBuilder {
    pub fn new(spec: CargoBuild) -> Self {
        Self { spec }
    }

    /// Arguments after `cargo`
    fn args(&self, crate_dir: &Path, prefix: &Path, jobs: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "install".into(),
            "--root".into(),
            prefix.into(),
            "--path".into(),
            crate_dir.into(),
            "--no-track".into(),
            "--jobs".into(),
            jobs.to_string().into(),
        ];
        if self.spec.locked {
            args.push("--locked".into());
        }
        if !self.spec.features.is_empty() {
            args.push("--features".into());
            args.push(self.spec.features.join(",").into());
        }
        for bin in &self.spec.bins {
            args.push("--bin".into());
            args.push(bin.into());
        }
        args
    }
}

impl Builder for CargoBuilder {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let crate_dir = ctx.workdir.join(&self.spec.path);
        if !crate_dir.join("Cargo.toml").is_file() {
            return Err(Error::BuildError {
                step: "cargo install".to_string(),
                message: format!("no Cargo.toml in {}", crate_dir.display()),
            });
        }

        let mut cmd = Command::new("cargo");
        cmd.args(self.args(&crate_dir, &ctx.prefix, ctx.jobs))
            .current_dir(&ctx.workdir)
            .env("CARGO_TARGET_DIR", ctx.scratch_dir.join("target"));

        ctx.log.line(&format!("$ cargo install --path {}", crate_dir.display()));
        ctx.run("cargo install", cmd)
    }
}

/// Shell steps, run in order until one fails
pub struct ScriptBuilder {
    spec: ScriptBuild,
}

impl ScriptBuilder {
    pub fn new(spec: ScriptBuild) -> Self {
        Self { spec }
    }
}

impl Builder for ScriptBuilder {
    fn name(&self) -> &'static str {
        "script"
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        for (i, step) in self.spec.steps.iter().enumerate() {
            ctx.run_shell(&format!("step {}", i + 1), step)?;
        }
        Ok(())
    }
}

/// Prebuilt executables copied into `<prefix>/bin`
pub struct ArchiveBuilder {
    spec: ArchiveBuild,
}

impl ArchiveBuilder {
    pub fn new(spec: ArchiveBuild) -> Self {
        Self { spec }
    }
}

impl Builder for ArchiveBuilder {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let bin_dir = ctx.prefix.join("bin");
        fs::create_dir_all(&bin_dir)?;

        for rel in &self.spec.bins {
            let src = ctx.workdir.join(rel);
            let copy_error = |message: String| Error::BuildError {
                step: format!("copy {}", rel),
                message,
            };

            if !src.is_file() {
                return Err(copy_error(format!("{} not found in archive", rel)));
            }
            let file_name = src
                .file_name()
                .ok_or_else(|| copy_error(format!("{} has no file name", rel)))?;
            let dest = bin_dir.join(file_name);

            fs::copy(&src, &dest).map_err(|e| copy_error(e.to_string()))?;
            fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
                .map_err(|e| copy_error(e.to_string()))?;

            info!("Installed {}", dest.display());
            ctx.log.line(&format!("Copied {} -> {}", src.display(), dest.display()));
        }
        Ok(())
    }
}
