// src/build/mod.rs

//! Build executor: unpack a verified source and run the recipe's builder
//!
//! Every build gets a private scratch directory under `<root>/work`. The
//! builder installs into a staging prefix, which the installer promotes to
//! the real prefix only after the whole build succeeded. A failed step
//! aborts the remaining steps; its partial output is left in the staging
//! prefix and the scratch directory is discarded.

mod builders;
mod unpack;

pub use builders::{ArchiveBuilder, CargoBuilder, ScriptBuilder, builder_for};
pub use unpack::{Compression, unpack_archive};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::{CancelToken, run_command, shell};
use crate::recipe::{Recipe, Substitutions};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A build-tool family
///
/// Implementations receive a context whose working directory is the
/// unpacked source and whose prefix is the staging install directory.
pub trait Builder: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()>;
}

/// Accumulated output of one build
#[derive(Debug, Default, Clone)]
pub struct BuildLog {
    text: String,
}

impl BuildLog {
    pub fn line(&mut self, line: &str) {
        debug!("{}", line);
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn step_output(&mut self, step: &str, stdout: &str, stderr: &str) {
        self.line(&format!("=== {} ===", step));
        for chunk in [stdout, stderr] {
            if !chunk.is_empty() {
                self.text.push_str(chunk);
                if !chunk.ends_with('\n') {
                    self.text.push('\n');
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Last `n` lines, for error messages
    pub fn tail(&self, n: usize) -> String {
        tail_lines(&self.text, n)
    }
}

/// Everything a builder needs for one build
pub struct BuildContext<'a> {
    pub recipe: &'a Recipe,
    /// Directory steps run in (source root plus the recipe's `workdir`)
    pub workdir: PathBuf,
    /// Unpacked source root
    pub source_dir: PathBuf,
    /// Scratch space owned by this build
    pub scratch_dir: PathBuf,
    /// Staging install prefix
    pub prefix: PathBuf,
    pub vars: Substitutions,
    pub jobs: u32,
    env: Vec<(String, String)>,
    timeout: Duration,
    cancel: CancelToken,
    pub log: BuildLog,
}

impl BuildContext<'_> {
    /// Substitute `{prefix}`-style variables in a template
    pub fn expand(&self, template: &str) -> String {
        self.recipe.substitute(template, &self.vars)
    }

    /// Environment applied to every step
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Run one prepared command as the build step `step`
    pub fn run(&mut self, step: &str, mut cmd: Command) -> Result<()> {
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        info!("[{}] {}", self.recipe.name, step);

        let output = run_command(cmd, self.timeout, &self.cancel).map_err(|e| Error::BuildError {
            step: step.to_string(),
            message: e.to_string(),
        })?;
        self.log.step_output(step, &output.stdout, &output.stderr);

        if !output.success() {
            let tail = tail_lines(&output.stderr, 20);
            return Err(Error::BuildError {
                step: step.to_string(),
                message: if tail.is_empty() {
                    output.termination.to_string()
                } else {
                    format!("{}\n{}", output.termination, tail)
                },
            });
        }
        Ok(())
    }

    /// Run a shell command line (after substitution) in the working directory
    pub fn run_shell(&mut self, step: &str, line: &str) -> Result<()> {
        let expanded = self.expand(line);
        self.log.line(&format!("$ {}", expanded));
        let cmd = shell(&expanded, &self.workdir);
        self.run(step, cmd)
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Inputs of one build
pub struct BuildRequest<'a> {
    pub recipe: &'a Recipe,
    pub version: &'a str,
    /// Verified source archive
    pub archive: &'a Path,
    /// Where the builder installs; wiped before the build starts
    pub staging_prefix: &'a Path,
    /// Where the build log is written, on success and on failure
    pub log_path: Option<&'a Path>,
}

/// Runs builds with the configured timeout, parallelism and scratch root
#[derive(Clone)]
pub struct BuildExecutor {
    work_root: PathBuf,
    timeout: Duration,
    jobs: u32,
    keep_builddir: bool,
    cancel: CancelToken,
}

impl BuildExecutor {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            timeout: crate::config::DEFAULT_BUILD_TIMEOUT,
            jobs: 1,
            keep_builddir: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.layout().work_dir())
            .with_timeout(config.build_timeout)
            .with_jobs(config.jobs)
            .keep_builddir(config.keep_builddir)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn keep_builddir(mut self, keep: bool) -> Self {
        self.keep_builddir = keep;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Unpack and build; on success the staging prefix holds the install
    pub fn build(&self, request: &BuildRequest<'_>) -> Result<BuildLog> {
        let recipe = request.recipe;
        let install = recipe.install.as_ref().ok_or_else(|| {
            Error::ParseError(format!("Recipe {} has no install procedure", recipe.name))
        })?;

        fs::create_dir_all(&self.work_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", recipe.name, request.version))
            .tempdir_in(&self.work_root)?;

        let mut log = BuildLog::default();
        let result = self.build_in(request, install, scratch.path(), &mut log);

        if let Some(path) = request.log_path {
            write_log(path, &log);
        }

        if self.keep_builddir {
            let kept = scratch.keep();
            info!("Keeping build directory {}", kept.display());
        }

        result.map(|()| log)
    }

    fn build_in(
        &self,
        request: &BuildRequest<'_>,
        install: &crate::recipe::InstallSection,
        scratch: &Path,
        log: &mut BuildLog,
    ) -> Result<()> {
        let recipe = request.recipe;
        log.line(&format!(
            "Building {} {} with {}",
            recipe.name,
            request.version,
            install.builder.name()
        ));

        let source_dir = unpack_archive(request.archive, &scratch.join("source"))?;
        log.line(&format!("Extracted source to {}", source_dir.display()));

        let workdir = match &install.workdir {
            Some(wd) => source_dir.join(wd),
            None => source_dir.clone(),
        };
        if !workdir.is_dir() {
            return Err(Error::BuildError {
                step: "unpack".to_string(),
                message: format!("working directory {} not found in source", workdir.display()),
            });
        }

        let prefix = request.staging_prefix.to_path_buf();
        if prefix.exists() {
            warn!("Removing stale staging directory {}", prefix.display());
            fs::remove_dir_all(&prefix)?;
        }
        fs::create_dir_all(&prefix)?;

        let vars = Substitutions {
            name: recipe.name.clone(),
            version: request.version.to_string(),
            prefix: prefix.to_string_lossy().into_owned(),
            bin: prefix.join("bin").to_string_lossy().into_owned(),
            source: source_dir.to_string_lossy().into_owned(),
            jobs: self.jobs.to_string(),
        };

        let mut env = vec![
            ("PREFIX".to_string(), vars.prefix.clone()),
            ("MAKEFLAGS".to_string(), format!("-j{}", self.jobs)),
        ];
        for (key, value) in &install.env {
            env.push((key.clone(), recipe.substitute(value, &vars)));
        }

        let mut ctx = BuildContext {
            recipe,
            workdir,
            source_dir,
            scratch_dir: scratch.to_path_buf(),
            prefix,
            vars,
            jobs: self.jobs,
            env,
            timeout: self.timeout,
            cancel: self.cancel.clone(),
            log: std::mem::take(log),
        };

        let builder = builder_for(&install.builder);
        let result = builder.build(&mut ctx);
        *log = std::mem::take(&mut ctx.log);

        match &result {
            Ok(()) => log.line(&format!("{} build finished", builder.name())),
            Err(e) => log.line(&format!("{} build failed: {}", builder.name(), e)),
        }
        result
    }
}

fn write_log(path: &Path, log: &BuildLog) {
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(path, log.as_str()));
    if let Err(e) = written {
        warn!("Failed to write build log {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn source_archive(dir: &Path) -> PathBuf {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), GzLevel::default()));
        let script = b"#!/bin/sh\necho spread 0.1.0\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "spread-0.1.0/spread", &script[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let path = dir.join("source.tar.gz");
        fs::write(&path, bytes).unwrap();
        path
    }

    fn recipe(install: &str) -> Recipe {
        parse_recipe(&format!(
            r#"
name = "spread"
url = "https://example.com/spread-0.1.0.tar.gz"
sha256 = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"

{install}
"#
        ))
        .unwrap()
    }

    fn run_build(recipe: &Recipe, dir: &TempDir) -> (Result<BuildLog>, PathBuf, PathBuf) {
        let archive = source_archive(dir.path());
        let staging = dir.path().join("cellar").join("spread").join(".0.1.0.partial");
        let log_path = dir.path().join("var").join("log").join("spread.log");
        let executor = BuildExecutor::new(dir.path().join("work")).with_timeout(Duration::from_secs(30));

        let result = executor.build(&BuildRequest {
            recipe,
            version: "0.1.0",
            archive: &archive,
            staging_prefix: &staging,
            log_path: Some(&log_path),
        });
        (result, staging, log_path)
    }

    #[test]
    fn test_script_build_installs_into_staging() {
        let dir = TempDir::new().unwrap();
        let recipe = recipe(
            r#"[install]
builder = "script"
steps = ["mkdir -p {bin}", "install -m755 spread {bin}/spread", "echo built $GREETING"]
env = { GREETING = "{name}-{version}" }
"#,
        );

        let (result, staging, log_path) = run_build(&recipe, &dir);
        let log = result.unwrap();
        assert!(staging.join("bin").join("spread").is_file());
        assert!(log.as_str().contains("built spread-0.1.0"));
        assert!(fs::read_to_string(log_path).unwrap().contains("build finished"));

        // Scratch directory is cleaned up
        assert_eq!(fs::read_dir(dir.path().join("work")).unwrap().count(), 0);
    }

    #[test]
    fn test_failing_step_aborts_remaining_steps() {
        let dir = TempDir::new().unwrap();
        let recipe = recipe(
            r#"[install]
builder = "script"
steps = ["echo compiling; echo 'error: boom' >&2; exit 2", "touch {prefix}/never"]
"#,
        );

        let (result, staging, log_path) = run_build(&recipe, &dir);
        match result.unwrap_err() {
            Error::BuildError { step, message } => {
                assert_eq!(step, "step 1");
                assert!(message.contains("exit code 2"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!staging.join("never").exists());
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("compiling"));
        assert!(log.contains("build failed"));
    }

    #[test]
    fn test_step_timeout_is_build_error() {
        let dir = TempDir::new().unwrap();
        let recipe = recipe(
            r#"[install]
builder = "script"
steps = ["sleep 30"]
"#,
        );
        let archive = source_archive(dir.path());
        let staging = dir.path().join("staging");
        let executor = BuildExecutor::new(dir.path().join("work"))
            .with_timeout(Duration::from_millis(300));

        let err = executor
            .build(&BuildRequest {
                recipe: &recipe,
                version: "0.1.0",
                archive: &archive,
                staging_prefix: &staging,
                log_path: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::BuildError { ref message, .. } if message.contains("timed out")));
    }

    #[test]
    fn test_archive_builder_copies_bins() {
        let dir = TempDir::new().unwrap();
        let recipe = recipe(
            r#"[install]
builder = "archive"
bins = ["spread"]
"#,
        );

        let (result, staging, _) = run_build(&recipe, &dir);
        result.unwrap();
        let bin = staging.join("bin").join("spread");
        assert!(bin.is_file());

        use std::os::unix::fs::PermissionsExt;
        assert_eq!(fs::metadata(&bin).unwrap().permissions().mode() & 0o111, 0o111);
    }

    #[test]
    fn test_missing_workdir() {
        let dir = TempDir::new().unwrap();
        let recipe = recipe(
            r#"[install]
builder = "script"
steps = ["true"]
workdir = "app"
"#,
        );

        let (result, _, _) = run_build(&recipe, &dir);
        assert!(matches!(result, Err(Error::BuildError { ref step, .. }) if step == "unpack"));
    }

    #[test]
    fn test_stale_staging_is_replaced() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("cellar").join("spread").join(".0.1.0.partial");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("leftover"), "old").unwrap();

        let recipe = recipe(
            r#"[install]
builder = "archive"
bins = ["spread"]
"#,
        );
        let (result, staging, _) = run_build(&recipe, &dir);
        result.unwrap();
        assert!(!staging.join("leftover").exists());
    }

    #[test]
    fn test_log_tail() {
        let mut log = BuildLog::default();
        for i in 0..5 {
            log.line(&format!("line {i}"));
        }
        assert_eq!(log.tail(2), "line 3\nline 4");
    }
}
