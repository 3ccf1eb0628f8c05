// src/config.rs

//! Installer configuration
//!
//! Defaults cover a per-user install under the platform data directory.
//! A `config.toml` in the root (or a file passed with `--config`) overrides
//! individual fields; anything it leaves out keeps its default.

use crate::error::{Error, Result};
use crate::paths::Layout;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable that overrides the default root
pub const ROOT_ENV: &str = "POTLUCK_ROOT";

/// Default timeout for a single HTTP request (30 seconds)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of download attempts before giving up
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default timeout for a single build step (1 hour)
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default timeout for a single smoke-test command
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime configuration for every operation
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the install tree
    pub root: PathBuf,
    /// Timeout for each HTTP request
    pub fetch_timeout: Duration,
    /// Maximum download attempts for retryable failures
    pub fetch_attempts: u32,
    /// Base delay between download attempts (grows linearly)
    pub retry_delay: Duration,
    /// Timeout for each build step
    pub build_timeout: Duration,
    /// Timeout for each smoke-test command
    pub test_timeout: Duration,
    /// Parallel jobs passed to build tools
    pub jobs: u32,
    /// Dependency name to executable name (e.g. `rust` is satisfied by `cargo`)
    pub tool_aliases: HashMap<String, String>,
    /// Keep the build directory after completion (for debugging)
    pub keep_builddir: bool,
    /// Show download progress bars
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        Self {
            root: default_root(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            retry_delay: Duration::from_millis(1000),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            jobs,
            tool_aliases: default_aliases(),
            keep_builddir: false,
            progress: false,
        }
    }
}

fn default_root() -> PathBuf {
    if let Ok(root) = std::env::var(ROOT_ENV)
        && !root.is_empty()
    {
        return PathBuf::from(root);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/usr/local/var"))
        .join("potluck")
}

fn default_aliases() -> HashMap<String, String> {
    [("rust", "cargo"), ("go", "go"), ("python", "python3")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// On-disk form of the configuration; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    root: Option<PathBuf>,
    fetch_timeout_secs: Option<u64>,
    fetch_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    build_timeout_secs: Option<u64>,
    test_timeout_secs: Option<u64>,
    jobs: Option<u32>,
    keep_builddir: Option<bool>,
    progress: Option<bool>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

impl Config {
    /// Configuration rooted at `root` with default settings
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration
    ///
    /// `root` overrides the default root. `file` names an explicit config
    /// file, which must exist; otherwise `<root>/config.toml` is read if present.
    pub fn load(root: Option<&Path>, file: Option<&Path>) -> Result<Self> {
        let mut config = match root {
            Some(root) => Self::with_root(root),
            None => Self::default(),
        };

        let path = match file {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => {
                let candidate = config.layout().config_path();
                candidate.exists().then_some(candidate)
            }
        };

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            config.merge_str(&content, root.is_some())?;
        }

        if config.fetch_attempts == 0 {
            return Err(Error::Config("fetch_attempts must be at least 1".into()));
        }
        if config.jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".into()));
        }

        Ok(config)
    }

    /// Overlay fields from TOML text; an explicit CLI root beats the file's root
    fn merge_str(&mut self, content: &str, keep_root: bool) -> Result<()> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e.message())))?;

        if let Some(root) = file.root
            && !keep_root
        {
            self.root = root;
        }
        if let Some(secs) = file.fetch_timeout_secs {
            self.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.fetch_attempts {
            self.fetch_attempts = n;
        }
        if let Some(ms) = file.retry_delay_ms {
            self.retry_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.build_timeout_secs {
            self.build_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.test_timeout_secs {
            self.test_timeout = Duration::from_secs(secs);
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
        if let Some(keep) = file.keep_builddir {
            self.keep_builddir = keep;
        }
        if let Some(progress) = file.progress {
            self.progress = progress;
        }
        self.tool_aliases.extend(file.aliases);
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    /// Commented `config.toml` showing the effective settings
    pub fn template(&self) -> String {
        let mut aliases: Vec<_> = self.tool_aliases.iter().collect();
        aliases.sort();
        let aliases: String = aliases
            .into_iter()
            .map(|(dep, tool)| format!("# {dep} = \"{tool}\"\n"))
            .collect();

        format!(
            "# potluck configuration; uncomment a setting to change it\n\
             # fetch_timeout_secs = {}\n\
             # fetch_attempts = {}\n\
             # retry_delay_ms = {}\n\
             # build_timeout_secs = {}\n\
             # test_timeout_secs = {}\n\
             # jobs = {}\n\
             # keep_builddir = {}\n\
             # progress = {}\n\
             \n\
             [aliases]\n\
             {}",
            self.fetch_timeout.as_secs(),
            self.fetch_attempts,
            self.retry_delay.as_millis(),
            self.build_timeout.as_secs(),
            self.test_timeout.as_secs(),
            self.jobs,
            self.keep_builddir,
            self.progress,
            aliases
        )
    }

    /// Executable that satisfies a dependency name
    pub fn tool_for<'a>(&'a self, dependency: &'a str) -> &'a str {
        self.tool_aliases
            .get(dependency)
            .map(String::as_str)
            .unwrap_or(dependency)
    }
}
