// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are flat TOML files modelled on package-manager formulas: package
//! metadata at the top level, followed by dependencies, an `[install]`
//! procedure and a list of `[[test]]` assertions.

use crate::hash::{Checksum, HashError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// A complete recipe for installing one package
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package name, unique within a recipe repository
    pub name: String,

    /// One-line description
    #[serde(default)]
    pub desc: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    /// Source archive URL (https, http, or file)
    pub url: String,

    /// SHA-256 of the source archive (bare hex or `sha256:` prefixed)
    pub sha256: String,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Explicit version; derived from the URL when absent
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<Dependency>,

    #[serde(default)]
    pub install: Option<InstallSection>,

    /// Post-install smoke test
    #[serde(default)]
    pub test: Vec<Assertion>,
}

impl Recipe {
    /// Resolved version: the explicit `version`, or one parsed out of the URL
    pub fn version(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| version_from_url(&self.url))
    }

    /// Parsed source checksum
    pub fn checksum(&self) -> Result<Checksum, HashError> {
        Checksum::parse(&self.sha256)
    }

    /// Get the archive filename from the URL
    pub fn archive_filename(&self) -> String {
        archive_filename(&self.url)
    }

    /// Dependencies that must be present to build
    pub fn build_deps(&self) -> Vec<&Dependency> {
        self.depends_on
            .iter()
            .filter(|d| d.scope == DependencyScope::Build)
            .collect()
    }

    /// Dependencies that must be present at run time
    pub fn run_deps(&self) -> Vec<&Dependency> {
        self.depends_on
            .iter()
            .filter(|d| d.scope == DependencyScope::Run)
            .collect()
    }

    /// Substitute `{variable}` placeholders in a template
    ///
    /// Unknown placeholders are left untouched so shell braces such as
    /// `${HOME}` survive.
    pub fn substitute(&self, template: &str, vars: &Substitutions) -> String {
        let mut result = template.to_string();
        for (key, value) in vars.pairs() {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        result
    }
}

/// Values available to `{variable}` placeholders in steps and tests
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    pub name: String,
    pub version: String,
    /// Install prefix for this recipe version
    pub prefix: String,
    /// `<prefix>/bin`
    pub bin: String,
    /// Unpacked source directory
    pub source: String,
    pub jobs: String,
}

impl Substitutions {
    fn pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("name", &self.name),
            ("version", &self.version),
            ("prefix", &self.prefix),
            ("bin", &self.bin),
            ("source", &self.source),
            ("jobs", &self.jobs),
        ]
    }
}

/// Get the archive filename from a URL or path
pub fn archive_filename(url: &str) -> String {
    url.trim_end_matches('/')
        .split('/')
        .next_back()
        .filter(|s| !s.is_empty())
        .unwrap_or("source.tar.gz")
        .to_string()
}

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.zst", ".tzst", ".tar", ".gz",
];

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+(?:-[0-9A-Za-z.]+)?").expect("valid regex"));

/// Derive a version from the archive name (`.../v0.1.0.tar.gz` → `0.1.0`)
pub fn version_from_url(url: &str) -> Option<String> {
    let filename = archive_filename(url);
    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))
        .unwrap_or(&filename);

    VERSION_RE
        .find_iter(stem)
        .last()
        .map(|m| m.as_str().to_string())
}

/// When a dependency must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    /// Needed only while building
    Build,
    /// Needed by the installed artifact
    #[default]
    Run,
}

impl DependencyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyScope::Build => "build",
            DependencyScope::Run => "run",
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(DependencyScope::Build),
            "run" | "runtime" => Ok(DependencyScope::Run),
            _ => Err(format!("Invalid dependency scope: {} (expected build or run)", s)),
        }
    }
}

/// A named reference to another recipe or a system-provided tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DependencyRepr")]
pub struct Dependency {
    pub name: String,
    pub scope: DependencyScope,
}

impl Dependency {
    pub fn new(name: impl Into<String>, scope: DependencyScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn build(name: impl Into<String>) -> Self {
        Self::new(name, DependencyScope::Build)
    }

    pub fn run(name: impl Into<String>) -> Self {
        Self::new(name, DependencyScope::Run)
    }
}

/// Accepted spellings: `"rust:build"`, `"openssl"`, `{ name = "rust", scope = "build" }`
#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Short(String),
    Full {
        name: String,
        #[serde(default)]
        scope: DependencyScope,
    },
}

impl TryFrom<DependencyRepr> for Dependency {
    type Error = String;

    fn try_from(repr: DependencyRepr) -> Result<Self, Self::Error> {
        match repr {
            DependencyRepr::Full { name, scope } => Ok(Self { name, scope }),
            DependencyRepr::Short(s) => match s.split_once(':') {
                Some((name, scope)) => Ok(Self {
                    name: name.to_string(),
                    scope: scope.parse()?,
                }),
                None => Ok(Self::run(s)),
            },
        }
    }
}

/// Install procedure: the build-tool family plus shared settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSection {
    #[serde(flatten)]
    pub builder: BuildSystem,

    /// Environment variables set for every step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory within the unpacked source (relative path)
    #[serde(default)]
    pub workdir: Option<String>,
}

/// Build-tool family, selected by the `builder` key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "builder", rename_all = "lowercase")]
pub enum BuildSystem {
    /// `cargo install` from a path inside the source tree
    Cargo(CargoBuild),
    /// Arbitrary shell steps
    Script(ScriptBuild),
    /// Prebuilt executables copied out of the archive
    Archive(ArchiveBuild),
}

impl BuildSystem {
    pub fn name(&self) -> &'static str {
        match self {
            BuildSystem::Cargo(_) => "cargo",
            BuildSystem::Script(_) => "script",
            BuildSystem::Archive(_) => "archive",
        }
    }

    /// Tool the builder itself invokes, if any
    pub fn required_tool(&self) -> Option<&'static str> {
        match self {
            BuildSystem::Cargo(_) => Some("cargo"),
            BuildSystem::Script(_) => Some("sh"),
            BuildSystem::Archive(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CargoBuild {
    /// Crate path relative to the source root
    #[serde(default = "default_cargo_path")]
    pub path: String,

    #[serde(default)]
    pub features: Vec<String>,

    /// Restrict to these binaries (all when empty)
    #[serde(default)]
    pub bins: Vec<String>,

    /// Pass `--locked`
    #[serde(default = "default_true")]
    pub locked: bool,
}

fn default_cargo_path() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptBuild {
    /// Shell command lines, run in order with `sh -c`
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveBuild {
    /// Executables inside the unpacked archive, relative to its root
    pub bins: Vec<String>,
}

/// One smoke-test assertion against a command's output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assertion {
    /// Command line, run with `sh -c`; supports `{bin}` and friends
    pub run: String,

    /// Substring that must appear in stdout or stderr
    #[serde(default)]
    pub expect: Option<String>,

    /// Regular expression that must match stdout or stderr
    #[serde(default)]
    pub regex: Option<String>,

    /// Required exit status
    #[serde(default)]
    pub status: i32,
}
