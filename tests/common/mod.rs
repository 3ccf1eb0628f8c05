// tests/common/mod.rs

//! Shared helpers for integration tests: scratch roots, in-test source
//! archives and recipe files.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use potluck::hash::sha256;
use potluck::{Config, LoadedRecipe, RecipeRepository};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A scratch install root with a recipe directory and a source directory
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn recipe_dir(&self) -> PathBuf {
        self.dir.path().join("recipes")
    }

    pub fn sources(&self) -> PathBuf {
        self.dir.path().join("sources")
    }

    /// Configuration with short timeouts and no retry delay
    pub fn config(&self) -> Config {
        let mut config = Config::with_root(self.root());
        config.fetch_attempts = 1;
        config.retry_delay = Duration::from_millis(10);
        config.build_timeout = Duration::from_secs(60);
        config.test_timeout = Duration::from_secs(30);
        config.jobs = 1;
        config
    }

    pub fn repository(&self) -> RecipeRepository {
        RecipeRepository::new(self.recipe_dir())
    }

    /// Write a tool's source archive and a recipe for it; returns the loaded recipe
    pub fn add_tool(&self, tool: &Tool) -> LoadedRecipe {
        let (archive, digest) = source_archive(&self.sources(), &tool.name, &tool.version, &tool.script);
        let sha = tool.sha256.clone().unwrap_or(digest);
        write_recipe(&self.recipe_dir(), tool, &format!("file://{}", archive.display()), &sha);
        self.repository().load(&tool.name).unwrap()
    }

    pub fn bin(&self, name: &str) -> PathBuf {
        self.root().join("bin").join(name)
    }

    pub fn keg(&self, name: &str, version: &str) -> PathBuf {
        self.root().join("cellar").join(name).join(version)
    }
}

/// Description of a fake tool and its recipe
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub version: String,
    /// Body of the installed shell script
    pub script: String,
    /// Overrides the real archive digest
    pub sha256: Option<String>,
    /// Extra `depends_on` entries
    pub depends_on: Vec<String>,
    /// Extra build steps run before the install step
    pub pre_steps: Vec<String>,
    /// Extra build steps run after the install step
    pub post_steps: Vec<String>,
    /// Substring the smoke test expects; `None` writes no test
    pub expect: Option<String>,
}

impl Tool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            script: format!("echo 'Usage: {name} [OPTIONS]'"),
            sha256: None,
            depends_on: Vec::new(),
            pre_steps: Vec::new(),
            post_steps: Vec::new(),
            expect: Some(name.to_string()),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.script = script.to_string();
        self
    }

    pub fn sha256(mut self, sha256: &str) -> Self {
        self.sha256 = Some(sha256.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.depends_on.push(dep.to_string());
        self
    }

    pub fn pre_step(mut self, step: &str) -> Self {
        self.pre_steps.push(step.to_string());
        self
    }

    pub fn post_step(mut self, step: &str) -> Self {
        self.post_steps.push(step.to_string());
        self
    }

    pub fn without_test(mut self) -> Self {
        self.expect = None;
        self
    }
}

/// Build `<dir>/<name>-<version>.tar.gz` holding `<name>-<version>/<name>`
///
/// Returns the archive path and its SHA-256.
pub fn source_archive(dir: &Path, name: &str, version: &str, body: &str) -> (PathBuf, String) {
    fs::create_dir_all(dir).unwrap();
    let script = format!("#!/bin/sh\n{body}\n");

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{name}-{version}/{name}"), script.as_bytes())
        .unwrap();
    let bytes = builder.into_inner().unwrap().finish().unwrap();

    let path = dir.join(format!("{name}-{version}.tar.gz"));
    fs::write(&path, &bytes).unwrap();
    (path, sha256(&bytes))
}

/// Write `<dir>/<name>.toml` with a script builder that installs the tool
pub fn write_recipe(dir: &Path, tool: &Tool, url: &str, sha: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();

    let deps: Vec<String> = tool.depends_on.iter().map(|d| format!("{d:?}")).collect();
    let mut steps: Vec<String> = tool.pre_steps.iter().map(|s| format!("{s:?}")).collect();
    steps.push(format!("{:?}", "mkdir -p {bin}"));
    steps.push(format!("{:?}", format!("cp {} {{bin}}/{}", tool.name, tool.name)));
    steps.extend(tool.post_steps.iter().map(|s| format!("{s:?}")));

    let mut content = format!(
        r#"name = "{name}"
desc = "Test tool {name}"
homepage = "https://example.com/{name}"
url = "{url}"
sha256 = "{sha}"
license = "MIT"
version = "{version}"
depends_on = [{deps}]

[install]
builder = "script"
steps = [{steps}]
"#,
        name = tool.name,
        version = tool.version,
        deps = deps.join(", "),
        steps = steps.join(", "),
    );

    if let Some(expect) = &tool.expect {
        content.push_str(&format!(
            r#"
[[test]]
run = "{{bin}}/{name} --help"
expect = "{expect}"
"#,
            name = tool.name
        ));
    }

    let path = dir.join(format!("{}.toml", tool.name));
    fs::write(&path, content).unwrap();
    path
}
