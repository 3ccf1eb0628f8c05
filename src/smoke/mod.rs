// src/smoke/mod.rs

//! Post-install smoke tests
//!
//! Each assertion runs a command line against the installed artifact, in a
//! throwaway directory with the install's `bin` directory first on `PATH`,
//! and checks its output and exit status. Results are advisory: a failing
//! test never removes the install.

use crate::error::{Error, Result};
use crate::exec::{CancelToken, Termination, run_command, shell};
use crate::recipe::{Assertion, Recipe, Substitutions};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest output excerpt kept in a failed assertion
const MAX_OUTPUT_EXCERPT: usize = 4096;

/// Outcome of one assertion
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Command line after substitution
    pub command: String,
    /// `None` when the command could not be started
    pub termination: Option<Termination>,
    /// Unmet expectations; empty when the assertion passed
    pub failures: Vec<String>,
    /// Combined stdout and stderr (truncated)
    pub output: String,
}

impl AssertionResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a recipe's whole test procedure
#[derive(Debug, Clone)]
pub struct TestReport {
    pub recipe: String,
    pub results: Vec<AssertionResult>,
    /// The run was stopped by the cancel token before it finished
    pub cancelled: bool,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        !self.cancelled && self.results.iter().all(AssertionResult::passed)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    /// One line per failure, with the mismatched output
    pub fn failure_summary(&self) -> String {
        self.failed()
            .map(|r| {
                format!(
                    "`{}`: {}\n--- output ---\n{}",
                    r.command,
                    r.failures.join("; "),
                    r.output.trim_end()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `Err(TestFailure)` unless every assertion passed
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            let failed = self.failed().count();
            Err(Error::TestFailure(format!(
                "{} of {} assertions failed for {}\n{}",
                failed,
                self.results.len(),
                self.recipe,
                self.failure_summary()
            )))
        }
    }
}

/// Runs test procedures with a per-command timeout
pub struct TestRunner {
    timeout: Duration,
    cancel: CancelToken,
}

impl TestRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every assertion of `recipe` with `vars` pointing at the install
    pub fn run(&self, recipe: &Recipe, vars: &Substitutions) -> Result<TestReport> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("potluck-test-{}-", recipe.name))
            .tempdir()?;

        let path = match std::env::var_os("PATH") {
            Some(existing) => {
                let mut dirs = vec![std::path::PathBuf::from(&vars.bin)];
                dirs.extend(std::env::split_paths(&existing));
                std::env::join_paths(dirs)
                    .map_err(|e| Error::IoError(format!("Invalid PATH: {}", e)))?
            }
            None => vars.bin.clone().into(),
        };

        let mut results = Vec::with_capacity(recipe.test.len());
        let mut cancelled = false;
        for assertion in &recipe.test {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let command = recipe.substitute(&assertion.run, vars);
            debug!("Testing {}: {}", recipe.name, command);

            let mut cmd = shell(&command, scratch.path());
            cmd.env("PATH", &path).env("HOME", scratch.path());
            let output = match run_command(cmd, self.timeout, &self.cancel) {
                Ok(output) => output,
                Err(e) => {
                    warn!("[{}] test could not run: {}: {}", recipe.name, command, e);
                    results.push(AssertionResult {
                        command,
                        termination: None,
                        failures: vec![format!("could not run: {}", e)],
                        output: String::new(),
                    });
                    continue;
                }
            };
            if output.termination == Termination::Cancelled {
                info!("[{}] test cancelled: {}", recipe.name, command);
                cancelled = true;
                break;
            }

            let combined = output.combined();
            let failures = check(assertion, output.termination, &combined);
            if failures.is_empty() {
                info!("[{}] test passed: {}", recipe.name, command);
            } else {
                warn!("[{}] test failed: {}: {}", recipe.name, command, failures.join("; "));
            }

            results.push(AssertionResult {
                command,
                termination: Some(output.termination),
                failures,
                output: excerpt(&combined),
            });
        }

        Ok(TestReport {
            recipe: recipe.name.clone(),
            results,
            cancelled,
        })
    }
}

fn check(assertion: &Assertion, termination: Termination, output: &str) -> Vec<String> {
    let mut failures = Vec::new();

    match termination {
        Termination::Exited(code) if code == assertion.status => {}
        other => failures.push(format!("expected exit code {}, got {}", assertion.status, other)),
    }

    if let Some(expected) = &assertion.expect
        && !output.contains(expected.as_str())
    {
        failures.push(format!("output does not contain {:?}", expected));
    }

    if let Some(pattern) = &assertion.regex {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(output) => {}
            Ok(_) => failures.push(format!("output does not match /{}/", pattern)),
            Err(e) => failures.push(format!("invalid regex /{}/: {}", pattern, e)),
        }
    }

    failures
}

fn excerpt(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_EXCERPT {
        return output.to_string();
    }
    let mut end = MAX_OUTPUT_EXCERPT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[... {} more bytes]", &output[..end], output.len() - end)
}
