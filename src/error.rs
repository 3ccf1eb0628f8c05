// src/error.rs

//! Error types for the potluck installer
//!
//! Every failure the pipeline can hit maps onto one variant here. The
//! command layer turns these into distinct process exit codes via
//! [`Error::exit_code`].

use crate::pipeline::InstallStage;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for failures that have no dedicated code
pub const EXIT_GENERIC: i32 = 1;
/// Exit code for malformed recipes
pub const EXIT_PARSE: i32 = 3;
/// Exit code for network/transport failures
pub const EXIT_FETCH: i32 = 4;
/// Exit code for checksum mismatches
pub const EXIT_INTEGRITY: i32 = 5;
/// Exit code for missing dependencies
pub const EXIT_DEPENDENCY: i32 = 6;
/// Exit code for failed build steps
pub const EXIT_BUILD: i32 = 7;
/// Exit code for failed smoke tests
pub const EXIT_TEST: i32 = 8;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete recipe
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network or transport failure while fetching a source
    #[error("Fetch failed for {url}: {message}")]
    FetchError {
        url: String,
        message: String,
        /// Whether another attempt may succeed
        retryable: bool,
    },

    /// Computed digest does not match the recipe's checksum
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    IntegrityError {
        url: String,
        expected: String,
        actual: String,
    },

    /// One or more declared dependencies are not available
    #[error("Missing {scope} dependencies: {}", .names.join(", "))]
    DependencyMissing { scope: String, names: Vec<String> },

    /// A build step exited non-zero, timed out or could not be spawned
    #[error("Build step '{step}' failed: {message}")]
    BuildError { step: String, message: String },

    /// One or more smoke-test assertions did not hold
    #[error("Smoke test failed: {0}")]
    TestFailure(String),

    /// Recipe is not present in the registry
    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),

    /// Stopped because a sibling install failed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A lower-level failure annotated with the recipe and pipeline stage
    #[error("{recipe}: {stage} failed: {source}")]
    Stage {
        recipe: String,
        stage: InstallStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with recipe-name and stage context
    ///
    /// Already-wrapped errors are returned unchanged so the innermost stage wins.
    pub fn at_stage(self, recipe: &str, stage: InstallStage) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                recipe: recipe.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping stage context
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.root_cause() {
            Error::ParseError(_) => EXIT_PARSE,
            Error::FetchError { .. } => EXIT_FETCH,
            Error::IntegrityError { .. } => EXIT_INTEGRITY,
            Error::DependencyMissing { .. } => EXIT_DEPENDENCY,
            Error::BuildError { .. } => EXIT_BUILD,
            Error::TestFailure(_) => EXIT_TEST,
            _ => EXIT_GENERIC,
        }
    }

    /// Whether a retry of the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::FetchError {
                retryable: true,
                ..
            }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ParseError(e.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::ParseError("x".into()),
            Error::FetchError {
                url: "u".into(),
                message: "m".into(),
                retryable: true,
            },
            Error::IntegrityError {
                url: "u".into(),
                expected: "a".into(),
                actual: "b".into(),
            },
            Error::DependencyMissing {
                scope: "build".into(),
                names: vec!["rust".into()],
            },
            Error::BuildError {
                step: "install".into(),
                message: "exit 1".into(),
            },
            Error::TestFailure("x".into()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&EXIT_GENERIC));
    }

    #[test]
    fn test_stage_wrapping_keeps_exit_code() {
        let err = Error::IntegrityError {
            url: "https://example.com/a.tar.gz".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .at_stage("spread", InstallStage::Verified);

        assert_eq!(err.exit_code(), EXIT_INTEGRITY);
        let msg = err.to_string();
        assert!(msg.starts_with("spread:"));
        assert!(msg.contains("verify"));
    }

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let err = Error::ParseError("bad".into())
            .at_stage("a", InstallStage::Parsed)
            .at_stage("a", InstallStage::Built);
        match err {
            Error::Stage { stage, .. } => assert_eq!(stage, InstallStage::Parsed),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_dependency_missing_message() {
        let err = Error::DependencyMissing {
            scope: "build".into(),
            names: vec!["rust".into(), "make".into()],
        };
        assert_eq!(err.to_string(), "Missing build dependencies: rust, make");
        assert!(!err.is_retryable());
    }
}
