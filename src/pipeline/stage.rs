// src/pipeline/stage.rs

use std::fmt;

/// Where an install is in its lifecycle
///
/// Stages are only ever entered in declaration order (the dependency check
/// runs before the fetch). There is no transition back. A failure at any
/// stage ends the install with an [`Error::Stage`](crate::Error::Stage)
/// naming the stage that failed; nothing is entered after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallStage {
    Parsed,
    DependenciesResolved,
    Fetched,
    Verified,
    Built,
    Installed,
    Tested,
    Done,
}

impl InstallStage {
    /// The action that leads into this stage
    pub fn action(&self) -> &'static str {
        match self {
            InstallStage::Parsed => "parse",
            InstallStage::DependenciesResolved => "dependency check",
            InstallStage::Fetched => "fetch",
            InstallStage::Verified => "verify",
            InstallStage::Built => "build",
            InstallStage::Installed => "install",
            InstallStage::Tested => "test",
            InstallStage::Done => "finish",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallStage::Done)
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Ordered record of the stages an install passed through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTrail {
    stages: Vec<InstallStage>,
}

impl StageTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `stage`; stages must advance monotonically and stop at a terminal one
    pub fn advance(&mut self, stage: InstallStage) {
        debug_assert!(
            self.stages.last().is_none_or(|last| !last.is_terminal() && *last < stage),
            "invalid stage transition {:?} -> {:?}",
            self.stages.last(),
            stage
        );
        self.stages.push(stage);
    }

    pub fn current(&self) -> Option<InstallStage> {
        self.stages.last().copied()
    }

    pub fn reached(&self, stage: InstallStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn as_slice(&self) -> &[InstallStage] {
        &self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(InstallStage::Verified.to_string(), "verify");
        assert_eq!(InstallStage::DependenciesResolved.to_string(), "dependency check");
    }

    #[test]
    fn test_dependency_check_precedes_fetch() {
        assert!(InstallStage::DependenciesResolved < InstallStage::Fetched);
        assert!(InstallStage::Fetched < InstallStage::Verified);
        assert!(InstallStage::Installed < InstallStage::Tested);
    }

    #[test]
    fn test_trail() {
        let mut trail = StageTrail::new();
        assert_eq!(trail.current(), None);
        trail.advance(InstallStage::Parsed);
        trail.advance(InstallStage::DependenciesResolved);
        trail.advance(InstallStage::Done);
        assert_eq!(trail.current(), Some(InstallStage::Done));
        assert!(trail.reached(InstallStage::Parsed));
        assert!(!trail.reached(InstallStage::Built));
    }

    #[test]
    #[should_panic(expected = "invalid stage transition")]
    #[cfg(debug_assertions)]
    fn test_nothing_follows_done() {
        let mut trail = StageTrail::new();
        trail.advance(InstallStage::Parsed);
        trail.advance(InstallStage::Done);
        assert!(InstallStage::Done.is_terminal());
        trail.advance(InstallStage::Tested);
    }

    #[test]
    #[should_panic(expected = "invalid stage transition")]
    #[cfg(debug_assertions)]
    fn test_no_transition_back() {
        let mut trail = StageTrail::new();
        trail.advance(InstallStage::Built);
        trail.advance(InstallStage::Fetched);
    }
}
