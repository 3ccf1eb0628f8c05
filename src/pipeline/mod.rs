// src/pipeline/mod.rs

//! Recipe install pipeline: the stage machine, prefix promotion and the
//! [`Installer`] that drives fetch, build, install and test

mod installer;
mod link;
mod stage;

pub use installer::{InstallOptions, InstallOutcome, InstallReport, Installer, UninstallReport};
pub use link::prefix_bins;
pub use stage::{InstallStage, StageTrail};
