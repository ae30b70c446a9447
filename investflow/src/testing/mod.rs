//! Testing utilities for investflow runs.
//!
//! This module provides:
//! - A sample three-stage configuration and scenario template
//! - Artifact fixtures written the way an optimizer would
//! - Solvers that script, grow or stall without an optimizer

mod fixtures;
mod mocks;

pub use fixtures::{sample_config, sample_template, solved_stage_result, ArtifactFixture};
pub use mocks::{GrowthSolver, ScriptedSolver, SlowSolver};
