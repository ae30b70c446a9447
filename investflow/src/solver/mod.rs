//! The solver capability and the stage solve adapter.
//!
//! A [`Solver`] turns one written stage specification into a
//! [`SolveOutcome`]. [`StageSolveAdapter`] wraps any solver with the stage
//! contract: specification on disk, bounded time, cancellation, strict
//! artifact decoding and the capacity floor check.

mod adapter;
mod artifact;
mod decode;
mod diagnostic;
mod process;
mod replay;
mod retry;

pub use adapter::{AdapterOutcome, StageSolveAdapter};
pub use artifact::{
    classify_artifact, read_status, ArtifactFiles, ArtifactStatus, SolverArtifact, SummaryTable,
};
pub use decode::FieldDecoder;
pub use diagnostic::{BindingConstraint, InfeasibilityDiagnostic};
pub use process::ProcessSolver;
pub use replay::ReplaySolver;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy, RetryingSolver};

use crate::cancellation::CancellationToken;
use crate::config::SolverConfig;
use crate::errors::StageFailure;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a solver needs to run one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveRequest {
    /// Stage index.
    pub stage_index: usize,
    /// Stage year.
    pub year: i32,
    /// Written `block,key,value` specification.
    pub specification_path: PathBuf,
    /// Directory the solver must write its artifacts into.
    pub output_dir: PathBuf,
    /// SHA-256 of the written specification.
    pub specification_hash: String,
    /// Hash recorded in the stage directory before this request overwrote it.
    pub previous_specification_hash: Option<String>,
    /// Time budget.
    pub timeout: Duration,
}

/// Classification of one solve.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// A feasible optimum with its artifact.
    Solved(SolverArtifact),
    /// The optimizer explicitly reported no feasible solution.
    Infeasible {
        /// Optimizer-provided detail.
        message: String,
    },
    /// Anything else.
    Error(StageFailure),
}

impl SolveOutcome {
    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Solved(_) => "solved",
            Self::Infeasible { .. } => "infeasible",
            Self::Error(_) => "error",
        }
    }
}

/// The external optimizer as a capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Solver: Send + Sync {
    /// Solves one stage. Implementations must honor `cancel` promptly.
    async fn solve(&self, request: &SolveRequest, cancel: &CancellationToken) -> SolveOutcome;
}

/// Builds the configured process solver, wrapped for retries when the
/// policy allows more than one attempt.
#[must_use]
pub fn process_solver(config: &SolverConfig) -> Arc<dyn Solver> {
    let solver = ProcessSolver::from_config(config);
    match &config.retry {
        Some(policy) if policy.max_attempts > 1 => {
            Arc::new(RetryingSolver::new(solver, policy.clone()))
        }
        _ => Arc::new(solver),
    }
}
