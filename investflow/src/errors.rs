//! Error types for investflow.
//!
//! Run-level errors (`InvestflowError`) abort a run before or outside the
//! stage loop. Stage-level failures are recorded as a [`StageFailure`] on the
//! failing stage so that a halted run stays inspectable.

use crate::core::StageStatus;
use crate::solver::InfeasibilityDiagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for investflow operations.
#[derive(Debug, Error)]
pub enum InvestflowError {
    /// Invalid run or evolution configuration.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A merged stage specification is malformed.
    #[error("{0}")]
    Specification(#[from] SpecificationError),

    /// A solver artifact field could not be decoded.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A stage was asked to make an illegal state transition.
    #[error("{0}")]
    Transition(#[from] StageTransitionError),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML configuration could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for investflow operations.
pub type InvestflowResult<T> = Result<T, InvestflowError>;

/// Raised when configuration values are outside their valid domain.
///
/// Configuration errors fail the run before any solve is attempted and are
/// never retried.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Configuration error{}: {message}", field.as_ref().map(|f| format!(" in '{f}'")).unwrap_or_default())]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The offending configuration field, if known.
    pub field: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Raised when a merged stage specification is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Specification error{}: {message}", stage.map(|s| format!(" in stage {s}")).unwrap_or_default())]
pub struct SpecificationError {
    /// The error message.
    pub message: String,
    /// The stage index the specification belongs to.
    pub stage: Option<usize>,
    /// The block involved, if any.
    pub block: Option<String>,
    /// The parameter key involved, if any.
    pub key: Option<String>,
}

impl SpecificationError {
    /// Creates a new specification error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
            block: None,
            key: None,
        }
    }

    /// Sets the stage index.
    #[must_use]
    pub fn with_stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Sets the block and key involved.
    #[must_use]
    pub fn with_parameter(mut self, block: impl Into<String>, key: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self.key = Some(key.into());
        self
    }
}

/// Raised when an artifact field has an unexpected representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot decode {block}.{key} as {expected}: {raw:?}")]
pub struct ParseError {
    /// The artifact block.
    pub block: String,
    /// The artifact key.
    pub key: String,
    /// The raw text found.
    pub raw: String,
    /// The expected type.
    pub expected: &'static str,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(
        block: impl Into<String>,
        key: impl Into<String>,
        raw: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self {
            block: block.into(),
            key: key.into(),
            raw: raw.into(),
            expected,
        }
    }
}

/// Raised when a stage is moved along an edge the state machine forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage {index} cannot move from {from} to {to}")]
pub struct StageTransitionError {
    /// The stage index.
    pub index: usize,
    /// The current status.
    pub from: StageStatus,
    /// The requested status.
    pub to: StageStatus,
}

/// Classification of a stage-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The merged specification was malformed.
    Specification,
    /// The optimizer reported no feasible solution.
    Infeasible,
    /// The solve exceeded its time budget.
    SolverTimeout,
    /// The optimizer process failed to start or exited abnormally.
    SolverCrash,
    /// The optimizer produced a missing or unreadable artifact.
    MalformedOutput,
    /// An artifact field failed strict decoding.
    Parse,
    /// Realized capacity fell below the carried-forward floor.
    FloorViolation,
    /// A replayed artifact was produced from a different specification.
    ReplayMismatch,
    /// The solve was cancelled by the operator.
    Cancelled,
    /// Filesystem access for the stage failed.
    Io,
}

impl FailureKind {
    /// Returns true if a caller-level retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SolverCrash)
    }

    /// The stage status this failure leaves the stage in.
    #[must_use]
    pub fn terminal_status(&self) -> StageStatus {
        match self {
            Self::Infeasible => StageStatus::Infeasible,
            _ => StageStatus::Error,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Specification => "specification",
            Self::Infeasible => "infeasible",
            Self::SolverTimeout => "solver_timeout",
            Self::SolverCrash => "solver_crash",
            Self::MalformedOutput => "malformed_output",
            Self::Parse => "parse",
            Self::FloorViolation => "floor_violation",
            Self::ReplayMismatch => "replay_mismatch",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        };
        write!(f, "{text}")
    }
}

/// A failure attached to the stage that halted the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The failure classification.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// Binding-constraint diagnostic for infeasible stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<InfeasibilityDiagnostic>,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Creates an infeasibility failure from a diagnostic.
    #[must_use]
    pub fn infeasible(diagnostic: InfeasibilityDiagnostic) -> Self {
        Self {
            kind: FailureKind::Infeasible,
            message: diagnostic.summary(),
            diagnostic: Some(diagnostic),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(seconds: f64) -> Self {
        Self::new(
            FailureKind::SolverTimeout,
            format!("Solver timed out after {seconds:.1} seconds"),
        )
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, reason)
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<SpecificationError> for StageFailure {
    fn from(err: SpecificationError) -> Self {
        Self::new(FailureKind::Specification, err.to_string())
    }
}

impl From<ParseError> for StageFailure {
    fn from(err: ParseError) -> Self {
        Self::new(FailureKind::Parse, err.to_string())
    }
}

impl From<std::io::Error> for StageFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(FailureKind::Io, err.to_string())
    }
}
