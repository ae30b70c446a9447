//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a planning stage.
///
/// `Pending -> Built -> {Solved | Infeasible | Error}`, plus
/// `Pending -> Error` when the stage specification cannot be built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not been built yet.
    #[default]
    Pending,
    /// Specification has been merged and written.
    Built,
    /// The optimizer found a solution.
    Solved,
    /// The optimizer reported no feasible solution.
    Infeasible,
    /// The stage failed for any other reason.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Built => write!(f, "built"),
            Self::Solved => write!(f, "solved"),
            Self::Infeasible => write!(f, "infeasible"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Solved | Self::Infeasible | Self::Error)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Solved)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Infeasible | Self::Error)
    }

    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Built | Self::Error)
                | (Self::Built, Self::Solved | Self::Infeasible | Self::Error)
        )
    }
}

/// Terminal status of a multi-stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "stage")]
pub enum RunStatus {
    /// Every stage solved.
    Completed,
    /// The run stopped at the given stage index.
    HaltedAtStage(usize),
}

impl RunStatus {
    /// Returns true if every stage solved.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The halting stage index, if any.
    #[must_use]
    pub fn halted_at(&self) -> Option<usize> {
        match self {
            Self::Completed => None,
            Self::HaltedAtStage(n) => Some(*n),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::HaltedAtStage(n) => write!(f, "halted at stage {n}"),
        }
    }
}
