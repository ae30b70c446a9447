//! The planning stage record and its state machine.

use super::{CapacitySnapshot, StageStatus};
use crate::errors::{StageFailure, StageTransitionError};
use crate::evolution::ParameterSet;
use serde::{Deserialize, Serialize};

/// One decision point in the planning horizon.
///
/// Stages are created `Pending` at run start and only move forward through
/// [`Stage::transition`]. Once terminal, a stage is never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Position in the stage sequence.
    pub index: usize,
    /// Calendar year of the investment decision.
    pub year: i32,
    /// Years this stage's decisions are in force.
    pub duration_years: u32,
    /// Current lifecycle status.
    status: StageStatus,
    /// Capacity floor inherited from the previous stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried_capacity: Option<CapacitySnapshot>,
    /// Evolved parameters for this stage's year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolved_parameters: Option<ParameterSet>,
    /// SHA-256 of the written specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_hash: Option<String>,
    /// Failure that made this stage terminal, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

impl Stage {
    /// Creates a pending stage.
    #[must_use]
    pub fn new(index: usize, year: i32, duration_years: u32) -> Self {
        Self {
            index,
            year,
            duration_years,
            status: StageStatus::Pending,
            carried_capacity: None,
            evolved_parameters: None,
            specification_hash: None,
            failure: None,
        }
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Moves the stage to `next` if the state machine allows it.
    pub fn transition(&mut self, next: StageStatus) -> Result<(), StageTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StageTransitionError {
                index: self.index,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Records the built specification and moves to `Built`.
    pub fn mark_built(
        &mut self,
        carried: CapacitySnapshot,
        parameters: ParameterSet,
        hash: impl Into<String>,
    ) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Built)?;
        self.carried_capacity = Some(carried);
        self.evolved_parameters = Some(parameters);
        self.specification_hash = Some(hash.into());
        Ok(())
    }

    /// Moves to `Solved`.
    pub fn mark_solved(&mut self) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Solved)
    }

    /// Moves to the failure's terminal status and records the failure.
    pub fn mark_failed(&mut self, failure: StageFailure) -> Result<(), StageTransitionError> {
        self.transition(failure.kind.terminal_status())?;
        self.failure = Some(failure);
        Ok(())
    }
}
