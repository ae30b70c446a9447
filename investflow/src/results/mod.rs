//! Stage metrics, the multi-stage aggregate and its persisted forms.

mod aggregator;
mod compare;
mod persist;
mod stage_result;
mod timeline;

pub use aggregator::{EmissionsRecord, HaltReport, ResultsAggregator};
pub use compare::{RunComparison, SensitivityReport, TornadoBar, VariantDelta};
pub use persist::{read_result_json, read_timeline_csv, write_result_json, write_timeline_csv};
pub use stage_result::{CashflowBasis, StageResult};
pub use timeline::{CapacityTimeline, TimelineEntry, TrajectoryRow};

use crate::core::{RunStatus, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and when a run was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique run identifier.
    pub run_id: String,
    /// Run directory.
    pub run_dir: PathBuf,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStageResult {
    /// Set by the orchestrator once the run is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
    /// Completed, or halted at the first stage that did not solve.
    pub status: RunStatus,
    /// Year cash flows are discounted to.
    pub npv_base_year: i32,
    /// Discount rate.
    pub wacc: f64,
    /// Sum of discounted stage cash flows.
    pub total_npv: f64,
    /// Sum of stage capex.
    pub total_capex: f64,
    /// Every stage record, including those never reached.
    pub stages: Vec<Stage>,
    /// Results of the solved stages, in order.
    pub results: Vec<StageResult>,
    /// Investment timeline.
    pub timeline: CapacityTimeline,
    /// Emissions against limits per solved stage.
    pub emissions: Vec<EmissionsRecord>,
    /// Present when the run halted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt: Option<HaltReport>,
}

impl MultiStageResult {
    /// Number of solved stages.
    #[must_use]
    pub fn solved_count(&self) -> usize {
        self.results.len()
    }

    /// Result of one stage, if it solved.
    #[must_use]
    pub fn result_for(&self, index: usize) -> Option<&StageResult> {
        self.results.iter().find(|r| r.index == index)
    }

    /// Returns true if every solved stage stayed within its emissions limit.
    #[must_use]
    pub fn emissions_compliant(&self) -> bool {
        self.emissions.iter().all(|e| e.compliant)
    }

    /// One-line summary for logs and the terminal.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let totals = format!(
            "{}/{} stages solved, NPV {:.2}, capex {:.2}",
            self.solved_count(),
            self.stages.len(),
            self.total_npv,
            self.total_capex
        );
        match &self.halt {
            Some(halt) => format!(
                "Halted at stage {} ({}): {} ({}); {totals}",
                halt.stage, halt.year, halt.kind, halt.message
            ),
            None => format!("Completed: {totals}"),
        }
    }
}
