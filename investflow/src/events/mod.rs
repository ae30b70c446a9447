//! Lifecycle events emitted by the orchestrator.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod types {
    /// A run began.
    pub const RUN_STARTED: &str = "run.started";
    /// Every stage solved.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// The run stopped at a non-solved stage.
    pub const RUN_HALTED: &str = "run.halted";
    /// A stage specification was written.
    pub const STAGE_BUILT: &str = "stage.built";
    /// A stage solved.
    pub const STAGE_SOLVED: &str = "stage.solved";
    /// A stage was reported infeasible.
    pub const STAGE_INFEASIBLE: &str = "stage.infeasible";
    /// A stage failed.
    pub const STAGE_ERROR: &str = "stage.error";
}
