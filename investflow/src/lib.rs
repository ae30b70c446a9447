//! # Investflow
//!
//! Sequential multi-stage investment planning for depot energy infrastructure.
//!
//! An external optimizer sizes solar PV, storage, chargers and grid
//! connection for one decision stage at a time. Investflow chains those
//! single-stage solves into a myopic, non-reversible investment trajectory:
//!
//! - **Evolution**: technology cost decline, demand growth and emissions
//!   limits derived per stage year from an explicit configuration
//! - **Linking**: installed capacity carried forward as a floor into the
//!   next stage's optimizer specification
//! - **Solving**: a strict fail-fast state machine around each solve, with
//!   timeout and cancellation
//! - **Aggregation**: discounted NPV, capacity timeline and emissions
//!   trajectory over the whole horizon
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use investflow::prelude::*;
//!
//! let config = RunConfig::from_yaml_file("run.yaml")?;
//! let template = ScenarioTemplate::from_csv_path("scenario.csv", None)?;
//! let solver = process_solver(&config.solver);
//! let layout = RunLayout::create(&config.output)?;
//!
//! let orchestrator = SequentialStageOrchestrator::new(config, template, solver, layout)?;
//! let result = orchestrator.run().await?;
//! println!("{}", result.summary_line());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod evolution;
pub mod linking;
pub mod observability;
pub mod orchestrator;
pub mod results;
pub mod solver;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::RunConfig;
    pub use crate::core::{
        CapacityChannel, CapacitySnapshot, RunStatus, Stage, StageStatus,
    };
    pub use crate::errors::{
        ConfigurationError, FailureKind, InvestflowError, InvestflowResult,
        ParseError, SpecificationError, StageFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::evolution::{EmissionsPathway, EvolutionConfig, EvolutionEngine, ParameterSet};
    pub use crate::linking::{ScenarioTemplate, StageLinker, StageSpecification};
    pub use crate::orchestrator::{RunLayout, SequentialStageOrchestrator};
    pub use crate::results::{MultiStageResult, ResultsAggregator, StageResult};
    pub use crate::solver::{
        process_solver, ProcessSolver, ReplaySolver, RetryingSolver, SolveOutcome, SolveRequest, Solver,
        SolverArtifact, StageSolveAdapter,
    };
    pub use std::sync::Arc;
}
