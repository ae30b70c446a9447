//! Sequential stage orchestration.
//!
//! [`SequentialStageOrchestrator`] drives stages strictly in order: link,
//! write, solve, record. The first stage that does not solve halts the run;
//! later stages stay `Pending` and nothing is carried past the halt.

mod layout;


pub use layout::{RunLayout, StagePaths};

use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::core::{RunStatus, Stage};
use crate::errors::{FailureKind, InvestflowResult, StageFailure};
use crate::events::{types, EventSink, LoggingEventSink, NoOpEventSink};
use crate::linking::{ScenarioTemplate, StageLinker};
use crate::results::{
    write_result_json, write_timeline_csv, MultiStageResult, ResultsAggregator, RunMetadata,
    StageResult,
};
use crate::solver::{AdapterOutcome, ArtifactFiles, ReplaySolver, Solver, StageSolveAdapter};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Runs every stage of a planning horizon in order.
pub struct SequentialStageOrchestrator {
    config: RunConfig,
    linker: StageLinker,
    adapter: StageSolveAdapter,
    aggregator: ResultsAggregator,
    layout: RunLayout,
    event_sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for SequentialStageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialStageOrchestrator")
            .field("run_id", &self.layout.run_id())
            .field("stages", &self.linker.stage_count())
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl SequentialStageOrchestrator {
    /// Validates the configuration and evaluates every stage's parameters
    /// up front, so a bad configuration fails before anything is solved.
    pub fn new(
        config: RunConfig,
        template: ScenarioTemplate,
        solver: Arc<dyn Solver>,
        layout: RunLayout,
    ) -> InvestflowResult<Self> {
        let adapter = StageSolveAdapter::from_config(solver, &config);
        Self::assemble(config, template, adapter, layout)
    }

    /// Re-reads each stage's stored artifact instead of invoking the
    /// optimizer. Stages whose specification changed are refused.
    pub fn replay(
        config: RunConfig,
        template: ScenarioTemplate,
        layout: RunLayout,
    ) -> InvestflowResult<Self> {
        let solver = Arc::new(ReplaySolver::new(ArtifactFiles::from_config(&config.solver)));
        let adapter = StageSolveAdapter::from_config(solver, &config).with_reused_output();
        Self::assemble(config, template, adapter, layout)
    }

    fn assemble(
        config: RunConfig,
        template: ScenarioTemplate,
        adapter: StageSolveAdapter,
        layout: RunLayout,
    ) -> InvestflowResult<Self> {
        config.validate()?;
        let linker = StageLinker::new(&config, template)?;
        linker.preflight()?;

        let aggregator = ResultsAggregator::from_config(&config);
        let event_sink: Arc<dyn EventSink> = if config.logging.events {
            Arc::new(LoggingEventSink::debug())
        } else {
            Arc::new(NoOpEventSink)
        };

        let orchestrator = Self {
            config,
            linker,
            adapter,
            aggregator,
            layout,
            event_sink,
            cancel: Arc::new(CancellationToken::new()),
        };
        orchestrator.watch_cancellation();
        Ok(orchestrator)
    }

    /// Sets the lifecycle event sink, replacing the default logging sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self.watch_cancellation();
        self
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run directory.
    #[must_use]
    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// The token that stops the run.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    fn watch_cancellation(&self) {
        let run_id = self.layout.run_id().to_string();
        self.cancel.on_cancel(move || {
            warn!(run_id = %run_id, "Run cancellation requested");
        });
    }

    /// Runs all stages and persists the aggregate.
    ///
    /// Stage failures do not make this an `Err`: they halt the run and are
    /// reported in [`MultiStageResult::status`]. `Err` means the run could
    /// not be recorded at all.
    pub async fn run(&self) -> InvestflowResult<MultiStageResult> {
        let span = info_span!(
            "run",
            run_id = %self.layout.run_id(),
            stages = self.linker.stage_count()
        );
        self.run_stages().instrument(span).await
    }

    async fn run_stages(&self) -> InvestflowResult<MultiStageResult> {
        let started_at = Utc::now();
        info!(root = %self.layout.root().display(), "Starting run");
        self.event_sink
            .emit(
                types::RUN_STARTED,
                Some(json!({
                    "run_id": self.layout.run_id(),
                    "years": self.linker.years(),
                })),
            )
            .await;

        let mut stages = Vec::with_capacity(self.linker.stage_count());
        for (index, year) in self.linker.years().iter().enumerate() {
            stages.push(Stage::new(index, *year, self.linker.duration_of(index)?));
        }

        let mut results: Vec<StageResult> = Vec::with_capacity(stages.len());
        for stage in &mut stages {
            if self.cancel.is_cancelled() {
                warn!(
                    stage = stage.index,
                    reason = ?self.cancel.reason(),
                    "Run cancelled before stage"
                );
                break;
            }

            let span = info_span!("stage", index = stage.index, year = stage.year);
            let solved = self
                .run_stage(stage, results.last())
                .instrument(span)
                .await?;
            match solved {
                Some(result) => results.push(result),
                None => break,
            }
        }

        let mut result = self.aggregator.aggregate(&stages, &results);
        result.metadata = Some(RunMetadata {
            run_id: self.layout.run_id().to_string(),
            run_dir: self.layout.root().to_path_buf(),
            started_at,
            finished_at: Utc::now(),
        });
        write_result_json(&self.layout.result_path(), &result)?;
        write_timeline_csv(&self.layout.timeline_path(), &result.timeline)?;

        let data = json!({
            "run_id": self.layout.run_id(),
            "status": result.status,
            "total_npv": result.total_npv,
            "solved": result.solved_count(),
        });
        match result.status {
            RunStatus::Completed => {
                info!(summary = %result.summary_line(), "Run completed");
                self.event_sink.emit(types::RUN_COMPLETED, Some(data)).await;
            }
            RunStatus::HaltedAtStage(stage) => {
                warn!(stage, summary = %result.summary_line(), "Run halted");
                self.event_sink.emit(types::RUN_HALTED, Some(data)).await;
            }
        }
        Ok(result)
    }

    /// Links, writes and solves one stage. `Ok(None)` means the stage did
    /// not solve and the run must halt.
    async fn run_stage(
        &self,
        stage: &mut Stage,
        previous: Option<&StageResult>,
    ) -> InvestflowResult<Option<StageResult>> {
        let spec = match self.linker.link(stage.index, previous) {
            Ok(spec) => spec,
            Err(e) => {
                self.fail(stage, e.into()).await?;
                return Ok(None);
            }
        };

        let paths = self.layout.stage_paths(stage.index, stage.year);
        let request = match self.adapter.prepare(&spec, &paths) {
            Ok(request) => request,
            Err(failure) => {
                self.fail(stage, failure).await?;
                return Ok(None);
            }
        };

        stage.mark_built(
            spec.carried_capacity.clone(),
            spec.parameters.clone(),
            request.specification_hash.clone(),
        )?;
        self.event_sink
            .emit(
                types::STAGE_BUILT,
                Some(json!({
                    "stage": stage.index,
                    "year": stage.year,
                    "specification": paths.specification.display().to_string(),
                    "hash": request.specification_hash,
                })),
            )
            .await;

        let solved = match self.adapter.execute(&spec, &request, &self.cancel).await {
            AdapterOutcome::Solved { artifact, capacity } => {
                self.aggregator.stage_result(&spec, &artifact, capacity)
            }
            AdapterOutcome::Infeasible(diagnostic) => {
                self.fail(stage, StageFailure::infeasible(diagnostic)).await?;
                return Ok(None);
            }
            AdapterOutcome::Error(failure) => {
                self.fail(stage, failure).await?;
                return Ok(None);
            }
        };

        let mut result = match solved {
            Ok(result) => result,
            Err(e) => {
                self.fail(stage, e.into()).await?;
                return Ok(None);
            }
        };
        result.specification_hash = Some(request.specification_hash);
        stage.mark_solved()?;

        info!(
            capex = result.capex,
            discounted_cashflow = result.discounted_cashflow,
            emissions_kg = result.window_emissions_kg,
            "Stage solved"
        );
        self.event_sink
            .emit(
                types::STAGE_SOLVED,
                Some(json!({
                    "stage": stage.index,
                    "year": stage.year,
                    "capacity": result.realized_capacity,
                    "discounted_cashflow": result.discounted_cashflow,
                })),
            )
            .await;
        Ok(Some(result))
    }

    async fn fail(&self, stage: &mut Stage, failure: StageFailure) -> InvestflowResult<()> {
        warn!(stage = stage.index, year = stage.year, failure = %failure, "Stage failed");
        let event = if failure.kind == FailureKind::Infeasible {
            types::STAGE_INFEASIBLE
        } else {
            types::STAGE_ERROR
        };
        let data = json!({
            "stage": stage.index,
            "year": stage.year,
            "kind": failure.kind,
            "message": failure.message,
        });
        stage.mark_failed(failure)?;
        self.event_sink.emit(event, Some(data)).await;
        Ok(())
    }
}
