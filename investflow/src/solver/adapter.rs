//! The stage solve contract around a [`Solver`].

use super::{FieldDecoder, InfeasibilityDiagnostic, SolveOutcome, SolveRequest, Solver, SolverArtifact};
use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::core::{CapacityChannel, CapacitySnapshot};
use crate::errors::{FailureKind, ParseError, StageFailure};
use crate::linking::StageSpecification;
use crate::observability::SpanTimer;
use crate::orchestrator::StagePaths;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Classified result of one stage solve.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutcome {
    /// Feasible optimum whose realized capacity respects the floor.
    Solved {
        /// The optimizer's artifact.
        artifact: SolverArtifact,
        /// Realized totals per channel.
        capacity: CapacitySnapshot,
    },
    /// The optimizer reported infeasibility.
    Infeasible(InfeasibilityDiagnostic),
    /// Any other failure.
    Error(StageFailure),
}

/// Runs one stage through a solver. Never retries.
#[derive(Clone)]
pub struct StageSolveAdapter {
    solver: Arc<dyn Solver>,
    channels: Vec<CapacityChannel>,
    timeout: Duration,
    floor_tolerance: f64,
    reuse_output: bool,
}

impl std::fmt::Debug for StageSolveAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSolveAdapter")
            .field("channels", &self.channels.len())
            .field("timeout", &self.timeout)
            .field("floor_tolerance", &self.floor_tolerance)
            .field("reuse_output", &self.reuse_output)
            .finish_non_exhaustive()
    }
}

impl StageSolveAdapter {
    /// Creates an adapter with an exact floor check.
    #[must_use]
    pub fn new(solver: Arc<dyn Solver>, channels: Vec<CapacityChannel>, timeout: Duration) -> Self {
        Self {
            solver,
            channels,
            timeout,
            floor_tolerance: 0.0,
            reuse_output: false,
        }
    }

    /// Creates an adapter from run configuration.
    #[must_use]
    pub fn from_config(solver: Arc<dyn Solver>, config: &RunConfig) -> Self {
        Self::new(solver, config.capacity.channels.clone(), config.solver.timeout())
            .with_floor_tolerance(config.evaluation.floor_tolerance)
    }

    /// Sets the absolute slack for the floor check.
    #[must_use]
    pub fn with_floor_tolerance(mut self, tolerance: f64) -> Self {
        self.floor_tolerance = tolerance;
        self
    }

    /// Keeps whatever is already in the stage output directory instead of
    /// clearing it. Only replay should read artifacts it did not just produce.
    #[must_use]
    pub fn with_reused_output(mut self) -> Self {
        self.reuse_output = true;
        self
    }

    /// Writes the specification and its hash, returning the solve request.
    ///
    /// The output directory is emptied first unless output reuse is on, so
    /// a solver that writes nothing cannot pick up an earlier run's artifact.
    pub fn prepare(
        &self,
        spec: &StageSpecification,
        paths: &StagePaths,
    ) -> Result<SolveRequest, StageFailure> {
        if !self.reuse_output && paths.output.exists() {
            std::fs::remove_dir_all(&paths.output)?;
            debug!(stage = spec.index, path = %paths.output.display(), "Cleared stale stage output");
        }
        std::fs::create_dir_all(&paths.output)?;

        let previous_specification_hash = std::fs::read_to_string(&paths.hash)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let specification_hash = spec.write_csv(&paths.specification)?;
        std::fs::write(&paths.hash, format!("{specification_hash}\n"))?;

        debug!(
            stage = spec.index,
            path = %paths.specification.display(),
            hash = %specification_hash,
            "Wrote stage specification"
        );

        Ok(SolveRequest {
            stage_index: spec.index,
            year: spec.year,
            specification_path: paths.specification.clone(),
            output_dir: paths.output.clone(),
            specification_hash,
            previous_specification_hash,
            timeout: self.timeout,
        })
    }

    /// Invokes the solver under timeout and cancellation, then classifies.
    pub async fn execute(
        &self,
        spec: &StageSpecification,
        request: &SolveRequest,
        cancel: &CancellationToken,
    ) -> AdapterOutcome {
        if cancel.is_cancelled() {
            return AdapterOutcome::Error(StageFailure::cancelled(cancel_reason(cancel)));
        }

        let timer = SpanTimer::start("stage.solve");
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                SolveOutcome::Error(StageFailure::cancelled(cancel_reason(cancel)))
            }
            result = tokio::time::timeout(request.timeout, self.solver.solve(request, cancel)) => {
                result.unwrap_or_else(|_| {
                    SolveOutcome::Error(StageFailure::timeout(request.timeout.as_secs_f64()))
                })
            }
        };

        info!(
            stage = spec.index,
            year = spec.year,
            outcome = outcome.label(),
            duration_ms = timer.finish(),
            "Stage solve finished"
        );
        self.classify(spec, outcome)
    }

    /// Writes the specification, solves it and classifies the outcome.
    pub async fn solve_stage(
        &self,
        spec: &StageSpecification,
        paths: &StagePaths,
        cancel: &CancellationToken,
    ) -> AdapterOutcome {
        match self.prepare(spec, paths) {
            Ok(request) => self.execute(spec, &request, cancel).await,
            Err(failure) => AdapterOutcome::Error(failure),
        }
    }

    /// Decodes realized totals for every channel.
    ///
    /// A channel without a reported total falls back to `floor + additional`
    /// when it names an additions key and the artifact carries it.
    pub fn decode_capacity(
        &self,
        artifact: &SolverArtifact,
        floor: &CapacitySnapshot,
    ) -> Result<CapacitySnapshot, ParseError> {
        let decoder = FieldDecoder::new(&artifact.summary);
        let mut capacity = CapacitySnapshot::new();
        for channel in &self.channels {
            let total = match decoder.number(&channel.block, &channel.total_key)? {
                Some(total) => total,
                None => {
                    let added = match &channel.additional_key {
                        Some(key) => decoder.number(&channel.block, key)?,
                        None => None,
                    };
                    match added {
                        Some(added) => floor.get(&channel.id).unwrap_or(0.0) + added,
                        None => decoder.require_number(&channel.block, &channel.total_key)?,
                    }
                }
            };
            capacity.set(channel.id.clone(), total);
        }
        Ok(capacity)
    }

    fn classify(&self, spec: &StageSpecification, outcome: SolveOutcome) -> AdapterOutcome {
        match outcome {
            SolveOutcome::Solved(artifact) => {
                let capacity = match self.decode_capacity(&artifact, &spec.carried_capacity) {
                    Ok(capacity) => capacity,
                    Err(e) => return AdapterOutcome::Error(e.into()),
                };
                if let Some((channel, realized, floor)) =
                    capacity.first_violation(&spec.carried_capacity, self.floor_tolerance)
                {
                    return AdapterOutcome::Error(StageFailure::new(
                        FailureKind::FloorViolation,
                        format!("channel '{channel}' realized {realized} below its floor {floor}"),
                    ));
                }
                // Totals within tolerance below the floor are carried at the floor.
                let capacity = capacity.raised_to(&spec.carried_capacity);
                AdapterOutcome::Solved { artifact, capacity }
            }
            SolveOutcome::Infeasible { message } => {
                AdapterOutcome::Infeasible(InfeasibilityDiagnostic::assess(spec, message))
            }
            SolveOutcome::Error(failure) => AdapterOutcome::Error(failure),
        }
    }
}

fn cancel_reason(cancel: &CancellationToken) -> String {
    cancel
        .reason()
        .unwrap_or_else(|| "solve cancelled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::default_channels;
    use crate::solver::{BindingConstraint, MockSolver, SummaryTable};
    use crate::testing::{sample_config, sample_template, SlowSolver};
    use crate::linking::StageLinker;

    fn artifact(pv: &str) -> SolverArtifact {
        let text = format!(
            "Block,Key,value\npv,size_total,{pv}\ness,size_total,40\ngrid,size_g2s_total,80\ngrid,size_s2g_total,0\n"
        );
        SolverArtifact {
            output_dir: "out".into(),
            status: "optimal".to_string(),
            summary: SummaryTable::from_reader(text.as_bytes()).unwrap(),
        }
    }

    fn spec_with_floor(pv: f64) -> StageSpecification {
        let linker = StageLinker::new(&sample_config(), sample_template()).unwrap();
        let mut spec = linker.link(1, None).unwrap();
        spec.carried_capacity.set("pv", pv);
        spec
    }

    fn adapter(solver: impl Solver + 'static, timeout: Duration) -> StageSolveAdapter {
        StageSolveAdapter::new(Arc::new(solver), default_channels(), timeout)
    }

    fn request(dir: &std::path::Path, timeout: Duration) -> SolveRequest {
        SolveRequest {
            stage_index: 1,
            year: 2030,
            specification_path: dir.join("specification.csv"),
            output_dir: dir.join("output"),
            specification_hash: "h".to_string(),
            previous_specification_hash: None,
            timeout,
        }
    }

    #[tokio::test]
    async fn test_solved_respects_floor() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .times(1)
            .returning(|_, _| SolveOutcome::Solved(artifact("119.2")));
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(119.2), &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        match outcome {
            AdapterOutcome::Solved { capacity, .. } => {
                assert_eq!(capacity.get("pv"), Some(119.2));
                assert_eq!(capacity.get("grid_g2s"), Some(80.0));
            }
            other => panic!("expected solved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_floor_violation_is_error() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .returning(|_, _| SolveOutcome::Solved(artifact("100")));
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(119.2), &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        match outcome {
            AdapterOutcome::Error(failure) => assert_eq!(failure.kind, FailureKind::FloorViolation),
            other => panic!("expected floor violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_numeric_total_is_parse_error() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .returning(|_, _| SolveOutcome::Solved(artifact("True")));
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(0.0), &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, AdapterOutcome::Error(f) if f.kind == FailureKind::Parse));
    }

    #[tokio::test]
    async fn test_infeasible_carries_diagnostic() {
        let mut solver = MockSolver::new();
        solver.expect_solve().returning(|_, _| SolveOutcome::Infeasible {
            message: "optimizer reported status 'infeasible'".to_string(),
        });
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let mut spec = spec_with_floor(0.0);
        spec.previous_emissions_kg = Some(1e9);
        let outcome = adapter
            .execute(&spec, &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        match outcome {
            AdapterOutcome::Infeasible(diagnostic) => {
                assert_eq!(diagnostic.suspected, BindingConstraint::EmissionsLimit);
                assert_eq!(diagnostic.emissions_limit_kg, 158_000.0);
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let adapter = adapter(SlowSolver::new(Duration::from_secs(30)), Duration::from_millis(20));
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(0.0), &request(dir.path(), Duration::from_millis(20)), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, AdapterOutcome::Error(f) if f.kind == FailureKind::SolverTimeout));
    }

    #[tokio::test]
    async fn test_cancel_during_solve_is_error() {
        let adapter = adapter(SlowSolver::new(Duration::from_secs(30)), Duration::from_secs(60));
        let dir = tempfile::tempdir().unwrap();
        let cancel = Arc::new(CancellationToken::new());

        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel("operator abort");
            })
        };
        let outcome = adapter
            .execute(&spec_with_floor(0.0), &request(dir.path(), Duration::from_secs(60)), &cancel)
            .await;
        trigger.await.unwrap();

        match outcome {
            AdapterOutcome::Error(failure) => {
                assert_eq!(failure.kind, FailureKind::Cancelled);
                assert_eq!(failure.message, "operator abort");
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_solver() {
        let mut solver = MockSolver::new();
        solver.expect_solve().never();
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel("stop");

        let outcome = adapter
            .execute(&spec_with_floor(0.0), &request(dir.path(), Duration::from_secs(5)), &cancel)
            .await;
        assert!(matches!(outcome, AdapterOutcome::Error(f) if f.kind == FailureKind::Cancelled));
    }

    #[test]
    fn test_prepare_writes_specification_and_hash() {
        let adapter = adapter(MockSolver::new(), Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let paths = StagePaths::under(dir.path(), 1, 2030);
        let spec = spec_with_floor(0.0);

        let first = adapter.prepare(&spec, &paths).unwrap();
        assert!(paths.specification.is_file());
        assert!(paths.output.is_dir());
        assert_eq!(first.previous_specification_hash, None);
        assert_eq!(first.specification_hash, spec.content_hash().unwrap());

        let second = adapter.prepare(&spec, &paths).unwrap();
        assert_eq!(second.previous_specification_hash, Some(first.specification_hash));
    }

    #[tokio::test]
    async fn test_total_within_tolerance_carried_at_floor() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .returning(|_, _| SolveOutcome::Solved(artifact("119.1999995")));
        let adapter = adapter(solver, Duration::from_secs(5)).with_floor_tolerance(1e-6);
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(119.2), &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        match outcome {
            AdapterOutcome::Solved { capacity, .. } => assert_eq!(capacity.get("pv"), Some(119.2)),
            other => panic!("expected solved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_total_from_reported_additions() {
        let text = "Block,Key,value\npv,size_additional,20\ness,size_total,40\ngrid,size_g2s_total,80\ngrid,size_s2g_total,0\n";
        let summary = SummaryTable::from_reader(text.as_bytes()).unwrap();
        let mut solver = MockSolver::new();
        solver.expect_solve().returning(move |_, _| {
            SolveOutcome::Solved(SolverArtifact {
                output_dir: "out".into(),
                status: "optimal".to_string(),
                summary: summary.clone(),
            })
        });
        let adapter = adapter(solver, Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let outcome = adapter
            .execute(&spec_with_floor(100.0), &request(dir.path(), Duration::from_secs(5)), &CancellationToken::new())
            .await;
        match outcome {
            AdapterOutcome::Solved { capacity, .. } => assert_eq!(capacity.get("pv"), Some(120.0)),
            other => panic!("expected solved, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_clears_stale_output() {
        let adapter = adapter(MockSolver::new(), Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let paths = StagePaths::under(dir.path(), 1, 2030);
        std::fs::create_dir_all(&paths.output).unwrap();
        std::fs::write(paths.output.join("status.csv"), "status\noptimal\n").unwrap();

        adapter.prepare(&spec_with_floor(0.0), &paths).unwrap();
        assert!(paths.output.is_dir());
        assert!(!paths.output.join("status.csv").exists());
    }

    #[test]
    fn test_reused_output_is_kept() {
        let adapter = adapter(MockSolver::new(), Duration::from_secs(5)).with_reused_output();
        let dir = tempfile::tempdir().unwrap();
        let paths = StagePaths::under(dir.path(), 1, 2030);
        std::fs::create_dir_all(&paths.output).unwrap();
        std::fs::write(paths.output.join("status.csv"), "status\noptimal\n").unwrap();

        adapter.prepare(&spec_with_floor(0.0), &paths).unwrap();
        assert!(paths.output.join("status.csv").is_file());
    }
}
