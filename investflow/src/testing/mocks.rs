//! Solvers for tests that never start an optimizer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

use super::ArtifactFixture;
use crate::cancellation::CancellationToken;
use crate::core::{default_channels, CapacityChannel, CapacitySnapshot};
use crate::errors::{FailureKind, StageFailure};
use crate::linking::{format_value, ScenarioTemplate};
use crate::solver::{classify_artifact, ArtifactFiles, SolveOutcome, SolveRequest, Solver};

/// Writes a fixture artifact per stage, then classifies it like a real
/// optimizer run would be.
#[derive(Debug)]
pub struct ScriptedSolver {
    fallback: ArtifactFixture,
    script: BTreeMap<usize, ArtifactFixture>,
    files: ArtifactFiles,
    requests: Mutex<Vec<SolveRequest>>,
}

impl ScriptedSolver {
    /// Every stage gets `fallback` unless scripted otherwise.
    #[must_use]
    pub fn new(fallback: ArtifactFixture) -> Self {
        Self {
            fallback,
            script: BTreeMap::new(),
            files: ArtifactFiles::default(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Uses `fixture` for stage `index`.
    #[must_use]
    pub fn with_stage(mut self, index: usize, fixture: ArtifactFixture) -> Self {
        self.script.insert(index, fixture);
        self
    }

    /// Returns the number of solves.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SolveRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Solver for ScriptedSolver {
    async fn solve(&self, request: &SolveRequest, _cancel: &CancellationToken) -> SolveOutcome {
        self.requests.lock().push(request.clone());
        let fixture = self.script.get(&request.stage_index).unwrap_or(&self.fallback);
        if let Err(e) = fixture.write_to(&request.output_dir, &self.files) {
            return SolveOutcome::Error(e.into());
        }
        classify_artifact(&request.output_dir, &self.files)
    }
}

/// Adds a fixed increment to every floor it is given.
///
/// Reads the written specification, so whatever the linker carried forward
/// is exactly what the artifact builds on. Each stage reports
/// `capex = sum of additions` and `npv = -capex`.
#[derive(Debug)]
pub struct GrowthSolver {
    channels: Vec<CapacityChannel>,
    increment: CapacitySnapshot,
    emissions_kg: f64,
    files: ArtifactFiles,
    calls: Mutex<usize>,
}

impl GrowthSolver {
    /// Grows the default channels by `increment` each stage.
    #[must_use]
    pub fn new(increment: CapacitySnapshot) -> Self {
        Self {
            channels: default_channels(),
            increment,
            emissions_kg: 1000.0,
            files: ArtifactFiles::default(),
            calls: Mutex::new(0),
        }
    }

    /// Sets the reported window emissions.
    #[must_use]
    pub fn with_emissions(mut self, kg: f64) -> Self {
        self.emissions_kg = kg;
        self
    }

    /// Returns the number of solves.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    fn fixture(&self, specification: &ScenarioTemplate) -> Result<ArtifactFixture, StageFailure> {
        let mut fixture = ArtifactFixture::solved();
        let mut capex = 0.0;
        for channel in &self.channels {
            let raw = specification
                .get(&channel.block, &channel.existing_key)
                .unwrap_or("0");
            let floor: f64 = raw.parse().map_err(|_| {
                StageFailure::new(
                    FailureKind::MalformedOutput,
                    format!("unreadable floor {}.{}: {raw:?}", channel.block, channel.existing_key),
                )
            })?;
            let added = self.increment.get(&channel.id).unwrap_or(0.0);
            capex += added;

            fixture = fixture.with_value(&channel.block, &channel.total_key, format_value(floor + added));
            if let Some(key) = &channel.additional_key {
                fixture = fixture.with_value(&channel.block, key, format_value(added));
            }
        }
        Ok(fixture
            .with_value("scenario", "capex_prj", format_value(capex))
            .with_value("scenario", "npv", format_value(-capex))
            .with_value("scenario", "co2_sim", format_value(self.emissions_kg)))
    }
}

#[async_trait]
impl Solver for GrowthSolver {
    async fn solve(&self, request: &SolveRequest, _cancel: &CancellationToken) -> SolveOutcome {
        *self.calls.lock() += 1;
        let specification = match ScenarioTemplate::from_csv_path(&request.specification_path, None) {
            Ok(specification) => specification,
            Err(e) => {
                return SolveOutcome::Error(StageFailure::new(FailureKind::Io, e.to_string()))
            }
        };
        let fixture = match self.fixture(&specification) {
            Ok(fixture) => fixture,
            Err(failure) => return SolveOutcome::Error(failure),
        };
        if let Err(e) = fixture.write_to(&request.output_dir, &self.files) {
            return SolveOutcome::Error(e.into());
        }
        classify_artifact(&request.output_dir, &self.files)
    }
}

/// Waits before crashing; returns early on cancellation.
#[derive(Debug)]
pub struct SlowSolver {
    delay: Duration,
}

impl SlowSolver {
    /// Creates a solver that takes `delay` to fail.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Solver for SlowSolver {
    async fn solve(&self, _request: &SolveRequest, cancel: &CancellationToken) -> SolveOutcome {
        tokio::select! {
            () = cancel.cancelled() => SolveOutcome::Error(StageFailure::cancelled("slow solve cancelled")),
            () = tokio::time::sleep(self.delay) => {
                SolveOutcome::Error(StageFailure::new(FailureKind::SolverCrash, "slow solver gave up"))
            }
        }
    }
}
