//! Per-stage metrics and the multi-stage aggregate.

use super::{CapacityTimeline, CashflowBasis, MultiStageResult, StageResult};
use crate::config::{ArtifactSchema, RunConfig};
use crate::core::{CapacitySnapshot, RunStatus, Stage, StageStatus};
use crate::errors::{FailureKind, ParseError};
use crate::linking::StageSpecification;
use crate::solver::{FieldDecoder, InfeasibilityDiagnostic, SolverArtifact};
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.0;

/// Relative slack when comparing window emissions against the limit.
const EMISSIONS_TOLERANCE: f64 = 1e-9;

/// Emissions of one solved stage against its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsRecord {
    /// Stage index.
    pub index: usize,
    /// Stage year.
    pub year: i32,
    /// Asserted limit in kg.
    pub limit_kg: f64,
    /// Window emissions in kg.
    pub window_kg: f64,
    /// Emissions scaled to the stage duration in kg.
    pub extrapolated_kg: f64,
    /// Window emissions within the limit.
    pub compliant: bool,
}

/// Why and where a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltReport {
    /// Index of the first stage that did not solve.
    pub stage: usize,
    /// Its year.
    pub year: i32,
    /// Its final status.
    pub status: StageStatus,
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub message: String,
    /// Infeasibility diagnosis, if the halt was an infeasible solve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<InfeasibilityDiagnostic>,
}

impl HaltReport {
    fn from_stage(stage: &Stage) -> Self {
        let (kind, message, diagnostic) = match &stage.failure {
            Some(failure) => (failure.kind, failure.message.clone(), failure.diagnostic.clone()),
            None => (
                FailureKind::Cancelled,
                "run cancelled before the stage was built".to_string(),
                None,
            ),
        };
        Self {
            stage: stage.index,
            year: stage.year,
            status: stage.status(),
            kind,
            message,
            diagnostic,
        }
    }
}

/// Computes stage metrics and combines them into a [`MultiStageResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsAggregator {
    schema: ArtifactSchema,
    wacc: f64,
    npv_base_year: i32,
    window_days: f64,
}

impl ResultsAggregator {
    /// Creates an aggregator. `window_days` is used when the artifact does
    /// not report its evaluation window.
    #[must_use]
    pub fn new(schema: ArtifactSchema, wacc: f64, npv_base_year: i32, window_days: f64) -> Self {
        Self {
            schema,
            wacc,
            npv_base_year,
            window_days,
        }
    }

    /// Creates an aggregator from run configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.artifact.clone(),
            config.economics.wacc,
            config.npv_base_year(),
            config.evaluation.window_days,
        )
    }

    /// NPV base year.
    #[must_use]
    pub fn npv_base_year(&self) -> i32 {
        self.npv_base_year
    }

    /// `1 / (1 + wacc)^(year - npv_base_year)`.
    #[must_use]
    pub fn discount_factor(&self, year: i32) -> f64 {
        1.0 / self.compounding(year)
    }

    /// `cashflow / (1 + wacc)^(year - npv_base_year)`.
    #[must_use]
    pub fn discount(&self, cashflow: f64, year: i32) -> f64 {
        cashflow / self.compounding(year)
    }

    fn compounding(&self, year: i32) -> f64 {
        (1.0 + self.wacc).powi(year - self.npv_base_year)
    }

    /// Decodes one solved stage's metrics from its artifact.
    pub fn stage_result(
        &self,
        spec: &StageSpecification,
        artifact: &SolverArtifact,
        realized_capacity: CapacitySnapshot,
    ) -> Result<StageResult, ParseError> {
        let schema = &self.schema;
        let scenario = schema.scenario_block.as_str();
        let decoder = FieldDecoder::new(&artifact.summary);

        let capex = decoder.number(scenario, &schema.capex_key)?.unwrap_or(0.0);
        let window_opex = decoder.number(scenario, &schema.opex_key)?.unwrap_or(0.0);
        let solver_npv = decoder.number(scenario, &schema.npv_key)?;

        let window_days = decoder
            .number(scenario, &schema.window_days_key)?
            .filter(|days| *days > 0.0)
            .unwrap_or(self.window_days);
        let window_years = window_days / DAYS_PER_YEAR;
        let compensate = decoder.flag(scenario, &schema.compensate_key)?.unwrap_or(true);
        let extrapolation_factor = if compensate {
            f64::from(spec.duration_years) / window_years
        } else {
            1.0
        };

        let window_emissions_kg = match decoder.number(scenario, &schema.emissions_key)? {
            Some(direct) => direct,
            None => {
                let imported_wh = decoder
                    .number(&schema.grid_block, &schema.grid_import_key)?
                    .unwrap_or(0.0);
                let factor = decoder
                    .number(&schema.grid_block, &schema.grid_factor_key)?
                    .unwrap_or(schema.default_grid_factor);
                imported_wh / 1000.0 * factor
            }
        };

        let extrapolated_opex = window_opex * extrapolation_factor;
        let (cashflow, cashflow_basis) = match solver_npv {
            Some(npv) => (npv, CashflowBasis::SolverNpv),
            None => (-(capex + extrapolated_opex), CashflowBasis::Costs),
        };
        let discount_factor = self.discount_factor(spec.year);

        let limit = spec.parameters.emissions_limit_kg;
        let emissions_compliant =
            window_emissions_kg <= limit + EMISSIONS_TOLERANCE * limit.abs().max(1.0);

        Ok(StageResult {
            index: spec.index,
            year: spec.year,
            duration_years: spec.duration_years,
            additions: realized_capacity.additions_over(&spec.carried_capacity),
            carried_capacity: spec.carried_capacity.clone(),
            realized_capacity,
            capex,
            window_opex,
            extrapolated_opex,
            window_emissions_kg,
            extrapolated_emissions_kg: window_emissions_kg * extrapolation_factor,
            window_years,
            extrapolation_factor,
            solver_npv,
            cashflow,
            cashflow_basis,
            discount_factor,
            discounted_cashflow: self.discount(cashflow, spec.year),
            emissions_limit_kg: limit,
            emissions_compliant,
            specification_hash: None,
        })
    }

    /// Combines stage records and the solved stages' results.
    ///
    /// Totals sum in stage order, so the same inputs always produce the same
    /// aggregate.
    #[must_use]
    pub fn aggregate(&self, stages: &[Stage], results: &[StageResult]) -> MultiStageResult {
        let halting = stages.iter().find(|s| s.status() != StageStatus::Solved);
        let status = halting.map_or(RunStatus::Completed, |s| RunStatus::HaltedAtStage(s.index));
        let halt = halting.map(HaltReport::from_stage);

        let total_npv = results.iter().fold(0.0, |acc, r| acc + r.discounted_cashflow);
        let total_capex = results.iter().fold(0.0, |acc, r| acc + r.capex);

        let emissions = results
            .iter()
            .map(|r| EmissionsRecord {
                index: r.index,
                year: r.year,
                limit_kg: r.emissions_limit_kg,
                window_kg: r.window_emissions_kg,
                extrapolated_kg: r.extrapolated_emissions_kg,
                compliant: r.emissions_compliant,
            })
            .collect();

        MultiStageResult {
            metadata: None,
            status,
            npv_base_year: self.npv_base_year,
            wacc: self.wacc,
            total_npv,
            total_capex,
            stages: stages.to_vec(),
            results: results.to_vec(),
            timeline: CapacityTimeline::from_results(results),
            emissions,
            halt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailure;
    use crate::evolution::ParameterSet;
    use crate::linking::StageLinker;
    use crate::solver::SummaryTable;
    use crate::testing::{sample_config, sample_template, solved_stage_result};

    fn aggregator() -> ResultsAggregator {
        ResultsAggregator::from_config(&sample_config())
    }

    fn artifact(rows: &str) -> SolverArtifact {
        let text = format!("Block,Key,value\n{rows}");
        SolverArtifact {
            output_dir: "out".into(),
            status: "optimal".to_string(),
            summary: SummaryTable::from_reader(text.as_bytes()).unwrap(),
        }
    }

    fn spec(index: usize) -> StageSpecification {
        StageLinker::new(&sample_config(), sample_template())
            .unwrap()
            .link(index, None)
            .unwrap()
    }

    #[test]
    fn test_discount_factor() {
        let aggregator = aggregator();
        assert_eq!(aggregator.discount_factor(2025), 1.0);
        assert!((aggregator.discount_factor(2030) - 1.0 / 1.05_f64.powi(5)).abs() < 1e-12);
    }

    #[test]
    fn test_solver_npv_is_cashflow() {
        let result = aggregator()
            .stage_result(
                &spec(1),
                &artifact("scenario,npv,-1000\nscenario,capex_prj,400\n"),
                CapacitySnapshot::new(),
            )
            .unwrap();
        assert_eq!(result.cashflow_basis, CashflowBasis::SolverNpv);
        assert_eq!(result.cashflow, -1000.0);
        assert_eq!(result.discounted_cashflow, -1000.0 / 1.05_f64.powi(5));
    }

    #[test]
    fn test_cost_fallback_extrapolates_opex() {
        let result = aggregator()
            .stage_result(
                &spec(0),
                &artifact("scenario,capex_prj,400\nscenario,opex_sim,10\nscenario,sim_duration,365\n"),
                CapacitySnapshot::new(),
            )
            .unwrap();
        assert_eq!(result.cashflow_basis, CashflowBasis::Costs);
        assert_eq!(result.extrapolation_factor, 5.0);
        assert_eq!(result.extrapolated_opex, 50.0);
        assert_eq!(result.cashflow, -450.0);
    }

    #[test]
    fn test_compensation_disabled() {
        let result = aggregator()
            .stage_result(
                &spec(0),
                &artifact("scenario,opex_sim,10\nscenario,compensate_sim_prj,False\n"),
                CapacitySnapshot::new(),
            )
            .unwrap();
        assert_eq!(result.extrapolation_factor, 1.0);
        assert_eq!(result.extrapolated_opex, 10.0);
    }

    #[test]
    fn test_emissions_from_grid_import() {
        let result = aggregator()
            .stage_result(
                &spec(1),
                &artifact("grid,e_del_sim,1000000\n"),
                CapacitySnapshot::new(),
            )
            .unwrap();
        // 1 MWh at the default 0.4 kg/kWh
        assert!((result.window_emissions_kg - 400.0).abs() < 1e-9);
        assert!(result.emissions_compliant);
    }

    #[test]
    fn test_direct_emissions_checked_against_limit() {
        let result = aggregator()
            .stage_result(
                &spec(1),
                &artifact("scenario,co2_sim,200000\n"),
                CapacitySnapshot::new(),
            )
            .unwrap();
        assert_eq!(result.emissions_limit_kg, 158_000.0);
        assert!(!result.emissions_compliant);
    }

    #[test]
    fn test_invalid_numeric_field_is_parse_error() {
        let err = aggregator()
            .stage_result(&spec(0), &artifact("scenario,npv,lots\n"), CapacitySnapshot::new())
            .unwrap_err();
        assert_eq!(err.key, "npv");
    }

    #[test]
    fn test_additions_over_floor() {
        let mut spec = spec(1);
        spec.carried_capacity = CapacitySnapshot::new().with("pv", 100.0);
        let result = aggregator()
            .stage_result(&spec, &artifact(""), CapacitySnapshot::new().with("pv", 130.0))
            .unwrap();
        assert!((result.additions.get("pv").unwrap() - 30.0).abs() < 1e-9);
    }

    fn solved_stage(index: usize, year: i32) -> Stage {
        let mut stage = Stage::new(index, year, 5);
        stage
            .mark_built(CapacitySnapshot::new(), ParameterSet::empty(year, 5), "h".to_string())
            .unwrap();
        stage.mark_solved().unwrap();
        stage
    }

    #[test]
    fn test_aggregate_completed() {
        let stages = vec![solved_stage(0, 2025), solved_stage(1, 2030)];
        let mut first = solved_stage_result(0, 2025, CapacitySnapshot::new().with("pv", 10.0));
        first.discounted_cashflow = -100.0;
        first.capex = 60.0;
        let mut second = solved_stage_result(1, 2030, CapacitySnapshot::new().with("pv", 20.0));
        second.discounted_cashflow = -50.0;
        second.capex = 30.0;

        let result = aggregator().aggregate(&stages, &[first, second]);
        assert!(result.status.is_completed());
        assert_eq!(result.total_npv, -150.0);
        assert_eq!(result.total_capex, 90.0);
        assert_eq!(result.timeline.entries.len(), 2);
        assert_eq!(result.emissions.len(), 2);
        assert!(result.halt.is_none());
    }

    #[test]
    fn test_aggregate_is_bit_identical_on_repeat() {
        let stages = vec![solved_stage(0, 2025), solved_stage(1, 2030)];
        let mut results = vec![
            solved_stage_result(0, 2025, CapacitySnapshot::new()),
            solved_stage_result(1, 2030, CapacitySnapshot::new()),
        ];
        results[0].discounted_cashflow = -0.1;
        results[1].discounted_cashflow = -0.2 / 1.05_f64.powi(5);

        let aggregator = aggregator();
        let first = aggregator.aggregate(&stages, &results);
        let second = aggregator.aggregate(&stages, &results);
        assert_eq!(first.total_npv.to_bits(), second.total_npv.to_bits());
    }

    #[test]
    fn test_aggregate_halted_reports_failure() {
        let mut failed = Stage::new(1, 2030, 5);
        failed
            .mark_built(CapacitySnapshot::new(), ParameterSet::empty(2030, 5), "h".to_string())
            .unwrap();
        failed
            .mark_failed(StageFailure::new(FailureKind::SolverCrash, "exit 1"))
            .unwrap();
        let stages = vec![solved_stage(0, 2025), failed, Stage::new(2, 2035, 10)];
        let results = vec![solved_stage_result(0, 2025, CapacitySnapshot::new())];

        let result = aggregator().aggregate(&stages, &results);
        assert_eq!(result.status, RunStatus::HaltedAtStage(1));
        let halt = result.halt.unwrap();
        assert_eq!(halt.kind, FailureKind::SolverCrash);
        assert_eq!(halt.status, StageStatus::Error);
    }

    #[test]
    fn test_aggregate_pending_halt_is_cancellation() {
        let stages = vec![solved_stage(0, 2025), Stage::new(1, 2030, 5)];
        let result = aggregator().aggregate(&stages, &[solved_stage_result(0, 2025, CapacitySnapshot::new())]);
        let halt = result.halt.unwrap();
        assert_eq!(halt.kind, FailureKind::Cancelled);
        assert_eq!(halt.status, StageStatus::Pending);
    }
}
