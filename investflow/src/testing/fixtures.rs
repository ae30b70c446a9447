//! Sample configuration, templates and artifacts.

use std::path::Path;

use crate::config::{
    ArtifactSchema, CapacityConfig, EconomicsConfig, EvaluationConfig, LoggingConfig,
    OutputConfig, RunConfig, ScenarioKeys, SolverConfig, StagesConfig,
};
use crate::core::CapacitySnapshot;
use crate::evolution::{DemandGrowth, EmissionsPathway, EvolutionConfig, TechnologyCost};
use crate::linking::{ParameterRecord, ScenarioTemplate};
use crate::results::{CashflowBasis, StageResult};
use crate::solver::ArtifactFiles;

/// A three-stage run: 2025, 2030, 2035 with a 10-year terminal stage.
///
/// PV and storage costs decline at 5% and 8% a year, demand grows 10% a
/// year and the emissions cap falls 4.2% of its 200 t base every year.
#[must_use]
pub fn sample_config() -> RunConfig {
    RunConfig {
        stages: StagesConfig {
            years: vec![2025, 2030, 2035],
            terminal_duration_years: 10,
            initial_capacity: None,
        },
        evolution: EvolutionConfig {
            base_year: 2025,
            technologies: vec![
                TechnologyCost::new("pv", 0.9, 0.05),
                TechnologyCost::new("ess", 0.5, 0.08),
            ],
            demand: DemandGrowth {
                base_level: 10.0,
                growth_rate: 0.10,
                targets: vec![],
            },
            emissions: EmissionsPathway::LinearAnnualReduction {
                base_limit_kg: 200_000.0,
                rate: 0.042,
            },
        },
        economics: EconomicsConfig {
            wacc: 0.05,
            npv_base_year: None,
        },
        evaluation: EvaluationConfig::default(),
        capacity: CapacityConfig::default(),
        scenario_keys: ScenarioKeys::default(),
        artifact: ArtifactSchema::default(),
        solver: SolverConfig::default(),
        output: OutputConfig::default(),
        logging: LoggingConfig::default(),
    }
}

fn record(block: &str, key: &str, value: &str) -> ParameterRecord {
    ParameterRecord {
        block: block.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// A depot scenario with PV, storage, a bidirectional grid connection, a
/// BEV fleet and a fixed demand profile.
#[must_use]
pub fn sample_template() -> ScenarioTemplate {
    ScenarioTemplate::from_records(vec![
        record("scenario", "prj_duration", "25"),
        record("scenario", "wacc", "0.09"),
        record("scenario", "sim_duration", "365"),
        record("scenario", "co2_max", ""),
        record("scenario", "compensate_sim_prj", "True"),
        record("pv", "size_existing", "0"),
        record("pv", "capex_spec", "1.0"),
        record("ess", "size_existing", "0"),
        record("ess", "capex_spec", "0.6"),
        record("grid", "size_g2s_existing", "0"),
        record("grid", "size_s2g_existing", "0"),
        record("grid", "co2_spec_g2s", "0.4"),
        record("bev", "num", "10"),
        record("dem", "consumption_yrl", "1000"),
        record("dem", "filename", "depot_profile.csv"),
    ])
}

/// A solved stage result with the given realized totals over a zero floor.
#[must_use]
pub fn solved_stage_result(index: usize, year: i32, realized: CapacitySnapshot) -> StageResult {
    StageResult {
        index,
        year,
        duration_years: 5,
        carried_capacity: CapacitySnapshot::new(),
        additions: realized.clone(),
        realized_capacity: realized,
        capex: 0.0,
        window_opex: 0.0,
        extrapolated_opex: 0.0,
        window_emissions_kg: 1000.0,
        extrapolated_emissions_kg: 5000.0,
        window_years: 1.0,
        extrapolation_factor: 5.0,
        solver_npv: Some(0.0),
        cashflow: 0.0,
        cashflow_basis: CashflowBasis::SolverNpv,
        discount_factor: 1.0,
        discounted_cashflow: 0.0,
        emissions_limit_kg: 158_000.0,
        emissions_compliant: true,
        specification_hash: None,
    }
}

/// Builder for an optimizer output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFixture {
    status: String,
    values: Vec<(String, String, String)>,
}

impl ArtifactFixture {
    /// An `optimal` artifact with zero totals on the default channels and a
    /// small stage NPV.
    #[must_use]
    pub fn solved() -> Self {
        Self {
            status: "optimal".to_string(),
            values: Vec::new(),
        }
        .with_value("scenario", "npv", "-1000")
        .with_value("scenario", "capex_prj", "500")
        .with_value("scenario", "opex_sim", "10")
        .with_value("scenario", "co2_sim", "1000")
        .with_value("scenario", "sim_duration", "365")
        .with_value("pv", "size_total", "0")
        .with_value("ess", "size_total", "0")
        .with_value("grid", "size_g2s_total", "0")
        .with_value("grid", "size_s2g_total", "0")
    }

    /// An `infeasible` artifact with no summary.
    #[must_use]
    pub fn infeasible() -> Self {
        Self::with_status("infeasible")
    }

    /// An artifact with an arbitrary status and no summary.
    #[must_use]
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            values: Vec::new(),
        }
    }

    /// Sets one summary value, replacing an existing one.
    #[must_use]
    pub fn with_value(
        mut self,
        block: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let (block, key, value) = (block.into(), key.into(), value.into());
        match self
            .values
            .iter_mut()
            .find(|(b, k, _)| *b == block && *k == key)
        {
            Some(entry) => entry.2 = value,
            None => self.values.push((block, key, value)),
        }
        self
    }

    /// Writes the status and, if any values are set, the summary table.
    pub fn write_to(&self, dir: &Path, files: &ArtifactFiles) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(&files.status), format!("status\n{}\n", self.status))?;
        if self.values.is_empty() {
            return Ok(());
        }

        let mut summary = String::from("Block,Key,value\n");
        for (block, key, value) in &self.values {
            summary.push_str(&format!("{block},{key},{value}\n"));
        }
        std::fs::write(dir.join(&files.summary), summary)
    }
}
