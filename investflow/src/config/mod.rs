//! Run configuration.
//!
//! A [`RunConfig`] is read from one or more YAML files. Later files are
//! deep-merged over earlier ones, so a sensitivity variant only needs to
//! name the values it changes.

mod layering;

pub use layering::deep_merge;

use crate::core::{default_channels, CapacityChannel, CapacitySnapshot};
use crate::errors::{ConfigurationError, InvestflowResult};
use crate::evolution::EvolutionConfig;
use crate::linking::is_identifier;
use crate::observability::LogFormat;
use crate::solver::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stage sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagesConfig {
    /// Stage years, strictly increasing.
    pub years: Vec<i32>,
    /// Duration of the last stage, which has no successor to measure against.
    pub terminal_duration_years: u32,
    /// Capacity already installed before the first stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_capacity: Option<CapacitySnapshot>,
}

/// Discounting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EconomicsConfig {
    /// Run-level discount rate.
    pub wacc: f64,
    /// Year cash flows are discounted to. Defaults to the first stage year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npv_base_year: Option<i32>,
}

fn default_window_days() -> f64 {
    365.0
}

fn default_floor_tolerance() -> f64 {
    1e-6
}

/// Short evaluation window the optimizer simulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Window length in days written to the specification.
    #[serde(default = "default_window_days")]
    pub window_days: f64,
    /// Absolute slack allowed when checking realized capacity against its floor.
    #[serde(default = "default_floor_tolerance")]
    pub floor_tolerance: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            floor_tolerance: default_floor_tolerance(),
        }
    }
}

impl EvaluationConfig {
    /// Window length in years.
    #[must_use]
    pub fn window_years(&self) -> f64 {
        self.window_days / 365.0
    }
}

/// Investable capacity channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityConfig {
    /// Channels tracked across stages.
    #[serde(default = "default_channels")]
    pub channels: Vec<CapacityChannel>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

fn scenario_block() -> String {
    "scenario".to_string()
}

/// Scenario-level parameter keys written into every specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScenarioKeys {
    /// Block holding scenario settings.
    pub block: String,
    /// Stage duration in years.
    pub duration_key: String,
    /// Discount rate.
    pub wacc_key: String,
    /// Evaluation window length in days.
    pub window_key: String,
    /// Emissions limit in kg.
    pub emissions_key: String,
}

impl Default for ScenarioKeys {
    fn default() -> Self {
        Self {
            block: scenario_block(),
            duration_key: "prj_duration".to_string(),
            wacc_key: "wacc".to_string(),
            window_key: "sim_duration".to_string(),
            emissions_key: "co2_max".to_string(),
        }
    }
}

/// Where stage metrics live in the solver's summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ArtifactSchema {
    /// Block holding scenario-level results.
    pub scenario_block: String,
    /// Project NPV reported by the solver.
    pub npv_key: String,
    /// Capital expenditure of the stage.
    pub capex_key: String,
    /// Operating expenditure over the evaluation window.
    pub opex_key: String,
    /// Direct evaluation-window emissions in kg, when reported.
    pub emissions_key: String,
    /// Evaluation window length in days.
    pub window_days_key: String,
    /// Whether window metrics should be extrapolated to the stage duration.
    pub compensate_key: String,
    /// Block holding grid metrics.
    pub grid_block: String,
    /// Grid import energy over the window in Wh.
    pub grid_import_key: String,
    /// Grid emission factor in kg per kWh.
    pub grid_factor_key: String,
    /// Emission factor used when the artifact reports none.
    pub default_grid_factor: f64,
}

impl Default for ArtifactSchema {
    fn default() -> Self {
        Self {
            scenario_block: scenario_block(),
            npv_key: "npv".to_string(),
            capex_key: "capex_prj".to_string(),
            opex_key: "opex_sim".to_string(),
            emissions_key: "co2_sim".to_string(),
            window_days_key: "sim_duration".to_string(),
            compensate_key: "compensate_sim_prj".to_string(),
            grid_block: "grid".to_string(),
            grid_import_key: "e_del_sim".to_string(),
            grid_factor_key: "co2_spec_g2s".to_string(),
            default_grid_factor: 0.4,
        }
    }
}

fn default_timeout_secs() -> f64 {
    3600.0
}

fn default_summary_file() -> String {
    "summary.csv".to_string()
}

fn default_status_file() -> String {
    "status.csv".to_string()
}

/// External optimizer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Program to execute.
    #[serde(default)]
    pub program: String,
    /// Arguments, with `{specification}`, `{output}`, `{stage}` and `{year}` placeholders.
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-stage time budget in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Summary artifact file name inside the stage output directory.
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
    /// Status artifact file name inside the stage output directory.
    #[serde(default = "default_status_file")]
    pub status_file: String,
    /// Working directory for the solver process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Opt-in retry of crashed solves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            summary_file: default_summary_file(),
            status_file: default_status_file(),
            working_dir: None,
            env: BTreeMap::new(),
            retry: None,
        }
    }
}

impl SolverConfig {
    /// The time budget as a duration. A budget too large to represent is
    /// treated as unbounded; validation rejects it before any solve.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }
}

fn default_run_root() -> PathBuf {
    PathBuf::from("runs")
}

/// Run directory placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory holding all runs.
    #[serde(default = "default_run_root")]
    pub run_root: PathBuf,
    /// Run directory name. A timestamped name is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_root: default_run_root(),
            run_name: None,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Logging setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Log lifecycle events when no event sink is attached.
    #[serde(default = "default_log_events")]
    pub events: bool,
}

const fn default_log_events() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
            events: default_log_events(),
        }
    }
}

/// Complete configuration of a planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Stage sequence.
    pub stages: StagesConfig,
    /// Parameter evolution.
    pub evolution: EvolutionConfig,
    /// Discounting.
    pub economics: EconomicsConfig,
    /// Evaluation window.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Capacity channels.
    #[serde(default)]
    pub capacity: CapacityConfig,
    /// Scenario keys written into specifications.
    #[serde(default)]
    pub scenario_keys: ScenarioKeys,
    /// Summary artifact field schema.
    #[serde(default)]
    pub artifact: ArtifactSchema,
    /// Solver invocation.
    #[serde(default)]
    pub solver: SolverConfig,
    /// Run directory placement.
    #[serde(default)]
    pub output: OutputConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// Parses a single YAML document and validates it.
    pub fn from_yaml_str(text: &str) -> InvestflowResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a single YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> InvestflowResult<Self> {
        Self::from_yaml_layers(&[path])
    }

    /// Reads YAML files in order, deep-merging each over the previous ones.
    pub fn from_yaml_layers<P: AsRef<Path>>(paths: &[P]) -> InvestflowResult<Self> {
        let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        for path in paths {
            let text = std::fs::read_to_string(path.as_ref())?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)?;
            deep_merge(&mut merged, layer);
        }
        let config: Self = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// The year cash flows are discounted to.
    #[must_use]
    pub fn npv_base_year(&self) -> i32 {
        self.economics
            .npv_base_year
            .or_else(|| self.stages.years.first().copied())
            .unwrap_or(self.evolution.base_year)
    }

    /// Checks every cross-field rule.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.evolution.validate()?;
        self.validate_stages()?;

        let wacc = self.economics.wacc;
        if !wacc.is_finite() || wacc < 0.0 {
            return Err(ConfigurationError::new(format!(
                "wacc must be finite and >= 0, got {wacc}"
            ))
            .with_field("economics.wacc"));
        }

        let window = self.evaluation.window_days;
        if !window.is_finite() || window <= 0.0 {
            return Err(ConfigurationError::new(format!(
                "window length must be positive, got {window}"
            ))
            .with_field("evaluation.window_days"));
        }
        let tolerance = self.evaluation.floor_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigurationError::new(format!(
                "floor tolerance must be finite and >= 0, got {tolerance}"
            ))
            .with_field("evaluation.floor_tolerance"));
        }

        self.validate_channels()?;

        let timeout = self.solver.timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigurationError::new(format!(
                "solver timeout must be positive, got {timeout}"
            ))
            .with_field("solver.timeout_secs"));
        }
        if Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ConfigurationError::new(format!(
                "solver timeout {timeout} s is too large"
            ))
            .with_field("solver.timeout_secs"));
        }
        if let Some(retry) = &self.solver.retry {
            retry.validate()?;
        }
        Ok(())
    }

    fn validate_stages(&self) -> Result<(), ConfigurationError> {
        let years = &self.stages.years;
        if years.is_empty() {
            return Err(ConfigurationError::new("at least one stage year is required")
                .with_field("stages.years"));
        }
        if let Some(pair) = years.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(ConfigurationError::new(format!(
                "stage years must strictly increase ({} then {})",
                pair[0], pair[1]
            ))
            .with_field("stages.years"));
        }
        let base_year = self.evolution.base_year;
        if years[0] < base_year {
            return Err(ConfigurationError::new(format!(
                "stage year {} precedes base year {base_year}",
                years[0]
            ))
            .with_field("stages.years"));
        }
        if self.stages.terminal_duration_years == 0 {
            return Err(ConfigurationError::new("terminal duration must be at least one year")
                .with_field("stages.terminal_duration_years"));
        }
        if let Some(initial) = &self.stages.initial_capacity {
            if let Some((id, value)) = initial.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
                return Err(ConfigurationError::new(format!(
                    "initial capacity of '{id}' must be finite and >= 0, got {value}"
                ))
                .with_field("stages.initial_capacity"));
            }
        }
        Ok(())
    }

    fn validate_channels(&self) -> Result<(), ConfigurationError> {
        let mut ids = BTreeSet::new();
        for channel in &self.capacity.channels {
            if !ids.insert(channel.id.as_str()) {
                return Err(ConfigurationError::new(format!(
                    "duplicate capacity channel '{}'",
                    channel.id
                ))
                .with_field("capacity.channels"));
            }
            let keys = [
                Some(&channel.block),
                Some(&channel.existing_key),
                Some(&channel.total_key),
                channel.additional_key.as_ref(),
            ];
            if let Some(bad) = keys.into_iter().flatten().find(|k| !is_identifier(k)) {
                return Err(ConfigurationError::new(format!(
                    "channel '{}' uses malformed identifier '{bad}'",
                    channel.id
                ))
                .with_field("capacity.channels"));
            }
        }
        if let Some(initial) = &self.stages.initial_capacity {
            if let Some((id, _)) = initial.iter().find(|(id, _)| !ids.contains(id)) {
                return Err(ConfigurationError::new(format!(
                    "initial capacity names unknown channel '{id}'"
                ))
                .with_field("stages.initial_capacity"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r"
stages:
  years: [2025, 2030, 2035]
  terminal_duration_years: 5
evolution:
  base_year: 2025
  technologies:
    - name: pv
      block: pv
      base_cost: 0.9
      decline_rate: 0.05
  demand:
    base_level: 10
    growth_rate: 0.1
  emissions:
    mechanism: linear_annual_reduction
    base_limit_kg: 200000
    rate: 0.042
economics:
  wacc: 0.05
";

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = RunConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.capacity.channels.len(), 4);
        assert_eq!(config.solver.summary_file, "summary.csv");
        assert_eq!(config.solver.timeout(), Duration::from_secs(3600));
        assert_eq!(config.scenario_keys.duration_key, "prj_duration");
        assert_eq!(config.evolution.technologies[0].cost_key, "capex_spec");
        assert_eq!(config.npv_base_year(), 2025);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{MINIMAL}bogus: 1\n");
        assert!(RunConfig::from_yaml_str(&text).is_err());
    }

    #[test]
    fn test_non_increasing_years_rejected() {
        let mut config = sample_config();
        config.stages.years = vec![2025, 2035, 2030];
        let err = config.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("stages.years"));
    }

    #[test]
    fn test_zero_terminal_duration_rejected() {
        let mut config = sample_config();
        config.stages.terminal_duration_years = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_wacc_rejected() {
        let mut config = sample_config();
        config.economics.wacc = -0.01;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("economics.wacc"));
    }

    #[test]
    fn test_unrepresentable_timeout_rejected() {
        let mut config = sample_config();
        config.solver.timeout_secs = 1e30;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("solver.timeout_secs"));
        assert_eq!(config.solver.timeout(), Duration::MAX);
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut config = sample_config();
        let first = config.capacity.channels[0].clone();
        config.capacity.channels.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_capacity_unknown_channel_rejected() {
        let mut config = sample_config();
        config.stages.initial_capacity = Some(CapacitySnapshot::new().with("wind", 5.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_npv_base_year() {
        let mut config = sample_config();
        config.economics.npv_base_year = Some(2020);
        assert_eq!(config.npv_base_year(), 2020);
    }

    #[test]
    fn test_layered_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let overlay = dir.path().join("co2_low.yaml");
        std::fs::write(&base, MINIMAL).unwrap();
        std::fs::write(
            &overlay,
            "economics:\n  wacc: 0.08\nsolver:\n  timeout_secs: 60\n",
        )
        .unwrap();

        let config = RunConfig::from_yaml_layers(&[&base, &overlay]).unwrap();
        assert_eq!(config.economics.wacc, 0.08);
        assert_eq!(config.solver.timeout_secs, 60.0);
        assert_eq!(config.stages.years, vec![2025, 2030, 2035]);
    }
}
