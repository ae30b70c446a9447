//! Evolution configuration: cost decline, demand growth, emissions pathway.

use super::EmissionsPathway;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_cost_key() -> String {
    "capex_spec".to_string()
}

/// Unit-cost evolution for one technology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnologyCost {
    /// Technology name, unique within the configuration.
    pub name: String,
    /// Optimizer block receiving the evolved cost.
    pub block: String,
    /// Parameter key receiving the evolved cost.
    #[serde(default = "default_cost_key")]
    pub cost_key: String,
    /// Unit cost at the base year.
    pub base_cost: f64,
    /// Annual fractional decline, in `[0, 1)`.
    pub decline_rate: f64,
}

impl TechnologyCost {
    /// Creates a technology priced through `<block>.capex_spec`.
    #[must_use]
    pub fn new(name: impl Into<String>, base_cost: f64, decline_rate: f64) -> Self {
        let name = name.into();
        Self {
            block: name.clone(),
            name,
            cost_key: default_cost_key(),
            base_cost,
            decline_rate,
        }
    }
}

/// How an evolved demand value lands in the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandMode {
    /// Write the demand level.
    Level,
    /// Write the demand level rounded down (e.g. a vehicle count).
    FloorLevel,
    /// Multiply the template's value by the demand scale.
    ScaleTemplate,
}

/// One optimizer parameter driven by evolved demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandTarget {
    /// Optimizer block.
    pub block: String,
    /// Parameter key.
    pub key: String,
    /// Write mode.
    pub mode: DemandMode,
}

/// Demand growth between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandGrowth {
    /// Demand level at the base year.
    pub base_level: f64,
    /// Annual growth rate, `>= -1`.
    pub growth_rate: f64,
    /// Parameters receiving the evolved demand.
    #[serde(default)]
    pub targets: Vec<DemandTarget>,
}

/// Explicit evolution parameters for a planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Year the base values refer to.
    pub base_year: i32,
    /// Per-technology cost decline.
    #[serde(default)]
    pub technologies: Vec<TechnologyCost>,
    /// Demand growth.
    pub demand: DemandGrowth,
    /// Emissions-limit pathway.
    pub emissions: EmissionsPathway,
}

impl EvolutionConfig {
    /// Validates every rate and base value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut names = BTreeSet::new();
        for tech in &self.technologies {
            let field = format!("evolution.technologies.{}", tech.name);
            if !names.insert(tech.name.as_str()) {
                return Err(ConfigurationError::new(format!(
                    "duplicate technology '{}'",
                    tech.name
                ))
                .with_field(field));
            }
            if !tech.base_cost.is_finite() || tech.base_cost < 0.0 {
                return Err(ConfigurationError::new(format!(
                    "base cost must be finite and >= 0, got {}",
                    tech.base_cost
                ))
                .with_field(format!("{field}.base_cost")));
            }
            if !(0.0..1.0).contains(&tech.decline_rate) {
                return Err(ConfigurationError::new(format!(
                    "decline rate must be in [0, 1), got {}",
                    tech.decline_rate
                ))
                .with_field(format!("{field}.decline_rate")));
            }
        }

        let demand = &self.demand;
        if !demand.base_level.is_finite() || demand.base_level < 0.0 {
            return Err(ConfigurationError::new(format!(
                "base demand must be finite and >= 0, got {}",
                demand.base_level
            ))
            .with_field("evolution.demand.base_level"));
        }
        if !demand.growth_rate.is_finite() || demand.growth_rate < -1.0 {
            return Err(ConfigurationError::new(format!(
                "growth rate must be finite and >= -1, got {}",
                demand.growth_rate
            ))
            .with_field("evolution.demand.growth_rate"));
        }
        if demand.base_level == 0.0
            && demand
                .targets
                .iter()
                .any(|t| t.mode == DemandMode::ScaleTemplate)
        {
            return Err(ConfigurationError::new(
                "scale_template targets need a non-zero base demand",
            )
            .with_field("evolution.demand.base_level"));
        }

        self.emissions.validate(self.base_year)
    }
}
