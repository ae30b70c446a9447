//! Deterministic evolution of stage parameters.
//!
//! [`EvolutionEngine`] turns an [`EvolutionConfig`] into the cost, demand and
//! emissions values in force for a given stage year. It is pure: the same
//! configuration and year always produce the same [`ParameterSet`].

mod emissions;
mod rules;

pub use emissions::{EmissionsPathway, TrajectoryPoint};
pub use rules::{DemandGrowth, DemandMode, DemandTarget, EvolutionConfig, TechnologyCost};

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Evolved parameters for one stage year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Stage year.
    pub year: i32,
    /// Stage duration in years.
    pub duration_years: u32,
    /// Unit cost per technology name.
    pub technology_costs: BTreeMap<String, f64>,
    /// Demand level.
    pub demand_level: f64,
    /// Demand level divided by the base level.
    pub demand_scale: f64,
    /// Emissions limit in kg CO2 for the evaluation window.
    pub emissions_limit_kg: f64,
}

impl ParameterSet {
    /// A parameter set with no technologies, unit demand and no limit.
    #[must_use]
    pub fn empty(year: i32, duration_years: u32) -> Self {
        Self {
            year,
            duration_years,
            technology_costs: BTreeMap::new(),
            demand_level: 1.0,
            demand_scale: 1.0,
            emissions_limit_kg: 0.0,
        }
    }
}

/// Derives stage parameters from base values and annual rates.
#[derive(Debug, Clone)]
pub struct EvolutionEngine {
    config: EvolutionConfig,
}

impl EvolutionEngine {
    /// Creates an engine after validating the configuration.
    pub fn new(config: EvolutionConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Unit cost of `technology` at `year`, or `None` for unknown technologies.
    #[must_use]
    pub fn cost_at(&self, technology: &str, year: i32) -> Option<f64> {
        self.config
            .technologies
            .iter()
            .find(|t| t.name == technology)
            .map(|t| t.base_cost * (1.0 - t.decline_rate).powi(self.elapsed(year)))
    }

    /// Demand level at `year`.
    #[must_use]
    pub fn demand_at(&self, year: i32) -> f64 {
        let demand = &self.config.demand;
        demand.base_level * (1.0 + demand.growth_rate).powi(self.elapsed(year))
    }

    /// Emissions limit at `year`.
    #[must_use]
    pub fn emissions_limit_at(&self, year: i32) -> f64 {
        self.config.emissions.limit_at(self.config.base_year, year)
    }

    /// Evaluates every evolved parameter for a stage.
    pub fn parameters_for(
        &self,
        year: i32,
        duration_years: u32,
    ) -> Result<ParameterSet, ConfigurationError> {
        if year < self.config.base_year {
            return Err(ConfigurationError::new(format!(
                "stage year {year} precedes base year {}",
                self.config.base_year
            ))
            .with_field("stages.years"));
        }

        let technology_costs = self
            .config
            .technologies
            .iter()
            .map(|t| {
                let cost = t.base_cost * (1.0 - t.decline_rate).powi(self.elapsed(year));
                (t.name.clone(), cost)
            })
            .collect();

        let demand_level = self.demand_at(year);
        let base_level = self.config.demand.base_level;
        let demand_scale = if base_level > 0.0 {
            demand_level / base_level
        } else {
            1.0
        };

        Ok(ParameterSet {
            year,
            duration_years,
            technology_costs,
            demand_level,
            demand_scale,
            emissions_limit_kg: self.emissions_limit_at(year),
        })
    }

    fn elapsed(&self, year: i32) -> i32 {
        year - self.config.base_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EvolutionConfig {
        EvolutionConfig {
            base_year: 2025,
            technologies: vec![
                TechnologyCost::new("pv", 1000.0, 0.05),
                TechnologyCost::new("ess", 500.0, 0.08),
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
        }
    }

    #[test]
    fn test_cost_decline() {
        let engine = EvolutionEngine::new(config()).unwrap();
        let params = engine.parameters_for(2030, 5).unwrap();

        let pv = params.technology_costs["pv"] / 1000.0;
        let ess = params.technology_costs["ess"] / 500.0;
        assert!((pv - 0.773_780_937_5).abs() < 1e-6);
        assert!((ess - 0.659_081_523_2).abs() < 1e-6);
    }

    #[test]
    fn test_base_year_is_identity() {
        let engine = EvolutionEngine::new(config()).unwrap();
        let params = engine.parameters_for(2025, 5).unwrap();
        assert_eq!(params.technology_costs["pv"], 1000.0);
        assert_eq!(params.technology_costs["ess"], 500.0);
        assert_eq!(params.demand_level, 10.0);
        assert_eq!(params.demand_scale, 1.0);
        assert_eq!(params.emissions_limit_kg, 200_000.0);
    }

    #[test]
    fn test_demand_growth() {
        let engine = EvolutionEngine::new(config()).unwrap();
        let params = engine.parameters_for(2030, 5).unwrap();
        assert!((params.demand_scale - 1.610_51).abs() < 1e-9);
        assert!((params.demand_level - 16.1051).abs() < 1e-9);
    }

    #[test]
    fn test_costs_are_independent() {
        let mut cfg = config();
        cfg.technologies[1].decline_rate = 0.0;
        let engine = EvolutionEngine::new(cfg).unwrap();
        assert_eq!(engine.cost_at("ess", 2045), Some(500.0));
        assert!(engine.cost_at("pv", 2045).unwrap() < 1000.0);
        assert_eq!(engine.cost_at("wind", 2045), None);
    }

    #[test]
    fn test_costs_non_increasing() {
        let engine = EvolutionEngine::new(config()).unwrap();
        let costs: Vec<f64> = (2025..2060)
            .map(|y| engine.cost_at("pv", y).unwrap())
            .collect();
        assert!(costs.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_year_before_base_rejected() {
        let engine = EvolutionEngine::new(config()).unwrap();
        let err = engine.parameters_for(2020, 5).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("stages.years"));
    }

    #[test]
    fn test_invalid_decline_rate() {
        let mut cfg = config();
        cfg.technologies[0].decline_rate = 1.0;
        let err = EvolutionEngine::new(cfg).unwrap_err();
        assert_eq!(
            err.field.as_deref(),
            Some("evolution.technologies.pv.decline_rate")
        );
    }

    #[test]
    fn test_growth_below_minus_one_rejected() {
        let mut cfg = config();
        cfg.demand.growth_rate = -1.5;
        assert!(EvolutionEngine::new(cfg).is_err());
    }

    #[test]
    fn test_full_decline_of_demand_allowed() {
        let mut cfg = config();
        cfg.demand.growth_rate = -1.0;
        let engine = EvolutionEngine::new(cfg).unwrap();
        assert_eq!(engine.demand_at(2026), 0.0);
    }

    #[test]
    fn test_duplicate_technology_rejected() {
        let mut cfg = config();
        cfg.technologies.push(TechnologyCost::new("pv", 900.0, 0.01));
        let err = EvolutionEngine::new(cfg).unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn test_deterministic() {
        let engine = EvolutionEngine::new(config()).unwrap();
        assert_eq!(
            engine.parameters_for(2040, 10).unwrap(),
            engine.parameters_for(2040, 10).unwrap()
        );
    }
}
