//! Stage linking: carried capacity plus evolved parameters over the template.
//!
//! [`StageLinker::link`] builds stage `n`'s [`StageSpecification`] from the
//! realized outcome of stage `n-1`. The carried floor is an identity copy of
//! the previous stage's realized totals; nothing grows or decays in transit.

mod spec;
mod template;

pub use spec::{hash_bytes, StageSpecification};
pub use template::{is_identifier, ParameterRecord, ScenarioTemplate};

use crate::config::{RunConfig, ScenarioKeys};
use crate::core::{CapacityChannel, CapacitySnapshot};
use crate::errors::{ConfigurationError, SpecificationError};
use crate::evolution::{DemandMode, EvolutionEngine, ParameterSet};
use crate::results::StageResult;
use tracing::debug;

/// Formats a number the way specifications carry it.
#[must_use]
pub fn format_value(value: f64) -> String {
    format!("{value}")
}

/// Produces each stage's specification from its predecessor's outcome.
#[derive(Debug, Clone)]
pub struct StageLinker {
    years: Vec<i32>,
    terminal_duration_years: u32,
    initial_capacity: CapacitySnapshot,
    channels: Vec<CapacityChannel>,
    scenario_keys: ScenarioKeys,
    wacc: f64,
    window_days: f64,
    engine: EvolutionEngine,
    template: ScenarioTemplate,
}

impl StageLinker {
    /// Creates a linker for a validated run configuration.
    pub fn new(config: &RunConfig, template: ScenarioTemplate) -> Result<Self, ConfigurationError> {
        let engine = EvolutionEngine::new(config.evolution.clone())?;
        let channels = config.capacity.channels.clone();

        let mut initial_capacity = CapacitySnapshot::zero(&channels);
        if let Some(configured) = &config.stages.initial_capacity {
            for (id, value) in configured.iter() {
                initial_capacity.set(id, value);
            }
        }

        Ok(Self {
            years: config.stages.years.clone(),
            terminal_duration_years: config.stages.terminal_duration_years,
            initial_capacity,
            channels,
            scenario_keys: config.scenario_keys.clone(),
            wacc: config.economics.wacc,
            window_days: config.evaluation.window_days,
            engine,
            template,
        })
    }

    /// Number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.years.len()
    }

    /// Stage years in order.
    #[must_use]
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Tracked capacity channels.
    #[must_use]
    pub fn channels(&self) -> &[CapacityChannel] {
        &self.channels
    }

    /// The floor handed to the first stage.
    #[must_use]
    pub fn initial_capacity(&self) -> &CapacitySnapshot {
        &self.initial_capacity
    }

    /// Years until the next stage, or the terminal duration for the last one.
    pub fn duration_of(&self, index: usize) -> Result<u32, ConfigurationError> {
        match (self.years.get(index), self.years.get(index + 1)) {
            (Some(year), Some(next)) => u32::try_from(next - year).map_err(|_| {
                ConfigurationError::new(format!("stage {index} has a non-positive duration"))
                    .with_field("stages.years")
            }),
            (Some(_), None) => Ok(self.terminal_duration_years),
            (None, _) => Err(ConfigurationError::new(format!(
                "stage {index} is outside the {}-stage sequence",
                self.years.len()
            ))
            .with_field("stages.years")),
        }
    }

    /// Evolved parameters of one stage.
    pub fn parameters_for(&self, index: usize) -> Result<ParameterSet, ConfigurationError> {
        let duration = self.duration_of(index)?;
        self.engine.parameters_for(self.years[index], duration)
    }

    /// Evaluates every stage's parameters before anything is solved.
    pub fn preflight(&self) -> Result<Vec<ParameterSet>, ConfigurationError> {
        (0..self.years.len()).map(|i| self.parameters_for(i)).collect()
    }

    /// Every channel's block and floor key must come from the template; the
    /// merge only overwrites values, it never supplies missing parameters.
    fn check_template(&self, index: usize) -> Result<(), SpecificationError> {
        for channel in &self.channels {
            let message = if !self.template.has_block(&channel.block) {
                format!("template has no block '{}' for channel '{}'", channel.block, channel.id)
            } else if self.template.get(&channel.block, &channel.existing_key).is_none() {
                format!(
                    "template block '{}' lacks '{}' for channel '{}'",
                    channel.block, channel.existing_key, channel.id
                )
            } else {
                continue;
            };
            return Err(SpecificationError::new(message)
                .with_stage(index)
                .with_parameter(&channel.block, &channel.existing_key));
        }
        Ok(())
    }

    /// Builds stage `index`'s specification.
    ///
    /// `previous` must be the solved result of stage `index - 1`, or `None`
    /// for the first stage.
    pub fn link(
        &self,
        index: usize,
        previous: Option<&StageResult>,
    ) -> Result<StageSpecification, SpecificationError> {
        let parameters = self
            .parameters_for(index)
            .map_err(|e| SpecificationError::new(e.to_string()).with_stage(index))?;

        let carried_capacity = match previous {
            Some(result) => result.realized_capacity.clone(),
            None => self.initial_capacity.clone(),
        };

        self.check_template(index)?;
        let mut records = self.template.clone();

        for channel in &self.channels {
            let floor = carried_capacity.get(&channel.id).unwrap_or(0.0);
            records.set(&channel.block, &channel.existing_key, format_value(floor));
        }

        for tech in &self.engine.config().technologies {
            if let Some(cost) = parameters.technology_costs.get(&tech.name) {
                records.set(&tech.block, &tech.cost_key, format_value(*cost));
            }
        }

        for target in &self.engine.config().demand.targets {
            let value = match target.mode {
                DemandMode::Level => parameters.demand_level,
                DemandMode::FloorLevel => parameters.demand_level.floor(),
                DemandMode::ScaleTemplate => {
                    let raw = self.template.get(&target.block, &target.key).unwrap_or_default();
                    let base = raw.parse::<f64>().map_err(|_| {
                        SpecificationError::new(format!(
                            "cannot scale non-numeric template value {raw:?}"
                        ))
                        .with_stage(index)
                        .with_parameter(&target.block, &target.key)
                    })?;
                    base * parameters.demand_scale
                }
            };
            records.set(&target.block, &target.key, format_value(value));
        }

        let keys = &self.scenario_keys;
        records.set(&keys.block, &keys.duration_key, parameters.duration_years.to_string());
        records.set(&keys.block, &keys.wacc_key, format_value(self.wacc));
        records.set(&keys.block, &keys.window_key, format_value(self.window_days));
        records.set(
            &keys.block,
            &keys.emissions_key,
            format_value(parameters.emissions_limit_kg),
        );

        let specification = StageSpecification {
            index,
            year: parameters.year,
            duration_years: parameters.duration_years,
            carried_capacity,
            parameters,
            previous_emissions_kg: previous.map(|r| r.window_emissions_kg),
            records,
        };
        specification.validate(&self.channels)?;

        debug!(
            stage = index,
            year = specification.year,
            records = specification.records.len(),
            "Linked stage specification"
        );
        Ok(specification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::DemandTarget;
    use crate::testing::{sample_config, sample_template, solved_stage_result};

    fn linker() -> StageLinker {
        StageLinker::new(&sample_config(), sample_template()).unwrap()
    }

    #[test]
    fn test_durations() {
        let linker = linker();
        assert_eq!(linker.duration_of(0).unwrap(), 5);
        assert_eq!(linker.duration_of(1).unwrap(), 5);
        assert_eq!(linker.duration_of(2).unwrap(), 10);
        assert!(linker.duration_of(3).is_err());
    }

    #[test]
    fn test_first_stage_uses_zero_floor() {
        let spec = linker().link(0, None).unwrap();
        assert_eq!(spec.records.get("pv", "size_existing"), Some("0"));
        assert_eq!(spec.records.get("grid", "size_g2s_existing"), Some("0"));
        assert!(spec.carried_capacity.iter().all(|(_, v)| v == 0.0));
        assert_eq!(spec.previous_emissions_kg, None);
    }

    #[test]
    fn test_initial_capacity_seeds_first_floor() {
        let mut config = sample_config();
        config.stages.initial_capacity = Some(CapacitySnapshot::new().with("pv", 50_000.0));
        let linker = StageLinker::new(&config, sample_template()).unwrap();

        let spec = linker.link(0, None).unwrap();
        assert_eq!(spec.records.get("pv", "size_existing"), Some("50000"));
        assert_eq!(spec.records.get("ess", "size_existing"), Some("0"));
    }

    #[test]
    fn test_capacity_carried_forward_exactly() {
        let previous = solved_stage_result(
            0,
            2025,
            CapacitySnapshot::new()
                .with("pv", 119.2)
                .with("ess", 40.0)
                .with("grid_g2s", 80.0)
                .with("grid_s2g", 10.0),
        );
        let spec = linker().link(1, Some(&previous)).unwrap();

        assert_eq!(spec.records.get("pv", "size_existing"), Some("119.2"));
        assert_eq!(spec.records.get("ess", "size_existing"), Some("40"));
        assert_eq!(spec.records.get("grid", "size_s2g_existing"), Some("10"));
        assert_eq!(spec.carried_capacity, previous.realized_capacity);
        assert_eq!(spec.previous_emissions_kg, Some(previous.window_emissions_kg));
    }

    #[test]
    fn test_evolved_values_merged() {
        let spec = linker().link(1, None).unwrap();
        let pv_cost: f64 = spec.records.get("pv", "capex_spec").unwrap().parse().unwrap();
        assert!((pv_cost - 0.9 * 0.95_f64.powi(5)).abs() < 1e-12);

        assert_eq!(spec.records.get("scenario", "prj_duration"), Some("5"));
        assert_eq!(spec.records.get("scenario", "wacc"), Some("0.05"));
        assert_eq!(spec.records.get("scenario", "co2_max"), Some("158000"));
        assert_eq!(spec.records.get("scenario", "sim_duration"), Some("365"));
    }

    #[test]
    fn test_demand_targets() {
        let mut config = sample_config();
        config.evolution.demand.targets = vec![
            DemandTarget {
                block: "bev".to_string(),
                key: "num".to_string(),
                mode: DemandMode::FloorLevel,
            },
            DemandTarget {
                block: "dem".to_string(),
                key: "consumption_yrl".to_string(),
                mode: DemandMode::ScaleTemplate,
            },
        ];
        let linker = StageLinker::new(&config, sample_template()).unwrap();
        let spec = linker.link(1, None).unwrap();

        // 10 * 1.1^5 = 16.1
        assert_eq!(spec.records.get("bev", "num"), Some("16"));
        let consumption: f64 = spec.records.get("dem", "consumption_yrl").unwrap().parse().unwrap();
        assert!((consumption - 1000.0 * 1.1_f64.powi(5)).abs() < 1e-9);
    }

    #[test]
    fn test_non_numeric_scale_target_is_specification_error() {
        let mut config = sample_config();
        config.evolution.demand.targets = vec![DemandTarget {
            block: "dem".to_string(),
            key: "filename".to_string(),
            mode: DemandMode::ScaleTemplate,
        }];
        let linker = StageLinker::new(&config, sample_template()).unwrap();
        let err = linker.link(0, None).unwrap_err();
        assert_eq!(err.key.as_deref(), Some("filename"));
    }

    fn template_without(block: &str, key: Option<&str>) -> ScenarioTemplate {
        let records = sample_template()
            .records()
            .iter()
            .filter(|r| r.block != block || key.is_some_and(|k| r.key != k))
            .cloned()
            .collect();
        ScenarioTemplate::from_records(records)
    }

    #[test]
    fn test_template_missing_channel_block_is_specification_error() {
        let linker = StageLinker::new(&sample_config(), template_without("ess", None)).unwrap();
        let err = linker.link(0, None).unwrap_err();
        assert_eq!(err.stage, Some(0));
        assert_eq!(err.block.as_deref(), Some("ess"));
        assert!(err.to_string().contains("no block 'ess'"));
    }

    #[test]
    fn test_template_missing_floor_key_is_specification_error() {
        let template = template_without("grid", Some("size_s2g_existing"));
        let linker = StageLinker::new(&sample_config(), template).unwrap();
        let err = linker.link(1, None).unwrap_err();
        assert_eq!(err.key.as_deref(), Some("size_s2g_existing"));
    }

    #[test]
    fn test_preflight_covers_every_stage() {
        let params = linker().preflight().unwrap();
        let years: Vec<_> = params.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2025, 2030, 2035]);
        assert_eq!(params[2].duration_years, 10);
    }

    #[test]
    fn test_link_is_reproducible() {
        let linker = linker();
        let a = linker.link(1, None).unwrap().content_hash().unwrap();
        let b = linker.link(1, None).unwrap().content_hash().unwrap();
        assert_eq!(a, b);
    }
}
