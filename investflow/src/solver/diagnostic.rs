//! Diagnostics for infeasible stages.

use crate::core::CapacitySnapshot;
use crate::linking::StageSpecification;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The constraint most likely responsible for infeasibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingConstraint {
    /// The emissions limit is below what the system could emit last stage.
    EmissionsLimit,
    /// Demand has grown beyond what the configuration can serve.
    DemandGrowth,
    /// Inherited capacity conflicts with this stage's constraints.
    CapacityFloor,
    /// No single constraint stands out.
    Unknown,
}

impl fmt::Display for BindingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmissionsLimit => write!(f, "emissions_limit"),
            Self::DemandGrowth => write!(f, "demand_growth"),
            Self::CapacityFloor => write!(f, "capacity_floor"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Evolved values and suggestions attached to an infeasible stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfeasibilityDiagnostic {
    /// Stage index.
    pub stage: usize,
    /// Stage year.
    pub year: i32,
    /// Suspected binding constraint.
    pub suspected: BindingConstraint,
    /// Emissions limit asserted for the stage.
    pub emissions_limit_kg: f64,
    /// Window emissions realized by the previous stage.
    pub previous_emissions_kg: Option<f64>,
    /// Demand scale relative to the base year.
    pub demand_scale: f64,
    /// Floor inherited from the previous stage.
    pub carried_capacity: CapacitySnapshot,
    /// Message reported by the optimizer.
    pub solver_message: String,
    /// Operator suggestions.
    pub suggestions: Vec<String>,
}

impl InfeasibilityDiagnostic {
    /// Names the suspected binding constraint from the stage's evolved values.
    ///
    /// A zero limit, or a limit below the previous stage's realized emissions,
    /// points at the emissions pathway. Otherwise grown demand is preferred
    /// over the capacity floor, and a first stage with nothing inherited and
    /// no growth is `Unknown`.
    #[must_use]
    pub fn assess(spec: &StageSpecification, solver_message: impl Into<String>) -> Self {
        let limit = spec.parameters.emissions_limit_kg;
        let scale = spec.parameters.demand_scale;
        let has_floor = spec.carried_capacity.iter().any(|(_, v)| v > 0.0);

        let emissions_bound = limit <= 0.0
            || spec
                .previous_emissions_kg
                .is_some_and(|previous| limit < previous);

        let suspected = if emissions_bound {
            BindingConstraint::EmissionsLimit
        } else if scale > 1.0 {
            BindingConstraint::DemandGrowth
        } else if has_floor {
            BindingConstraint::CapacityFloor
        } else {
            BindingConstraint::Unknown
        };

        let mut suggestions = Vec::new();
        match suspected {
            BindingConstraint::EmissionsLimit => {
                suggestions.push(format!(
                    "Increase the emissions limit (current: {limit:.0} kg) or slow its reduction"
                ));
            }
            BindingConstraint::DemandGrowth => {
                suggestions.push(format!(
                    "Reduce demand growth (current: {scale:.3}x the base year)"
                ));
            }
            BindingConstraint::CapacityFloor => {
                suggestions.push(
                    "Review capacity inherited from the previous stage against this stage's size limits"
                        .to_string(),
                );
            }
            BindingConstraint::Unknown => {}
        }
        suggestions.push("Check scenario constraints in the template".to_string());

        Self {
            stage: spec.index,
            year: spec.year,
            suspected,
            emissions_limit_kg: limit,
            previous_emissions_kg: spec.previous_emissions_kg,
            demand_scale: scale,
            carried_capacity: spec.carried_capacity.clone(),
            solver_message: solver_message.into(),
            suggestions,
        }
    }

    /// One-line description.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Stage {} ({}) infeasible; suspected binding constraint: {}",
            self.stage, self.year, self.suspected
        )
    }
}
