//! Per-stage financial and technical outcome.

use crate::core::CapacitySnapshot;
use serde::{Deserialize, Serialize};

/// Where a stage's cash flow came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashflowBasis {
    /// The solver reported a stage NPV.
    SolverNpv,
    /// No NPV reported; `-(capex + extrapolated opex)`.
    Costs,
}

/// Metrics of one solved stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage index.
    pub index: usize,
    /// Stage year.
    pub year: i32,
    /// Stage duration in years.
    pub duration_years: u32,
    /// Floor the stage was solved against.
    pub carried_capacity: CapacitySnapshot,
    /// Realized totals.
    pub realized_capacity: CapacitySnapshot,
    /// Realized totals minus the floor.
    pub additions: CapacitySnapshot,
    /// Capital expenditure.
    pub capex: f64,
    /// Operating cost over the evaluation window.
    pub window_opex: f64,
    /// Operating cost scaled to the stage duration.
    pub extrapolated_opex: f64,
    /// Emissions over the evaluation window in kg.
    pub window_emissions_kg: f64,
    /// Emissions scaled to the stage duration in kg.
    pub extrapolated_emissions_kg: f64,
    /// Evaluation window length in years.
    pub window_years: f64,
    /// `duration_years / window_years`, or 1 when compensation is off.
    pub extrapolation_factor: f64,
    /// NPV reported by the solver, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_npv: Option<f64>,
    /// Undiscounted stage cash flow.
    pub cashflow: f64,
    /// Origin of `cashflow`.
    pub cashflow_basis: CashflowBasis,
    /// `1 / (1 + wacc)^(year - npv_base_year)`.
    pub discount_factor: f64,
    /// `cashflow * discount_factor`.
    pub discounted_cashflow: f64,
    /// Limit asserted for the stage.
    pub emissions_limit_kg: f64,
    /// Window emissions within the limit.
    pub emissions_compliant: bool,
    /// Hash of the specification the stage was solved from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_hash: Option<String>,
}
