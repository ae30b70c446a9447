//! Comparing scenario variants against a baseline run.
//!
//! Variants named `<parameter>_low` and `<parameter>_high` are paired into
//! tornado bars.

use super::MultiStageResult;
use serde::{Deserialize, Serialize};

/// Difference of one variant against the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDelta {
    /// Variant name.
    pub name: String,
    /// The variant run completed every stage.
    pub completed: bool,
    /// `variant.total_npv - base.total_npv`.
    pub delta_npv: f64,
    /// `variant.total_capex - base.total_capex`.
    pub delta_capex: f64,
    /// Final realized totals minus the baseline's, per channel.
    pub delta_final_capacity: Vec<(String, f64)>,
}

impl VariantDelta {
    /// Compares `variant` against `base`.
    #[must_use]
    pub fn between(name: impl Into<String>, base: &MultiStageResult, variant: &MultiStageResult) -> Self {
        let last = |r: &MultiStageResult| r.timeline.entries.last().map(|e| e.totals.clone());
        let base_final = last(base).unwrap_or_default();
        let variant_final = last(variant).unwrap_or_default();

        let mut channels: Vec<&str> = base_final.iter().map(|(id, _)| id).collect();
        for (id, _) in variant_final.iter() {
            if !channels.contains(&id) {
                channels.push(id);
            }
        }
        let delta_final_capacity = channels
            .into_iter()
            .map(|id| {
                let delta = variant_final.get(id).unwrap_or(0.0) - base_final.get(id).unwrap_or(0.0);
                (id.to_string(), delta)
            })
            .collect();

        Self {
            name: name.into(),
            completed: variant.status.is_completed(),
            delta_npv: variant.total_npv - base.total_npv,
            delta_capex: variant.total_capex - base.total_capex,
            delta_final_capacity,
        }
    }
}

/// One parameter's low/high swing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoBar {
    /// Parameter name.
    pub parameter: String,
    /// ΔNPV of the `_low` variant.
    pub low_delta: Option<f64>,
    /// ΔNPV of the `_high` variant.
    pub high_delta: Option<f64>,
}

impl TornadoBar {
    /// Largest absolute ΔNPV of either side.
    #[must_use]
    pub fn swing(&self) -> f64 {
        let low = self.low_delta.map_or(0.0, f64::abs);
        let high = self.high_delta.map_or(0.0, f64::abs);
        low.max(high)
    }
}

/// Variants ranked by NPV impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityReport {
    /// Largest |ΔNPV| first.
    pub variants: Vec<VariantDelta>,
}

impl SensitivityReport {
    /// Tornado bars ordered by swing, largest first. Ties keep name order.
    #[must_use]
    pub fn tornado(&self) -> Vec<TornadoBar> {
        let mut bars: Vec<TornadoBar> = Vec::new();
        for variant in &self.variants {
            let (parameter, is_low) = if let Some(p) = variant.name.strip_suffix("_low") {
                (p, true)
            } else if let Some(p) = variant.name.strip_suffix("_high") {
                (p, false)
            } else {
                continue;
            };

            let index = match bars.iter().position(|b| b.parameter == parameter) {
                Some(index) => index,
                None => {
                    bars.push(TornadoBar {
                        parameter: parameter.to_string(),
                        low_delta: None,
                        high_delta: None,
                    });
                    bars.len() - 1
                }
            };
            if is_low {
                bars[index].low_delta = Some(variant.delta_npv);
            } else {
                bars[index].high_delta = Some(variant.delta_npv);
            }
        }
        bars.sort_by(|a, b| {
            b.swing()
                .total_cmp(&a.swing())
                .then_with(|| a.parameter.cmp(&b.parameter))
        });
        bars
    }
}

/// A baseline run and its variants.
#[derive(Debug, Clone, Default)]
pub struct RunComparison {
    base: Option<MultiStageResult>,
    variants: Vec<(String, MultiStageResult)>,
}

impl RunComparison {
    /// Starts a comparison against `base`.
    #[must_use]
    pub fn new(base: MultiStageResult) -> Self {
        Self {
            base: Some(base),
            variants: Vec::new(),
        }
    }

    /// Adds a named variant.
    #[must_use]
    pub fn with_variant(mut self, name: impl Into<String>, result: MultiStageResult) -> Self {
        self.variants.push((name.into(), result));
        self
    }

    /// Number of variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Returns true if there are no variants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Ranks variants by |ΔNPV|, largest first. Ties keep insertion order.
    #[must_use]
    pub fn rank(&self) -> SensitivityReport {
        let Some(base) = &self.base else {
            return SensitivityReport { variants: Vec::new() };
        };
        let mut variants: Vec<VariantDelta> = self
            .variants
            .iter()
            .map(|(name, result)| VariantDelta::between(name.clone(), base, result))
            .collect();
        variants.sort_by(|a, b| b.delta_npv.abs().total_cmp(&a.delta_npv.abs()));
        SensitivityReport { variants }
    }
}
