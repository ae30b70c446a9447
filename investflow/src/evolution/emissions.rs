//! Emissions-limit pathways.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};

/// One point of an explicit emissions trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrajectoryPoint {
    /// Calendar year.
    pub year: i32,
    /// Emissions limit in kg CO2 for the evaluation window.
    pub limit_kg: f64,
}

/// How the emissions limit evolves from its base-year value.
///
/// Every mechanism except `None` yields a non-increasing limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case", deny_unknown_fields)]
pub enum EmissionsPathway {
    /// Constant limit.
    None {
        /// Limit at and after the base year.
        base_limit_kg: f64,
    },
    /// Annual cap reduction: `base * max(0, 1 - rate * (year - base_year))`.
    LinearAnnualReduction {
        /// Limit at the base year.
        base_limit_kg: f64,
        /// Fraction of the base limit removed per year.
        rate: f64,
    },
    /// Straight line from the base limit to `final_limit_kg` at `final_year`,
    /// constant afterwards.
    Target {
        /// Limit at the base year.
        base_limit_kg: f64,
        /// Year the final limit is reached.
        final_year: i32,
        /// Limit from `final_year` on.
        final_limit_kg: f64,
    },
    /// Linear interpolation through explicit points, clamped at both ends.
    Trajectory {
        /// Points with strictly increasing years.
        points: Vec<TrajectoryPoint>,
    },
}

impl EmissionsPathway {
    /// Short mechanism name.
    #[must_use]
    pub fn mechanism(&self) -> &'static str {
        match self {
            Self::None { .. } => "none",
            Self::LinearAnnualReduction { .. } => "linear_annual_reduction",
            Self::Target { .. } => "target",
            Self::Trajectory { .. } => "trajectory",
        }
    }

    /// Returns true if the limit may never increase over time.
    #[must_use]
    pub fn is_non_increasing(&self) -> bool {
        !matches!(self, Self::None { .. })
    }

    /// Checks rates, limits and point ordering.
    pub fn validate(&self, base_year: i32) -> Result<(), ConfigurationError> {
        let field = "evolution.emissions";
        match self {
            Self::None { base_limit_kg } => check_limit(*base_limit_kg, field),
            Self::LinearAnnualReduction {
                base_limit_kg,
                rate,
            } => {
                check_limit(*base_limit_kg, field)?;
                if !rate.is_finite() || *rate < 0.0 {
                    return Err(ConfigurationError::new(format!(
                        "annual reduction rate must be finite and >= 0, got {rate}"
                    ))
                    .with_field(format!("{field}.rate")));
                }
                Ok(())
            }
            Self::Target {
                base_limit_kg,
                final_year,
                final_limit_kg,
            } => {
                check_limit(*base_limit_kg, field)?;
                check_limit(*final_limit_kg, field)?;
                if *final_year <= base_year {
                    return Err(ConfigurationError::new(format!(
                        "final year {final_year} must be after base year {base_year}"
                    ))
                    .with_field(format!("{field}.final_year")));
                }
                if final_limit_kg > base_limit_kg {
                    return Err(ConfigurationError::new(format!(
                        "final limit {final_limit_kg} exceeds base limit {base_limit_kg}"
                    ))
                    .with_field(format!("{field}.final_limit_kg")));
                }
                Ok(())
            }
            Self::Trajectory { points } => {
                if points.is_empty() {
                    return Err(ConfigurationError::new("trajectory needs at least one point")
                        .with_field(format!("{field}.points")));
                }
                for point in points {
                    check_limit(point.limit_kg, field)?;
                }
                for pair in points.windows(2) {
                    if pair[1].year <= pair[0].year {
                        return Err(ConfigurationError::new(format!(
                            "trajectory years must strictly increase ({} then {})",
                            pair[0].year, pair[1].year
                        ))
                        .with_field(format!("{field}.points")));
                    }
                    if pair[1].limit_kg > pair[0].limit_kg {
                        return Err(ConfigurationError::new(format!(
                            "trajectory limit rises from {} to {} at {}",
                            pair[0].limit_kg, pair[1].limit_kg, pair[1].year
                        ))
                        .with_field(format!("{field}.points")));
                    }
                }
                Ok(())
            }
        }
    }

    /// The emissions limit in force for `year`.
    #[must_use]
    pub fn limit_at(&self, base_year: i32, year: i32) -> f64 {
        let elapsed = f64::from(year - base_year);
        match self {
            Self::None { base_limit_kg } => *base_limit_kg,
            Self::LinearAnnualReduction {
                base_limit_kg,
                rate,
            } => base_limit_kg * (1.0 - rate * elapsed).max(0.0),
            Self::Target {
                base_limit_kg,
                final_year,
                final_limit_kg,
            } => {
                if year >= *final_year {
                    *final_limit_kg
                } else {
                    let span = f64::from(final_year - base_year);
                    let progress = (elapsed / span).clamp(0.0, 1.0);
                    base_limit_kg - (base_limit_kg - final_limit_kg) * progress
                }
            }
            Self::Trajectory { points } => interpolate(points, year),
        }
    }
}

fn check_limit(limit: f64, field: &str) -> Result<(), ConfigurationError> {
    if !limit.is_finite() || limit < 0.0 {
        return Err(ConfigurationError::new(format!(
            "emissions limit must be finite and >= 0, got {limit}"
        ))
        .with_field(field));
    }
    Ok(())
}

fn interpolate(points: &[TrajectoryPoint], year: i32) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if year <= first.year {
        return first.limit_kg;
    }
    if year >= last.year {
        return last.limit_kg;
    }
    points
        .windows(2)
        .find(|pair| year <= pair[1].year)
        .map_or(last.limit_kg, |pair| {
            let (a, b) = (pair[0], pair[1]);
            let t = f64::from(year - a.year) / f64::from(b.year - a.year);
            a.limit_kg + (b.limit_kg - a.limit_kg) * t
        })
}
