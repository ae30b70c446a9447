//! Capacity totals and additions over the planning horizon.

use super::StageResult;
use crate::core::CapacitySnapshot;
use serde::{Deserialize, Serialize};

/// Capacity of one solved stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Stage index.
    pub index: usize,
    /// Stage year.
    pub year: i32,
    /// Realized totals.
    pub totals: CapacitySnapshot,
    /// Additions over the carried floor.
    pub additions: CapacitySnapshot,
    /// Stage capex.
    pub capex: f64,
}

/// One channel's movement between consecutive stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    /// Stage year.
    pub year: i32,
    /// Channel id.
    pub channel: String,
    /// Realized total.
    pub total: f64,
    /// Added this stage.
    pub added: f64,
    /// Percent change against the previous stage's total, if it was non-zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
}

/// Investment timeline across solved stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityTimeline {
    /// Channel ids in column order.
    pub channels: Vec<String>,
    /// Solved stages in order.
    pub entries: Vec<TimelineEntry>,
}

impl CapacityTimeline {
    /// Builds the timeline from solved stage results.
    #[must_use]
    pub fn from_results(results: &[StageResult]) -> Self {
        let mut channels: Vec<String> = Vec::new();
        for result in results {
            for (id, _) in result.realized_capacity.iter() {
                if !channels.iter().any(|c| c == id) {
                    channels.push(id.to_string());
                }
            }
        }

        let entries = results
            .iter()
            .map(|r| TimelineEntry {
                index: r.index,
                year: r.year,
                totals: r.realized_capacity.clone(),
                additions: r.additions.clone(),
                capex: r.capex,
            })
            .collect();
        Self { channels, entries }
    }

    /// `(year, total)` pairs for one channel.
    #[must_use]
    pub fn series(&self, channel: &str) -> Vec<(i32, f64)> {
        self.entries
            .iter()
            .map(|e| (e.year, e.totals.get(channel).unwrap_or(0.0)))
            .collect()
    }

    /// Returns true if every channel's total never decreases.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[1].totals.dominates(&pair[0].totals))
    }

    /// Per-channel rows with stage-over-stage percent change.
    #[must_use]
    pub fn trajectory(&self) -> Vec<TrajectoryRow> {
        let mut rows = Vec::with_capacity(self.entries.len() * self.channels.len());
        for channel in &self.channels {
            let mut previous: Option<f64> = None;
            for entry in &self.entries {
                let total = entry.totals.get(channel).unwrap_or(0.0);
                let change_pct = previous
                    .filter(|p| *p != 0.0)
                    .map(|p| (total - p) / p * 100.0);
                rows.push(TrajectoryRow {
                    year: entry.year,
                    channel: channel.clone(),
                    total,
                    added: entry.additions.get(channel).unwrap_or(0.0),
                    change_pct,
                });
                previous = Some(total);
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solved_stage_result;

    fn timeline() -> CapacityTimeline {
        let results = vec![
            solved_stage_result(0, 2025, CapacitySnapshot::new().with("pv", 0.0).with("ess", 10.0)),
            solved_stage_result(1, 2030, CapacitySnapshot::new().with("pv", 50.0).with("ess", 10.0)),
            solved_stage_result(2, 2035, CapacitySnapshot::new().with("pv", 75.0).with("ess", 15.0)),
        ];
        CapacityTimeline::from_results(&results)
    }

    #[test]
    fn test_series_and_monotonic() {
        let timeline = timeline();
        assert_eq!(timeline.series("pv"), vec![(2025, 0.0), (2030, 50.0), (2035, 75.0)]);
        assert!(timeline.is_monotonic());
    }

    #[test]
    fn test_trajectory_percent_change() {
        let rows = timeline().trajectory();
        let pv: Vec<_> = rows.iter().filter(|r| r.channel == "pv").collect();
        assert_eq!(pv[0].change_pct, None);
        // previous total was zero
        assert_eq!(pv[1].change_pct, None);
        assert_eq!(pv[2].change_pct, Some(50.0));

        let ess: Vec<_> = rows.iter().filter(|r| r.channel == "ess").collect();
        assert_eq!(ess[1].change_pct, Some(0.0));
        assert_eq!(ess[2].change_pct, Some(50.0));
    }

    #[test]
    fn test_decrease_is_not_monotonic() {
        let results = vec![
            solved_stage_result(0, 2025, CapacitySnapshot::new().with("pv", 50.0)),
            solved_stage_result(1, 2030, CapacitySnapshot::new().with("pv", 40.0)),
        ];
        assert!(!CapacityTimeline::from_results(&results).is_monotonic());
    }
}
