//! Investable capacity channels and per-stage capacity snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Physical unit a capacity channel is sized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityUnit {
    /// Power in watts.
    #[serde(rename = "W")]
    Watt,
    /// Energy in watt-hours.
    #[serde(rename = "Wh")]
    WattHour,
    /// A count of discrete units (e.g. chargers).
    #[serde(rename = "count")]
    Count,
}

impl fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watt => write!(f, "W"),
            Self::WattHour => write!(f, "Wh"),
            Self::Count => write!(f, "count"),
        }
    }
}

/// Describes where one investable capacity lives in the optimizer's
/// parameter space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityChannel {
    /// Channel identifier used in snapshots and timelines.
    pub id: String,
    /// Optimizer block holding the channel's parameters.
    pub block: String,
    /// Input key receiving the carried-forward floor.
    pub existing_key: String,
    /// Output key holding the realized total.
    pub total_key: String,
    /// Output key holding new additions, if the optimizer reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_key: Option<String>,
    /// Unit of the channel.
    pub unit: CapacityUnit,
}

impl CapacityChannel {
    /// Creates a channel following the `size_existing` / `size_total` key convention.
    #[must_use]
    pub fn sized(id: impl Into<String>, block: impl Into<String>, unit: CapacityUnit) -> Self {
        Self {
            id: id.into(),
            block: block.into(),
            existing_key: "size_existing".to_string(),
            total_key: "size_total".to_string(),
            additional_key: Some("size_additional".to_string()),
            unit,
        }
    }

    fn grid(direction: &str) -> Self {
        Self {
            id: format!("grid_{direction}"),
            block: "grid".to_string(),
            existing_key: format!("size_{direction}_existing"),
            total_key: format!("size_{direction}_total"),
            additional_key: Some(format!("size_{direction}_additional")),
            unit: CapacityUnit::Watt,
        }
    }
}

/// The default channel set: PV, stationary storage and both grid directions.
#[must_use]
pub fn default_channels() -> Vec<CapacityChannel> {
    vec![
        CapacityChannel::sized("pv", "pv", CapacityUnit::Watt),
        CapacityChannel::sized("ess", "ess", CapacityUnit::WattHour),
        CapacityChannel::grid("g2s"),
        CapacityChannel::grid("s2g"),
    ]
}

/// Installed capacity per channel at the end of a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapacitySnapshot(BTreeMap<String, f64>);

impl CapacitySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot with every channel at zero.
    #[must_use]
    pub fn zero(channels: &[CapacityChannel]) -> Self {
        Self(channels.iter().map(|c| (c.id.clone(), 0.0)).collect())
    }

    /// Returns the capacity of a channel.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<f64> {
        self.0.get(channel).copied()
    }

    /// Sets the capacity of a channel.
    pub fn set(&mut self, channel: impl Into<String>, value: f64) {
        self.0.insert(channel.into(), value);
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, channel: impl Into<String>, value: f64) -> Self {
        self.set(channel, value);
        self
    }

    /// Iterates channels in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of channels in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot holds no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first channel where `self` falls below `floor` by more
    /// than `tolerance`, as `(channel, realized, floor)`.
    ///
    /// A channel missing from `self` counts as zero.
    #[must_use]
    pub fn first_violation(&self, floor: &Self, tolerance: f64) -> Option<(String, f64, f64)> {
        floor.iter().find_map(|(id, min)| {
            let realized = self.get(id).unwrap_or(0.0);
            (realized + tolerance < min).then(|| (id.to_string(), realized, min))
        })
    }

    /// Returns true if every channel is at or above `floor`.
    #[must_use]
    pub fn dominates(&self, floor: &Self) -> bool {
        self.first_violation(floor, 0.0).is_none()
    }

    /// Raises every channel to at least its `floor`. Channels only present
    /// in `floor` are added at the floor value.
    #[must_use]
    pub fn raised_to(&self, floor: &Self) -> Self {
        let mut raised = self.clone();
        for (id, min) in floor.iter() {
            let entry = raised.0.entry(id.to_string()).or_insert(min);
            *entry = entry.max(min);
        }
        raised
    }

    /// Per-channel additions over a previous floor (`self - floor`).
    #[must_use]
    pub fn additions_over(&self, floor: &Self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(id, total)| (id.clone(), total - floor.get(id).unwrap_or(0.0)))
                .collect(),
        )
    }
}

impl FromIterator<(String, f64)> for CapacitySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
