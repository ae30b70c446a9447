//! Core planning types: stage status, capacity channels and snapshots, stages.

mod capacity;
mod stage;
mod status;

pub use capacity::{default_channels, CapacityChannel, CapacitySnapshot, CapacityUnit};
pub use stage::Stage;
pub use status::{RunStatus, StageStatus};
