mod file;
mod memory;

pub use file::{
    deserialize_timetable, load_snapshot, save_snapshot, serialize_timetable, SnapshotError,
    SNAPSHOT_VERSION,
};
pub use memory::InMemoryStore;

use crate::models::{DwellRules, Observation, Stop, Timetable, Train, TrainId};
use crate::projection::TrainProjection;

const GB: f64 = 1_073_741_824.0;
const MB: f64 = 1_048_576.0;
const KB: f64 = 1_024.0;

/// Format bytes into a human-readable string with appropriate units
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.1} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.1} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.1} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown train {0}")]
    UnknownTrain(TrainId),
    #[error("train {train} has no stop at position {position}")]
    UnknownStop { train: TrainId, position: u32 },
    #[error("observations of train {0} changed while it was projected")]
    StaleProjection(TrainId),
    #[error("timetable lock poisoned")]
    Poisoned,
}

/// Storage of trains, stops and dwell rules shared by the projection engine
/// and the display queries
pub trait TimetableStore: Sync {
    /// Ids of all trains, in insertion order
    fn train_ids(&self) -> Result<Vec<TrainId>, StoreError>;

    fn train(&self, id: TrainId) -> Result<Train, StoreError>;

    /// Stops of a train ordered by schedule position
    fn stops(&self, id: TrainId) -> Result<Vec<Stop>, StoreError>;

    /// Current dwell rule set, read once per projection pass
    fn dwell_rules(&self) -> Result<DwellRules, StoreError>;

    /// Replace the projected fields of one train's stops in a single step.
    /// Stops not covered by the projection lose their projected values.
    /// Fails with `StoreError::StaleProjection`, writing nothing, if the
    /// train's observations differ from those the projection was based on.
    fn write_projection(&self, projection: &TrainProjection) -> Result<(), StoreError>;

    fn record_observation(&self, train: TrainId, position: u32, observation: Observation) -> Result<(), StoreError>;

    /// Consistent copy of everything stored
    fn snapshot(&self) -> Result<Timetable, StoreError>;
}
