mod dwell_rule;
mod line;
mod stop;
mod timetable;
mod train;

pub use dwell_rule::{DwellError, DwellRules, MatchScore, MinimumDwellRule, RuleRank};
pub use line::{Line, LineDefinition, LineError, LineRegistry, LocationMarker, MarkerDefinition, REVERSED_PREFIX};
pub use stop::{Observation, Stop};
pub use timetable::Timetable;
pub use train::{Train, TrainCategory, TrainId, TrainType, TrainTypeId, TrainView};

#[cfg(test)]
pub(crate) use line::sample_line;
