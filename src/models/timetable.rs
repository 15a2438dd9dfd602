use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use super::{DwellRules, Stop, Train, TrainId, TrainType, TrainTypeId, TrainView};

/// Everything the projection engine and the display queries read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timetable {
    #[serde(default)]
    pub train_types: IndexMap<TrainTypeId, TrainType>,
    #[serde(default)]
    pub trains: IndexMap<TrainId, Train>,
    /// Stops per train, kept sorted by schedule position
    #[serde(default)]
    pub stops: HashMap<TrainId, Vec<Stop>>,
    #[serde(default)]
    pub dwell_rules: DwellRules,
}

impl Timetable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_train_type(&mut self, train_type: TrainType) {
        self.train_types.insert(train_type.id, train_type);
    }

    /// Insert or replace a train together with its stops
    pub fn add_train(&mut self, train: Train, mut stops: Vec<Stop>) {
        stops.sort_by_key(|s| s.position);
        self.stops.insert(train.id, stops);
        self.trains.insert(train.id, train);
    }

    #[must_use]
    pub fn train_type_by_name(&self, name: &str) -> Option<&TrainType> {
        self.train_types.values().find(|t| t.name == name)
    }

    #[must_use]
    pub fn stops_of(&self, train: TrainId) -> &[Stop] {
        self.stops.get(&train).map_or(&[], Vec::as_slice)
    }

    /// The train with its type and transition partners resolved
    #[must_use]
    pub fn view(&self, train: TrainId) -> Option<TrainView<'_>> {
        let train = self.trains.get(&train)?;
        Some(TrainView {
            train,
            train_type: train.train_type.and_then(|id| self.train_types.get(&id)),
            transition_from: train.transition_from.and_then(|id| self.trains.get(&id)),
            transition_to: train.transition_to.and_then(|id| self.trains.get(&id)),
        })
    }

    /// A train is finished once its last stop has been reached
    #[must_use]
    pub fn is_finished(&self, train: TrainId) -> bool {
        self.stops_of(train)
            .last()
            .is_some_and(|last| last.arr_real.is_some() || last.dep_real.is_some())
    }
}
