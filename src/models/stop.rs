use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// One scheduled calling point of a train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Schedule position within the train, strictly increasing
    pub position: u32,
    pub location: String,
    #[serde(default)]
    pub track_plan: Option<u32>,
    #[serde(default)]
    pub arr_plan: Option<NaiveTime>,
    #[serde(default)]
    pub dep_plan: Option<NaiveTime>,
    /// Minimum running time from here to the next stop, in seconds
    #[serde(default)]
    pub min_running_time: Option<u32>,
    /// Minimum dwell at this stop in seconds, overriding the dwell rules
    #[serde(default)]
    pub min_dwell: Option<u32>,

    #[serde(default)]
    pub arr_real: Option<NaiveTime>,
    #[serde(default)]
    pub dep_real: Option<NaiveTime>,
    #[serde(default)]
    pub track_real: Option<u32>,

    #[serde(default)]
    pub arr_pred: Option<NaiveTime>,
    #[serde(default)]
    pub dep_pred: Option<NaiveTime>,
}

/// A recorded event at a stop. Fields left `None` keep their stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub arrival: Option<NaiveTime>,
    #[serde(default)]
    pub departure: Option<NaiveTime>,
    #[serde(default)]
    pub track: Option<u32>,
}

impl Stop {
    #[must_use]
    pub fn planned(position: u32, location: &str, arr_plan: Option<NaiveTime>, dep_plan: Option<NaiveTime>) -> Self {
        Self {
            position,
            location: location.to_string(),
            track_plan: None,
            arr_plan,
            dep_plan,
            min_running_time: None,
            min_dwell: None,
            arr_real: None,
            dep_real: None,
            track_real: None,
            arr_pred: None,
            dep_pred: None,
        }
    }

    /// A stop with equal planned arrival and departure has no scheduled dwell
    #[must_use]
    pub fn is_timing_point(&self) -> bool {
        matches!((self.arr_plan, self.dep_plan), (Some(arr), Some(dep)) if arr == dep)
    }

    #[must_use]
    pub fn has_plan(&self) -> bool {
        self.arr_plan.is_some() || self.dep_plan.is_some()
    }

    #[must_use]
    pub fn has_observation(&self) -> bool {
        self.arr_real.is_some() || self.dep_real.is_some()
    }

    /// Observed, else projected, else planned arrival
    #[must_use]
    pub fn effective_arrival(&self) -> Option<NaiveTime> {
        self.arr_real.or(self.arr_pred).or(self.arr_plan)
    }

    /// Observed, else projected, else planned departure
    #[must_use]
    pub fn effective_departure(&self) -> Option<NaiveTime> {
        self.dep_real.or(self.dep_pred).or(self.dep_plan)
    }

    /// Time used to order stops chronologically when no position is known
    #[must_use]
    pub fn sort_time(&self) -> Option<NaiveTime> {
        self.arr_plan.or(self.dep_plan)
    }

    /// Record an observation. Observed values are only ever replaced, never
    /// cleared, and the matching projection is dropped.
    pub fn observe(&mut self, observation: Observation) {
        if let Some(arrival) = observation.arrival {
            self.arr_real = Some(arrival);
            self.arr_pred = None;
        }
        if let Some(departure) = observation.departure {
            self.dep_real = Some(departure);
            self.dep_pred = None;
        }
        if let Some(track) = observation.track {
            self.track_real = Some(track);
        }
    }
}
