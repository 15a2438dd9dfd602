//! Cascading projection of one train's stops.

use chrono::{Duration, NaiveTime};
use crate::models::{DwellRules, Stop, Train, TrainId};
use crate::time::{self, TimeSum};
use super::{ProjectionConfig, ProjectionError};

/// Projected times for one stop; `None` where nothing is projected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopProjection {
    pub position: u32,
    pub arr_pred: Option<NaiveTime>,
    pub dep_pred: Option<NaiveTime>,
}

/// Observed times of a stop at the moment it was projected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedTimes {
    pub position: u32,
    pub arr_real: Option<NaiveTime>,
    pub dep_real: Option<NaiveTime>,
}

impl ObservedTimes {
    #[must_use]
    pub fn of(stop: &Stop) -> Self {
        Self { position: stop.position, arr_real: stop.arr_real, dep_real: stop.dep_real }
    }
}

/// Result of projecting one train, written back as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct TrainProjection {
    pub train: TrainId,
    pub stops: Vec<StopProjection>,
    /// Observations the projection was computed from
    pub basis: Vec<ObservedTimes>,
    /// Stops skipped because they carry no planned time
    pub issues: Vec<ProjectionError>,
    /// Latest known or projected instant of the train, the lower bound for
    /// a successor train's first departure
    pub final_frontier: Option<NaiveTime>,
}

impl TrainProjection {
    /// Copy the projected fields onto `stops`, clearing the projection of
    /// every stop not covered. An observed time always wins over its
    /// projected counterpart.
    pub fn apply(&self, stops: &mut [Stop]) {
        for stop in stops.iter_mut() {
            let projection = self.stops.iter().find(|p| p.position == stop.position);
            stop.arr_pred = projection.and_then(|p| p.arr_pred).filter(|_| stop.arr_real.is_none());
            stop.dep_pred = projection.and_then(|p| p.dep_pred).filter(|_| stop.dep_real.is_none());
        }
    }

    /// Whether `stops` still carry the observations this projection was
    /// computed from
    #[must_use]
    pub fn is_current(&self, stops: &[Stop]) -> bool {
        stops.len() == self.basis.len()
            && stops.iter().zip(&self.basis).all(|(stop, seen)| ObservedTimes::of(stop) == *seen)
    }

    #[must_use]
    pub fn stop(&self, position: u32) -> Option<&StopProjection> {
        self.stops.iter().find(|p| p.position == position)
    }
}

/// Planned departure and running-time hint of the last usable stop
#[derive(Debug, Clone, Copy)]
struct Previous {
    dep_plan: Option<NaiveTime>,
    min_running_time: Option<u32>,
}

struct TrainProjector<'a> {
    train: &'a Train,
    rules: &'a DwellRules,
    config: &'a ProjectionConfig,
    now: NaiveTime,
}

impl TrainProjector<'_> {
    fn add(&self, position: u32, base: NaiveTime, duration: Duration) -> Result<NaiveTime, ProjectionError> {
        let TimeSum { time, rollover } = time::add(base, duration).map_err(|source| ProjectionError::Time {
            train: self.train.id,
            position,
            source,
        })?;
        if rollover != time::Rollover::None {
            log::warn!(
                "projection of train {} wrapped past midnight at stop {position} ({base} + {}s)",
                self.train.nr,
                duration.num_seconds()
            );
        }
        Ok(time)
    }

    /// Explicit minimum running time of the previous stop, else the scheduled
    /// running time scaled by the travel ratio
    fn running_time_floor(&self, previous: Previous, stop: &Stop) -> Result<Duration, ProjectionError> {
        if let Some(seconds) = previous.min_running_time {
            return Ok(Duration::seconds(i64::from(seconds)));
        }
        let (Some(dep_plan), Some(arr_plan)) = (previous.dep_plan, stop.arr_plan.or(stop.dep_plan)) else {
            return Ok(Duration::zero());
        };
        let planned = time::diff_within(arr_plan, dep_plan, self.config.max_same_day_gap).map_err(|source| {
            ProjectionError::Time { train: self.train.id, position: stop.position, source }
        })?;
        Ok(time::scale_duration(planned, self.config.minimum_travel_time_ratio))
    }

    fn projected_arrival(&self, previous: Previous, frontier: NaiveTime, stop: &Stop) -> Result<NaiveTime, ProjectionError> {
        let candidate = self.add(stop.position, frontier, self.running_time_floor(previous, stop)?)?;

        // A train that left on schedule keeps to the schedule; a late one may
        // gain time up to the running-time floor.
        let left_on_time = previous.dep_plan.is_none_or(|plan| frontier <= plan);
        let arrival = match stop.arr_plan {
            Some(plan) if left_on_time || self.config.hold_late_arrivals_to_schedule => candidate.max(plan),
            _ => candidate,
        };
        Ok(arrival.max(self.now))
    }

    fn required_dwell(&self, stop: &Stop) -> Result<Duration, ProjectionError> {
        if stop.is_timing_point() {
            return Ok(Duration::zero());
        }
        let seconds = match stop.min_dwell {
            Some(seconds) => seconds,
            None => self.rules
                .resolve(self.train.train_type, Some(&stop.location), stop.track_plan)
                .map_err(|source| ProjectionError::Dwell { train: self.train.id, position: stop.position, source })?,
        };
        Ok(Duration::seconds(i64::from(seconds)))
    }

    fn project(&self, stops: &[Stop], inherited: Option<NaiveTime>) -> Result<TrainProjection, ProjectionError> {
        let mut projection = TrainProjection {
            train: self.train.id,
            stops: stops
                .iter()
                .map(|s| StopProjection { position: s.position, arr_pred: None, dep_pred: None })
                .collect(),
            basis: stops.iter().map(ObservedTimes::of).collect(),
            issues: Vec::new(),
            final_frontier: None,
        };

        // Everything before the last observed stop has been passed already
        let anchor = stops.iter().rposition(Stop::has_observation).unwrap_or(0);
        let mut frontier: Option<NaiveTime> = None;
        let mut previous = Previous { dep_plan: None, min_running_time: None };

        for (idx, stop) in stops.iter().enumerate().skip(anchor) {
            if !stop.has_plan() {
                log::warn!("train {} has no planned time at stop {} ({})", self.train.nr, stop.position, stop.location);
                projection.issues.push(ProjectionError::IncompleteStop {
                    train: self.train.id,
                    position: stop.position,
                    location: stop.location.clone(),
                });
                if let Some(seen) = stop.dep_real.or(stop.arr_real) {
                    frontier = Some(seen);
                }
                continue;
            }

            let next_previous = Previous {
                dep_plan: stop.dep_plan.or(stop.arr_plan),
                min_running_time: stop.min_running_time,
            };

            if let Some(departed) = stop.dep_real {
                frontier = Some(departed);
                previous = next_previous;
                continue;
            }

            let out = &mut projection.stops[idx];
            let arrival = match (stop.arr_real, frontier) {
                (Some(arrived), _) => Some(arrived),
                (None, Some(frontier)) => {
                    let arrival = self.projected_arrival(previous, frontier, stop)?;
                    out.arr_pred = Some(arrival);
                    Some(arrival)
                }
                (None, None) => {
                    // Anchor without any observation: the train waits for its
                    // schedule, the clock and its predecessor
                    out.arr_pred = stop.arr_plan.map(|plan| plan.max(self.now).max(inherited.unwrap_or(plan)));
                    let Some(dep_plan) = stop.dep_plan else {
                        projection.final_frontier = out.arr_pred;
                        return Ok(projection);
                    };
                    let departure = dep_plan.max(self.now).max(inherited.unwrap_or(dep_plan));
                    out.dep_pred = Some(departure);
                    frontier = Some(departure);
                    previous = next_previous;
                    continue;
                }
            };

            let Some(dep_plan) = stop.dep_plan else {
                // Terminus: the chain ends, a successor train takes over
                projection.final_frontier = arrival;
                return Ok(projection);
            };

            let dwell = self.required_dwell(stop)?;
            let mut departure = dep_plan.max(self.now);
            if let Some(arrival) = arrival {
                departure = departure.max(self.add(stop.position, arrival, dwell)?);
            }
            projection.stops[idx].dep_pred = Some(departure);
            frontier = Some(departure);
            previous = next_previous;
        }

        projection.final_frontier = frontier;
        Ok(projection)
    }
}

/// Project one train from its last known position.
///
/// Pure function of its inputs; the store is not touched. `inherited` is
/// the final frontier of the train this one continues (transition), used as
/// the lower bound of its first departure.
///
/// # Errors
///
/// Returns `ProjectionError::Dwell` if a dwell lookup fails and
/// `ProjectionError::Time` on invalid time arithmetic. Stops without any
/// planned time are reported in `TrainProjection::issues` instead.
pub fn project_train(
    train: &Train,
    stops: &[Stop],
    rules: &DwellRules,
    config: &ProjectionConfig,
    now: NaiveTime,
    inherited: Option<NaiveTime>,
) -> Result<TrainProjection, ProjectionError> {
    TrainProjector { train, rules, config, now }.project(stops, inherited)
}
