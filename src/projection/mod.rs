//! Delay projection: cascades observed delays downstream through each
//! train's remaining stops and across planned train transitions.

mod train;

pub use train::{project_train, ObservedTimes, StopProjection, TrainProjection};

use chrono::{Duration, NaiveTime};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;

use crate::constants::{DEFAULT_MAX_SAME_DAY_GAP, DEFAULT_MINIMUM_TRAVEL_TIME_RATIO, DEFAULT_PREDICTION_INTERVAL};
use crate::models::{DwellError, DwellRules, Stop, Train, TrainId};
use crate::storage::{StoreError, TimetableStore};
use crate::time::{self, TimeError};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("train {train}: stop {position} at {location} has no planned time")]
    IncompleteStop { train: TrainId, position: u32, location: String },
    #[error("train {train}: no minimum dwell at stop {position}: {source}")]
    Dwell {
        train: TrainId,
        position: u32,
        #[source]
        source: DwellError,
    },
    #[error("train {train}: time arithmetic failed at stop {position}: {source}")]
    Time {
        train: TrainId,
        position: u32,
        #[source]
        source: TimeError,
    },
    #[error("train {train}: {source}")]
    Store {
        train: TrainId,
        #[source]
        source: StoreError,
    },
}

impl ProjectionError {
    #[must_use]
    pub fn train(&self) -> TrainId {
        match self {
            Self::IncompleteStop { train, .. }
            | Self::Dwell { train, .. }
            | Self::Time { train, .. }
            | Self::Store { train, .. } => *train,
        }
    }
}

/// Tunables of the projection engine
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionConfig {
    /// Share of the scheduled running time a late train needs at least
    pub minimum_travel_time_ratio: f64,
    /// Never project an arrival earlier than planned, even for late trains
    pub hold_late_arrivals_to_schedule: bool,
    /// Longest scheduled gap between consecutive stops
    pub max_same_day_gap: Duration,
    /// Trains starting further ahead than this are not projected
    pub prediction_interval: Duration,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            minimum_travel_time_ratio: DEFAULT_MINIMUM_TRAVEL_TIME_RATIO,
            hold_late_arrivals_to_schedule: false,
            max_same_day_gap: DEFAULT_MAX_SAME_DAY_GAP,
            prediction_interval: DEFAULT_PREDICTION_INTERVAL,
        }
    }
}

/// Outcome of one projection pass
#[derive(Debug, Default)]
pub struct ProjectionReport {
    /// Trains whose projection was written, in batch order
    pub projected: Vec<TrainId>,
    /// Trains left untouched because projecting them failed
    pub failed: Vec<ProjectionError>,
    /// Non-fatal problems, such as stops without planned times
    pub issues: Vec<ProjectionError>,
}

impl ProjectionReport {
    fn merge(&mut self, outcome: ChainOutcome) {
        for result in outcome {
            match result {
                Ok(projection) => {
                    self.projected.push(projection.train);
                    self.issues.extend(projection.issues);
                }
                Err(e) => self.failed.push(e),
            }
        }
    }
}

type ChainOutcome = Vec<Result<TrainProjection, ProjectionError>>;

/// Projections of one train computed before giving up on a train that keeps
/// receiving observations
const WRITE_ATTEMPTS: u32 = 2;

/// Runs projection passes against a store
pub struct Projector<'a, S> {
    store: &'a S,
    config: ProjectionConfig,
}

impl<'a, S: TimetableStore> Projector<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, config: ProjectionConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Trains that have not reached their last stop and start no later than
    /// the prediction interval from `now`
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be read.
    pub fn select_active(&self, now: NaiveTime) -> Result<Vec<TrainId>, StoreError> {
        let horizon = time::add(now, self.config.prediction_interval)
            .ok()
            .filter(|sum| !sum.wrapped())
            .map(|sum| sum.time);

        let mut active = Vec::new();
        for id in self.store.train_ids()? {
            let stops = self.store.stops(id)?;
            if stops.last().is_some_and(Stop::has_observation) {
                continue;
            }
            let Some(start) = stops.iter().find_map(Stop::sort_time) else {
                continue;
            };
            if horizon.is_none_or(|horizon| start <= horizon) {
                active.push(id);
            }
        }
        Ok(active)
    }

    /// Project every active train
    ///
    /// # Errors
    ///
    /// See `run`.
    pub fn run_active(&self, now: NaiveTime) -> Result<ProjectionReport, StoreError> {
        let trains = self.select_active(now)?;
        self.run(&trains, now)
    }

    /// Project `trains` and write each result back atomically.
    ///
    /// Trains linked by transitions are projected in order so that a
    /// successor starts no earlier than its predecessor arrives; unrelated
    /// chains run in parallel. A failing train is reported and left
    /// untouched, the others still complete.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` only if the dwell rules cannot be read.
    pub fn run(&self, trains: &[TrainId], now: NaiveTime) -> Result<ProjectionReport, StoreError> {
        #[cfg(feature = "perf_timing")]
        let started = std::time::Instant::now();

        let rules = self.store.dwell_rules()?;
        let mut report = ProjectionReport::default();

        let mut loaded = IndexMap::new();
        for &id in trains {
            match self.store.train(id) {
                Ok(train) => {
                    loaded.insert(id, train);
                }
                Err(source) => report.failed.push(ProjectionError::Store { train: id, source }),
            }
        }

        let chains = transition_chains(&loaded);
        let outcomes: Vec<ChainOutcome> = chains
            .par_iter()
            .map(|chain| self.project_chain(chain, &rules, now))
            .collect();
        for outcome in outcomes {
            report.merge(outcome);
        }

        log::info!(
            "projected {} trains at {now} ({} failed, {} incomplete stops)",
            report.projected.len(),
            report.failed.len(),
            report.issues.len()
        );
        for e in &report.failed {
            log::warn!("{e}");
        }

        #[cfg(feature = "perf_timing")]
        log::info!("projection pass took {:?}", started.elapsed());

        Ok(report)
    }

    fn project_chain(&self, chain: &[&Train], rules: &DwellRules, now: NaiveTime) -> ChainOutcome {
        let mut inherited = None;
        chain
            .iter()
            .map(|train| {
                let result = self.project_one(train, rules, now, inherited);
                inherited = result.as_ref().ok().and_then(|p| p.final_frontier);
                result
            })
            .collect()
    }

    fn project_one(
        &self,
        train: &Train,
        rules: &DwellRules,
        now: NaiveTime,
        inherited: Option<NaiveTime>,
    ) -> Result<TrainProjection, ProjectionError> {
        let store_error = |source| ProjectionError::Store { train: train.id, source };
        let mut attempt = 1;
        loop {
            let stops = self.store.stops(train.id).map_err(store_error)?;
            let projection = project_train(train, &stops, rules, &self.config, now, inherited)?;
            match self.store.write_projection(&projection) {
                Ok(()) => return Ok(projection),
                Err(StoreError::StaleProjection(_)) if attempt < WRITE_ATTEMPTS => {
                    log::debug!("train {} observed during projection, projecting again", train.nr);
                    attempt += 1;
                }
                Err(source) => return Err(store_error(source)),
            }
        }
    }
}

/// Group trains into chains following `transition_to`, each chain ordered
/// predecessor first. Links to trains outside the batch are ignored.
fn transition_chains(trains: &IndexMap<TrainId, Train>) -> Vec<Vec<&Train>> {
    let mut visited = IndexSet::new();
    let mut chains = Vec::new();

    let is_head = |train: &Train| {
        train.transition_from.is_none_or(|from| {
            !trains.get(&from).is_some_and(|prev| prev.transition_to == Some(train.id))
        })
    };

    // Heads first, then whatever is left over from cycles
    let starts: Vec<&Train> = trains
        .values()
        .filter(|t| is_head(t))
        .chain(trains.values().filter(|t| !is_head(t)))
        .collect();

    for start in starts {
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(train) = current {
            if !visited.insert(train.id) {
                break;
            }
            chain.push(train);
            current = train.transition_to.and_then(|next| trains.get(&next));
        }
        if !chain.is_empty() {
            chains.push(chain);
        }
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MinimumDwellRule, Observation, Timetable};
    use crate::storage::InMemoryStore;

    fn hms(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).expect("valid time")
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        hms(hour, minute, 0)
    }

    fn fixture_timetable() -> Timetable {
        let mut timetable = Timetable::new();
        timetable.dwell_rules = DwellRules::new(vec![MinimumDwellRule::new(45, None, None, None)]);

        let mut first = Train::new(1, 102, None);
        first.transition_to = Some(2);
        timetable.add_train(
            first,
            vec![
                Stop::planned(0, "XWF", None, Some(hm(15, 30))),
                Stop::planned(1, "XLG", Some(hm(15, 34)), Some(hm(15, 34))),
                Stop::planned(2, "XBG", Some(hm(15, 35)), Some(hm(15, 36))),
                Stop::planned(3, "XDE", Some(hm(15, 39)), None),
            ],
        );

        let mut second = Train::new(2, 103, None);
        second.transition_from = Some(1);
        timetable.add_train(
            second,
            vec![
                Stop::planned(0, "XDE", None, Some(hm(15, 40))),
                Stop::planned(1, "XCE", Some(hm(15, 43)), None),
            ],
        );

        timetable.add_train(
            Train::new(3, 2342, None),
            vec![
                Stop::planned(0, "XPN", None, Some(hm(19, 21))),
                Stop::planned(1, "XLG", Some(hm(19, 23)), None),
            ],
        );
        timetable
    }

    #[test]
    fn test_transition_passes_delay_to_successor() {
        let store = InMemoryStore::new(fixture_timetable());
        store
            .record_observation(1, 0, Observation { departure: Some(hm(15, 32)), ..Observation::default() })
            .expect("stop exists");

        let projector = Projector::new(&store, ProjectionConfig::default());
        let report = projector.run(&[2, 1], hm(15, 34)).expect("rules readable");
        assert_eq!(report.projected, vec![1, 2]);
        assert!(report.failed.is_empty());
        assert_eq!(store.stops(2).expect("train exists")[0].dep_pred, Some(hm(15, 40)));

        projector.run(&[2, 1], hm(15, 37)).expect("rules readable");
        assert_eq!(store.stops(1).expect("train exists")[3].arr_pred, Some(hms(15, 41, 21)));
        let successor = store.stops(2).expect("train exists");
        assert_eq!(successor[0].dep_pred, Some(hms(15, 41, 21)));
        assert_eq!(successor[1].arr_pred, Some(hms(15, 44, 3)));
    }

    #[test]
    fn test_select_active_respects_horizon_and_finished_trains() {
        let store = InMemoryStore::new(fixture_timetable());
        let projector = Projector::new(&store, ProjectionConfig::default());
        assert_eq!(projector.select_active(hm(15, 0)).expect("store readable"), vec![1, 2]);
        assert_eq!(projector.select_active(hm(17, 30)).expect("store readable"), vec![1, 2, 3]);

        store
            .record_observation(2, 1, Observation { arrival: Some(hm(15, 44)), ..Observation::default() })
            .expect("stop exists");
        assert_eq!(projector.select_active(hm(17, 30)).expect("store readable"), vec![1, 3]);
    }

    #[test]
    fn test_failing_train_does_not_block_others() {
        let mut timetable = fixture_timetable();
        timetable.dwell_rules = DwellRules::new(vec![MinimumDwellRule::new(60, None, Some("XBG"), None)]);
        let store = InMemoryStore::new(timetable);

        let projector = Projector::new(&store, ProjectionConfig::default());
        let report = projector.run(&[1, 2, 3, 9], hm(15, 31)).expect("rules readable");

        let failed: Vec<TrainId> = report.failed.iter().map(ProjectionError::train).collect();
        assert_eq!(failed, vec![9, 1]);
        assert_eq!(report.projected, vec![2, 3]);
        assert!(store.stops(1).expect("train exists").iter().all(|s| s.dep_pred.is_none()));
        assert_eq!(store.stops(2).expect("train exists")[0].dep_pred, Some(hm(15, 40)));
    }

    #[test]
    fn test_incomplete_stops_are_reported() {
        let mut timetable = fixture_timetable();
        timetable.add_train(
            Train::new(3, 2342, None),
            vec![
                Stop::planned(0, "XPN", None, Some(hm(19, 21))),
                Stop::planned(1, "XXX", None, None),
                Stop::planned(2, "XLG", Some(hm(19, 23)), None),
            ],
        );
        let store = InMemoryStore::new(timetable);
        let report = Projector::new(&store, ProjectionConfig::default())
            .run(&[3], hm(19, 0))
            .expect("rules readable");
        assert_eq!(report.projected, vec![3]);
        assert!(matches!(report.issues.as_slice(), [ProjectionError::IncompleteStop { train: 3, position: 1, .. }]));
    }

    /// Records an observation right before the first projection write, as a
    /// concurrent request would
    struct ObservedMidPass {
        inner: InMemoryStore,
        pending: std::sync::Mutex<Option<(TrainId, u32, Observation)>>,
    }

    impl TimetableStore for ObservedMidPass {
        fn train_ids(&self) -> Result<Vec<TrainId>, StoreError> {
            self.inner.train_ids()
        }

        fn train(&self, id: TrainId) -> Result<Train, StoreError> {
            self.inner.train(id)
        }

        fn stops(&self, id: TrainId) -> Result<Vec<Stop>, StoreError> {
            self.inner.stops(id)
        }

        fn dwell_rules(&self) -> Result<DwellRules, StoreError> {
            self.inner.dwell_rules()
        }

        fn write_projection(&self, projection: &TrainProjection) -> Result<(), StoreError> {
            let pending = self.pending.lock().expect("lock not poisoned").take();
            if let Some((train, position, observation)) = pending {
                self.inner.record_observation(train, position, observation)?;
            }
            self.inner.write_projection(projection)
        }

        fn record_observation(&self, train: TrainId, position: u32, observation: Observation) -> Result<(), StoreError> {
            self.inner.record_observation(train, position, observation)
        }

        fn snapshot(&self) -> Result<Timetable, StoreError> {
            self.inner.snapshot()
        }
    }

    #[test]
    fn test_observation_during_pass_is_projected_again() {
        let departure = Observation { departure: Some(hm(15, 32)), ..Observation::default() };
        let store = ObservedMidPass {
            inner: InMemoryStore::new(fixture_timetable()),
            pending: std::sync::Mutex::new(Some((1, 0, departure))),
        };

        let report = Projector::new(&store, ProjectionConfig::default())
            .run(&[1], hm(15, 31))
            .expect("rules readable");
        assert_eq!(report.projected, vec![1]);
        assert!(report.failed.is_empty());

        let stops = store.stops(1).expect("train exists");
        assert_eq!(stops[0].dep_real, Some(hm(15, 32)));
        assert_eq!(stops[0].dep_pred, None);
        assert_eq!(stops[1].arr_pred, Some(hms(15, 35, 36)));
    }

    #[test]
    fn test_transition_chains_order_and_cycles() {
        let mut trains = IndexMap::new();
        let mut a = Train::new(1, 1, None);
        let mut b = Train::new(2, 2, None);
        a.transition_to = Some(2);
        b.transition_from = Some(1);
        let mut c = Train::new(3, 3, None);
        let mut d = Train::new(4, 4, None);
        c.transition_to = Some(4);
        c.transition_from = Some(4);
        d.transition_to = Some(3);
        d.transition_from = Some(3);
        for train in [b, a, c, d] {
            trains.insert(train.id, train);
        }

        let chains: Vec<Vec<TrainId>> = transition_chains(&trains)
            .iter()
            .map(|chain| chain.iter().map(|t| t.id).collect())
            .collect();
        assert_eq!(chains, vec![vec![1, 2], vec![3, 4]]);
    }
}
