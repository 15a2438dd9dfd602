use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{DwellRules, Observation, Stop, Timetable, Train, TrainId};
use crate::projection::TrainProjection;
use super::{StoreError, TimetableStore};

/// Timetable held in memory behind a read-write lock
#[derive(Debug, Default)]
pub struct InMemoryStore {
    timetable: RwLock<Timetable>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(timetable: Timetable) -> Self {
        Self { timetable: RwLock::new(timetable) }
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Timetable>, StoreError> {
        self.timetable.read().map_err(|_| StoreError::Poisoned)
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Timetable>, StoreError> {
        self.timetable.write().map_err(|_| StoreError::Poisoned)
    }

    /// Run a query against the stored timetable without copying it
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Poisoned` if a writer panicked.
    pub fn read<R>(&self, f: impl FnOnce(&Timetable) -> R) -> Result<R, StoreError> {
        let timetable = self.read_lock()?;
        Ok(f(&timetable))
    }

    /// Swap in a freshly loaded timetable
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Poisoned` if a writer panicked.
    pub fn replace(&self, timetable: Timetable) -> Result<(), StoreError> {
        *self.write_lock()? = timetable;
        Ok(())
    }
}

impl TimetableStore for InMemoryStore {
    fn train_ids(&self) -> Result<Vec<TrainId>, StoreError> {
        self.read(|t| t.trains.keys().copied().collect())
    }

    fn train(&self, id: TrainId) -> Result<Train, StoreError> {
        self.read_lock()?.trains.get(&id).cloned().ok_or(StoreError::UnknownTrain(id))
    }

    fn stops(&self, id: TrainId) -> Result<Vec<Stop>, StoreError> {
        self.read_lock()?.stops.get(&id).cloned().ok_or(StoreError::UnknownTrain(id))
    }

    fn dwell_rules(&self) -> Result<DwellRules, StoreError> {
        self.read(|t| t.dwell_rules.clone())
    }

    fn write_projection(&self, projection: &TrainProjection) -> Result<(), StoreError> {
        let mut timetable = self.write_lock()?;
        let stops = timetable
            .stops
            .get_mut(&projection.train)
            .ok_or(StoreError::UnknownTrain(projection.train))?;

        // Validate everything before touching any stop
        if let Some(missing) = projection
            .stops
            .iter()
            .find(|p| !stops.iter().any(|s| s.position == p.position))
        {
            return Err(StoreError::UnknownStop { train: projection.train, position: missing.position });
        }
        if !projection.is_current(stops) {
            return Err(StoreError::StaleProjection(projection.train));
        }

        projection.apply(stops);
        Ok(())
    }

    fn record_observation(&self, train: TrainId, position: u32, observation: Observation) -> Result<(), StoreError> {
        let mut timetable = self.write_lock()?;
        let stop = timetable
            .stops
            .get_mut(&train)
            .ok_or(StoreError::UnknownTrain(train))?
            .iter_mut()
            .find(|s| s.position == position)
            .ok_or(StoreError::UnknownStop { train, position })?;

        stop.observe(observation);
        log::debug!("observation for train {train} at {} recorded: {observation:?}", stop.location);
        Ok(())
    }

    fn snapshot(&self) -> Result<Timetable, StoreError> {
        self.read(Clone::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{project_train, ObservedTimes, ProjectionConfig, StopProjection};
    use chrono::NaiveTime;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn store() -> InMemoryStore {
        let mut timetable = Timetable::new();
        timetable.add_train(
            Train::new(1, 102, None),
            vec![
                Stop::planned(0, "XWF", None, Some(hm(15, 30))),
                Stop::planned(1, "XLG", Some(hm(15, 34)), Some(hm(15, 34))),
            ],
        );
        InMemoryStore::new(timetable)
    }

    fn projection(store: &InMemoryStore, positions: &[u32]) -> TrainProjection {
        let stops = store.stops(1).expect("train exists");
        TrainProjection {
            train: 1,
            basis: stops.iter().map(ObservedTimes::of).collect(),
            stops: positions
                .iter()
                .map(|&position| StopProjection {
                    position,
                    arr_pred: Some(hm(15, 40)),
                    dep_pred: Some(hm(15, 41)),
                })
                .collect(),
            issues: Vec::new(),
            final_frontier: None,
        }
    }

    #[test]
    fn test_write_projection_replaces_all_fields() {
        let store = store();
        store.write_projection(&projection(&store, &[0, 1])).expect("train exists");
        store.write_projection(&projection(&store, &[1])).expect("train exists");

        let stops = store.stops(1).expect("train exists");
        assert_eq!(stops[0].dep_pred, None);
        assert_eq!(stops[1].dep_pred, Some(hm(15, 41)));
    }

    #[test]
    fn test_write_projection_is_all_or_nothing() {
        let store = store();
        let result = store.write_projection(&projection(&store, &[1, 7]));
        assert_eq!(result, Err(StoreError::UnknownStop { train: 1, position: 7 }));
        assert!(store.stops(1).expect("train exists").iter().all(|s| s.dep_pred.is_none()));
    }

    #[test]
    fn test_stale_projection_is_rejected() {
        let store = store();
        let train = store.train(1).expect("train exists");
        let stops = store.stops(1).expect("train exists");
        let config = ProjectionConfig::default();
        let projection =
            project_train(&train, &stops, &DwellRules::default(), &config, hm(15, 31), None).expect("projectable");

        let departure = Observation { departure: Some(hm(15, 33)), ..Observation::default() };
        store.record_observation(1, 0, departure).expect("stop exists");

        assert_eq!(store.write_projection(&projection), Err(StoreError::StaleProjection(1)));
        let stops = store.stops(1).expect("train exists");
        assert_eq!(stops[0].dep_real, Some(hm(15, 33)));
        assert_eq!(stops[0].dep_pred, None);
        assert_eq!(stops[1].arr_pred, None);
    }

    #[test]
    fn test_record_observation() {
        let store = store();
        let observation = Observation { departure: Some(hm(15, 32)), ..Observation::default() };
        store.record_observation(1, 0, observation).expect("stop exists");
        assert_eq!(store.stops(1).expect("train exists")[0].dep_real, Some(hm(15, 32)));

        assert_eq!(store.record_observation(2, 0, observation), Err(StoreError::UnknownTrain(2)));
        assert_eq!(
            store.record_observation(1, 9, observation),
            Err(StoreError::UnknownStop { train: 1, position: 9 })
        );
    }

    #[test]
    fn test_unknown_train() {
        let store = InMemoryStore::default();
        assert_eq!(store.train(4), Err(StoreError::UnknownTrain(4)));
        assert!(store.train_ids().expect("lock held").is_empty());
    }
}
