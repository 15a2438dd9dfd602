use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use crate::models::{
    DwellRules, MinimumDwellRule, Observation, Stop, Timetable, Train, TrainCategory, TrainId, TrainType,
    TrainTypeId,
};
use super::shared::{line_of, optional_time};
use super::ImportError;

/// One row of a timetable file: a stop of a train, with the train's own
/// attributes repeated on every row and read from the first
#[derive(Debug, Deserialize)]
struct TimetableRow {
    train: u32,
    #[serde(rename = "type")]
    train_type: Option<String>,
    category: Option<String>,
    stop: u32,
    location: String,
    track: Option<u32>,
    arrival: Option<String>,
    departure: Option<String>,
    min_running_time: Option<u32>,
    min_dwell: Option<u32>,
    #[serde(default)]
    arr_real: Option<String>,
    #[serde(default)]
    dep_real: Option<String>,
    #[serde(default)]
    track_real: Option<u32>,
    #[serde(default)]
    transition_to: Option<u32>,
    #[serde(default)]
    vmax: Option<u32>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DwellRuleRow {
    dwell: u32,
    #[serde(rename = "type")]
    train_type: Option<String>,
    location: Option<String>,
    track: Option<u32>,
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes())
}

/// Train types found so far, numbered in order of appearance
#[derive(Default)]
struct TypeTable {
    types: IndexMap<String, TrainType>,
}

impl TypeTable {
    fn resolve(&mut self, name: &str, category: Option<TrainCategory>) -> TrainTypeId {
        let next_id = TrainTypeId::try_from(self.types.len() + 1).unwrap_or(TrainTypeId::MAX);
        let entry = self.types.entry(name.to_string()).or_insert_with(|| TrainType {
            id: next_id,
            name: name.to_string(),
            description: None,
            category: None,
        });
        if entry.category.is_none() {
            entry.category = category;
        }
        entry.id
    }
}

/// Parse a timetable CSV.
///
/// Required columns: `train,type,category,stop,location,track,arrival,
/// departure,min_running_time,min_dwell`. Optional columns `arr_real`,
/// `dep_real` and `track_real` carry observations, `transition_to` the
/// number of the train continuing this one, `vmax` and `comment` train
/// attributes. Train numbers double as train ids.
///
/// # Errors
///
/// Returns an error on malformed rows, unknown categories, repeated stops or
/// transitions to trains not in the file.
pub fn parse_timetable(content: &str) -> Result<Timetable, ImportError> {
    let mut reader = reader(content);
    let headers = reader.headers()?.clone();

    let mut types = TypeTable::default();
    let mut trains: IndexMap<u32, Train> = IndexMap::new();
    let mut stops: HashMap<u32, Vec<Stop>> = HashMap::new();
    let mut transitions: Vec<(u32, u32)> = Vec::new();

    for record in reader.records() {
        let record = record?;
        let line = line_of(&record);
        let row: TimetableRow = record.deserialize(Some(&headers))?;

        let category = match row.category.as_deref().filter(|c| !c.is_empty()) {
            None => None,
            Some(code) => Some(
                TrainCategory::from_code(code)
                    .ok_or_else(|| ImportError::UnknownCategory { line, value: code.to_string() })?,
            ),
        };

        if !trains.contains_key(&row.train) {
            let train_type = row.train_type.as_deref().filter(|t| !t.is_empty()).map(|t| types.resolve(t, category));
            let mut train = Train::new(TrainId::from(row.train), row.train, train_type);
            train.vmax = row.vmax;
            train.comment = row.comment.clone().unwrap_or_default();
            if let Some(target) = row.transition_to {
                transitions.push((row.train, target));
            }
            trains.insert(row.train, train);
        }

        let train_stops = stops.entry(row.train).or_default();
        if train_stops.iter().any(|s| s.position == row.stop) {
            return Err(ImportError::DuplicateStop { train: row.train, position: row.stop });
        }

        let mut stop = Stop::planned(
            row.stop,
            &row.location,
            optional_time(row.arrival.as_deref(), line)?,
            optional_time(row.departure.as_deref(), line)?,
        );
        stop.track_plan = row.track;
        stop.min_running_time = row.min_running_time;
        stop.min_dwell = row.min_dwell;
        stop.observe(Observation {
            arrival: optional_time(row.arr_real.as_deref(), line)?,
            departure: optional_time(row.dep_real.as_deref(), line)?,
            track: row.track_real,
        });
        train_stops.push(stop);
    }

    for (train, target) in transitions {
        if !trains.contains_key(&target) {
            return Err(ImportError::UnknownTransition { train, target });
        }
        if let Some(t) = trains.get_mut(&train) {
            t.transition_to = Some(TrainId::from(target));
        }
        if let Some(t) = trains.get_mut(&target) {
            t.transition_from = Some(TrainId::from(train));
        }
    }

    let mut timetable = Timetable::new();
    for train_type in types.types.into_values() {
        timetable.add_train_type(train_type);
    }
    for (nr, train) in trains {
        timetable.add_train(train, stops.remove(&nr).unwrap_or_default());
    }
    Ok(timetable)
}

/// Parse a dwell rule CSV with columns `dwell,type,location,track`; empty
/// filter columns match anything.
///
/// # Errors
///
/// Returns an error on malformed rows or train types unknown to `timetable`.
pub fn parse_dwell_rules(content: &str, timetable: &Timetable) -> Result<DwellRules, ImportError> {
    let mut reader = reader(content);
    let headers = reader.headers()?.clone();
    let mut rules = DwellRules::default();

    for record in reader.records() {
        let record = record?;
        let line = line_of(&record);
        let row: DwellRuleRow = record.deserialize(Some(&headers))?;

        let train_type = match row.train_type.as_deref().filter(|t| !t.is_empty()) {
            None => None,
            Some(name) => Some(
                timetable
                    .train_type_by_name(name)
                    .map(|t| t.id)
                    .ok_or_else(|| ImportError::UnknownTrainType { line, value: name.to_string() })?,
            ),
        };
        let location = row.location.as_deref().filter(|l| !l.is_empty());
        rules.push(MinimumDwellRule::new(row.dwell, train_type, location, row.track));
    }

    if rules.validate().is_err() {
        log::warn!("dwell rules have no unfiltered fallback rule");
    }
    Ok(rules)
}
