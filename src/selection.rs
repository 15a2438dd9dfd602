//! Which trains run through a time and position window of a line, and how
//! their stops map onto the line's markers.

use std::collections::HashSet;

use chrono::NaiveTime;
use serde::Serialize;

use crate::constants::POSITION_EPSILON;
use crate::models::{Line, Stop, Timetable, TrainCategory, TrainId};

/// Time and position range of a chart view. A time range whose start lies
/// after its end spans midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub time_from: NaiveTime,
    pub time_to: NaiveTime,
    pub pos_from: f64,
    pub pos_to: f64,
}

impl Window {
    #[must_use]
    pub fn new(time_from: NaiveTime, time_to: NaiveTime) -> Self {
        Self { time_from, time_to, pos_from: 0.0, pos_to: 1.0 }
    }

    #[must_use]
    pub fn with_positions(mut self, pos_from: f64, pos_to: f64) -> Self {
        self.pos_from = pos_from;
        self.pos_to = pos_to;
        self
    }

    #[must_use]
    pub fn contains_time(&self, time: NaiveTime) -> bool {
        if self.time_from <= self.time_to {
            self.time_from <= time && time <= self.time_to
        } else {
            time >= self.time_from || time <= self.time_to
        }
    }
}

/// Trains with a stop inside the window, in timetable order
#[must_use]
pub fn trains_in_window(timetable: &Timetable, line: &Line, window: &Window) -> Vec<TrainId> {
    let codes: HashSet<&str> = line
        .between(window.pos_from, window.pos_to)
        .map(|m| m.code.as_str())
        .collect();

    timetable
        .trains
        .keys()
        .copied()
        .filter(|&id| {
            timetable.stops_of(id).iter().any(|stop| {
                codes.contains(stop.location.as_str())
                    && [stop.effective_arrival(), stop.effective_departure()]
                        .into_iter()
                        .flatten()
                        .any(|t| window.contains_time(t))
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn between(from: f64, to: f64) -> Option<Self> {
        if to > from + POSITION_EPSILON {
            Some(Self::Right)
        } else if to < from - POSITION_EPSILON {
            Some(Self::Left)
        } else {
            None
        }
    }
}

/// A stop placed on a marker of the line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStop {
    /// Occurrence id of the marker, e.g. `XDE#2`
    pub marker: String,
    pub stop: Stop,
    /// Location the train comes from, on the first stop of a segment
    pub pred: Option<String>,
    /// Location the train continues to, on the last stop of a segment
    pub succ: Option<String>,
}

/// Contiguous run of a train along the line in one direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub stops: Vec<SegmentStop>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainSummary {
    pub id: TrainId,
    pub nr: u32,
    pub type_name: Option<String>,
    pub category: Option<TrainCategory>,
    pub comment: String,
    pub transition_from: Option<u32>,
    pub transition_to: Option<u32>,
    pub segments: Vec<Segment>,
}

/// Display information for each train, computed lazily. Unknown train ids
/// are skipped.
pub fn train_information<'a>(
    timetable: &'a Timetable,
    trains: &'a [TrainId],
    line: &'a Line,
) -> impl Iterator<Item = TrainSummary> + 'a {
    trains.iter().filter_map(move |&id| {
        let view = timetable.view(id)?;
        Some(TrainSummary {
            id,
            nr: view.train.nr,
            type_name: view.type_name().map(ToString::to_string),
            category: view.category(),
            comment: view.train.comment.clone(),
            transition_from: view.transition_from_nr(),
            transition_to: view.transition_to_nr(),
            segments: segments(line, timetable.stops_of(id)),
        })
    })
}

#[derive(Debug, Clone, Copy)]
struct Visit {
    marker: usize,
    stop: usize,
}

fn distance(line: &Line, marker: usize, pos: f64) -> f64 {
    (line.all()[marker].pos - pos).abs()
}

fn nearest(line: &Line, candidates: &[usize], pos: f64) -> usize {
    candidates
        .iter()
        .copied()
        .min_by(|&a, &b| distance(line, a, pos).total_cmp(&distance(line, b, pos)))
        .unwrap_or_default()
}

/// Occurrence to start a segment on: the one closest to where the train
/// goes next
fn start_marker(line: &Line, candidates: &[usize], next: Option<&Stop>) -> usize {
    let following: Vec<usize> = next.map(|s| line.occurrences(&s.location).collect()).unwrap_or_default();
    if candidates.len() < 2 || following.is_empty() {
        return candidates.first().copied().unwrap_or_default();
    }
    let gap = |c: usize| {
        let pos = line.all()[c].pos;
        distance(line, nearest(line, &following, pos), pos)
    };
    candidates
        .iter()
        .copied()
        .min_by(|&a, &b| gap(a).total_cmp(&gap(b)))
        .unwrap_or_default()
}

/// Walk the stops, splitting where the train leaves the line, reverses, or
/// passes the joint of a loop
fn split(line: &Line, stops: &[Stop]) -> Vec<(Vec<Visit>, Direction)> {
    let mut segments = Vec::new();
    let mut current: Vec<Visit> = Vec::new();
    let mut direction: Option<Direction> = None;

    let mut flush = |current: &mut Vec<Visit>, direction: &mut Option<Direction>| {
        if !current.is_empty() {
            segments.push((std::mem::take(current), direction.unwrap_or(Direction::Right)));
        }
        *direction = None;
    };

    for (idx, stop) in stops.iter().enumerate() {
        let candidates: Vec<usize> = line.occurrences(&stop.location).collect();
        if candidates.is_empty() {
            flush(&mut current, &mut direction);
            continue;
        }

        let Some(&last) = current.last() else {
            current.push(Visit { marker: start_marker(line, &candidates, stops.get(idx + 1)), stop: idx });
            continue;
        };

        let here = line.all()[last.marker].pos;
        let next = nearest(line, &candidates, here);

        if let Some(partner) = line.loop_partner(last.marker) {
            let there = line.all()[partner].pos;
            let wrapped = nearest(line, &candidates, there);
            if distance(line, wrapped, there) < distance(line, next, here) {
                flush(&mut current, &mut direction);
                current.push(Visit { marker: partner, stop: last.stop });
                current.push(Visit { marker: wrapped, stop: idx });
                direction = Direction::between(there, line.all()[wrapped].pos);
                continue;
            }
        }

        let step = Direction::between(here, line.all()[next].pos);
        match (direction, step) {
            (Some(current_direction), Some(step)) if current_direction != step => {
                flush(&mut current, &mut direction);
                current.push(last);
                direction = Some(step);
            }
            (None, Some(step)) => direction = Some(step),
            _ => {}
        }
        current.push(Visit { marker: next, stop: idx });
    }
    flush(&mut current, &mut direction);
    segments
}

fn segments(line: &Line, stops: &[Stop]) -> Vec<Segment> {
    let location = |idx: Option<usize>| idx.and_then(|i| stops.get(i)).map(|s| s.location.clone());

    split(line, stops)
        .into_iter()
        .map(|(visits, direction)| {
            let first = visits.first().map(|v| v.stop);
            let last = visits.last().map(|v| v.stop);
            let count = visits.len();
            let stops = visits
                .into_iter()
                .enumerate()
                .map(|(n, visit)| SegmentStop {
                    marker: line.all()[visit.marker].id.clone(),
                    stop: stops[visit.stop].clone(),
                    pred: if n == 0 { location(first.and_then(|s| s.checked_sub(1))) } else { None },
                    succ: if n + 1 == count { location(last.map(|s| s + 1)) } else { None },
                })
                .collect();
            Segment { stops, direction }
        })
        .collect()
}
