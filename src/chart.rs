//! JSON shapes consumed by the running-graph frontend.

use chrono::NaiveTime;
use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{Line, Stop, Timetable, TrainCategory, TrainId};
use crate::selection::{self, Direction, Segment, SegmentStop, TrainSummary, Window};
use crate::theme::category_class;
use crate::time::time_to_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineElement {
    Location { id: String, code: String, name: String, pos: f64 },
    /// Stretch between two consecutive locations, `<from>_<to>`
    Track { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineJson {
    pub id: String,
    pub name: String,
    pub elements: Vec<LineElement>,
}

#[must_use]
pub fn line_json(line: &Line) -> LineJson {
    let mut elements = Vec::with_capacity(line.all().len() * 2);
    for (idx, marker) in line.all().iter().enumerate() {
        if let Some(prev) = idx.checked_sub(1).map(|i| &line.all()[i]) {
            elements.push(LineElement::Track { id: format!("{}_{}", prev.id, marker.id) });
        }
        elements.push(LineElement::Location {
            id: marker.id.clone(),
            code: marker.code.clone(),
            name: marker.name.clone(),
            pos: marker.pos,
        });
    }
    LineJson { id: line.id.clone(), name: line.name.clone(), elements }
}

/// A stop with its times as chart timestamps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartStop {
    pub loc: String,
    pub arr_plan: Option<i64>,
    pub dep_plan: Option<i64>,
    pub arr_real: Option<i64>,
    pub dep_real: Option<i64>,
    pub arr_pred: Option<i64>,
    pub dep_pred: Option<i64>,
    pub track_plan: Option<u32>,
    pub track_real: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succ: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartTrack {
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartElement {
    Stop(ChartStop),
    Track(ChartTrack),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSegment {
    pub timetable: Vec<ChartElement>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartTrain {
    pub id: TrainId,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub nr: u32,
    pub category: Option<TrainCategory>,
    pub css_class: Option<String>,
    pub comment: String,
    pub transition_from: Option<u32>,
    pub transition_to: Option<u32>,
    pub segments: Vec<ChartSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphData {
    pub trains: Vec<ChartTrain>,
    pub line: String,
    /// Markers to draw: the position window plus one neighbour beyond each
    /// bound
    pub locations: Vec<String>,
    pub starttime: i64,
    pub endtime: i64,
}

/// Converts times of day to chart timestamps for one operating day
#[derive(Debug, Clone, Copy)]
pub struct Timestamps {
    day_start: NaiveTime,
}

impl Timestamps {
    #[must_use]
    pub fn new(day_start: NaiveTime) -> Self {
        Self { day_start }
    }

    #[must_use]
    pub fn of(&self, time: NaiveTime) -> i64 {
        time_to_timestamp(time, self.day_start)
    }

    fn opt(&self, time: Option<NaiveTime>) -> Option<i64> {
        time.map(|t| self.of(t))
    }

    fn stop(&self, marker: String, stop: &Stop, pred: Option<String>, succ: Option<String>) -> ChartStop {
        ChartStop {
            loc: marker,
            arr_plan: self.opt(stop.arr_plan),
            dep_plan: self.opt(stop.dep_plan),
            arr_real: self.opt(stop.arr_real),
            dep_real: self.opt(stop.dep_real),
            arr_pred: self.opt(stop.arr_pred),
            dep_pred: self.opt(stop.dep_pred),
            track_plan: stop.track_plan,
            track_real: stop.track_real,
            pred,
            succ,
        }
    }

    fn segment(&self, segment: Segment) -> ChartSegment {
        let mut timetable = Vec::with_capacity(segment.stops.len() * 2);
        let mut previous: Option<String> = None;
        for SegmentStop { marker, stop, pred, succ } in segment.stops {
            if let Some(prev) = previous.replace(marker.clone()) {
                timetable.push(ChartElement::Track(ChartTrack { line: track_id(&prev, &marker, segment.direction) }));
            }
            timetable.push(ChartElement::Stop(self.stop(marker, &stop, pred, succ)));
        }
        ChartSegment { timetable, direction: segment.direction }
    }

    #[must_use]
    pub fn train(&self, summary: TrainSummary) -> ChartTrain {
        ChartTrain {
            id: summary.id,
            type_name: summary.type_name,
            nr: summary.nr,
            category: summary.category,
            css_class: category_class(summary.category),
            comment: summary.comment,
            transition_from: summary.transition_from,
            transition_to: summary.transition_to,
            segments: summary.segments.into_iter().map(|s| self.segment(s)).collect(),
        }
    }
}

/// Track element id in line order, whichever way the train runs
fn track_id(from: &str, to: &str, direction: Direction) -> String {
    match direction {
        Direction::Right => format!("{from}_{to}"),
        Direction::Left => format!("{to}_{from}"),
    }
}

/// Everything the chart needs to draw `window` of `line`
#[must_use]
pub fn graph_data(timetable: &Timetable, line: &Line, window: &Window, day_start: NaiveTime) -> GraphData {
    let timestamps = Timestamps::new(day_start);
    let ids = selection::trains_in_window(timetable, line, window);
    let trains = selection::train_information(timetable, &ids, line)
        .map(|summary| timestamps.train(summary))
        .collect();

    GraphData {
        trains,
        line: line.id.clone(),
        locations: line
            .extended_between(window.pos_from, window.pos_to)
            .iter()
            .map(|m| m.id.clone())
            .collect(),
        starttime: timestamps.of(window.time_from),
        endtime: timestamps.of(window.time_to),
    }
}

/// Values handed to the frontend as global script variables
#[derive(Debug, Clone)]
pub struct FrontendVariables<'a> {
    pub script_root: &'a str,
    pub default_viewconfig: &'a str,
    pub lines: IndexMap<String, String>,
    pub refresh_interval_secs: u64,
    pub day_start: NaiveTime,
    pub timetable_url_template: &'a str,
}

impl FrontendVariables<'_> {
    /// Render as `NAME = <json>;` lines
    #[must_use]
    pub fn script(&self) -> String {
        let values = [
            ("SCRIPT_ROOT", serde_json::json!(self.script_root)),
            ("DEFAULT_VIEWCONFIG", serde_json::json!(self.default_viewconfig)),
            ("ALL_LINECONFIGS", serde_json::json!(self.lines)),
            ("REFRESH_INTERVAL", serde_json::json!(self.refresh_interval_secs * 1000)),
            ("EPOCH", serde_json::json!(Timestamps::new(self.day_start).of(self.day_start))),
            ("TIMETABLE_URL_TEMPLATE", serde_json::json!(self.timetable_url_template)),
        ];
        values
            .iter()
            .map(|(name, value)| format!("{name} = {};\n", html_safe(&value.to_string())))
            .collect()
    }
}

/// Escape characters that could close a script element
fn html_safe(json: &str) -> String {
    json.replace('<', "\\u003c").replace('>', "\\u003e").replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OPERATING_DAY_START;
    use crate::models::{sample_line, Train};

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn test_line_json_alternates_elements() {
        let json = line_json(&sample_line());
        assert_eq!(json.elements.len(), 9);
        assert_eq!(json.elements[1], LineElement::Track { id: "XDE#1_XCE#1".to_string() });

        let value = serde_json::to_value(&json).expect("serializable");
        assert_eq!(value["elements"][0]["type"], "location");
        assert_eq!(value["elements"][0]["code"], "XDE");
        assert_eq!(value["elements"][8]["id"], "XDE#2");
    }

    #[test]
    fn test_graph_data() {
        let mut timetable = Timetable::new();
        timetable.add_train(
            Train::new(1, 700, None),
            vec![
                Stop::planned(0, "XCE", None, Some(hm(15, 30))),
                Stop::planned(1, "XLG", Some(hm(15, 34)), Some(hm(15, 34))),
                Stop::planned(2, "XZZ", Some(hm(15, 40)), None),
            ],
        );
        let window = Window::new(hm(15, 0), hm(16, 0));
        let data = graph_data(&timetable, &sample_line(), &window, OPERATING_DAY_START);

        assert_eq!(data.starttime, 15 * 3600);
        assert_eq!(data.trains.len(), 1);
        let segment = &data.trains[0].segments[0];
        assert_eq!(segment.timetable.len(), 3);
        assert_eq!(segment.timetable[1], ChartElement::Track(ChartTrack { line: "XCE#1_XLG#1".to_string() }));

        let value = serde_json::to_value(&data).expect("serializable");
        let last = &value["trains"][0]["segments"][0]["timetable"][2];
        assert_eq!(last["loc"], "XLG#1");
        assert_eq!(last["arr_plan"], 15 * 3600 + 34 * 60);
        assert_eq!(last["succ"], "XZZ");
        assert_eq!(value["trains"][0]["segments"][0]["direction"], "right");
    }

    #[test]
    fn test_graph_data_locations_reach_past_window() {
        let timetable = Timetable::new();
        let line = sample_line();

        let window = Window::new(hm(15, 0), hm(16, 0));
        let data = graph_data(&timetable, &line, &window, OPERATING_DAY_START);
        assert_eq!(data.locations.len(), 5);

        let window = window.with_positions(0.36, 0.5);
        let data = graph_data(&timetable, &line, &window, OPERATING_DAY_START);
        assert_eq!(data.locations, vec!["XCE#1", "XLG#1", "XBG#1"]);
    }

    #[test]
    fn test_left_running_track_ids_follow_line_order() {
        assert_eq!(track_id("XLG#1", "XCE#1", Direction::Left), "XCE#1_XLG#1");
    }

    #[test]
    fn test_variables_script() {
        let mut lines = IndexMap::new();
        lines.insert("sample".to_string(), "Sample <loop>".to_string());
        let variables = FrontendVariables {
            script_root: "",
            default_viewconfig: "gt/sample,.01,.99",
            lines,
            refresh_interval_secs: 15,
            day_start: OPERATING_DAY_START,
            timetable_url_template: "/trains/{id}",
        };
        let script = variables.script();
        assert!(script.contains("REFRESH_INTERVAL = 15000;\n"));
        assert!(script.contains("EPOCH = 14400;\n"));
        assert!(script.contains(r#"ALL_LINECONFIGS = {"sample":"Sample \u003cloop\u003e"};"#));
    }
}
