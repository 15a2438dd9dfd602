use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use crate::constants::POSITION_EPSILON;

/// Prefix marking the reversed variant of a configured line
pub const REVERSED_PREFIX: char = '-';

#[derive(thiserror::Error, Debug)]
pub enum LineError {
    #[error("unknown line {0}")]
    UnknownLine(String),
    #[error("line {line} has no location {marker}")]
    UnknownMarker { line: String, marker: String },
    #[error("line {0} has no locations")]
    Empty(String),
    #[error("location {marker} of line {line} has position {pos} outside [0, 1]")]
    PositionOutOfRange { line: String, marker: String, pos: f64 },
    #[error("location {marker} of line {line} is placed before its predecessor")]
    PositionsNotOrdered { line: String, marker: String },
    #[error("loop line {0} must start and end at the same location")]
    OpenLoop(String),
    #[error("line {0} is defined twice")]
    DuplicateLine(String),
    #[error("line id {0} must not start with '-'")]
    ReservedId(String),
    #[error("failed reading line definitions from {path}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

/// One occurrence of a location along a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMarker {
    /// `<code>#<occurrence>`, unique within the line
    pub id: String,
    pub code: String,
    pub name: String,
    pub pos: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerDefinition {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub pos: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "loop")]
    pub is_loop: bool,
    pub markers: Vec<MarkerDefinition>,
}

#[derive(Debug, Deserialize)]
struct LinesFile {
    #[serde(default)]
    lines: Vec<LineDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    pub name: String,
    pub is_loop: bool,
    markers: Vec<LocationMarker>,
}

impl Line {
    /// Build a line, numbering repeated locations and checking positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is empty, a position lies outside
    /// [0, 1], positions decrease, or a loop does not close.
    pub fn from_definition(definition: LineDefinition) -> Result<Self, LineError> {
        let LineDefinition { id, name, is_loop, markers: definitions } = definition;

        if id.starts_with(REVERSED_PREFIX) {
            return Err(LineError::ReservedId(id));
        }
        if definitions.is_empty() {
            return Err(LineError::Empty(id));
        }

        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut markers: Vec<LocationMarker> = Vec::with_capacity(definitions.len());

        for marker in definitions {
            let count = occurrences.entry(marker.code.clone()).or_insert(0);
            *count += 1;
            let marker_id = format!("{}#{}", marker.code, count);

            if !(0.0..=1.0).contains(&marker.pos) {
                return Err(LineError::PositionOutOfRange { line: id, marker: marker_id, pos: marker.pos });
            }
            if markers.last().is_some_and(|prev| prev.pos > marker.pos) {
                return Err(LineError::PositionsNotOrdered { line: id, marker: marker_id });
            }

            markers.push(LocationMarker {
                id: marker_id,
                name: marker.name.unwrap_or_else(|| marker.code.clone()),
                code: marker.code,
                pos: marker.pos,
            });
        }

        if is_loop {
            let closes = matches!((markers.first(), markers.last()), (Some(first), Some(last)) if first.code == last.code);
            if markers.len() < 2 || !closes {
                return Err(LineError::OpenLoop(id));
            }
        }

        Ok(Self { id, name, is_loop, markers })
    }

    /// All markers in line order
    #[must_use]
    pub fn all(&self) -> &[LocationMarker] {
        &self.markers
    }

    #[must_use]
    pub fn marker(&self, occurrence_id: &str) -> Option<&LocationMarker> {
        self.markers.iter().find(|m| m.id == occurrence_id)
    }

    /// Position of a location occurrence such as `XDE#2`
    ///
    /// # Errors
    ///
    /// Returns `LineError::UnknownMarker` if the occurrence is not on the line.
    pub fn position_of(&self, occurrence_id: &str) -> Result<f64, LineError> {
        self.marker(occurrence_id)
            .map(|m| m.pos)
            .ok_or_else(|| LineError::UnknownMarker { line: self.id.clone(), marker: occurrence_id.to_string() })
    }

    /// Indices of every occurrence of a location code
    pub fn occurrences<'a>(&'a self, code: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.markers
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.code == code)
            .map(|(idx, _)| idx)
    }

    /// Markers whose position lies in `[from, to]`, widened by
    /// `POSITION_EPSILON` on both ends
    pub fn between(&self, from: f64, to: f64) -> impl Iterator<Item = &LocationMarker> + '_ {
        self.markers
            .iter()
            .filter(move |m| m.pos >= from - POSITION_EPSILON && m.pos <= to + POSITION_EPSILON)
    }

    /// Markers in `[from, to]` plus the nearest marker at or beyond each bound,
    /// so the track leaving the window can still be drawn
    #[must_use]
    pub fn extended_between(&self, from: f64, to: f64) -> &[LocationMarker] {
        let start = self.markers
            .iter()
            .rposition(|m| m.pos <= from + POSITION_EPSILON)
            .unwrap_or(0);
        let end = self.markers
            .iter()
            .position(|m| m.pos >= to - POSITION_EPSILON)
            .unwrap_or(self.markers.len().saturating_sub(1));

        if start > end {
            return &[];
        }
        &self.markers[start..=end]
    }

    /// For a loop, the index of the other end of the closing joint
    #[must_use]
    pub fn loop_partner(&self, idx: usize) -> Option<usize> {
        if !self.is_loop {
            return None;
        }
        let last = self.markers.len().checked_sub(1)?;
        match idx {
            0 => Some(last),
            i if i == last => Some(0),
            _ => None,
        }
    }

    /// The same line traversed in the opposite direction
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            id: format!("{REVERSED_PREFIX}{}", self.id),
            name: format!("{} (reversed)", self.name),
            is_loop: self.is_loop,
            markers: self.markers
                .iter()
                .rev()
                .map(|m| LocationMarker { pos: 1.0 - m.pos, ..m.clone() })
                .collect(),
        }
    }

    /// Plain-text description of the line
    #[must_use]
    pub fn info(&self) -> String {
        let mut out = format!("{} ({}){}\n", self.name, self.id, if self.is_loop { ", loop" } else { "" });
        for marker in &self.markers {
            let _ = writeln!(out, "  {:<8} {:>6.3}  {}", marker.id, marker.pos, marker.name);
        }
        out
    }
}

/// All configured lines, keyed by id
#[derive(Debug, Clone, Default)]
pub struct LineRegistry {
    lines: IndexMap<String, Line>,
}

impl LineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line.
    ///
    /// # Errors
    ///
    /// Returns `LineError::DuplicateLine` if the id is taken.
    pub fn insert(&mut self, line: Line) -> Result<(), LineError> {
        if self.lines.contains_key(&line.id) {
            return Err(LineError::DuplicateLine(line.id));
        }
        self.lines.insert(line.id.clone(), line);
        Ok(())
    }

    /// Parse `[[lines]]` tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a line fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self, LineError> {
        let file: LinesFile = toml::from_str(content)?;
        let mut registry = Self::new();
        for definition in file.lines {
            registry.insert(Line::from_definition(definition)?)?;
        }
        Ok(registry)
    }

    /// Load line definitions from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, LineError> {
        let content = std::fs::read_to_string(path).map_err(|source| LineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_toml_str(&content)?;
        log::info!("loaded {} lines from {}", registry.lines.len(), path.display());
        Ok(registry)
    }

    /// Look up a line; a `-` prefix selects the reversed line.
    ///
    /// # Errors
    ///
    /// Returns `LineError::UnknownLine` if no such line is configured.
    pub fn get(&self, id: &str) -> Result<Cow<'_, Line>, LineError> {
        if let Some(line) = self.lines.get(id) {
            return Ok(Cow::Borrowed(line));
        }
        id.strip_prefix(REVERSED_PREFIX)
            .and_then(|base| self.lines.get(base))
            .map(|line| Cow::Owned(line.reversed()))
            .ok_or_else(|| LineError::UnknownLine(id.to_string()))
    }

    /// Configured ids and their reversed variants, `-foo` right after `foo`
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lines
            .keys()
            .flat_map(|id| [id.clone(), format!("{REVERSED_PREFIX}{id}")])
            .collect();
        ids.sort_by(|a, b| {
            let key = |id: &str| (id.trim_start_matches(REVERSED_PREFIX).to_string(), id.starts_with(REVERSED_PREFIX));
            key(a).cmp(&key(b))
        });
        ids
    }

    /// Display name for every id returned by `ids`
    #[must_use]
    pub fn names(&self) -> IndexMap<String, String> {
        self.ids()
            .into_iter()
            .filter_map(|id| {
                let name = self.get(&id).ok()?.name.clone();
                Some((id, name))
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Five-location loop used throughout the tests
#[cfg(test)]
pub(crate) fn sample_line() -> Line {
    let marker = |code: &str, pos: f64| MarkerDefinition { code: code.to_string(), name: None, pos };
    Line::from_definition(LineDefinition {
        id: "sample".to_string(),
        name: "Sample loop".to_string(),
        is_loop: true,
        markers: vec![
            marker("XDE", 0.0),
            marker("XCE", 0.35),
            marker("XLG", 0.45),
            marker("XBG", 0.55),
            marker("XDE", 1.0),
        ],
    })
    .expect("sample line is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(markers: impl IntoIterator<Item = &'a LocationMarker>) -> Vec<&'a str> {
        markers.into_iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_occurrences_are_numbered() {
        let line = sample_line();
        assert_eq!(ids(line.all()), vec!["XDE#1", "XCE#1", "XLG#1", "XBG#1", "XDE#2"]);
        assert_eq!(line.occurrences("XDE").collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn test_position_of() {
        let line = sample_line();
        assert_eq!(line.position_of("XDE#2").expect("exists"), 1.0);
        assert_eq!(line.position_of("XLG#1").expect("exists"), 0.45);
        assert!(matches!(line.position_of("XDE"), Err(LineError::UnknownMarker { .. })));
    }

    #[test]
    fn test_between_default_returns_everything() {
        let line = sample_line();
        let all: Vec<&LocationMarker> = line.between(0.0, 1.0).collect();
        assert_eq!(all.len(), line.all().len());
        assert_eq!(ids(all), ids(line.all()));
    }

    #[test]
    fn test_between_sub_range() {
        let line = sample_line();
        assert_eq!(ids(line.between(0.31, 0.55)), vec!["XCE#1", "XLG#1", "XBG#1"]);
    }

    #[test]
    fn test_between_single_point_tolerates_jitter() {
        let line = sample_line();
        assert_eq!(ids(line.between(0.55, 0.55)), vec!["XBG#1"]);
        assert_eq!(ids(line.between(0.55 + 1e-11, 0.55 - 1e-11)), vec!["XBG#1"]);
        assert_eq!(ids(line.between(0.55 - 1e-11, 0.55 + 1e-11)), vec!["XBG#1"]);
        assert!(line.between(0.5, 0.5).next().is_none());
    }

    #[test]
    fn test_between_is_restartable() {
        let line = sample_line();
        let first: Vec<&LocationMarker> = line.between(0.3, 0.6).collect();
        let second: Vec<&LocationMarker> = line.between(0.3, 0.6).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extended_between() {
        let line = sample_line();
        assert_eq!(ids(line.extended_between(0.0, 1.0)), ids(line.all()));
        assert_eq!(ids(line.extended_between(0.4, 0.4)), vec!["XCE#1", "XLG#1"]);
        assert_eq!(ids(line.extended_between(0.36, 0.5)), vec!["XCE#1", "XLG#1", "XBG#1"]);
        assert_eq!(ids(line.extended_between(0.3499999999999, 0.5500000000001)), vec!["XCE#1", "XLG#1", "XBG#1"]);
    }

    #[test]
    fn test_loop_partner() {
        let line = sample_line();
        assert_eq!(line.loop_partner(0), Some(4));
        assert_eq!(line.loop_partner(4), Some(0));
        assert_eq!(line.loop_partner(2), None);
    }

    #[test]
    fn test_reversed_line_mirrors_positions() {
        let line = sample_line();
        let reversed = line.reversed();
        assert_eq!(reversed.id, "-sample");
        assert_eq!(ids(reversed.all()), vec!["XDE#2", "XBG#1", "XLG#1", "XCE#1", "XDE#1"]);
        assert_eq!(reversed.position_of("XDE#2").expect("exists"), 0.0);
        assert!((reversed.position_of("XCE#1").expect("exists") - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_unordered_positions() {
        let definition = LineDefinition {
            id: "bad".to_string(),
            name: "Bad".to_string(),
            is_loop: false,
            markers: vec![
                MarkerDefinition { code: "A".to_string(), name: None, pos: 0.5 },
                MarkerDefinition { code: "B".to_string(), name: None, pos: 0.2 },
            ],
        };
        assert!(matches!(Line::from_definition(definition), Err(LineError::PositionsNotOrdered { .. })));
    }

    #[test]
    fn test_rejects_out_of_range_and_open_loop() {
        let out_of_range = LineDefinition {
            id: "bad".to_string(),
            name: "Bad".to_string(),
            is_loop: false,
            markers: vec![MarkerDefinition { code: "A".to_string(), name: None, pos: 1.5 }],
        };
        assert!(matches!(Line::from_definition(out_of_range), Err(LineError::PositionOutOfRange { .. })));

        let open_loop = LineDefinition {
            id: "ring".to_string(),
            name: "Ring".to_string(),
            is_loop: true,
            markers: vec![
                MarkerDefinition { code: "A".to_string(), name: None, pos: 0.0 },
                MarkerDefinition { code: "B".to_string(), name: None, pos: 1.0 },
            ],
        };
        assert!(matches!(Line::from_definition(open_loop), Err(LineError::OpenLoop(_))));
    }

    #[test]
    fn test_registry_from_toml() {
        let content = r#"
            [[lines]]
            id = "ring"
            name = "Ring"
            loop = true
            markers = [
                { code = "XDE", name = "Derfeld", pos = 0.0 },
                { code = "XCE", pos = 0.5 },
                { code = "XDE", pos = 1.0 },
            ]

            [[lines]]
            id = "branch"
            name = "Branch"
            markers = [
                { code = "XWF", pos = 0.0 },
                { code = "XPN", pos = 1.0 },
            ]
        "#;
        let registry = LineRegistry::from_toml_str(content).expect("valid lines");
        assert_eq!(registry.len(), 2);

        let ring = registry.get("ring").expect("configured");
        assert!(ring.is_loop);
        assert_eq!(ring.all()[0].name, "Derfeld");
        assert_eq!(ring.all()[1].name, "XCE");

        let reversed = registry.get("-branch").expect("reversed variant");
        assert_eq!(reversed.all()[0].code, "XPN");

        assert!(matches!(registry.get("nowhere"), Err(LineError::UnknownLine(_))));
        assert_eq!(registry.ids(), vec!["branch", "-branch", "ring", "-ring"]);
        assert_eq!(registry.names().get("-ring").map(String::as_str), Some("Ring (reversed)"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = LineRegistry::new();
        registry.insert(sample_line()).expect("first insert");
        assert!(matches!(registry.insert(sample_line()), Err(LineError::DuplicateLine(_))));
    }

    #[test]
    fn test_info_lists_markers() {
        let info = sample_line().info();
        assert!(info.starts_with("Sample loop (sample), loop"));
        assert!(info.contains("XBG#1"));
        assert_eq!(info.lines().count(), 6);
    }
}
