use serde::{Deserialize, Serialize};

pub type TrainId = u64;
pub type TrainTypeId = u32;

/// Traffic category of a train type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainCategory {
    /// Long-distance passenger
    #[serde(rename = "fv")]
    LongDistance,
    /// Regional passenger
    #[serde(rename = "nv")]
    Regional,
    #[serde(rename = "gv")]
    Freight,
    /// Light engine movement
    #[serde(rename = "lz")]
    LightEngine,
    #[serde(rename = "sz")]
    Special,
}

impl TrainCategory {
    pub const ALL: [Self; 5] = [
        Self::LongDistance,
        Self::Regional,
        Self::Freight,
        Self::LightEngine,
        Self::Special,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::LongDistance => "fv",
            Self::Regional => "nv",
            Self::Freight => "gv",
            Self::LightEngine => "lz",
            Self::Special => "sz",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainType {
    pub id: TrainTypeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<TrainCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub nr: u32,
    #[serde(default)]
    pub train_type: Option<TrainTypeId>,
    #[serde(default)]
    pub vmax: Option<u32>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub transition_from: Option<TrainId>,
    #[serde(default)]
    pub transition_to: Option<TrainId>,
}

impl Train {
    #[must_use]
    pub fn new(id: TrainId, nr: u32, train_type: Option<TrainTypeId>) -> Self {
        Self {
            id,
            nr,
            train_type,
            vmax: None,
            comment: String::new(),
            transition_from: None,
            transition_to: None,
        }
    }
}

/// A train together with the records it references.
///
/// Type name, category and transition numbers are read through the
/// references rather than copied into `Train`.
#[derive(Debug, Clone, Copy)]
pub struct TrainView<'a> {
    pub train: &'a Train,
    pub train_type: Option<&'a TrainType>,
    pub transition_from: Option<&'a Train>,
    pub transition_to: Option<&'a Train>,
}

impl TrainView<'_> {
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.train_type.map(|t| t.name.as_str())
    }

    #[must_use]
    pub fn category(&self) -> Option<TrainCategory> {
        self.train_type.and_then(|t| t.category)
    }

    #[must_use]
    pub fn transition_from_nr(&self) -> Option<u32> {
        self.transition_from.map(|t| t.nr)
    }

    #[must_use]
    pub fn transition_to_nr(&self) -> Option<u32> {
        self.transition_to.map(|t| t.nr)
    }

    /// Display name such as "ICE 407"
    #[must_use]
    pub fn name(&self) -> String {
        match self.type_name() {
            Some(name) => format!("{name} {}", self.train.nr),
            None => self.train.nr.to_string(),
        }
    }
}
