pub mod csv;
mod shared;

use std::path::{Path, PathBuf};

pub use csv::{parse_dwell_rules, parse_timetable};

use crate::models::{DwellRules, Timetable};

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] ::csv::Error),
    #[error("line {line}: invalid time {value:?}")]
    InvalidTime { line: u64, value: String },
    #[error("line {line}: unknown train category {value:?}")]
    UnknownCategory { line: u64, value: String },
    #[error("line {line}: unknown train type {value:?}")]
    UnknownTrainType { line: u64, value: String },
    #[error("train {train} lists stop {position} twice")]
    DuplicateStop { train: u32, position: u32 },
    #[error("train {train} continues as unknown train {target}")]
    UnknownTransition { train: u32, target: u32 },
}

fn read(path: &Path) -> Result<String, ImportError> {
    std::fs::read_to_string(path).map_err(|source| ImportError::Io { path: path.to_path_buf(), source })
}

/// Read a timetable CSV file
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_timetable(path: &Path) -> Result<Timetable, ImportError> {
    let timetable = parse_timetable(&read(path)?)?;
    log::info!("imported {} trains from {}", timetable.trains.len(), path.display());
    Ok(timetable)
}

/// Read a dwell rule CSV file, resolving train type names against `timetable`
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_dwell_rules(path: &Path, timetable: &Timetable) -> Result<DwellRules, ImportError> {
    let rules = parse_dwell_rules(&read(path)?, timetable)?;
    log::info!("imported {} dwell rules from {}", rules.rules().len(), path.display());
    Ok(rules)
}
