//! Service configuration: built-in defaults, overridden by an optional TOML
//! file and then by `RUNNING_GRAPH__*` environment variables.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_SAME_DAY_GAP, DEFAULT_MINIMUM_TRAVEL_TIME_RATIO, DEFAULT_PREDICTION_INTERVAL, OPERATING_DAY_START,
};
use crate::projection::ProjectionConfig;

/// Environment variable naming the settings file
pub const SETTINGS_PATH_VAR: &str = "RUNNING_GRAPH_SETTINGS";
const ENV_PREFIX: &str = "RUNNING_GRAPH";
const ENV_SEPARATOR: &str = "__";

/// Key of a color map entry applying to trains without category
pub const DEFAULT_COLOR_KEY: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("{msg}: {source}")]
    ConfigReadError {
        msg: String,
        #[source]
        source: config::ConfigError,
    },
    #[error("minimum_travel_time_ratio must be in (0, 1], got {0}")]
    InvalidRatio(f64),
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

/// Where the service takes the current time from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ClockSettings {
    System,
    /// Time stands still
    Fixed { time: NaiveTime },
    /// Simulated session time, advancing in real time from `start`
    Offset { start: NaiveTime },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub minimum_travel_time_ratio: f64,
    pub hold_late_arrivals_to_schedule: bool,
    pub max_same_day_gap_secs: i64,
    pub prediction_interval_secs: i64,

    pub refresh_interval_secs: u64,
    pub response_delay_ms: u64,
    /// Seconds between background projection passes, 0 to disable
    pub recompute_interval_secs: u64,

    pub timetable_url_template: String,
    pub default_viewconfig: String,
    pub operating_day_start: NaiveTime,
    /// Theme name to category code to CSS color
    pub train_color_maps: IndexMap<String, IndexMap<String, String>>,

    pub bind_address: String,
    pub port: u16,
    pub frontend_dir: PathBuf,

    pub lines_file: PathBuf,
    pub timetable_file: PathBuf,
    pub dwell_rules_file: PathBuf,
    pub snapshot_file: Option<PathBuf>,

    pub clock: ClockSettings,
}

fn color_map(entries: &[(&str, &str)]) -> IndexMap<String, String> {
    entries.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

impl Default for Settings {
    fn default() -> Self {
        let mut train_color_maps = IndexMap::new();
        train_color_maps.insert(
            "dark".to_string(),
            color_map(&[("nv", "#f44"), ("fv", "#48f"), ("gv", "#2f6"), ("lz", "#fff"), ("sz", "#bd5"), (DEFAULT_COLOR_KEY, "#fff")]),
        );
        train_color_maps.insert(
            "light".to_string(),
            color_map(&[("nv", "#c00"), ("fv", "#03c"), ("gv", "#090"), ("lz", "#333"), ("sz", "#870"), (DEFAULT_COLOR_KEY, "#000")]),
        );

        Self {
            minimum_travel_time_ratio: DEFAULT_MINIMUM_TRAVEL_TIME_RATIO,
            hold_late_arrivals_to_schedule: false,
            max_same_day_gap_secs: DEFAULT_MAX_SAME_DAY_GAP.num_seconds(),
            prediction_interval_secs: DEFAULT_PREDICTION_INTERVAL.num_seconds(),
            refresh_interval_secs: 15,
            response_delay_ms: 0,
            recompute_interval_secs: 30,
            timetable_url_template: "/trains/{id}".to_string(),
            default_viewconfig: "gt/sample,.01,.99".to_string(),
            operating_day_start: OPERATING_DAY_START,
            train_color_maps,
            bind_address: "127.0.0.1".to_string(),
            port: 8231,
            frontend_dir: PathBuf::from("frontend"),
            lines_file: PathBuf::from("data/lines.toml"),
            timetable_file: PathBuf::from("data/timetable.csv"),
            dwell_rules_file: PathBuf::from("data/dwell_rules.csv"),
            snapshot_file: None,
            clock: ClockSettings::System,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the file named by
    /// `RUNNING_GRAPH_SETTINGS` if no path is given, then apply environment
    /// overrides such as `RUNNING_GRAPH__PORT=8080`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let from_env = std::env::var_os(SETTINGS_PATH_VAR).map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(from_env);

        let defaults = config::Config::try_from(&Self::default()).map_err(|source| SettingsError::ConfigReadError {
            msg: "failed preparing default settings".to_string(),
            source,
        })?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = &path {
            log::info!("reading settings from {}", path.display());
            builder = builder.add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| SettingsError::ConfigReadError {
                msg: path.as_ref().map_or_else(
                    || "failed reading settings".to_string(),
                    |p| format!("failed reading '{}'", p.display()),
                ),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid settings.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let read_error = |source| SettingsError::ConfigReadError { msg: "failed parsing settings".to_string(), source };
        let defaults = config::Config::try_from(&Self::default()).map_err(read_error)?;
        let settings: Self = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(read_error)?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    ///
    /// Returns an error if the travel ratio is outside (0, 1] or a duration
    /// is not positive.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let ratio = self.minimum_travel_time_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(SettingsError::InvalidRatio(ratio));
        }
        if self.max_same_day_gap_secs <= 0 {
            return Err(SettingsError::NotPositive("max_same_day_gap_secs"));
        }
        if self.prediction_interval_secs <= 0 {
            return Err(SettingsError::NotPositive("prediction_interval_secs"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(SettingsError::NotPositive("refresh_interval_secs"));
        }
        Ok(())
    }

    #[must_use]
    pub fn projection_config(&self) -> ProjectionConfig {
        ProjectionConfig {
            minimum_travel_time_ratio: self.minimum_travel_time_ratio,
            hold_late_arrivals_to_schedule: self.hold_late_arrivals_to_schedule,
            max_same_day_gap: Duration::seconds(self.max_same_day_gap_secs),
            prediction_interval: Duration::seconds(self.prediction_interval_secs),
        }
    }

    #[must_use]
    pub fn recompute_interval(&self) -> Option<std::time::Duration> {
        (self.recompute_interval_secs > 0).then(|| std::time::Duration::from_secs(self.recompute_interval_secs))
    }
}
