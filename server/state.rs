use std::path::Path;

use chrono::NaiveTime;
use running_graph::clock::{self, Clock};
use running_graph::import::{self, ImportError};
use running_graph::models::{DwellError, LineError};
use running_graph::storage::{self, SnapshotError};
use running_graph::{
    InMemoryStore, LineRegistry, ProjectionReport, Projector, Settings, StoreError, Timetable, TimetableStore,
};
use running_graph::settings::SettingsError;

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Lines(#[from] LineError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("invalid dwell rules: {0}")]
    DwellRules(#[from] DwellError),
}

/// Shared state of all request handlers
pub struct AppState {
    pub settings: Settings,
    pub lines: LineRegistry,
    pub store: InMemoryStore,
    pub clock: Box<dyn Clock>,
}

impl AppState {
    #[must_use]
    pub fn new(settings: Settings, lines: LineRegistry, timetable: Timetable, clock: Box<dyn Clock>) -> Self {
        Self { settings, lines, store: InMemoryStore::new(timetable), clock }
    }

    /// Read lines and timetable as configured. An existing snapshot takes
    /// precedence over the CSV files.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, StartupError> {
        let settings = Settings::load(settings_path)?;
        let lines = LineRegistry::from_file(&settings.lines_file)?;
        if lines.is_empty() {
            log::warn!("no lines configured in {}", settings.lines_file.display());
        }

        let timetable = match settings.snapshot_file.as_deref().filter(|p| p.exists()) {
            Some(path) => storage::load_snapshot(path)?,
            None => {
                let mut timetable = import::load_timetable(&settings.timetable_file)?;
                timetable.dwell_rules = import::load_dwell_rules(&settings.dwell_rules_file, &timetable)?;
                timetable
            }
        };
        timetable.dwell_rules.validate()?;

        let clock = clock::from_settings(&settings.clock);
        Ok(Self::new(settings, lines, timetable, clock))
    }

    #[must_use]
    pub fn now(&self) -> NaiveTime {
        self.clock.now().time()
    }

    /// Project every active train at the current clock time
    pub fn project(&self) -> Result<ProjectionReport, StoreError> {
        let report = Projector::new(&self.store, self.settings.projection_config()).run_active(self.now())?;
        self.save_snapshot();
        Ok(report)
    }

    /// Write the configured snapshot; failures are logged, never fatal
    pub fn save_snapshot(&self) {
        let Some(path) = &self.settings.snapshot_file else {
            return;
        };
        let result = self
            .store
            .snapshot()
            .map_err(|e| e.to_string())
            .and_then(|timetable| storage::save_snapshot(path, &timetable).map_err(|e| e.to_string()));
        if let Err(e) = result {
            log::error!("failed to save snapshot: {e}");
        }
    }
}
