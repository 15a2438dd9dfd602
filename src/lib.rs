#![allow(clippy::implicit_hasher)]
#![allow(unknown_lints)]

pub mod chart;
pub mod clock;
pub mod constants;
pub mod import;
pub mod models;
pub mod projection;
pub mod selection;
pub mod settings;
pub mod storage;
pub mod theme;
pub mod time;

pub use models::{LineRegistry, Stop, Timetable, Train, TrainId};
pub use projection::{project_train, ProjectionConfig, ProjectionError, ProjectionReport, Projector};
pub use settings::Settings;
pub use storage::{InMemoryStore, StoreError, TimetableStore};
