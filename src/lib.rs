//! Guided exercise session engine.
//!
//! Drives a user through a fixed sequence of stages (rating, instructions,
//! exercise, rating, trigger log, completion), tracks active time with paused
//! intervals excluded, and reports snapshots and a terminal record to the
//! persistence and analytics collaborators.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod exercise;
pub mod insights;
pub mod persistence;
pub mod session;
pub mod settings;
pub mod timer;
mod utils;

pub use config::{ExerciseCatalog, ExerciseConfig, ExerciseKind, Stage, TriggerCatalog};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use exercise::{ExerciseData, ExerciseEvent, ExerciseType};
pub use persistence::{AnalyticsSink, SessionSink, SnapshotSaver};
pub use session::{
    Advance, Collaborators, SessionContext, SessionSnapshot, SessionStateMachine, SessionStatus,
    TerminalRecord, TriggerInput,
};
pub use timer::{Clock, ManualClock, StageTimer, SystemClock};
pub use utils::logging::init_logging;
