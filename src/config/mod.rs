pub mod catalog;
pub mod exercise_config;
pub mod stage;
pub mod triggers;

pub use catalog::ExerciseCatalog;
pub use exercise_config::{validate_stages, ExerciseConfig, ExerciseCopy, ExerciseKind};
pub use stage::{parse_stage, Stage};
pub use triggers::TriggerCatalog;
