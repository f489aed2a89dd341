use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a guided exercise. Declaration order is the canonical order;
/// a config may skip stages but never reorder them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreRating,
    Instructions,
    Exercise,
    PostRating,
    TriggerLog,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreRating => "pre_rating",
            Stage::Instructions => "instructions",
            Stage::Exercise => "exercise",
            Stage::PostRating => "post_rating",
            Stage::TriggerLog => "trigger_log",
            Stage::Complete => "complete",
        }
    }

    /// The full sequence used by the built-in exercises.
    pub fn standard_sequence() -> Vec<Stage> {
        vec![
            Stage::PreRating,
            Stage::Instructions,
            Stage::Exercise,
            Stage::PostRating,
            Stage::TriggerLog,
            Stage::Complete,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_stage(value: &str) -> Option<Stage> {
    match value {
        "pre_rating" => Some(Stage::PreRating),
        "instructions" => Some(Stage::Instructions),
        "exercise" => Some(Stage::Exercise),
        "post_rating" => Some(Stage::PostRating),
        "trigger_log" => Some(Stage::TriggerLog),
        "complete" => Some(Stage::Complete),
        _ => None,
    }
}
