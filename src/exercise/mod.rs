//! Exercise-type payloads. Each variant's transition logic is a pure function
//! in its own module; this module only dispatches between them.

pub mod breathing;
pub mod grounding;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ExerciseKind;

pub use breathing::{
    BreathPhase, BreathingData, BreathingDefaults, BreathingEvent, CycleRecord, PhaseDurations,
};
pub use grounding::{GroundingData, GroundingDefaults, GroundingEvent, SenseKey, SenseProgress};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseType {
    Breathing,
    Grounding,
}

impl ExerciseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::Breathing => "breathing",
            ExerciseType::Grounding => "grounding",
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExerciseData {
    Breathing(BreathingData),
    Grounding(GroundingData),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseEvent {
    Breathing(BreathingEvent),
    Grounding(GroundingEvent),
}

impl ExerciseData {
    pub fn from_kind(kind: &ExerciseKind) -> Self {
        match kind {
            ExerciseKind::Breathing(defaults) => {
                ExerciseData::Breathing(BreathingData::from_defaults(defaults))
            }
            ExerciseKind::Grounding(defaults) => {
                ExerciseData::Grounding(GroundingData::from_defaults(defaults))
            }
        }
    }

    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseData::Breathing(_) => ExerciseType::Breathing,
            ExerciseData::Grounding(_) => ExerciseType::Grounding,
        }
    }

    /// Whether the payload has reached its variant's auto-advance condition.
    pub fn is_finished(&self) -> bool {
        match self {
            ExerciseData::Breathing(data) => data.is_finished(),
            ExerciseData::Grounding(data) => data.is_finished(),
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        match self {
            ExerciseData::Breathing(data) => data.check_invariants(),
            ExerciseData::Grounding(data) => data.check_invariants(),
        }
    }

    /// Rejects payloads that change what the config fixed (targets, protocol).
    pub fn check_defaults(&self, kind: &ExerciseKind) -> Result<(), String> {
        match (self, kind) {
            (ExerciseData::Breathing(data), ExerciseKind::Breathing(defaults)) => {
                data.check_defaults(defaults)
            }
            (ExerciseData::Grounding(data), ExerciseKind::Grounding(defaults)) => {
                data.check_defaults(defaults)
            }
            _ => Err(format!(
                "{} payload does not fit a {} config",
                self.exercise_type(),
                kind.exercise_type()
            )),
        }
    }

    pub fn as_breathing(&self) -> Option<&BreathingData> {
        match self {
            ExerciseData::Breathing(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_grounding(&self) -> Option<&GroundingData> {
        match self {
            ExerciseData::Grounding(data) => Some(data),
            _ => None,
        }
    }
}

impl ExerciseEvent {
    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseEvent::Breathing(_) => ExerciseType::Breathing,
            ExerciseEvent::Grounding(_) => ExerciseType::Grounding,
        }
    }
}

/// Run `event` through the matching reducer. `None` means the event did not
/// change anything or targets the other variant.
pub fn reduce(data: &ExerciseData, event: &ExerciseEvent) -> Option<ExerciseData> {
    match (data, event) {
        (ExerciseData::Breathing(data), ExerciseEvent::Breathing(event)) => {
            breathing::reduce(data, event).map(ExerciseData::Breathing)
        }
        (ExerciseData::Grounding(data), ExerciseEvent::Grounding(event)) => {
            grounding::reduce(data, event).map(ExerciseData::Grounding)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_payload_carries_type_tag() {
        let data = ExerciseData::Grounding(GroundingData::from_defaults(
            &GroundingDefaults::default(),
        ));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "grounding");
        assert_eq!(json["currentSense"], "see");
        assert_eq!(json["senses"]["see"]["target"], 5);

        let back: ExerciseData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn cross_variant_events_do_nothing() {
        let data = ExerciseData::Grounding(GroundingData::from_defaults(
            &GroundingDefaults::default(),
        ));
        let event = ExerciseEvent::Breathing(BreathingEvent::PhaseAdvanced);
        assert!(reduce(&data, &event).is_none());
    }
}
