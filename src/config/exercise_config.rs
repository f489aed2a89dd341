//! Static exercise configuration handed to the engine at `start`.
//!
//! Configs come from the built-in catalog or from JSON files shipped with the
//! content bundle. The engine only checks the stage list and the variant
//! defaults; titles and copy are opaque.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::exercise::{BreathingDefaults, ExerciseType, GroundingDefaults};

use super::stage::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExerciseKind {
    Breathing(BreathingDefaults),
    Grounding(GroundingDefaults),
}

impl ExerciseKind {
    pub fn exercise_type(&self) -> ExerciseType {
        match self {
            ExerciseKind::Breathing(_) => ExerciseType::Breathing,
            ExerciseKind::Grounding(_) => ExerciseType::Grounding,
        }
    }
}

/// Screen copy. Passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExerciseCopy {
    pub subtitle: Option<String>,
    pub instructions: Vec<String>,
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseConfig {
    pub id: String,
    pub title: String,
    pub stages: Vec<Stage>,
    pub kind: ExerciseKind,
    #[serde(default)]
    pub copy: ExerciseCopy,
}

impl ExerciseConfig {
    pub fn exercise_type(&self) -> ExerciseType {
        self.kind.exercise_type()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Config("config id is empty".into()));
        }
        validate_stages(&self.stages)?;

        match &self.kind {
            ExerciseKind::Breathing(defaults) => {
                if defaults.target_cycles == 0 {
                    return Err(EngineError::Config(format!(
                        "{}: breathing target cycles must be greater than zero",
                        self.id
                    )));
                }
                if defaults.phase_durations.cycle_seconds() == 0 {
                    return Err(EngineError::Config(format!(
                        "{}: breathing phase durations are all zero",
                        self.id
                    )));
                }
            }
            ExerciseKind::Grounding(defaults) => {
                let total = defaults.total_target();
                if total > u64::from(u32::MAX) {
                    return Err(EngineError::Config(format!(
                        "{}: grounding targets add up to {total}, which is too many",
                        self.id
                    )));
                }
                if total == 0 {
                    return Err(EngineError::Config(format!(
                        "{}: grounding needs at least one sense with a target",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Stage lists start at `pre_rating` or `instructions`, end at `complete`,
/// hold `exercise` exactly once and follow the canonical order.
pub fn validate_stages(stages: &[Stage]) -> Result<()> {
    let (first, last) = match (stages.first(), stages.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(EngineError::Config("stage list is empty".into())),
    };

    if !matches!(first, Stage::PreRating | Stage::Instructions) {
        return Err(EngineError::Config(format!(
            "stage list must begin at pre_rating or instructions, found {first}"
        )));
    }
    if last != Stage::Complete {
        return Err(EngineError::Config(format!(
            "stage list must end at complete, found {last}"
        )));
    }

    let exercise_count = stages.iter().filter(|s| **s == Stage::Exercise).count();
    if exercise_count != 1 {
        return Err(EngineError::Config(format!(
            "stage list must contain exercise exactly once, found {exercise_count}"
        )));
    }

    if let Some(pair) = stages.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(EngineError::Config(format!(
            "stage {} cannot follow {}",
            pair[1], pair[0]
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_sequence_is_valid() {
        assert!(validate_stages(&Stage::standard_sequence()).is_ok());
    }

    #[test]
    fn minimal_sequence_is_valid() {
        let stages = [Stage::Instructions, Stage::Exercise, Stage::Complete];
        assert!(validate_stages(&stages).is_ok());
    }

    #[test]
    fn rejects_empty_and_missing_exercise() {
        assert!(matches!(validate_stages(&[]), Err(EngineError::Config(_))));
        let stages = [Stage::PreRating, Stage::PostRating, Stage::Complete];
        assert!(matches!(validate_stages(&stages), Err(EngineError::Config(_))));
    }

    #[test]
    fn rejects_bad_boundaries() {
        let starts_at_exercise = [Stage::Exercise, Stage::Complete];
        assert!(validate_stages(&starts_at_exercise).is_err());

        let no_complete = [Stage::PreRating, Stage::Exercise, Stage::PostRating];
        assert!(validate_stages(&no_complete).is_err());
    }

    #[test]
    fn rejects_duplicates_and_reordering() {
        let duplicate = [
            Stage::PreRating,
            Stage::Exercise,
            Stage::Exercise,
            Stage::Complete,
        ];
        assert!(validate_stages(&duplicate).is_err());

        let reordered = [
            Stage::Instructions,
            Stage::PreRating,
            Stage::Exercise,
            Stage::Complete,
        ];
        assert!(validate_stages(&reordered).is_err());
    }

    #[test]
    fn config_json_uses_tagged_kind() {
        let json = r#"{
            "id": "box",
            "title": "Box breathing",
            "stages": ["pre_rating", "instructions", "exercise", "post_rating", "complete"],
            "kind": {
                "type": "breathing",
                "protocol": "box",
                "phaseDurations": { "inhale": 4, "holdIn": 4, "exhale": 4, "holdOut": 4 },
                "targetCycles": 4
            }
        }"#;

        let config: ExerciseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.exercise_type(), ExerciseType::Breathing);
        assert_eq!(config.stages.len(), 5);
        assert!(config.copy.instructions.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_target_cycles_is_a_config_error() {
        let mut config = crate::config::catalog::box_breathing();
        if let ExerciseKind::Breathing(defaults) = &mut config.kind {
            defaults.target_cycles = 0;
        }
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn huge_durations_and_targets_do_not_overflow() {
        use crate::exercise::{PhaseDurations, SenseKey};

        let mut breathing = crate::config::catalog::box_breathing();
        if let ExerciseKind::Breathing(defaults) = &mut breathing.kind {
            defaults.phase_durations = PhaseDurations::new(u32::MAX, 1, 0, 0);
            assert_eq!(defaults.phase_durations.cycle_seconds(), u64::from(u32::MAX) + 1);
        }
        assert!(breathing.validate().is_ok());

        let mut grounding = crate::config::catalog::grounding_54321();
        if let ExerciseKind::Grounding(defaults) = &mut grounding.kind {
            defaults.targets.insert(SenseKey::See, u32::MAX);
        }
        assert!(matches!(grounding.validate(), Err(EngineError::Config(_))));
    }
}
