use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::exercise::{BreathingDefaults, GroundingDefaults, PhaseDurations};

use super::{ExerciseConfig, ExerciseCopy, ExerciseKind, Stage};

/// Read-only set of exercise configs, shared across sessions.
#[derive(Debug, Clone, Default)]
pub struct ExerciseCatalog {
    configs: BTreeMap<String, Arc<ExerciseConfig>>,
}

impl ExerciseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let builtins = [
            box_breathing(),
            relaxing_breath(),
            coherent_breathing(),
            grounding_54321(),
        ];
        for config in builtins {
            // Built-ins are validated by the catalog tests.
            catalog.configs.insert(config.id.clone(), Arc::new(config));
        }
        catalog
    }

    pub fn insert(&mut self, config: ExerciseConfig) -> Result<()> {
        config
            .validate()
            .with_context(|| format!("rejected exercise config '{}'", config.id))?;
        self.configs.insert(config.id.clone(), Arc::new(config));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<ExerciseConfig>> {
        self.configs.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Load every `*.json` file in `dir`. Files that fail to parse or validate
    /// are skipped with a warning; an unreadable directory is an error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read exercise directory {}", dir.display()))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match load_config_file(&path).and_then(|config| self.insert(config)) {
                Ok(()) => loaded += 1,
                Err(err) => warn!("Skipping exercise config {}: {err:#}", path.display()),
            }
        }

        info!("Loaded {loaded} exercise configs from {}", dir.display());
        Ok(loaded)
    }
}

pub fn load_config_file(path: &Path) -> Result<ExerciseConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).map_err(|err| anyhow!("invalid exercise config: {err}"))
}

fn breathing(
    id: &str,
    title: &str,
    protocol: &str,
    phase_durations: PhaseDurations,
    target_cycles: u32,
    instructions: &[&str],
) -> ExerciseConfig {
    ExerciseConfig {
        id: id.into(),
        title: title.into(),
        stages: Stage::standard_sequence(),
        kind: ExerciseKind::Breathing(BreathingDefaults {
            protocol: protocol.into(),
            phase_durations,
            target_cycles,
        }),
        copy: ExerciseCopy {
            subtitle: None,
            instructions: instructions.iter().map(|s| s.to_string()).collect(),
            tips: vec!["Breathe through your nose if you can.".into()],
        },
    }
}

pub fn box_breathing() -> ExerciseConfig {
    breathing(
        "box-breathing",
        "Box Breathing",
        "box",
        PhaseDurations::new(4, 4, 4, 4),
        4,
        &[
            "Inhale for four seconds.",
            "Hold for four seconds.",
            "Exhale for four seconds.",
            "Hold again for four seconds.",
        ],
    )
}

pub fn relaxing_breath() -> ExerciseConfig {
    breathing(
        "relaxing-breath",
        "4-7-8 Breathing",
        "4-7-8",
        PhaseDurations::new(4, 7, 8, 0),
        4,
        &[
            "Inhale quietly for four seconds.",
            "Hold for seven seconds.",
            "Exhale completely for eight seconds.",
        ],
    )
}

pub fn coherent_breathing() -> ExerciseConfig {
    breathing(
        "coherent-breathing",
        "Coherent Breathing",
        "coherent",
        PhaseDurations::new(5, 0, 5, 0),
        6,
        &["Inhale for five seconds.", "Exhale for five seconds."],
    )
}

pub fn grounding_54321() -> ExerciseConfig {
    ExerciseConfig {
        id: "grounding-54321".into(),
        title: "5-4-3-2-1 Grounding".into(),
        stages: Stage::standard_sequence(),
        kind: ExerciseKind::Grounding(GroundingDefaults::default()),
        copy: ExerciseCopy {
            subtitle: Some("Come back to the room you are in.".into()),
            instructions: vec![
                "Name five things you can see.".into(),
                "Name four things you can touch.".into(),
                "Name three things you can hear.".into(),
                "Name two things you can smell.".into(),
                "Name one thing you can taste.".into(),
            ],
            tips: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn builtins_are_valid() {
        let catalog = ExerciseCatalog::builtin();
        assert_eq!(catalog.len(), 4);
        for id in catalog.ids() {
            let config = catalog.get(id).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn load_dir_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&box_breathing()).unwrap();
        fs::write(dir.path().join("box.json"), good).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut bad = grounding_54321();
        bad.id = "bad".into();
        bad.stages = vec![Stage::Exercise, Stage::Complete];
        fs::write(dir.path().join("bad.json"), serde_json::to_string(&bad).unwrap()).unwrap();

        let mut catalog = ExerciseCatalog::new();
        let loaded = catalog.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert!(catalog.get("box-breathing").is_some());
        assert!(catalog.get("bad").is_none());
    }

    #[test]
    fn load_dir_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = ExerciseCatalog::new();
        assert!(catalog.load_dir(&dir.path().join("missing")).is_err());
    }
}
