//! 5-4-3-2-1 sensory grounding payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Senses in the order the user walks through them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SenseKey {
    See,
    Touch,
    Hear,
    Smell,
    Taste,
}

impl SenseKey {
    pub const ORDER: [SenseKey; 5] = [
        SenseKey::See,
        SenseKey::Touch,
        SenseKey::Hear,
        SenseKey::Smell,
        SenseKey::Taste,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroundingDefaults {
    pub targets: BTreeMap<SenseKey, u32>,
}

impl Default for GroundingDefaults {
    fn default() -> Self {
        Self {
            targets: SenseKey::ORDER.into_iter().zip([5, 4, 3, 2, 1]).collect(),
        }
    }
}

impl GroundingDefaults {
    pub fn total_target(&self) -> u64 {
        self.targets.values().copied().map(u64::from).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SenseProgress {
    pub target: u32,
    pub identified: u32,
    pub items: Vec<String>,
}

impl SenseProgress {
    fn is_complete(&self) -> bool {
        self.identified >= self.target
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroundingData {
    pub senses: BTreeMap<SenseKey, SenseProgress>,
    pub current_sense: Option<SenseKey>,
    pub total_identified: u32,
    pub total_target: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroundingEvent {
    ItemIdentified { text: String },
}

impl GroundingData {
    pub fn from_defaults(defaults: &GroundingDefaults) -> Self {
        let senses: BTreeMap<SenseKey, SenseProgress> = SenseKey::ORDER
            .into_iter()
            .map(|sense| {
                let target = defaults.targets.get(&sense).copied().unwrap_or(0);
                (
                    sense,
                    SenseProgress {
                        target,
                        ..SenseProgress::default()
                    },
                )
            })
            .collect();

        let total_target = senses
            .values()
            .fold(0u32, |total, p| total.saturating_add(p.target));
        let current_sense = first_incomplete(&senses);

        Self {
            senses,
            current_sense,
            total_identified: 0,
            total_target,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current_sense.is_none()
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        for (sense, progress) in &self.senses {
            if progress.identified as usize != progress.items.len() {
                return Err(format!(
                    "{sense:?}: identified {} does not match {} items",
                    progress.identified,
                    progress.items.len()
                ));
            }
            if progress.identified > progress.target {
                return Err(format!(
                    "{sense:?}: identified {} exceeds target {}",
                    progress.identified, progress.target
                ));
            }
        }

        let sum: u64 = self.senses.values().map(|p| u64::from(p.identified)).sum();
        if sum != u64::from(self.total_identified) {
            return Err(format!(
                "totalIdentified {} does not match per-sense sum {sum}",
                self.total_identified
            ));
        }

        let expected = first_incomplete(&self.senses);
        if self.current_sense != expected {
            return Err(format!(
                "currentSense {:?} should be {expected:?}",
                self.current_sense
            ));
        }

        Ok(())
    }

    /// Per-sense targets are fixed by the config.
    pub fn check_defaults(&self, defaults: &GroundingDefaults) -> Result<(), String> {
        let configured = GroundingData::from_defaults(defaults);
        if self.senses.len() != configured.senses.len() {
            return Err(format!(
                "expected {} senses, got {}",
                configured.senses.len(),
                self.senses.len()
            ));
        }
        for (sense, expected) in &configured.senses {
            let target = self.senses.get(sense).map(|p| p.target);
            if target != Some(expected.target) {
                return Err(format!(
                    "{sense:?}: target {target:?} differs from configured {}",
                    expected.target
                ));
            }
        }
        if self.total_target != configured.total_target {
            return Err(format!(
                "totalTarget {} differs from configured {}",
                self.total_target, configured.total_target
            ));
        }
        Ok(())
    }
}

fn first_incomplete(senses: &BTreeMap<SenseKey, SenseProgress>) -> Option<SenseKey> {
    SenseKey::ORDER
        .into_iter()
        .find(|sense| senses.get(sense).is_some_and(|p| !p.is_complete()))
}

/// Returns the next payload, or `None` for blank input or a finished exercise.
pub fn reduce(data: &GroundingData, event: &GroundingEvent) -> Option<GroundingData> {
    let GroundingEvent::ItemIdentified { text } = event;

    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let sense = data.current_sense?;

    let mut updated = data.clone();
    let progress = updated.senses.get_mut(&sense)?;
    progress.items.push(text.to_string());
    progress.identified += 1;
    updated.total_identified += 1;

    if progress.is_complete() {
        updated.current_sense = first_incomplete(&updated.senses);
    }

    Some(updated)
}
