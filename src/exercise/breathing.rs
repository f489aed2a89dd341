//! Cyclic breathing payload and its transitions.
//!
//! A cycle is one full pass through the protocol's phases. The screen reports
//! phase changes and finished cycles; the engine advances out of the exercise
//! stage once the target cycle count is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BreathPhase {
    Inhale,
    HoldIn,
    Exhale,
    HoldOut,
}

impl BreathPhase {
    const ORDER: [BreathPhase; 4] = [
        BreathPhase::Inhale,
        BreathPhase::HoldIn,
        BreathPhase::Exhale,
        BreathPhase::HoldOut,
    ];

    fn following(self) -> BreathPhase {
        match self {
            BreathPhase::Inhale => BreathPhase::HoldIn,
            BreathPhase::HoldIn => BreathPhase::Exhale,
            BreathPhase::Exhale => BreathPhase::HoldOut,
            BreathPhase::HoldOut => BreathPhase::Inhale,
        }
    }
}

/// Seconds spent in each phase. A zero duration means the protocol skips it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDurations {
    pub inhale: u32,
    pub hold_in: u32,
    pub exhale: u32,
    pub hold_out: u32,
}

impl PhaseDurations {
    pub fn new(inhale: u32, hold_in: u32, exhale: u32, hold_out: u32) -> Self {
        Self {
            inhale,
            hold_in,
            exhale,
            hold_out,
        }
    }

    pub fn seconds_for(&self, phase: BreathPhase) -> u32 {
        match phase {
            BreathPhase::Inhale => self.inhale,
            BreathPhase::HoldIn => self.hold_in,
            BreathPhase::Exhale => self.exhale,
            BreathPhase::HoldOut => self.hold_out,
        }
    }

    pub fn cycle_seconds(&self) -> u64 {
        [self.inhale, self.hold_in, self.exhale, self.hold_out]
            .into_iter()
            .map(u64::from)
            .sum()
    }

    fn first_phase(&self) -> BreathPhase {
        BreathPhase::ORDER
            .into_iter()
            .find(|phase| self.seconds_for(*phase) > 0)
            .unwrap_or(BreathPhase::Inhale)
    }

    fn next_phase(&self, current: BreathPhase) -> BreathPhase {
        let mut phase = current.following();
        // At most three hops before we are back where we started.
        for _ in 0..3 {
            if self.seconds_for(phase) > 0 {
                return phase;
            }
            phase = phase.following();
        }
        phase
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreathingDefaults {
    pub protocol: String,
    pub phase_durations: PhaseDurations,
    pub target_cycles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub cycle_number: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreathingData {
    pub protocol: String,
    pub current_phase: BreathPhase,
    pub completed_cycles: u32,
    pub target_cycles: u32,
    pub cycle_history: Vec<CycleRecord>,
    pub breath_durations: PhaseDurations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreathingEvent {
    PhaseAdvanced,
    CycleCompleted {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
}

impl BreathingData {
    pub fn from_defaults(defaults: &BreathingDefaults) -> Self {
        Self {
            protocol: defaults.protocol.clone(),
            current_phase: defaults.phase_durations.first_phase(),
            completed_cycles: 0,
            target_cycles: defaults.target_cycles,
            cycle_history: Vec::new(),
            breath_durations: defaults.phase_durations,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed_cycles >= self.target_cycles
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.completed_cycles as usize != self.cycle_history.len() {
            return Err(format!(
                "completedCycles {} does not match {} recorded cycles",
                self.completed_cycles,
                self.cycle_history.len()
            ));
        }
        if self.completed_cycles > self.target_cycles {
            return Err(format!(
                "completedCycles {} exceeds targetCycles {}",
                self.completed_cycles, self.target_cycles
            ));
        }
        Ok(())
    }

    /// Protocol, durations and cycle target are fixed by the config.
    pub fn check_defaults(&self, defaults: &BreathingDefaults) -> Result<(), String> {
        if self.protocol != defaults.protocol {
            return Err(format!(
                "protocol {} differs from configured {}",
                self.protocol, defaults.protocol
            ));
        }
        if self.target_cycles != defaults.target_cycles {
            return Err(format!(
                "targetCycles {} differs from configured {}",
                self.target_cycles, defaults.target_cycles
            ));
        }
        if self.breath_durations != defaults.phase_durations {
            return Err("breath durations differ from the configured protocol".into());
        }
        Ok(())
    }
}

/// Returns the next payload, or `None` when the event changes nothing.
pub fn reduce(data: &BreathingData, event: &BreathingEvent) -> Option<BreathingData> {
    match event {
        BreathingEvent::PhaseAdvanced => {
            let next = data.breath_durations.next_phase(data.current_phase);
            if next == data.current_phase {
                return None;
            }
            let mut updated = data.clone();
            updated.current_phase = next;
            Some(updated)
        }
        BreathingEvent::CycleCompleted {
            started_at,
            completed_at,
        } => {
            if data.is_finished() {
                return None;
            }

            let duration_seconds = (*completed_at - *started_at).num_seconds().max(0) as u64;
            let mut updated = data.clone();
            updated.cycle_history.push(CycleRecord {
                cycle_number: data.completed_cycles + 1,
                started_at: *started_at,
                completed_at: *completed_at,
                duration_seconds,
            });
            updated.completed_cycles += 1;
            updated.current_phase = data.breath_durations.first_phase();
            Some(updated)
        }
    }
}
