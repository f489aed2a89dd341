#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use stillpoint::{
    AnalyticsSink, Collaborators, ExerciseConfig, ManualClock, SessionContext, SessionSink,
    SessionSnapshot, SessionStateMachine, TerminalRecord,
};

#[derive(Debug, Clone)]
pub struct SavedSnapshot {
    pub snapshot: SessionSnapshot,
    pub version: u64,
    pub is_final: bool,
}

#[derive(Default)]
pub struct RecordingSink {
    saves: Mutex<Vec<SavedSnapshot>>,
}

impl RecordingSink {
    pub fn saves(&self) -> Vec<SavedSnapshot> {
        self.saves.lock().unwrap().clone()
    }

    pub fn final_saves(&self) -> Vec<SavedSnapshot> {
        self.saves().into_iter().filter(|s| s.is_final).collect()
    }
}

impl SessionSink for RecordingSink {
    fn save(&self, snapshot: SessionSnapshot, version: u64, is_final: bool) {
        self.saves.lock().unwrap().push(SavedSnapshot {
            snapshot,
            version,
            is_final,
        });
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    records: Mutex<Vec<TerminalRecord>>,
}

impl RecordingAnalytics {
    pub fn records(&self) -> Vec<TerminalRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record(&self, record: &TerminalRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

pub struct Harness {
    pub machine: SessionStateMachine,
    pub clock: ManualClock,
    pub sink: Arc<RecordingSink>,
    pub analytics: Arc<RecordingAnalytics>,
}

pub fn start(config: ExerciseConfig) -> Harness {
    let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let analytics = Arc::new(RecordingAnalytics::default());

    let collaborators = Collaborators::default()
        .with_sink(sink.clone())
        .with_analytics(analytics.clone())
        .with_clock(Arc::new(clock.clone()));

    let machine = SessionStateMachine::start(
        Arc::new(config),
        SessionContext::new("toolkit", "breathing-card"),
        collaborators,
    )
    .unwrap();

    Harness {
        machine,
        clock,
        sink,
        analytics,
    }
}
