use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Active-time bookkeeping for a session and its current stage.
///
/// Nothing here ticks. Durations are `(now - started) - paused`, computed on
/// read from wall-clock anchors, so a suspended process or a missed redraw
/// never skews the figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageTimer {
    pub session_started_at: DateTime<Utc>,
    pub stage_started_at: DateTime<Utc>,
    pub session_paused_ms: u64,
    pub stage_paused_ms: u64,
    pub paused_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

impl StageTimer {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            session_started_at: now,
            stage_started_at: now,
            session_paused_ms: 0,
            stage_paused_ms: 0,
            paused_at: None,
            stopped_at: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    /// The instant readings are taken at: frozen while paused or stopped.
    fn reading_point(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.stopped_at.or(self.paused_at).unwrap_or(now)
    }

    pub fn total_ms(&self, now: DateTime<Utc>) -> u64 {
        let at = self.reading_point(now);
        millis_between(self.session_started_at, at).saturating_sub(self.session_paused_ms)
    }

    pub fn stage_ms(&self, now: DateTime<Utc>) -> u64 {
        let at = self.reading_point(now).max(self.stage_started_at);
        let stage = millis_between(self.stage_started_at, at).saturating_sub(self.stage_paused_ms);
        stage.min(self.total_ms(now))
    }

    pub fn total_secs(&self, now: DateTime<Utc>) -> u64 {
        self.total_ms(now) / 1000
    }

    pub fn stage_secs(&self, now: DateTime<Utc>) -> u64 {
        self.stage_ms(now) / 1000
    }

    pub fn restart_stage(&mut self, now: DateTime<Utc>) {
        if self.is_stopped() {
            return;
        }
        self.stage_started_at = now;
        self.stage_paused_ms = 0;
    }

    /// Returns false when already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused() || self.is_stopped() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Returns false when not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_stopped() {
            return false;
        }
        let Some(paused_at) = self.paused_at.take() else {
            return false;
        };

        self.session_paused_ms = self
            .session_paused_ms
            .saturating_add(millis_between(paused_at, now));
        // A stage entered while paused only owes the part of the gap after it began.
        let stage_gap_start = paused_at.max(self.stage_started_at);
        self.stage_paused_ms = self
            .stage_paused_ms
            .saturating_add(millis_between(stage_gap_start, now));
        true
    }

    /// Freeze both figures. A pending pause ends at its start.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.is_stopped() {
            return;
        }
        self.stopped_at = Some(self.paused_at.unwrap_or(now));
    }
}
