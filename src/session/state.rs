use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Stage;
use crate::exercise::{ExerciseData, ExerciseType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the user launched the exercise from. Opaque to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub module_context: Option<String>,
    pub module_screen: Option<String>,
}

impl SessionContext {
    pub fn new(module_context: impl Into<String>, module_screen: impl Into<String>) -> Self {
        Self {
            module_context: Some(module_context.into()),
            module_screen: Some(module_screen.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEntry {
    pub category: String,
    pub custom_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A trigger as submitted by the screen; the timestamp defaults to now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerInput {
    pub category: String,
    pub custom_text: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TriggerInput {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_custom_text(mut self, text: impl Into<String>) -> Self {
        self.custom_text = Some(text.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Live session state. Durations are not stored here; they are read from the
/// owning machine's timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSession {
    pub session_id: String,
    pub config_id: String,
    pub current_stage: Stage,
    pub status: SessionStatus,
    pub pre_rating: Option<u8>,
    pub post_rating: Option<u8>,
    pub exercise_data: ExerciseData,
    pub triggers: Vec<TriggerEntry>,
    pub module_context: Option<String>,
    pub module_screen: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy handed to the persistence sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub config_id: String,
    pub exercise_type: ExerciseType,
    pub current_stage: Stage,
    pub status: SessionStatus,
    pub pre_rating: Option<u8>,
    pub post_rating: Option<u8>,
    pub exercise_data: ExerciseData,
    pub triggers: Vec<TriggerEntry>,
    pub current_stage_duration: u64,
    pub total_duration: u64,
    pub module_context: Option<String>,
    pub module_screen: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
}

/// Summary handed to analytics once a session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRecord {
    pub session_id: String,
    pub config_id: String,
    pub pre_rating: Option<u8>,
    pub post_rating: Option<u8>,
    pub total_duration: u64,
    pub triggers: Vec<TriggerEntry>,
    pub status: SessionStatus,
    pub ended_at: DateTime<Utc>,
}

impl TerminalRecord {
    /// Post minus pre rating, when both were given.
    pub fn rating_shift(&self) -> Option<i32> {
        match (self.pre_rating, self.post_rating) {
            (Some(pre), Some(post)) => Some(post as i32 - pre as i32),
            _ => None,
        }
    }
}

impl From<&SessionSnapshot> for TerminalRecord {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id.clone(),
            config_id: snapshot.config_id.clone(),
            pre_rating: snapshot.pre_rating,
            post_rating: snapshot.post_rating,
            total_duration: snapshot.total_duration,
            triggers: snapshot.triggers.clone(),
            status: snapshot.status,
            ended_at: snapshot.ended_at.unwrap_or(snapshot.captured_at),
        }
    }
}
