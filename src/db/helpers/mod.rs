use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::config::{parse_stage, Stage};
use crate::exercise::ExerciseType;
use crate::session::SessionStatus;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_rating(value: Option<i64>, field: &str) -> Result<Option<u8>> {
    value
        .map(|raw| u8::try_from(raw).map_err(|_| anyhow!("{field} out of range: {raw}")))
        .transpose()
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "active" => Ok(SessionStatus::Active),
        "paused" => Ok(SessionStatus::Paused),
        "completed" => Ok(SessionStatus::Completed),
        "abandoned" => Ok(SessionStatus::Abandoned),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

pub fn parse_stage_column(value: &str) -> Result<Stage> {
    parse_stage(value).ok_or_else(|| anyhow!("unknown stage {value}"))
}

pub fn parse_exercise_type(value: &str) -> Result<ExerciseType> {
    match value {
        "breathing" => Ok(ExerciseType::Breathing),
        "grounding" => Ok(ExerciseType::Grounding),
        other => Err(anyhow!("unknown exercise type {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("Running").is_err());
    }

    #[test]
    fn rejects_negative_and_oversized_values() {
        assert!(to_u64(-1, "total_secs").is_err());
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_rating(Some(300), "pre_rating").is_err());
        assert_eq!(to_rating(None, "pre_rating").unwrap(), None);
    }
}
