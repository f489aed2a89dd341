//! Aggregates over finished sessions for the insights screen.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::session::{SessionStatus, TerminalRecord};

/// How often a trigger category was logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCount {
    pub category: String,
    pub count: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSummary {
    pub session_count: u32,
    pub completed_count: u32,
    pub abandoned_count: u32,
    pub total_active_secs: u64,
    /// Mean of post minus pre rating over sessions that have both.
    pub average_rating_shift: Option<f64>,
    /// Sessions where the post rating is below the pre rating (distress went down).
    pub improved_count: u32,
    pub top_triggers: Vec<TriggerCount>,
}

pub fn summarize(records: &[TerminalRecord], top_n: usize) -> InsightsSummary {
    let mut summary = InsightsSummary {
        session_count: records.len() as u32,
        ..InsightsSummary::default()
    };

    let mut shifts = Vec::new();
    let mut trigger_counts: HashMap<&str, u32> = HashMap::new();
    let mut trigger_total = 0u32;

    for record in records {
        match record.status {
            SessionStatus::Completed => summary.completed_count += 1,
            SessionStatus::Abandoned => summary.abandoned_count += 1,
            _ => {}
        }
        summary.total_active_secs += record.total_duration;

        if let Some(shift) = record.rating_shift() {
            shifts.push(shift);
            if shift < 0 {
                summary.improved_count += 1;
            }
        }

        for trigger in &record.triggers {
            *trigger_counts.entry(trigger.category.as_str()).or_default() += 1;
            trigger_total += 1;
        }
    }

    if !shifts.is_empty() {
        let sum: i32 = shifts.iter().sum();
        summary.average_rating_shift = Some(sum as f64 / shifts.len() as f64);
    }

    let mut counts: Vec<(&str, u32)> = trigger_counts.into_iter().collect();
    // Most frequent first; ties by name so the order is stable.
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    summary.top_triggers = counts
        .into_iter()
        .take(top_n)
        .map(|(category, count)| TriggerCount {
            category: category.to_string(),
            count,
            percentage: count as f64 * 100.0 / trigger_total as f64,
        })
        .collect();

    summary
}

/// Summarize the most recent `limit` ended sessions in the store.
pub async fn load_insights(db: &Database, limit: usize, top_n: usize) -> Result<InsightsSummary> {
    let records: Vec<TerminalRecord> = db
        .list_sessions_paginated(limit, 0)
        .await?
        .iter()
        .filter_map(|stored| stored.terminal_record())
        .collect();
    Ok(summarize(&records, top_n))
}
