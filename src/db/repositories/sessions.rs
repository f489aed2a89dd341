use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{
        parse_datetime, parse_exercise_type, parse_optional_datetime, parse_stage_column,
        parse_status, to_i64, to_rating, to_u64,
    },
    models::StoredSession,
    Database,
};
use crate::session::{SessionSnapshot, SessionStatus, TriggerEntry};

const SESSION_COLUMNS: &str = "id, config_id, exercise_type, current_stage, status, pre_rating, post_rating,
     exercise_data, current_stage_secs, total_secs, module_context, module_screen,
     started_at, ended_at, captured_at, version, is_final";

fn row_to_stored(row: &Row) -> Result<StoredSession> {
    let exercise_type: String = row.get("exercise_type")?;
    let current_stage: String = row.get("current_stage")?;
    let status: String = row.get("status")?;
    let exercise_data: String = row.get("exercise_data")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let captured_at: String = row.get("captured_at")?;

    let snapshot = SessionSnapshot {
        session_id: row.get("id")?,
        config_id: row.get("config_id")?,
        exercise_type: parse_exercise_type(&exercise_type)?,
        current_stage: parse_stage_column(&current_stage)?,
        status: parse_status(&status)?,
        pre_rating: to_rating(row.get("pre_rating")?, "pre_rating")?,
        post_rating: to_rating(row.get("post_rating")?, "post_rating")?,
        exercise_data: serde_json::from_str(&exercise_data)
            .context("failed to decode exercise_data")?,
        triggers: Vec::new(),
        current_stage_duration: to_u64(row.get("current_stage_secs")?, "current_stage_secs")?,
        total_duration: to_u64(row.get("total_secs")?, "total_secs")?,
        module_context: row.get("module_context")?,
        module_screen: row.get("module_screen")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    };

    Ok(StoredSession {
        snapshot,
        version: to_u64(row.get("version")?, "version")?,
        is_final: row.get::<_, i64>("is_final")? != 0,
    })
}

fn load_triggers(conn: &Connection, session_id: &str) -> Result<Vec<TriggerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT category, custom_text, logged_at
         FROM session_triggers
         WHERE session_id = ?1
         ORDER BY position ASC",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    let mut triggers = Vec::new();
    while let Some(row) = rows.next()? {
        let logged_at: String = row.get(2)?;
        triggers.push(TriggerEntry {
            category: row.get(0)?,
            custom_text: row.get(1)?,
            timestamp: parse_datetime(&logged_at, "logged_at")?,
        });
    }
    Ok(triggers)
}

fn query_sessions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<StoredSession>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_stored(row)?);
    }

    for stored in &mut sessions {
        stored.snapshot.triggers = load_triggers(conn, &stored.snapshot.session_id)?;
    }
    Ok(sessions)
}

impl Database {
    /// Upsert a snapshot. Writes carrying a version at or below the stored one,
    /// or targeting a row that already holds its final snapshot, are dropped.
    /// Returns whether the write was applied.
    pub async fn save_snapshot(
        &self,
        snapshot: SessionSnapshot,
        version: u64,
        is_final: bool,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let exercise_data = serde_json::to_string(&snapshot.exercise_data)
                .context("failed to encode exercise_data")?;

            let tx = conn.transaction()?;
            let applied = tx
                .execute(
                    "INSERT INTO exercise_sessions (id, config_id, exercise_type, current_stage, status,
                         pre_rating, post_rating, exercise_data, current_stage_secs, total_secs,
                         module_context, module_screen, started_at, ended_at, captured_at, version, is_final)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                     ON CONFLICT(id) DO UPDATE SET
                         current_stage = excluded.current_stage,
                         status = excluded.status,
                         pre_rating = excluded.pre_rating,
                         post_rating = excluded.post_rating,
                         exercise_data = excluded.exercise_data,
                         current_stage_secs = excluded.current_stage_secs,
                         total_secs = excluded.total_secs,
                         ended_at = excluded.ended_at,
                         captured_at = excluded.captured_at,
                         version = excluded.version,
                         is_final = excluded.is_final
                     WHERE excluded.version > exercise_sessions.version
                       AND exercise_sessions.is_final = 0",
                    params![
                        snapshot.session_id,
                        snapshot.config_id,
                        snapshot.exercise_type.as_str(),
                        snapshot.current_stage.as_str(),
                        snapshot.status.as_str(),
                        snapshot.pre_rating,
                        snapshot.post_rating,
                        exercise_data,
                        to_i64(snapshot.current_stage_duration)?,
                        to_i64(snapshot.total_duration)?,
                        snapshot.module_context,
                        snapshot.module_screen,
                        snapshot.started_at.to_rfc3339(),
                        snapshot.ended_at.map(|dt| dt.to_rfc3339()),
                        snapshot.captured_at.to_rfc3339(),
                        to_i64(version)?,
                        is_final,
                    ],
                )
                .with_context(|| format!("failed to save session {}", snapshot.session_id))?
                > 0;

            if applied {
                tx.execute(
                    "DELETE FROM session_triggers WHERE session_id = ?1",
                    params![snapshot.session_id],
                )?;
                for (position, trigger) in snapshot.triggers.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO session_triggers (session_id, position, category, custom_text, logged_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            snapshot.session_id,
                            position as i64,
                            trigger.category,
                            trigger.custom_text,
                            trigger.timestamp.to_rfc3339(),
                        ],
                    )?;
                }
            }

            tx.commit()?;
            Ok(applied)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<StoredSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let stored = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM exercise_sessions WHERE id = ?1"),
                    params![session_id],
                    |row| Ok(row_to_stored(row)),
                )
                .optional()?
                .transpose()?;

            match stored {
                Some(mut stored) => {
                    stored.snapshot.triggers = load_triggers(conn, &session_id)?;
                    Ok(Some(stored))
                }
                None => Ok(None),
            }
        })
        .await
    }

    /// Ended sessions, newest first.
    pub async fn list_sessions_paginated(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredSession>> {
        let limit = limit as i64;
        let offset = offset as i64;
        self.execute(move |conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS}
                     FROM exercise_sessions
                     WHERE status IN ('completed', 'abandoned')
                     ORDER BY started_at DESC
                     LIMIT ?1 OFFSET ?2"
                ),
                params![limit, offset],
            )
        })
        .await
    }

    /// Rows whose final snapshot never arrived, e.g. after a crash.
    pub async fn get_incomplete_sessions(&self) -> Result<Vec<StoredSession>> {
        self.execute(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS}
                     FROM exercise_sessions
                     WHERE is_final = 0 AND status IN ('active', 'paused')
                     ORDER BY started_at DESC"
                ),
                params![],
            )
        })
        .await
    }

    pub async fn mark_session_abandoned(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE exercise_sessions
                 SET status = ?1,
                     ended_at = ?2,
                     captured_at = ?2,
                     is_final = 1
                 WHERE id = ?3 AND is_final = 0",
                params![
                    SessionStatus::Abandoned.as_str(),
                    ended_at.to_rfc3339(),
                    session_id,
                ],
            )
            .with_context(|| "failed to mark session abandoned")?;
            Ok(())
        })
        .await
    }

    /// Delete a session and its triggers (cascade).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM exercise_sessions WHERE id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog;
    use crate::session::{Collaborators, SessionContext, SessionStateMachine, TriggerInput};
    use crate::timer::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn machine() -> (SessionStateMachine, ManualClock) {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let collaborators = Collaborators::default().with_clock(Arc::new(clock.clone()));
        let machine = SessionStateMachine::start(
            Arc::new(catalog::grounding_54321()),
            SessionContext::new("anxiety-module", "toolkit"),
            collaborators,
        )
        .unwrap();
        (machine, clock)
    }

    #[tokio::test]
    async fn stale_versions_are_dropped() {
        let db = Database::open_in_memory().unwrap();
        let (mut machine, clock) = machine();

        let first = machine.snapshot();
        clock.advance_secs(30);
        machine.log_trigger(TriggerInput::new("work")).unwrap();
        let second = machine.snapshot();

        assert!(db.save_snapshot(second.clone(), 2, false).await.unwrap());
        assert!(!db.save_snapshot(first, 1, false).await.unwrap());
        assert!(!db.save_snapshot(second.clone(), 2, false).await.unwrap());

        let stored = db.get_session(&second.session_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.snapshot, second);
        assert_eq!(stored.snapshot.module_context.as_deref(), Some("anxiety-module"));
    }

    #[tokio::test]
    async fn final_snapshot_is_never_overwritten() {
        let db = Database::open_in_memory().unwrap();
        let (mut machine, _clock) = machine();
        let record = machine.abandon().unwrap();
        let last = machine.snapshot();

        assert!(db.save_snapshot(last.clone(), 5, true).await.unwrap());
        assert!(!db.save_snapshot(last, 6, false).await.unwrap());

        let listed = db.list_sessions_paginated(10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_final);
        assert_eq!(listed[0].terminal_record(), Some(record));
    }

    #[tokio::test]
    async fn incomplete_sessions_can_be_recovered() {
        let db = Database::open_in_memory().unwrap();
        let (machine, clock) = machine();
        db.save_snapshot(machine.snapshot(), 1, false).await.unwrap();

        let incomplete = db.get_incomplete_sessions().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert!(db.list_sessions_paginated(10, 0).await.unwrap().is_empty());

        clock.advance_secs(600);
        db.mark_session_abandoned(machine.session_id(), clock_now(&clock))
            .await
            .unwrap();
        assert!(db.get_incomplete_sessions().await.unwrap().is_empty());

        let stored = db.get_session(machine.session_id()).await.unwrap().unwrap();
        assert_eq!(stored.snapshot.status, SessionStatus::Abandoned);
        assert!(stored.is_final);
    }

    #[tokio::test]
    async fn delete_removes_triggers() {
        let db = Database::open_in_memory().unwrap();
        let (mut machine, _clock) = machine();
        machine.log_trigger(TriggerInput::new("sleep")).unwrap();
        db.save_snapshot(machine.snapshot(), 2, false).await.unwrap();

        db.delete_session(machine.session_id()).await.unwrap();
        assert!(db.get_session(machine.session_id()).await.unwrap().is_none());

        let orphaned: i64 = db
            .execute(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM session_triggers", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(orphaned, 0);
    }

    fn clock_now(clock: &ManualClock) -> DateTime<Utc> {
        use crate::timer::Clock;
        clock.now()
    }
}
