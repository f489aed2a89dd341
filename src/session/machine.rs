use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::{ExerciseConfig, Stage},
    error::{EngineError, Result},
    exercise::{self, ExerciseData, ExerciseEvent},
    persistence::{AnalyticsSink, LogAnalytics, NullSink, SessionSink},
    timer::{Clock, StageTimer, SystemClock},
};

use super::state::{
    ExerciseSession, SessionContext, SessionSnapshot, SessionStatus, TerminalRecord, TriggerEntry,
    TriggerInput,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 10;

/// Outcome of a stage advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { from: Stage, to: Stage },
    AtFinalStage,
}

/// External parties a session reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub sink: Arc<dyn SessionSink>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            sink: Arc::new(NullSink),
            analytics: Arc::new(LogAnalytics),
            clock: Arc::new(SystemClock),
        }
    }
}

impl Collaborators {
    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Drives one guided exercise session from its first stage to a terminal
/// status. Owned by the screen that started it; every operation is
/// synchronous and reports to the collaborators before returning.
pub struct SessionStateMachine {
    config: Arc<ExerciseConfig>,
    session: ExerciseSession,
    stage_index: usize,
    timer: StageTimer,
    version: u64,
    collaborators: Collaborators,
}

impl SessionStateMachine {
    pub fn start(
        config: Arc<ExerciseConfig>,
        context: SessionContext,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let now = collaborators.clock.now();
        let session = ExerciseSession {
            session_id: Uuid::new_v4().to_string(),
            config_id: config.id.clone(),
            current_stage: config.stages[0],
            status: SessionStatus::Active,
            pre_rating: None,
            post_rating: None,
            exercise_data: ExerciseData::from_kind(&config.kind),
            triggers: Vec::new(),
            module_context: context.module_context,
            module_screen: context.module_screen,
            started_at: now,
            ended_at: None,
        };

        log_info!(
            "Started {} session {} at stage {}",
            config.id,
            session.session_id,
            session.current_stage
        );

        let mut machine = Self {
            config,
            session,
            stage_index: 0,
            timer: StageTimer::start(now),
            version: 0,
            collaborators,
        };
        machine.persist(false);
        Ok(machine)
    }

    pub fn config(&self) -> &ExerciseConfig {
        &self.config
    }

    pub fn session(&self) -> &ExerciseSession {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn current_stage(&self) -> Stage {
        self.session.current_stage
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn is_paused(&self) -> bool {
        self.session.status == SessionStatus::Paused
    }

    pub fn exercise_data(&self) -> &ExerciseData {
        &self.session.exercise_data
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Active seconds spent in the current stage.
    pub fn current_stage_duration(&self) -> u64 {
        self.timer.stage_secs(self.collaborators.clock.now())
    }

    /// Active seconds since the session started; fixed once terminal.
    pub fn total_duration(&self) -> u64 {
        self.timer.total_secs(self.collaborators.clock.now())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.collaborators.clock.now();
        let session = &self.session;
        SessionSnapshot {
            session_id: session.session_id.clone(),
            config_id: session.config_id.clone(),
            exercise_type: session.exercise_data.exercise_type(),
            current_stage: session.current_stage,
            status: session.status,
            pre_rating: session.pre_rating,
            post_rating: session.post_rating,
            exercise_data: session.exercise_data.clone(),
            triggers: session.triggers.clone(),
            current_stage_duration: self.timer.stage_secs(now),
            total_duration: self.timer.total_secs(now),
            module_context: session.module_context.clone(),
            module_screen: session.module_screen.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            captured_at: now,
        }
    }

    pub fn go_to_next_stage(&mut self) -> Result<Advance> {
        self.ensure_live()?;
        let advance = self.advance_stage();
        if matches!(advance, Advance::Moved { .. }) {
            self.persist(false);
        }
        Ok(advance)
    }

    pub fn set_pre_rating(&mut self, rating: i32) -> Result<()> {
        self.ensure_live()?;
        self.session.pre_rating = Some(validate_rating(rating)?);
        self.persist(false);
        Ok(())
    }

    pub fn set_post_rating(&mut self, rating: i32) -> Result<()> {
        self.ensure_live()?;
        let rating = validate_rating(rating)?;
        if self.session.pre_rating.is_none() {
            return Err(EngineError::Validation(
                "rate how you felt before the exercise first".into(),
            ));
        }
        self.session.post_rating = Some(rating);
        self.persist(false);
        Ok(())
    }

    /// Replace the exercise payload. Only the `exercise` stage takes updates;
    /// elsewhere a valid payload is ignored. When the new payload has reached
    /// its finish condition, the session advances and the move is returned.
    pub fn update_exercise_data(&mut self, next: ExerciseData) -> Result<Option<Advance>> {
        self.ensure_live()?;

        let expected = self.session.exercise_data.exercise_type();
        let actual = next.exercise_type();
        if expected != actual {
            log_error!(
                "Session {}: ignoring {actual} data for a {expected} session",
                self.session.session_id
            );
            return Err(EngineError::TypeMismatch { expected, actual });
        }
        next.check_invariants()
            .and_then(|()| next.check_defaults(&self.config.kind))
            .map_err(EngineError::InvalidExerciseData)?;

        if !self.ensure_exercise_stage() {
            return Ok(None);
        }

        let finished = next.is_finished();
        self.session.exercise_data = next;

        let advance = if finished {
            log_info!(
                "Session {}: exercise finished, advancing",
                self.session.session_id
            );
            Some(self.advance_stage())
        } else {
            None
        };

        self.persist(false);
        Ok(advance)
    }

    /// Run a screen event through the variant reducer and apply the result.
    /// Events that change nothing (blank grounding item, extra cycle, any
    /// event outside the `exercise` stage) return `Ok(None)` without touching
    /// the session.
    pub fn apply_exercise_event(&mut self, event: &ExerciseEvent) -> Result<Option<Advance>> {
        self.ensure_live()?;

        let expected = self.session.exercise_data.exercise_type();
        let actual = event.exercise_type();
        if expected != actual {
            log_error!(
                "Session {}: ignoring {actual} event for a {expected} session",
                self.session.session_id
            );
            return Err(EngineError::TypeMismatch { expected, actual });
        }

        if !self.ensure_exercise_stage() {
            return Ok(None);
        }

        match exercise::reduce(&self.session.exercise_data, event) {
            Some(next) => self.update_exercise_data(next),
            None => Ok(None),
        }
    }

    pub fn log_trigger(&mut self, input: TriggerInput) -> Result<()> {
        self.ensure_live()?;

        let category = input.category.trim();
        if category.is_empty() {
            return Err(EngineError::Validation("please choose a trigger category".into()));
        }
        let custom_text = input
            .custom_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        self.session.triggers.push(TriggerEntry {
            category: category.to_string(),
            custom_text,
            timestamp: input
                .timestamp
                .unwrap_or_else(|| self.collaborators.clock.now()),
        });
        self.persist(false);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.timer.pause(self.collaborators.clock.now()) {
            self.session.status = SessionStatus::Paused;
            self.persist(false);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.timer.resume(self.collaborators.clock.now()) {
            self.session.status = SessionStatus::Active;
            self.persist(false);
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<TerminalRecord> {
        self.ensure_live()?;
        if self.session.current_stage != Stage::Complete {
            return Err(EngineError::PrematureCompletion {
                stage: self.session.current_stage,
            });
        }
        Ok(self.finish(SessionStatus::Completed))
    }

    /// Always succeeds on a live session; the partial record still reaches
    /// persistence and analytics.
    pub fn abandon(&mut self) -> Result<TerminalRecord> {
        self.ensure_live()?;
        log_info!(
            "Session {} abandoned at stage {}",
            self.session.session_id,
            self.session.current_stage
        );
        Ok(self.finish(SessionStatus::Abandoned))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.session.status.is_terminal() {
            return Err(EngineError::SessionEnded {
                session_id: self.session.session_id.clone(),
            });
        }
        Ok(())
    }

    fn ensure_exercise_stage(&self) -> bool {
        let stage = self.session.current_stage;
        if stage != Stage::Exercise {
            log_warn!(
                "Session {}: ignoring exercise input at stage {stage}",
                self.session.session_id
            );
            return false;
        }
        true
    }

    fn advance_stage(&mut self) -> Advance {
        let from = self.session.current_stage;
        let Some(&to) = self.config.stages.get(self.stage_index + 1) else {
            log_warn!(
                "Session {}: already at final stage {from}",
                self.session.session_id
            );
            return Advance::AtFinalStage;
        };

        self.stage_index += 1;
        self.session.current_stage = to;
        self.timer.restart_stage(self.collaborators.clock.now());
        Advance::Moved { from, to }
    }

    fn finish(&mut self, status: SessionStatus) -> TerminalRecord {
        let now = self.collaborators.clock.now();
        self.timer.stop(now);
        self.session.status = status;
        self.session.ended_at = Some(now);

        self.persist(true);

        let record = TerminalRecord::from(&self.snapshot());
        self.collaborators.analytics.record(&record);
        record
    }

    fn persist(&mut self, is_final: bool) {
        self.version += 1;
        let snapshot = self.snapshot();
        self.collaborators.sink.save(snapshot, self.version, is_final);
    }
}

fn validate_rating(rating: i32) -> Result<u8> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(EngineError::Validation(format!(
            "please select a rating between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    Ok(rating as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog;
    use crate::exercise::{BreathingEvent, GroundingEvent};
    use crate::timer::ManualClock;
    use chrono::{TimeZone, Utc};

    fn manual_clock() -> ManualClock {
        ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn start(config: ExerciseConfig, clock: &ManualClock) -> SessionStateMachine {
        let collaborators = Collaborators::default().with_clock(Arc::new(clock.clone()));
        SessionStateMachine::start(Arc::new(config), SessionContext::default(), collaborators)
            .unwrap()
    }

    #[test]
    fn start_uses_first_stage_and_defaults() {
        let clock = manual_clock();
        let machine = start(catalog::box_breathing(), &clock);
        assert_eq!(machine.current_stage(), Stage::PreRating);
        assert_eq!(machine.status(), SessionStatus::Active);
        assert_eq!(machine.version(), 1);
        let data = machine.exercise_data().as_breathing().unwrap();
        assert_eq!(data.completed_cycles, 0);
        assert_eq!(data.target_cycles, 4);
    }

    #[test]
    fn start_rejects_malformed_stages() {
        let mut config = catalog::box_breathing();
        config.stages = vec![Stage::PreRating, Stage::Complete];
        let result = SessionStateMachine::start(
            Arc::new(config),
            SessionContext::default(),
            Collaborators::default(),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn ratings_are_validated() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        assert!(matches!(machine.set_pre_rating(0), Err(EngineError::Validation(_))));
        assert!(matches!(machine.set_pre_rating(11), Err(EngineError::Validation(_))));
        assert!(matches!(machine.set_post_rating(5), Err(EngineError::Validation(_))));

        machine.set_pre_rating(10).unwrap();
        machine.set_post_rating(1).unwrap();
        assert_eq!(machine.session().pre_rating, Some(10));
        assert_eq!(machine.session().post_rating, Some(1));
        assert_eq!(machine.current_stage(), Stage::PreRating);
    }

    #[test]
    fn final_stage_advance_is_a_noop() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        for _ in 0..5 {
            assert!(matches!(machine.go_to_next_stage().unwrap(), Advance::Moved { .. }));
        }
        assert_eq!(machine.current_stage(), Stage::Complete);
        let version = machine.version();
        assert_eq!(machine.go_to_next_stage().unwrap(), Advance::AtFinalStage);
        assert_eq!(machine.version(), version);
    }

    #[test]
    fn stage_advance_resets_stage_duration() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        clock.advance_secs(20);
        assert_eq!(machine.current_stage_duration(), 20);
        machine.go_to_next_stage().unwrap();
        assert_eq!(machine.current_stage_duration(), 0);
        clock.advance_secs(5);
        assert_eq!(machine.current_stage_duration(), 5);
        assert_eq!(machine.total_duration(), 25);
    }

    #[test]
    fn type_mismatch_leaves_data_untouched() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        let before = machine.exercise_data().clone();
        let grounding = ExerciseData::from_kind(&catalog::grounding_54321().kind);

        let err = machine.update_exercise_data(grounding).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
        assert_eq!(machine.exercise_data(), &before);

        let event = ExerciseEvent::Grounding(GroundingEvent::ItemIdentified {
            text: "lamp".into(),
        });
        assert!(matches!(
            machine.apply_exercise_event(&event),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn broken_payload_is_rejected() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        let mut data = machine.exercise_data().as_breathing().unwrap().clone();
        data.completed_cycles = 3;
        let err = machine
            .update_exercise_data(ExerciseData::Breathing(data))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidExerciseData(_)));
    }

    #[test]
    fn finished_data_outside_exercise_stage_does_not_advance() {
        let clock = manual_clock();
        let mut config = catalog::box_breathing();
        if let crate::config::ExerciseKind::Breathing(defaults) = &mut config.kind {
            defaults.target_cycles = 1;
        }
        let mut machine = start(config, &clock);
        let started = clock.now();
        let event = ExerciseEvent::Breathing(BreathingEvent::CycleCompleted {
            started_at: started,
            completed_at: started,
        });

        let advance = machine.apply_exercise_event(&event).unwrap();
        assert_eq!(advance, None);
        assert_eq!(machine.current_stage(), Stage::PreRating);
        assert_eq!(machine.exercise_data().as_breathing().unwrap().completed_cycles, 0);

        // The cycle reported early did not count, so the exercise can still finish.
        machine.go_to_next_stage().unwrap();
        machine.go_to_next_stage().unwrap();
        assert_eq!(
            machine.apply_exercise_event(&event).unwrap(),
            Some(Advance::Moved {
                from: Stage::Exercise,
                to: Stage::PostRating
            })
        );
    }

    #[test]
    fn data_updates_outside_exercise_stage_are_ignored() {
        let clock = manual_clock();
        let mut machine = start(catalog::grounding_54321(), &clock);
        let version = machine.version();
        let next = exercise::reduce(
            machine.exercise_data(),
            &ExerciseEvent::Grounding(GroundingEvent::ItemIdentified {
                text: "window".into(),
            }),
        )
        .unwrap();

        assert_eq!(machine.update_exercise_data(next).unwrap(), None);
        assert_eq!(machine.exercise_data().as_grounding().unwrap().total_identified, 0);
        assert_eq!(machine.version(), version);
    }

    #[test]
    fn grounding_counter_mismatch_is_rejected() {
        let clock = manual_clock();
        let mut machine = start(catalog::grounding_54321(), &clock);
        machine.go_to_next_stage().unwrap();
        machine.go_to_next_stage().unwrap();
        machine
            .apply_exercise_event(&ExerciseEvent::Grounding(GroundingEvent::ItemIdentified {
                text: "window".into(),
            }))
            .unwrap();
        let before = machine.exercise_data().clone();
        let version = machine.version();

        let mut total_off = before.as_grounding().unwrap().clone();
        total_off.total_identified += 1;
        let mut items_off = before.as_grounding().unwrap().clone();
        items_off
            .senses
            .get_mut(&crate::exercise::SenseKey::See)
            .unwrap()
            .items
            .push("door".into());

        for broken in [total_off, items_off] {
            let err = machine
                .update_exercise_data(ExerciseData::Grounding(broken))
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidExerciseData(_)));
        }
        assert_eq!(machine.exercise_data(), &before);
        assert_eq!(machine.version(), version);
    }

    #[test]
    fn config_fixed_fields_cannot_change() {
        let clock = manual_clock();
        let mut breathing = start(catalog::box_breathing(), &clock);
        breathing.go_to_next_stage().unwrap();
        breathing.go_to_next_stage().unwrap();
        let mut shortened = breathing.exercise_data().as_breathing().unwrap().clone();
        shortened.target_cycles = 0;
        let mut renamed = breathing.exercise_data().as_breathing().unwrap().clone();
        renamed.protocol = "4-7-8".into();
        for data in [shortened, renamed] {
            assert!(matches!(
                breathing.update_exercise_data(ExerciseData::Breathing(data)),
                Err(EngineError::InvalidExerciseData(_))
            ));
        }
        assert_eq!(breathing.current_stage(), Stage::Exercise);

        let mut grounding = start(catalog::grounding_54321(), &clock);
        let mut easier = grounding.exercise_data().as_grounding().unwrap().clone();
        for progress in easier.senses.values_mut() {
            progress.target = 0;
        }
        easier.total_target = 0;
        easier.current_sense = None;
        assert!(matches!(
            grounding.update_exercise_data(ExerciseData::Grounding(easier)),
            Err(EngineError::InvalidExerciseData(_))
        ));
    }

    #[test]
    fn blank_trigger_category_is_rejected() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        assert!(matches!(
            machine.log_trigger(TriggerInput::new("  ")),
            Err(EngineError::Validation(_))
        ));

        machine
            .log_trigger(TriggerInput::new("work").with_custom_text("   "))
            .unwrap();
        let entry = &machine.session().triggers[0];
        assert_eq!(entry.category, "work");
        assert_eq!(entry.custom_text, None);
        assert_eq!(entry.timestamp, clock.now());
    }

    #[test]
    fn premature_completion_is_recoverable() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        let err = machine.complete().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(machine.status(), SessionStatus::Active);
    }

    #[test]
    fn terminal_session_rejects_everything() {
        let clock = manual_clock();
        let mut machine = start(catalog::box_breathing(), &clock);
        machine.abandon().unwrap();
        let before = machine.snapshot();

        assert!(matches!(machine.pause(), Err(EngineError::SessionEnded { .. })));
        assert!(matches!(machine.resume(), Err(EngineError::SessionEnded { .. })));
        assert!(matches!(machine.go_to_next_stage(), Err(EngineError::SessionEnded { .. })));
        assert!(matches!(machine.set_pre_rating(5), Err(EngineError::SessionEnded { .. })));
        assert!(matches!(
            machine.log_trigger(TriggerInput::new("work")),
            Err(EngineError::SessionEnded { .. })
        ));
        assert!(matches!(machine.abandon(), Err(EngineError::SessionEnded { .. })));

        clock.advance_secs(60);
        let mut after = machine.snapshot();
        after.captured_at = before.captured_at;
        assert_eq!(after, before);
    }

    #[test]
    fn abandon_while_paused_excludes_the_pause() {
        let clock = manual_clock();
        let mut machine = start(catalog::grounding_54321(), &clock);
        clock.advance_secs(15);
        machine.pause().unwrap();
        clock.advance_secs(300);
        let record = machine.abandon().unwrap();
        assert_eq!(record.status, SessionStatus::Abandoned);
        assert_eq!(record.total_duration, 15);
    }
}
