//! Live session engine.
//!
//! A `WorkoutSession` owns the planned steps, the current position and both
//! timers. Every call takes `now` explicitly; the host decides how often to
//! tick and the engine stays correct however irregular that is.
//!
//! Lifecycle:
//! 1. `start` plans the workout, loads saved records and resumes at the first
//!    incomplete step
//! 2. `advance` saves the current step, starts its rest and moves on
//! 3. `finish` (or passing the last step) writes the summary
//! 4. `teardown` flushes what it can; afterwards every call is a no-op

use crate::clock::SessionClock;
use crate::defaults::{resolve_defaults, InputDefaults};
use crate::gateway::{Gateway, Notifier};
use crate::planner::plan_workout;
use crate::rest::{RestTick, RestTimer, DEFAULT_ALERT_SECONDS};
use crate::resume::{index_records, locate_resume, RecordIndex, ResumePoint};
use crate::summary::summarize;
use crate::swap::{relocate, replan_block, SwapOrigin};
use crate::{
    config::SessionConfig, Error, Measurements, Result, Session, SessionSummary, SetRecord, Step,
    StepKey, Workout,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub rest_alert_seconds: u32,
    pub default_rest_seconds: Option<u32>,
    pub notify_rest: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rest_alert_seconds: DEFAULT_ALERT_SECONDS,
            default_rest_seconds: None,
            notify_rest: true,
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            rest_alert_seconds: config.rest_alert_seconds,
            default_rest_seconds: config.default_rest_seconds,
            notify_rest: config.notify_rest,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user to perform the current step
    Active,
    /// Resting before the current step
    Resting,
    /// Every step passed (or the user ended early); terminal
    Complete,
}

/// Non-fatal conditions for the host to surface
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    SaveFailed { key: StepKey, error: String },
    /// The session ended locally but its summary is not stored yet;
    /// `finish` or `teardown` retries
    FinalizeFailed { error: String },
}

/// What the user logged for a step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetEntry {
    pub measurements: Measurements,
    pub note: String,
}

impl From<InputDefaults> for SetEntry {
    fn from(defaults: InputDefaults) -> Self {
        Self {
            measurements: defaults.measurements,
            note: defaults.note,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Advance {
    Next {
        index: usize,
        rest_seconds: Option<u32>,
    },
    Finished(SessionSummary),
    /// The session was torn down; nothing happened
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub elapsed_seconds: i64,
    pub rest: RestTick,
}

pub struct WorkoutSession<G, N> {
    gateway: G,
    notifier: N,
    options: SessionOptions,
    workout: Workout,
    session: Session,
    steps: Vec<Step>,
    records: RecordIndex,
    /// Records kept locally whose save failed
    outstanding: BTreeSet<StepKey>,
    block_instances: HashSet<String>,
    position: usize,
    phase: Phase,
    clock: SessionClock,
    rest: RestTimer,
    notices: Vec<Notice>,
    /// Ended locally, summary not yet accepted by the gateway
    finalize_pending: bool,
    torn_down: bool,
}

impl<G: Gateway, N: Notifier> WorkoutSession<G, N> {
    /// Open (or resume) a session for `workout_id`
    pub fn start(
        mut gateway: G,
        notifier: N,
        options: SessionOptions,
        workout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let workout = gateway.read_workout(workout_id)?;
        let steps = plan_workout(&workout);
        if steps.is_empty() {
            return Err(Error::EmptyWorkout(workout.id));
        }

        let session = gateway.open_session(&workout.id, now)?;
        session.require_workout()?;

        let mut records = RecordIndex::new();
        for block in &workout.blocks {
            records.extend(index_records(gateway.read_records(session.id, &block.id)?));
        }

        let point = locate_resume(&workout.id, &steps, &records)?;

        let mut clock = SessionClock::new();
        clock.resync(session.elapsed_seconds, now);

        let rest = RestTimer::new(options.rest_alert_seconds);
        let mut this = Self {
            gateway,
            notifier,
            options,
            workout,
            session,
            steps,
            records,
            outstanding: BTreeSet::new(),
            block_instances: HashSet::new(),
            position: 0,
            phase: Phase::Active,
            clock,
            rest,
            notices: Vec::new(),
            finalize_pending: false,
            torn_down: false,
        };

        match point {
            ResumePoint::At(index) => {
                this.position = index;
                this.clock.resume(now);
                tracing::info!(
                    "Session {} for '{}' at step {}/{}",
                    this.session.id,
                    this.workout.name,
                    index + 1,
                    this.steps.len()
                );
            }
            ResumePoint::Complete => {
                this.position = this.steps.len() - 1;
                tracing::info!(
                    "Every step of session {} is already complete",
                    this.session.id
                );
                if let Err(e) = this.finish(now) {
                    tracing::warn!("Failed to finalize completed session: {}", e);
                }
            }
        }

        Ok(this)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn workout(&self) -> &Workout {
        &self.workout
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused() && !self.is_complete()
    }

    /// The step to perform next; `None` once complete
    pub fn current_step(&self) -> Option<&Step> {
        if self.is_complete() {
            return None;
        }
        self.steps.get(self.position)
    }

    pub fn records(&self) -> &RecordIndex {
        &self.records
    }

    /// Pre-filled values for the current step
    pub fn defaults(&self) -> Option<InputDefaults> {
        if self.is_complete() {
            return None;
        }
        resolve_defaults(&self.steps, self.position, &self.records)
    }

    pub fn elapsed_seconds(&self) -> i64 {
        self.clock.elapsed()
    }

    pub fn rest_remaining(&self) -> Option<u32> {
        self.rest.is_active().then(|| self.rest.remaining())
    }

    pub fn outstanding_saves(&self) -> usize {
        self.outstanding.len()
    }

    /// Drain notices accumulated since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.torn_down {
            return Tick {
                elapsed_seconds: self.clock.elapsed(),
                rest: RestTick::Idle,
            };
        }

        let elapsed_seconds = self.clock.tick(now);
        let rest = self.rest.tick(now);
        if rest == RestTick::Finished && self.phase == Phase::Resting {
            self.phase = Phase::Active;
        }

        Tick {
            elapsed_seconds,
            rest,
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.torn_down || self.is_complete() {
            return;
        }
        self.clock.pause(now);
        self.rest.pause(now);
        self.checkpoint(now);
        tracing::info!("Session paused at {}s", self.clock.elapsed());
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.torn_down || self.is_complete() {
            return;
        }
        self.clock.resume(now);
        self.rest.resume(now);
        tracing::info!("Session resumed at {}s", self.clock.elapsed());
    }

    /// Cut the current rest short
    pub fn skip_rest(&mut self) {
        if self.torn_down {
            return;
        }
        if self.rest.skip() {
            self.notifier.cancel();
            if self.phase == Phase::Resting {
                self.phase = Phase::Active;
            }
        }
    }

    pub fn extend_rest(&mut self, seconds: i64, now: DateTime<Utc>) {
        if !self.torn_down {
            self.rest.extend(seconds, now);
        }
    }

    // ------------------------------------------------------------------
    // Step transitions
    // ------------------------------------------------------------------

    /// Save the current step and move to the next one
    ///
    /// A failed save is logged and reported through `take_notices`; the
    /// record stays in local state and the session still advances.
    pub fn advance(&mut self, entry: SetEntry, now: DateTime<Utc>) -> Result<Advance> {
        if self.torn_down {
            return Ok(Advance::Ignored);
        }
        if self.is_complete() {
            return Err(Error::State("session is already complete".into()));
        }
        let workout_id = self.session.require_workout()?.to_string();
        let step = self.steps[self.position].clone();

        self.stop_rest();

        let record = SetRecord {
            session_id: self.session.id,
            block_id: step.block.id.clone(),
            exercise_id: step.exercise.exercise_id.clone(),
            set_index: step.set_index,
            measurements: entry.measurements,
            completed: true,
            note: entry.note,
            recorded_at: now,
        };
        self.save_record(&workout_id, record);

        if self.position + 1 >= self.steps.len() {
            let summary = match self.finish(now) {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!("Failed to finalize session {}: {}", self.session.id, e);
                    self.notices.push(Notice::FinalizeFailed {
                        error: e.to_string(),
                    });
                    self.session.summary.clone().unwrap_or_default()
                }
            };
            return Ok(Advance::Finished(summary));
        }

        self.checkpoint(now);
        self.position += 1;

        let rest_seconds = step
            .exercise
            .rest_seconds
            .or(self.options.default_rest_seconds)
            .filter(|s| *s > 0);

        match rest_seconds {
            Some(seconds) => {
                self.rest.start(seconds, now);
                if self.clock.is_paused() {
                    self.rest.pause(now);
                }
                self.phase = Phase::Resting;
                if self.options.notify_rest {
                    let next = &self.steps[self.position];
                    let message = format!(
                        "Rest over: {} set {} of {}",
                        next.exercise.exercise_id,
                        next.set_index + 1,
                        next.total_sets
                    );
                    self.notifier
                        .schedule(&message, std::time::Duration::from_secs(u64::from(seconds)));
                }
            }
            None => self.phase = Phase::Active,
        }

        Ok(Advance::Next {
            index: self.position,
            rest_seconds,
        })
    }

    /// Jump to any step, e.g. to revisit one already done
    pub fn go_to(&mut self, index: usize) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.is_complete() {
            return Err(Error::State("session is already complete".into()));
        }
        if index >= self.steps.len() {
            return Err(Error::State(format!(
                "step {} is out of range (1-{})",
                index + 1,
                self.steps.len()
            )));
        }
        self.stop_rest();
        self.position = index;
        self.phase = Phase::Active;
        Ok(())
    }

    pub fn back(&mut self) -> Result<()> {
        match self.position.checked_sub(1) {
            Some(index) => self.go_to(index),
            None => Ok(()),
        }
    }

    /// Replace the exercise in the current step's slot
    ///
    /// On any error the step list and position are left exactly as they were.
    pub fn swap_exercise(&mut self, exercise_id: &str) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.is_complete() {
            return Err(Error::State("session is already complete".into()));
        }
        let workout_id = self.session.require_workout()?.to_string();
        let origin = SwapOrigin::from(&self.steps[self.position]);

        let block_index = self
            .workout
            .blocks
            .iter()
            .position(|b| b.id == origin.block_id)
            .ok_or_else(|| Error::NotFound(format!("block '{}'", origin.block_id)))?;

        let exercises =
            self.gateway
                .swap_exercise(&workout_id, &origin.block_id, origin.slot, exercise_id)?;
        if exercises.is_empty() {
            return Err(Error::Swap(format!(
                "no exercises returned for block '{}'",
                origin.block_id
            )));
        }

        let mut block = self.workout.blocks[block_index].clone();
        block.exercises = exercises;

        let steps = replan_block(&self.steps, &block);
        let position = relocate(&self.workout.id, &steps, &origin, &self.records)?
            .unwrap_or_else(|| self.position.min(steps.len() - 1));

        // A rest counting down for a step that moved or changed is stale
        let moved = position != self.position
            || steps.get(position).map(Step::key) != self.steps.get(self.position).map(Step::key);
        if moved {
            self.stop_rest();
        }

        self.workout.blocks[block_index] = block;
        self.steps = steps;
        self.position = position;

        tracing::info!(
            "Swapped slot {} of block '{}' to '{}', now at step {}",
            origin.slot,
            origin.block_id,
            exercise_id,
            position + 1
        );
        Ok(())
    }

    /// End the session, writing its summary
    ///
    /// `completed` is recorded as true only if every step has a completed
    /// record, so ending early is distinguishable from finishing. The session
    /// is complete locally even when the gateway rejects the summary; calling
    /// again retries the write.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<SessionSummary> {
        if self.torn_down {
            return Err(Error::State("session has been torn down".into()));
        }
        if !self.session.is_finished() {
            self.stop_rest();
            self.close(now);
        }
        if self.finalize_pending {
            self.flush_outstanding();
            self.write_summary()?;
        }
        Ok(self.session.summary.clone().unwrap_or_default())
    }

    /// Freeze the clock and settle the summary in local state
    fn close(&mut self, now: DateTime<Utc>) {
        let elapsed = self.clock.tick(now);
        let summary = summarize(self.records.values(), elapsed);
        let completed = self.steps.iter().all(|s| {
            self.records
                .get(&s.key())
                .map_or(false, |r| r.completed)
        });

        self.clock.pause(now);
        self.session.completed = completed;
        self.session.elapsed_seconds = elapsed;
        self.session.finished_at = Some(now);
        self.session.summary = Some(summary);
        self.phase = Phase::Complete;
        self.finalize_pending = true;
    }

    fn write_summary(&mut self) -> Result<()> {
        let (Some(summary), Some(finished_at)) =
            (self.session.summary.clone(), self.session.finished_at)
        else {
            return Err(Error::State("session has not ended".into()));
        };

        self.gateway.finalize_session(
            self.session.id,
            self.session.completed,
            &summary,
            finished_at,
        )?;
        self.finalize_pending = false;

        tracing::info!(
            "Session {} finished (completed: {}, {}s, {:.1} kg)",
            self.session.id,
            self.session.completed,
            summary.duration_seconds,
            summary.volume_kg
        );
        Ok(())
    }

    /// Flush what can be saved, then detach from the host
    ///
    /// Errors here are logged and dropped.
    pub fn teardown(&mut self, now: DateTime<Utc>) {
        if self.torn_down {
            return;
        }
        self.stop_rest();
        if self.finalize_pending {
            self.flush_outstanding();
            if let Err(e) = self.write_summary() {
                tracing::warn!("Session {} left unfinalized: {}", self.session.id, e);
            }
        } else if !self.is_complete() {
            self.flush_outstanding();
            self.checkpoint(now);
            self.clock.pause(now);
        }
        self.torn_down = true;
        tracing::info!("Session {} torn down", self.session.id);
    }

    // ------------------------------------------------------------------
    // Persistence helpers
    // ------------------------------------------------------------------

    fn save_record(&mut self, workout_id: &str, record: SetRecord) {
        let key = record.key();
        let result = self.persist(workout_id, &record);
        self.records.insert(key.clone(), record);

        match result {
            Ok(()) => {
                self.outstanding.remove(&key);
            }
            Err(e) => {
                tracing::warn!("Failed to save {}: {}", key, e);
                self.notices.push(Notice::SaveFailed {
                    key: key.clone(),
                    error: e.to_string(),
                });
                self.outstanding.insert(key);
            }
        }
    }

    fn persist(&mut self, workout_id: &str, record: &SetRecord) -> Result<()> {
        if !self.block_instances.contains(&record.block_id) {
            self.gateway
                .ensure_block_instance(self.session.id, workout_id, &record.block_id)?;
            self.block_instances.insert(record.block_id.clone());
        }
        self.gateway.upsert_record(record)
    }

    /// Retry every save that failed earlier; returns how many still fail
    pub fn flush_outstanding(&mut self) -> usize {
        if self.outstanding.is_empty() {
            return 0;
        }
        let workout_id = match self.session.require_workout() {
            Ok(id) => id.to_string(),
            Err(e) => {
                tracing::warn!("Cannot flush outstanding saves: {}", e);
                return self.outstanding.len();
            }
        };

        let pending = std::mem::take(&mut self.outstanding);
        for key in pending {
            let Some(record) = self.records.get(&key).cloned() else {
                continue;
            };
            if let Err(e) = self.persist(&workout_id, &record) {
                tracing::warn!("Retry of {} failed: {}", key, e);
                self.outstanding.insert(key);
            }
        }

        if !self.outstanding.is_empty() {
            tracing::warn!("{} set(s) remain unsaved", self.outstanding.len());
        }
        self.outstanding.len()
    }

    /// Drop any countdown along with its pending notification
    fn stop_rest(&mut self) {
        if self.rest.is_active() {
            self.notifier.cancel();
        }
        self.rest.cancel();
        if self.phase == Phase::Resting {
            self.phase = Phase::Active;
        }
    }

    fn checkpoint(&mut self, now: DateTime<Utc>) {
        let elapsed = self.clock.tick(now);
        self.session.elapsed_seconds = elapsed;
        if let Err(e) = self.gateway.save_progress(self.session.id, elapsed) {
            tracing::warn!("Failed to checkpoint session progress: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::tests::{block, exercise};
    use crate::store::{Database, MemoryStore};
    use crate::{Exercise, LoadUnit, Quantity};
    use chrono::{Duration, TimeZone};

    #[derive(Default)]
    struct RecordingNotifier {
        scheduled: Vec<(String, std::time::Duration)>,
        cancelled: usize,
    }

    impl Notifier for RecordingNotifier {
        fn schedule(&mut self, message: &str, delay: std::time::Duration) {
            self.scheduled.push((message.to_string(), delay));
        }

        fn cancel(&mut self) {
            self.cancelled += 1;
        }
    }

    type TestSession = WorkoutSession<MemoryStore, RecordingNotifier>;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(seconds)
    }

    fn kg(value: f64) -> Option<Quantity<LoadUnit>> {
        Some(Quantity::new(value, LoadUnit::Kg))
    }

    fn lifted(reps: u32, load: f64) -> SetEntry {
        SetEntry {
            measurements: Measurements {
                reps: Some(reps),
                load: kg(load),
                ..Default::default()
            },
            note: String::new(),
        }
    }

    /// warmup: row x1 | main: squat x2 (rest 60), bench x2, deadlift x4 | finisher circuit
    fn store() -> MemoryStore {
        crate::logging::init_test();
        let mut squat = exercise("squat", 0, 2);
        squat.rest_seconds = Some(60);
        squat.target = Measurements {
            reps: Some(5),
            load: kg(80.0),
            ..Default::default()
        };

        let mut db = Database::default();
        db.add_workout(Workout {
            id: "w".into(),
            name: "Full Body".into(),
            blocks: vec![
                block("warmup", 0, false, vec![exercise("row", 0, 1)]),
                block(
                    "main",
                    1,
                    false,
                    vec![squat, exercise("bench", 1, 2), exercise("deadlift", 2, 4)],
                ),
                block(
                    "finisher",
                    2,
                    true,
                    vec![exercise("burpee", 0, 2), exercise("swing", 1, 1)],
                ),
            ],
        })
        .unwrap();
        db.add_exercise(Exercise {
            id: "rdl".into(),
            name: "Romanian Deadlift".into(),
            default_sets: Some(2),
            default_target: None,
        });
        MemoryStore::new(db)
    }

    fn start(store: MemoryStore, now: DateTime<Utc>) -> TestSession {
        WorkoutSession::start(
            store,
            RecordingNotifier::default(),
            SessionOptions::default(),
            "w",
            now,
        )
        .unwrap()
    }

    fn run_to(session: &mut TestSession, index: usize, now: DateTime<Utc>) {
        while session.position() < index {
            session.advance(SetEntry::default(), now).unwrap();
        }
    }

    #[test]
    fn test_fresh_session_starts_at_first_step() {
        let session = start(store(), t0());
        assert_eq!(session.steps().len(), 12);
        assert_eq!(session.position(), 0);
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.current_step().unwrap().exercise.exercise_id, "row");
    }

    #[test]
    fn test_advance_saves_and_starts_rest() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(30)).unwrap();

        let outcome = session.advance(lifted(5, 100.0), at(90)).unwrap();
        assert_eq!(
            outcome,
            Advance::Next {
                index: 2,
                rest_seconds: Some(60)
            }
        );
        assert_eq!(session.phase(), Phase::Resting);
        assert_eq!(session.gateway().upserts, 2);
        assert_eq!(session.notifier().scheduled.len(), 1);
        assert_eq!(
            session.notifier().scheduled[0].1,
            std::time::Duration::from_secs(60)
        );

        // Rest auto-advances back to an active step
        assert_eq!(session.tick(at(120)).rest, RestTick::Counting { remaining: 30 });
        assert_eq!(session.tick(at(150)).rest, RestTick::Finished);
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.tick(at(151)).rest, RestTick::Idle);
    }

    #[test]
    fn test_carry_forward_then_own_record_wins() {
        let mut session = start(store(), t0());
        run_to(&mut session, 1, at(10));
        session.advance(lifted(5, 100.0), at(60)).unwrap();

        let defaults = session.defaults().unwrap();
        assert_eq!(defaults.measurements.load, kg(100.0));

        session.advance(lifted(5, 90.0), at(200)).unwrap();
        session.back().unwrap();
        assert_eq!(session.current_step().unwrap().set_index, 1);
        assert_eq!(session.defaults().unwrap().measurements.load, kg(90.0));
    }

    #[test]
    fn test_resume_picks_up_where_left_off() {
        let mut session = start(store(), t0());
        run_to(&mut session, 3, at(100));
        session.teardown(at(100));
        let store = session.gateway().clone();

        let resumed = start(store, at(5000));
        assert_eq!(resumed.position(), 3);
        assert_eq!(resumed.session().id, session.session().id);
        // The clock continues from the checkpoint, not from wall time
        assert_eq!(resumed.elapsed_seconds(), 100);
    }

    #[test]
    fn test_save_failure_still_advances() {
        let mut store = store();
        store.fail_writes = true;
        let mut session = start(store, t0());

        let outcome = session.advance(lifted(8, 40.0), at(20)).unwrap();
        assert!(matches!(outcome, Advance::Next { index: 1, .. }));
        assert_eq!(session.outstanding_saves(), 1);

        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Notice::SaveFailed { key, .. } if key.exercise_id == "row"));
        assert!(session.take_notices().is_empty());

        // Local state still has the set, so defaults and summary see it
        assert_eq!(session.records().len(), 1);
    }

    #[test]
    fn test_outstanding_saves_are_flushed_on_finish() {
        let mut store = store();
        store.fail_writes = true;
        let mut session = start(store, t0());
        session.advance(lifted(8, 40.0), at(20)).unwrap();
        assert_eq!(session.outstanding_saves(), 1);

        session.gateway.fail_writes = false;
        session.finish(at(100)).unwrap();
        assert_eq!(session.outstanding_saves(), 0);
        assert_eq!(session.gateway().db.records.len(), 1);
    }

    #[test]
    fn test_finishing_last_step_finalizes() {
        let mut session = start(store(), t0());
        let last = session.steps().len() - 1;
        run_to(&mut session, last, at(10));

        let summary = match session.advance(lifted(10, 24.0), at(900)).unwrap() {
            Advance::Finished(summary) => summary,
            other => panic!("expected Finished, got {:?}", other),
        };
        assert_eq!(summary.duration_seconds, 900);
        assert_eq!(summary.volume_kg, 240.0);
        assert!(session.is_complete());
        assert!(session.current_step().is_none());

        let stored = &session.gateway().db.sessions[&session.session().id];
        assert!(stored.completed);
        assert_eq!(stored.summary.as_ref().unwrap().duration_seconds, 900);

        assert!(matches!(
            session.advance(SetEntry::default(), at(901)),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn test_finish_early_is_not_completed() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(10)).unwrap();
        session.finish(at(20)).unwrap();

        let stored = &session.gateway().db.sessions[&session.session().id];
        assert!(!stored.completed);
        assert!(stored.finished_at.is_some());
    }

    #[test]
    fn test_fully_recorded_session_opens_complete() {
        let mut session = start(store(), t0());
        let steps = session.steps().len();
        for _ in 0..steps - 1 {
            session.advance(SetEntry::default(), at(10)).unwrap();
        }
        // Simulate a crash right before the last advance finalized
        session.save_record("w", SetRecord {
            session_id: session.session().id,
            block_id: "finisher".into(),
            exercise_id: "burpee".into(),
            set_index: 1,
            measurements: Measurements::default(),
            completed: true,
            note: String::new(),
            recorded_at: at(20),
        });
        let store = session.gateway().clone();

        let reopened = start(store, at(30));
        assert!(reopened.is_complete());
        assert!(reopened.session().completed);
    }

    #[test]
    fn test_pause_freezes_clock_and_rest() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(0)).unwrap();
        session.advance(lifted(5, 80.0), at(0)).unwrap(); // 60s rest

        session.tick(at(10));
        session.pause(at(10));
        assert!(session.is_paused());
        assert_eq!(session.tick(at(70)).elapsed_seconds, 10);
        assert_eq!(session.rest_remaining(), Some(50));

        session.resume(at(70));
        let tick = session.tick(at(80));
        assert_eq!(tick.elapsed_seconds, 20);
        assert_eq!(tick.rest, RestTick::Counting { remaining: 40 });
    }

    #[test]
    fn test_delayed_tick_catches_up() {
        let mut session = start(store(), t0());
        assert_eq!(session.tick(at(10)).elapsed_seconds, 10);
    }

    #[test]
    fn test_swap_to_shorter_exercise_keeps_slot() {
        let mut session = start(store(), t0());
        // row0, squat0, squat1, bench0, bench1, deadlift0..3
        run_to(&mut session, 7, at(10));
        assert_eq!(session.current_step().unwrap().set_index, 2);
        session.skip_rest();

        session.swap_exercise("rdl").unwrap();
        let step = session.current_step().unwrap();
        assert_eq!(step.exercise.exercise_id, "rdl");
        assert_eq!(step.set_index, 0);
        assert_eq!(step.block.id, "main");
        assert_eq!(session.steps().len(), 10);
        assert_eq!(session.steps()[0].exercise.exercise_id, "row");
        assert_eq!(session.elapsed_seconds(), 10);
    }

    #[test]
    fn test_failed_swap_changes_nothing() {
        let mut store = store();
        store.fail_swaps = true;
        let mut session = start(store, t0());
        run_to(&mut session, 7, at(10));
        let before = session.steps().to_vec();

        assert!(session.swap_exercise("rdl").is_err());
        assert_eq!(session.steps(), &before[..]);
        assert_eq!(session.position(), 7);
    }

    #[test]
    fn test_swap_to_unknown_exercise_is_reported() {
        let mut session = start(store(), t0());
        run_to(&mut session, 5, at(10));
        assert!(matches!(
            session.swap_exercise("nope"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(session.position(), 5);
    }

    #[test]
    fn test_missing_workout_association_short_circuits() {
        let mut session = start(store(), t0());
        session.session.workout_id = None;

        assert!(matches!(
            session.advance(SetEntry::default(), at(1)),
            Err(Error::MissingWorkout(_))
        ));
        assert!(matches!(
            session.swap_exercise("rdl"),
            Err(Error::MissingWorkout(_))
        ));
        assert_eq!(session.gateway().upserts, 0);
    }

    #[test]
    fn test_empty_workout_cannot_start() {
        let mut db = Database::default();
        db.add_workout(Workout {
            id: "empty".into(),
            name: "Nothing".into(),
            blocks: vec![block("b", 0, false, vec![])],
        })
        .unwrap();

        let result = WorkoutSession::start(
            MemoryStore::new(db),
            RecordingNotifier::default(),
            SessionOptions::default(),
            "empty",
            t0(),
        );
        assert!(matches!(result, Err(Error::EmptyWorkout(_))));
    }

    #[test]
    fn test_torn_down_session_ignores_everything() {
        let mut session = start(store(), t0());
        session.teardown(at(5));

        assert_eq!(
            session.advance(SetEntry::default(), at(6)).unwrap(),
            Advance::Ignored
        );
        assert!(session.swap_exercise("rdl").is_ok());
        assert_eq!(session.position(), 0);
        assert_eq!(session.gateway().upserts, 0);
        assert_eq!(session.tick(at(100)).elapsed_seconds, 5);
    }

    #[test]
    fn test_default_rest_applies_when_unprescribed() {
        let options = SessionOptions {
            default_rest_seconds: Some(45),
            notify_rest: false,
            ..Default::default()
        };
        let mut session = WorkoutSession::start(
            store(),
            RecordingNotifier::default(),
            options,
            "w",
            t0(),
        )
        .unwrap();

        let outcome = session.advance(SetEntry::default(), at(1)).unwrap();
        assert_eq!(
            outcome,
            Advance::Next {
                index: 1,
                rest_seconds: Some(45)
            }
        );
        assert!(session.notifier().scheduled.is_empty());
    }

    #[test]
    fn test_finalize_failure_on_last_step_still_completes() {
        let mut session = start(store(), t0());
        let last = session.steps().len() - 1;
        run_to(&mut session, last, at(10));

        session.gateway.fail_writes = true;
        let outcome = session.advance(lifted(10, 24.0), at(900)).unwrap();
        assert!(matches!(outcome, Advance::Finished(ref s) if s.duration_seconds == 900));
        assert!(session.is_complete());
        assert!(session
            .take_notices()
            .iter()
            .any(|n| matches!(n, Notice::FinalizeFailed { .. })));
        assert!(!session.gateway().db.sessions[&session.session().id].is_finished());

        // The store comes back before the host detaches
        session.gateway.fail_writes = false;
        session.teardown(at(950));
        let stored = &session.gateway().db.sessions[&session.session().id];
        assert!(stored.completed);
        assert_eq!(stored.finished_at, Some(at(900)));
        assert_eq!(stored.summary.as_ref().unwrap().volume_kg, 240.0);
        assert_eq!(session.outstanding_saves(), 0);
    }

    #[test]
    fn test_finish_retries_after_gateway_failure() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(10)).unwrap();

        session.gateway.fail_writes = true;
        assert!(session.finish(at(20)).is_err());
        assert!(session.is_complete());

        session.gateway.fail_writes = false;
        let summary = session.finish(at(60)).unwrap();
        assert_eq!(summary.duration_seconds, 20);
        let stored = &session.gateway().db.sessions[&session.session().id];
        assert_eq!(stored.finished_at, Some(at(20)));
    }

    #[test]
    fn test_swap_during_rest_cancels_it() {
        let options = SessionOptions {
            default_rest_seconds: Some(30),
            ..Default::default()
        };
        let mut session = WorkoutSession::start(
            store(),
            RecordingNotifier::default(),
            options,
            "w",
            t0(),
        )
        .unwrap();
        run_to(&mut session, 7, at(10));
        assert_eq!(session.phase(), Phase::Resting);
        assert_eq!(session.rest_remaining(), Some(30));
        let cancelled = session.notifier().cancelled;

        session.swap_exercise("rdl").unwrap();
        assert_eq!(session.position(), 5);
        assert_eq!(session.current_step().unwrap().exercise.exercise_id, "rdl");
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.rest_remaining(), None);
        assert_eq!(session.tick(at(60)).rest, RestTick::Idle);
        assert_eq!(session.notifier().cancelled, cancelled + 1);
    }

    #[test]
    fn test_extend_rest_moves_deadline() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(0)).unwrap();
        session.advance(lifted(5, 80.0), at(0)).unwrap(); // 60s rest

        session.extend_rest(30, at(10));
        assert_eq!(session.rest_remaining(), Some(80));
        assert_eq!(session.tick(at(20)).rest, RestTick::Counting { remaining: 70 });

        session.extend_rest(-100, at(20));
        assert_eq!(session.tick(at(20)).rest, RestTick::Finished);
        assert_eq!(session.phase(), Phase::Active);
    }

    #[test]
    fn test_skip_rest_withdraws_notification() {
        let mut session = start(store(), t0());
        session.advance(SetEntry::default(), at(0)).unwrap();
        session.advance(lifted(5, 80.0), at(0)).unwrap();
        assert_eq!(session.notifier().scheduled.len(), 1);

        session.skip_rest();
        assert_eq!(session.notifier().cancelled, 1);
        assert_eq!(session.phase(), Phase::Active);

        // Nothing left to withdraw
        session.skip_rest();
        session.go_to(0).unwrap();
        assert_eq!(session.notifier().cancelled, 1);
    }

    #[test]
    fn test_go_to_out_of_range() {
        let mut session = start(store(), t0());
        assert!(session.go_to(99).is_err());
        session.go_to(4).unwrap();
        assert_eq!(session.position(), 4);
    }
}
