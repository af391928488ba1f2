//! Persistence and notification boundaries used by the session engine.

use crate::{PrescribedExercise, Result, Session, SessionSummary, SetRecord, Workout};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage contract for workouts, sessions and set records
///
/// Every call completes (or fails) before it returns. Implementations must
/// make `upsert_record` and `ensure_block_instance` idempotent.
pub trait Gateway {
    fn read_workout(&self, workout_id: &str) -> Result<Workout>;

    /// Return the latest unfinished session for the workout, or create one
    fn open_session(&mut self, workout_id: &str, started_at: DateTime<Utc>) -> Result<Session>;

    fn read_records(&self, session_id: Uuid, block_id: &str) -> Result<Vec<SetRecord>>;

    /// Create the block-level record that set records in this block hang off
    fn ensure_block_instance(&mut self, session_id: Uuid, workout_id: &str, block_id: &str) -> Result<()>;

    /// Insert or replace the record addressed by (session, block, exercise, set)
    fn upsert_record(&mut self, record: &SetRecord) -> Result<()>;

    /// Checkpoint elapsed time for an in-progress session
    fn save_progress(&mut self, session_id: Uuid, elapsed_seconds: i64) -> Result<()>;

    fn finalize_session(
        &mut self,
        session_id: Uuid,
        completed: bool,
        summary: &SessionSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Put `exercise_id` into the given slot and return the block's refreshed
    /// exercise list
    fn swap_exercise(
        &mut self,
        workout_id: &str,
        block_id: &str,
        slot: u32,
        exercise_id: &str,
    ) -> Result<Vec<PrescribedExercise>>;
}

/// Schedules a one-time alert outside the app (best effort)
pub trait Notifier {
    fn schedule(&mut self, message: &str, delay: std::time::Duration);

    /// Withdraw anything scheduled and not yet delivered
    fn cancel(&mut self) {}
}
